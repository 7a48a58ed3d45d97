// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `/dotclaw` admin command surface.
//!
//! Commands arrive as ordinary chat messages and are intercepted by the
//! pipeline before routing. Cross-group commands only work from the main
//! group; everything else operates on the sender's own group.

use async_trait::async_trait;
use dotclaw_adapters::MemoryStore;
use dotclaw_core::{
    ChatId, Clock, GroupFolder, HookEvent, QueuedMessage, RegisteredGroup,
};
use dotclaw_engine::{CommandHandler, HookBus};
use dotclaw_storage::{iso_from_ms, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Rejection sent when a main-only command is used elsewhere.
pub const MAIN_ONLY_ERROR: &str = "This command is only available from the main group.";

const HELP_TEXT: &str = "DotClaw admin commands:\n\
/dotclaw groups — list registered groups\n\
/dotclaw add-group <chat_id> <folder> [name…] — register a chat\n\
/dotclaw remove-group <chat_id> — unregister a chat\n\
/dotclaw set-model <folder> <model|default> — override a group's model\n\
/dotclaw remember <text…> — save a memory for this group\n\
/dotclaw memory <query…> — search this group's memories\n\
/dotclaw style <text…> — set this group's style notes\n\
/dotclaw tools <text…> — set this group's tool guidance\n\
/dotclaw caution <text…> — set this group's caution notes\n\
/dotclaw skill install|remove|list|update — manage this group's skills";

pub struct AdminCommands<C: Clock> {
    store: Store,
    memory: Arc<dyn MemoryStore>,
    hooks: Arc<HookBus>,
    groups_dir: PathBuf,
    clock: C,
}

impl<C: Clock> AdminCommands<C> {
    pub fn new(
        store: Store,
        memory: Arc<dyn MemoryStore>,
        hooks: Arc<HookBus>,
        groups_dir: PathBuf,
        clock: C,
    ) -> Self {
        Self {
            store,
            memory,
            hooks,
            groups_dir,
            clock,
        }
    }

    async fn dispatch(&self, group: &RegisteredGroup, argv: &[&str]) -> String {
        let subcommand = argv.first().copied().unwrap_or("help");
        let main_only = matches!(
            subcommand,
            "groups" | "add-group" | "remove-group" | "set-model" | "skill"
        );
        if main_only && !group.folder.is_main() {
            return MAIN_ONLY_ERROR.to_string();
        }

        match subcommand {
            "help" => HELP_TEXT.to_string(),
            "groups" => self.cmd_groups(),
            "add-group" => self.cmd_add_group(&argv[1..]),
            "remove-group" => self.cmd_remove_group(&argv[1..]),
            "set-model" => self.cmd_set_model(&argv[1..]),
            "remember" => self.cmd_remember(group, &argv[1..]).await,
            "memory" => self.cmd_memory(group, &argv[1..]).await,
            "style" => self.cmd_group_file(group, "style.md", &argv[1..]),
            "tools" => self.cmd_group_file(group, "tools.md", &argv[1..]),
            "caution" => self.cmd_group_file(group, "caution.md", &argv[1..]),
            "skill" => self.cmd_skill(group, &argv[1..]),
            other => format!("Unknown subcommand {other:?}. Try /dotclaw help."),
        }
    }

    fn cmd_groups(&self) -> String {
        let groups = self.store.list_groups();
        if groups.is_empty() {
            return "No groups registered.".to_string();
        }
        groups
            .iter()
            .map(|g| format!("{} → {} ({})", g.folder, g.chat_id, g.name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cmd_add_group(&self, args: &[&str]) -> String {
        let [chat_id, folder, rest @ ..] = args else {
            return "Usage: /dotclaw add-group <chat_id> <folder> [name…]".to_string();
        };
        let folder = match GroupFolder::parse(folder) {
            Ok(folder) => folder,
            Err(e) => return format!("Invalid folder: {e}"),
        };
        let name = if rest.is_empty() {
            folder.as_str().to_string()
        } else {
            rest.join(" ")
        };
        let group = RegisteredGroup {
            chat_id: ChatId::new(*chat_id),
            name,
            folder: folder.clone(),
            trigger: None,
            added_at: iso_from_ms(self.clock.now_ms()),
            container_config: None,
            model_override: None,
        };
        match self.store.register_group(group) {
            Ok(()) => {
                ensure_group_workspace(&self.groups_dir, &folder);
                format!("Registered {chat_id} as group {folder}.")
            }
            Err(e) => format!("Could not register group: {e}"),
        }
    }

    fn cmd_remove_group(&self, args: &[&str]) -> String {
        let [chat_id] = args else {
            return "Usage: /dotclaw remove-group <chat_id>".to_string();
        };
        match self.store.unregister_group(&ChatId::new(*chat_id)) {
            Ok(group) => format!("Removed group {}.", group.folder),
            Err(e) => format!("Could not remove group: {e}"),
        }
    }

    fn cmd_set_model(&self, args: &[&str]) -> String {
        let [folder, model] = args else {
            return "Usage: /dotclaw set-model <folder> <model|default>".to_string();
        };
        let folder = match GroupFolder::parse(folder) {
            Ok(folder) => folder,
            Err(e) => return format!("Invalid folder: {e}"),
        };
        let override_value = if *model == "default" {
            None
        } else {
            Some(model.to_string())
        };
        match self.store.set_group_model(&folder, override_value) {
            Ok(()) => match model {
                &"default" => format!("Model override cleared for {folder}."),
                other => format!("Model for {folder} set to {other}."),
            },
            Err(e) => format!("Could not set model: {e}"),
        }
    }

    async fn cmd_remember(&self, group: &RegisteredGroup, args: &[&str]) -> String {
        if args.is_empty() {
            return "Usage: /dotclaw remember <text…>".to_string();
        }
        let content = args.join(" ");
        match self
            .memory
            .upsert(&group.folder, None, content.clone(), vec![])
            .await
        {
            Ok(key) => {
                self.hooks
                    .emit(
                        HookEvent::MemoryUpserted,
                        &serde_json::json!({ "group": group.folder.as_str(), "key": key }),
                    )
                    .await;
                "Saved.".to_string()
            }
            Err(e) => format!("Could not save that: {e}"),
        }
    }

    async fn cmd_memory(&self, group: &RegisteredGroup, args: &[&str]) -> String {
        if args.is_empty() {
            return "Usage: /dotclaw memory <query…>".to_string();
        }
        let query = args.join(" ");
        match self.memory.search(&group.folder, &query, 5).await {
            Ok(hits) if hits.is_empty() => "No matches.".to_string(),
            Ok(hits) => hits
                .iter()
                .map(|h| format!("• {}", h.content))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("Memory search failed: {e}"),
        }
    }

    /// `style`/`tools`/`caution`: with text, write the group file; without,
    /// show it.
    fn cmd_group_file(&self, group: &RegisteredGroup, file: &str, args: &[&str]) -> String {
        let path = self.groups_dir.join(group.folder.as_str()).join(file);
        if args.is_empty() {
            return match std::fs::read_to_string(&path) {
                Ok(body) if !body.trim().is_empty() => body,
                _ => format!("No {file} set for this group."),
            };
        }
        let body = args.join(" ");
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::write(&path, body + "\n") {
            Ok(()) => format!("Updated {file}."),
            Err(e) => format!("Could not write {file}: {e}"),
        }
    }

    fn cmd_skill(&self, group: &RegisteredGroup, args: &[&str]) -> String {
        let skills_dir = self
            .groups_dir
            .join(group.folder.as_str())
            .join("skills");
        match args {
            ["list"] => match std::fs::read_dir(&skills_dir) {
                Ok(entries) => {
                    let mut names: Vec<String> = entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect();
                    names.sort();
                    if names.is_empty() {
                        "No skills installed.".to_string()
                    } else {
                        names.join("\n")
                    }
                }
                Err(_) => "No skills installed.".to_string(),
            },
            ["install", name, source] | ["update", name, source] => {
                if GroupFolder::parse(name).is_err() {
                    return format!("Invalid skill name {name:?}.");
                }
                let dest = skills_dir.join(name);
                let _ = std::fs::remove_dir_all(&dest);
                let _ = std::fs::remove_file(&dest);
                match copy_recursively(Path::new(source), &dest) {
                    Ok(()) => format!("Installed skill {name}."),
                    Err(e) => format!("Could not install {name}: {e}"),
                }
            }
            ["remove", name] => {
                if GroupFolder::parse(name).is_err() {
                    return format!("Invalid skill name {name:?}.");
                }
                let dest = skills_dir.join(name);
                if std::fs::remove_dir_all(&dest).is_ok() || std::fs::remove_file(&dest).is_ok() {
                    format!("Removed skill {name}.")
                } else {
                    format!("No skill named {name}.")
                }
            }
            _ => "Usage: /dotclaw skill install|remove|list|update".to_string(),
        }
    }
}

#[async_trait]
impl<C: Clock> CommandHandler for AdminCommands<C> {
    async fn try_handle(
        &self,
        group: &RegisteredGroup,
        message: &QueuedMessage,
    ) -> Option<String> {
        let content = message.content.trim();
        let mut argv = content.split_whitespace();
        if argv.next() != Some("/dotclaw") {
            return None;
        }
        let argv: Vec<&str> = argv.collect();
        Some(self.dispatch(group, &argv).await)
    }
}

/// Create the standard workspace tree for a group.
pub fn ensure_group_workspace(groups_dir: &Path, folder: &GroupFolder) {
    for sub in ["logs", "inbox"] {
        let path = groups_dir.join(folder.as_str()).join(sub);
        if let Err(e) = std::fs::create_dir_all(&path) {
            warn!(path = %path.display(), error = %e, "failed to create group workspace dir");
        }
    }
}

fn copy_recursively(source: &Path, dest: &Path) -> std::io::Result<()> {
    let meta = std::fs::metadata(source)?;
    if meta.is_dir() {
        std::fs::create_dir_all(dest)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            copy_recursively(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, dest)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;
