// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registered groups: internal workspaces bound to exactly one chat.

use crate::chat::ChatId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Folder of the administrative group. Always registered, never removable.
pub const MAIN_GROUP_FOLDER: &str = "main";

/// Errors from group-folder validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupFolderError {
    #[error("group folder is empty")]
    Empty,
    #[error("group folder {0:?} contains invalid characters (want ^[a-z0-9][a-z0-9_-]*$)")]
    InvalidChars(String),
    #[error("group folder {0:?} is a path traversal")]
    Traversal(String),
}

/// A validated, filesystem-safe group folder slug.
///
/// Construction is only possible through [`GroupFolder::parse`], so every
/// value in the system is known to match `^[a-z0-9][a-z0-9_-]*$` and can be
/// joined onto a base directory without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupFolder(String);

impl GroupFolder {
    pub fn parse(s: &str) -> Result<Self, GroupFolderError> {
        if s.is_empty() {
            return Err(GroupFolderError::Empty);
        }
        if s == ".." || s.contains("..") || s.starts_with('/') {
            return Err(GroupFolderError::Traversal(s.to_string()));
        }
        let mut chars = s.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !first_ok || !rest_ok {
            return Err(GroupFolderError::InvalidChars(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The main (administrative) group folder.
    pub fn main() -> Self {
        Self(MAIN_GROUP_FOLDER.to_string())
    }

    pub fn is_main(&self) -> bool {
        self.0 == MAIN_GROUP_FOLDER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for GroupFolder {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        GroupFolder::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A chat registered as an agent workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredGroup {
    pub chat_id: ChatId,
    pub name: String,
    pub folder: GroupFolder,
    /// Optional regex; group messages only trigger the agent when the
    /// trigger matches (mentions and replies always trigger).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// ISO-8601 UTC
    pub added_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_config: Option<serde_json::Value>,
    /// Model override applied to every run in this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
