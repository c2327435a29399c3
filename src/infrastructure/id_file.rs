//! Conversation-id list readers.
//!
//! With no ids on the command line the tool reads them from a file:
//! either plain text (one id per line) or YAML with a `conversation_ids`
//! list.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::domain::{AppError, Result};

/// File consulted when no ids are given explicitly.
pub const DEFAULT_IDS_FILE: &str = "conversation_ids.txt";

#[derive(Debug, Deserialize)]
struct IdsFile {
    #[serde(default)]
    conversation_ids: Vec<IdEntry>,
}

/// YAML lists may hold ids as bare numbers or strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdEntry {
    Number(u64),
    Text(String),
}

impl IdEntry {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// Load conversation ids from a file, dispatching on the extension.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_conversation_ids(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read ids file: {}", path.display()), e))?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        let parsed: IdsFile = serde_yaml::from_str(&content).map_err(|e| AppError::Config {
            message: format!("Failed to parse ids file {}: {e}", path.display()),
        })?;
        Ok(parsed
            .conversation_ids
            .into_iter()
            .map(IdEntry::into_string)
            .collect())
    } else {
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}
