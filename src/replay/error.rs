use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::StoreError;

/// Errors raised while loading or running a replay script.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The script file could not be read
    #[error("I/O error on '{path}': {details}")]
    Io {
        /// Path of the script
        path: PathBuf,
        /// I/O error details
        details: String,
    },

    /// The script is not valid TOML or does not match the script format
    #[error("failed to parse TOML at '{location}': {details}")]
    TomlParse {
        /// Location of the TOML being parsed (file path or "string")
        location: String,
        /// Parse error details
        details: String,
    },

    /// A step referred to a listener the script never registered
    #[error("no listener named '{0}'")]
    UnknownListener(String),

    /// A step registered a listener under a name already in use
    #[error("listener '{0}' is already registered")]
    DuplicateListener(String),

    /// The store rejected an operation
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The transcript could not be rendered
    #[error("failed to serialize transcript: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ReplayError {
    /// Creates a TOML parsing error with optional file path context.
    pub fn toml_parse(error: impl std::fmt::Display, path: Option<&Path>) -> Self {
        let location = match path {
            Some(p) => {
                let clean_path = p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
                clean_path.to_string_lossy().to_string()
            }
            None => "string".to_string(),
        };

        ReplayError::TomlParse {
            location,
            details: error.to_string(),
        }
    }

    /// Creates an I/O error with file path context.
    pub fn io(error: impl std::fmt::Display, path: &Path) -> Self {
        ReplayError::Io {
            path: path.to_path_buf(),
            details: error.to_string(),
        }
    }
}
