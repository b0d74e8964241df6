use std::{fs, path::Path};

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{LogLevel, ReplayError};

/// A scripted session against a JSON store.
///
/// Scripts are TOML documents: an optional `[general]` table, an optional
/// `initial` object, and an array of `[[steps]]` run in order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct ReplayScript {
    /// Settings for the run itself.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Initial value of the store. Must be a table when present.
    #[serde(default)]
    pub initial: Value,

    /// Steps to run, in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// General settings for a replay run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct GeneralConfig {
    /// Logging level used when the command line does not set one.
    #[serde(default)]
    pub log_level: LogLevel,
}

/// One action in a replay script.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Step {
    /// Register a callback listener under `name`.
    Listen {
        /// Name used in the transcript and by `cancel`.
        name: String,
    },

    /// Open a pull subscription under `name`. It is drained at every flush.
    Subscribe {
        /// Name used in the transcript and by `cancel`.
        name: String,
    },

    /// Cancel the listener or subscription registered under `name`.
    Cancel {
        /// Name of a registered listener.
        name: String,
    },

    /// Merge `patch` into the store.
    Update {
        /// Fields to overwrite. An absent patch changes nothing.
        #[serde(default)]
        patch: Value,
    },

    /// Run deferred work and drain subscriptions.
    Flush,
}

impl ReplayScript {
    /// Parse a script from TOML text.
    ///
    /// # Errors
    /// Returns `ReplayError::TomlParse` if the text is not a valid script.
    pub fn from_toml_str(content: &str) -> Result<Self, ReplayError> {
        toml::from_str(content).map_err(|e| ReplayError::toml_parse(e, None))
    }

    /// Load a script from a file.
    ///
    /// # Errors
    /// Returns `ReplayError::Io` if the file cannot be read and
    /// `ReplayError::TomlParse` if it is not a valid script.
    #[instrument]
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let content = fs::read_to_string(path).map_err(|e| ReplayError::io(e, path))?;
        let script: Self =
            toml::from_str(&content).map_err(|e| ReplayError::toml_parse(e, Some(path)))?;

        debug!(steps = script.steps.len(), "loaded replay script");
        Ok(script)
    }

    /// JSON schema describing the script format.
    ///
    /// # Errors
    /// Returns `ReplayError::Serialize` if the schema cannot be rendered.
    pub fn schema() -> Result<String, ReplayError> {
        let schema = schema_for!(ReplayScript);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}
