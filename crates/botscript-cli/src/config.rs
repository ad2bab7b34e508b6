//! Persistent configuration for botscript.
//!
//! Stores settings in `~/.botscript/config.json` (or `$BOTSCRIPT_HOME/config.json`).
//! Every field is optional; a missing file means defaults.
//!
//! ```json
//! {
//!   "max_nesting_depth": 16,
//!   "builtins": { "game": "Celeste" },
//!   "counters_path": "/var/lib/botscript/counters.json",
//!   "command_prefix": "!"
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use botscript_core::DEFAULT_MAX_DEPTH;

use crate::error::CliError;

const CONFIG_FILENAME: &str = "config.json";
const COUNTERS_FILENAME: &str = "counters.json";

/// Returns the botscript state directory.
///
/// `$BOTSCRIPT_HOME` when set, otherwise `~/.botscript`.
pub fn botscript_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("BOTSCRIPT_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".botscript")
}

/// Location of the default config file.
pub fn config_path() -> PathBuf {
    botscript_dir().join(CONFIG_FILENAME)
}

fn default_prefix() -> String {
    "!".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Deepest `when` nesting accepted when parsing scripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nesting_depth: Option<usize>,

    /// Fixed builtin values, such as `game`, available to every command.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub builtins: BTreeMap<String, String>,

    /// Where `count()` values persist between runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counters_path: Option<PathBuf>,

    #[serde(default = "default_prefix")]
    pub command_prefix: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: None,
            builtins: BTreeMap::new(),
            counters_path: None,
            command_prefix: default_prefix(),
        }
    }
}

impl BotConfig {
    /// Load config from the default location.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        let path = config_path();
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            Self::default()
        })
    }

    /// Load config from an explicit path. Unlike [`load`](Self::load), a
    /// missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self, CliError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| CliError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<(), CliError> {
        let dir = botscript_dir();
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(CONFIG_FILENAME), json)?;
        Ok(())
    }

    pub fn max_depth(&self) -> usize {
        self.max_nesting_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    pub fn counters_path(&self) -> PathBuf {
        self.counters_path
            .clone()
            .unwrap_or_else(|| botscript_dir().join(COUNTERS_FILENAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BotConfig::default();
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.max_depth(), DEFAULT_MAX_DEPTH);
        assert!(config.builtins.is_empty());
    }

    #[test]
    fn deserialize_empty_json() {
        let loaded: BotConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded, BotConfig::default());
    }

    #[test]
    fn roundtrip_serialization() {
        let mut config = BotConfig {
            max_nesting_depth: Some(8),
            counters_path: Some(PathBuf::from("/tmp/counters.json")),
            command_prefix: "?".to_string(),
            ..BotConfig::default()
        };
        config.builtins.insert("game".to_string(), "Celeste".to_string());
        let json = serde_json::to_string(&config).unwrap();
        let loaded: BotConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.max_depth(), 8);
        assert_eq!(loaded.counters_path(), PathBuf::from("/tmp/counters.json"));
    }

    #[test]
    fn load_from_missing_file_is_error() {
        let result = BotConfig::load_from(Path::new("/nonexistent/botscript/config.json"));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
