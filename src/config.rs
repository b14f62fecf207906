//! Layered configuration.
//!
//! Values resolve from three layers, highest precedence first:
//!
//! 1. the **explicit layer**, loaded from and persisted to a JSON file,
//! 2. **environment variables** named exactly like the key,
//! 3. the **built-in defaults**.
//!
//! Only the explicit layer is ever written to disk.
//!
//! ```rust
//! use studio_gateway::config::{coerce_env_value, ConfigValue};
//!
//! assert_eq!(coerce_env_value("true"), ConfigValue::Bool(true));
//! assert_eq!(coerce_env_value("42"), ConfigValue::Int(42));
//! assert_eq!(coerce_env_value("3.5"), ConfigValue::Float(3.5));
//! assert_eq!(coerce_env_value("llama3"), ConfigValue::Str("llama3".into()));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const DEFAULT_MODEL: &str = "DEFAULT_MODEL";
pub const OLLAMA_HOST: &str = "OLLAMA_HOST";
pub const OLLAMA_PORT: &str = "OLLAMA_PORT";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const STORE_URI: &str = "STORE_URI";
pub const STORE_DB_NAME: &str = "STORE_DB_NAME";
pub const STORE_DATA_PATH: &str = "STORE_DATA_PATH";
pub const THEME: &str = "THEME";
pub const LANGUAGE: &str = "LANGUAGE";

/// Every key the gateway recognizes, in display order.
pub const KNOWN_KEYS: [&str; 9] = [
    DEFAULT_MODEL,
    OLLAMA_HOST,
    OLLAMA_PORT,
    LOG_LEVEL,
    STORE_URI,
    STORE_DB_NAME,
    STORE_DATA_PATH,
    THEME,
    LANGUAGE,
];

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(x) => write!(f, "{}", x),
            ConfigValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Str(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

/// Which layer a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Explicit,
    Environment,
    Default,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Origin::Explicit => "explicit",
            Origin::Environment => "environment",
            Origin::Default => "default",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: ConfigValue,
    pub origin: Origin,
}

/// Coerce a raw environment string.
///
/// Order: boolean literals (case-insensitive), then a float if the string
/// contains `.`, otherwise an integer, otherwise the string unchanged.
pub fn coerce_env_value(raw: &str) -> ConfigValue {
    match raw.to_ascii_lowercase().as_str() {
        "true" => return ConfigValue::Bool(true),
        "false" => return ConfigValue::Bool(false),
        _ => {}
    }

    if raw.contains('.') {
        if let Ok(x) = raw.parse::<f64>() {
            return ConfigValue::Float(x);
        }
    } else if let Ok(i) = raw.parse::<i64>() {
        return ConfigValue::Int(i);
    }

    ConfigValue::Str(raw.to_string())
}

/// The fixed default set. `data_dir` anchors the store's data path.
pub fn built_in_defaults(data_dir: &Path) -> BTreeMap<String, ConfigValue> {
    let store_path = data_dir.join("store");
    [
        (DEFAULT_MODEL, ConfigValue::from("llama3.2:latest")),
        (OLLAMA_HOST, ConfigValue::from("http://localhost")),
        (OLLAMA_PORT, ConfigValue::from("11434")),
        (LOG_LEVEL, ConfigValue::from("INFO")),
        (STORE_URI, ConfigValue::from("sqlite://")),
        (STORE_DB_NAME, ConfigValue::from("studio")),
        (
            STORE_DATA_PATH,
            ConfigValue::Str(store_path.to_string_lossy().into_owned()),
        ),
        (THEME, ConfigValue::from("system")),
        (LANGUAGE, ConfigValue::from("en")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Resolves configuration values across the explicit, environment, and
/// default layers, and persists the explicit layer.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    path: PathBuf,
    explicit: BTreeMap<String, ConfigValue>,
    defaults: BTreeMap<String, ConfigValue>,
}

impl ConfigResolver {
    pub fn new(path: impl Into<PathBuf>, defaults: BTreeMap<String, ConfigValue>) -> Self {
        Self {
            path: path.into(),
            explicit: BTreeMap::new(),
            defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn explicit(&self) -> &BTreeMap<String, ConfigValue> {
        &self.explicit
    }

    pub fn defaults(&self) -> &BTreeMap<String, ConfigValue> {
        &self.defaults
    }

    /// Read the explicit layer from disk.
    ///
    /// A missing file is reported as an [`Error::Io`] with `NotFound`; a file
    /// that is not a JSON object of scalars is [`Error::ConfigParse`]. Neither
    /// touches the in-memory layer.
    pub fn load(&mut self) -> Result<()> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;

        let parsed: BTreeMap<String, Option<ConfigValue>> =
            serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
                path: self.path.clone(),
                source,
            })?;

        self.explicit = parsed
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();

        info!(path = %self.path.display(), "configuration loaded");
        Ok(())
    }

    /// Load the explicit layer, or materialize it from the defaults and save.
    pub fn load_or_create_default(&mut self) -> Result<()> {
        match self.load() {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_not_found() {
                    warn!(path = %self.path.display(), "configuration file not found");
                } else {
                    warn!(error = %e, "configuration file unreadable");
                }
                info!("creating default configuration");
                self.explicit = self.defaults.clone();
                self.save()
            }
        }
    }

    /// Resolve a key, recording which layer supplied the value.
    pub fn entry(&self, key: &str) -> Option<ConfigEntry> {
        let (value, origin) = if let Some(v) = self.explicit.get(key) {
            (v.clone(), Origin::Explicit)
        } else if let Ok(raw) = std::env::var(key) {
            (coerce_env_value(&raw), Origin::Environment)
        } else {
            (self.defaults.get(key)?.clone(), Origin::Default)
        };

        Some(ConfigEntry {
            key: key.to_string(),
            value,
            origin,
        })
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.entry(key).map(|e| e.value)
    }

    pub fn get_or(&self, key: &str, fallback: impl Into<ConfigValue>) -> ConfigValue {
        self.get(key).unwrap_or_else(|| fallback.into())
    }

    /// Resolve a key and render it as a string, whatever its type.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    /// Set a value in the explicit layer. Not persisted until [`save`](Self::save).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.explicit.insert(key.into(), value.into());
    }

    /// Merge `values` into the explicit layer and persist immediately.
    pub fn update(&mut self, values: BTreeMap<String, ConfigValue>) -> Result<()> {
        self.explicit.extend(values);
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(&self.explicit).map_err(|source| {
            Error::ConfigParse {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, json).map_err(|e| Error::io(&self.path, e))?;

        info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    /// Replace the explicit layer with the defaults and persist.
    pub fn reset(&mut self) -> Result<()> {
        self.explicit = self.defaults.clone();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver(tmp: &TempDir) -> ConfigResolver {
        ConfigResolver::new(
            tmp.path().join("nested").join("config.json"),
            built_in_defaults(&tmp.path().join("data")),
        )
    }

    #[test]
    fn test_coercion_order() {
        assert_eq!(coerce_env_value("TRUE"), ConfigValue::Bool(true));
        assert_eq!(coerce_env_value("False"), ConfigValue::Bool(false));
        assert_eq!(coerce_env_value("-7"), ConfigValue::Int(-7));
        assert_eq!(coerce_env_value("0.25"), ConfigValue::Float(0.25));
        // Dotted but not numeric stays a string.
        assert_eq!(
            coerce_env_value("llama3.2:latest"),
            ConfigValue::Str("llama3.2:latest".to_string())
        );
        assert_eq!(coerce_env_value("1e5"), ConfigValue::Str("1e5".to_string()));
    }

    #[test]
    fn test_explicit_beats_environment_and_default() {
        let tmp = TempDir::new().unwrap();
        let mut config = resolver(&tmp);
        std::env::set_var("STUDIO_TEST_PRECEDENCE_THEME", "from-env");
        config.set("STUDIO_TEST_PRECEDENCE_THEME", "from-file");
        config.set(THEME, "dark");

        let entry = config.entry("STUDIO_TEST_PRECEDENCE_THEME").unwrap();
        assert_eq!(entry.value, ConfigValue::from("from-file"));
        assert_eq!(entry.origin, Origin::Explicit);
        assert_eq!(config.get(THEME), Some(ConfigValue::from("dark")));
    }

    #[test]
    fn test_environment_values_are_coerced() {
        let tmp = TempDir::new().unwrap();
        let config = resolver(&tmp);
        std::env::set_var("STUDIO_TEST_ENV_BOOL", "true");
        std::env::set_var("STUDIO_TEST_ENV_INT", "42");
        std::env::set_var("STUDIO_TEST_ENV_FLOAT", "3.5");
        std::env::set_var("STUDIO_TEST_ENV_STR", "hello");

        assert_eq!(config.get("STUDIO_TEST_ENV_BOOL"), Some(ConfigValue::Bool(true)));
        assert_eq!(config.get("STUDIO_TEST_ENV_INT"), Some(ConfigValue::Int(42)));
        assert_eq!(config.get("STUDIO_TEST_ENV_FLOAT"), Some(ConfigValue::Float(3.5)));
        assert_eq!(
            config.get("STUDIO_TEST_ENV_STR"),
            Some(ConfigValue::from("hello"))
        );
        assert_eq!(
            config.entry("STUDIO_TEST_ENV_INT").unwrap().origin,
            Origin::Environment
        );
    }

    #[test]
    fn test_default_then_fallback() {
        let tmp = TempDir::new().unwrap();
        let config = resolver(&tmp);

        let entry = config.entry(STORE_DB_NAME).unwrap();
        assert_eq!(entry.origin, Origin::Default);
        assert_eq!(entry.value, ConfigValue::from("studio"));

        assert_eq!(config.get("STUDIO_TEST_UNKNOWN_KEY"), None);
        assert_eq!(
            config.get_or("STUDIO_TEST_UNKNOWN_KEY", 7i64),
            ConfigValue::Int(7)
        );
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let mut config = resolver(&tmp);
        let err = config.load().unwrap_err();
        assert!(err.is_not_found());
        assert!(config.explicit().is_empty());
    }

    #[test]
    fn test_load_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let mut config = ConfigResolver::new(&path, BTreeMap::new());
        assert!(matches!(config.load(), Err(Error::ConfigParse { .. })));
    }

    #[test]
    fn test_load_drops_null_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"THEME": null, "OLLAMA_PORT": 11500}"#).unwrap();
        let mut config = ConfigResolver::new(&path, built_in_defaults(tmp.path()));
        config.load().unwrap();

        assert_eq!(config.explicit().len(), 1);
        assert_eq!(config.get_string(OLLAMA_PORT).as_deref(), Some("11500"));
        assert_eq!(config.entry(THEME).unwrap().origin, Origin::Default);
    }

    #[test]
    fn test_load_or_create_default_persists_defaults() {
        let tmp = TempDir::new().unwrap();
        let mut config = resolver(&tmp);
        config.load_or_create_default().unwrap();
        assert!(config.path().exists());

        let mut reloaded = resolver(&tmp);
        reloaded.load().unwrap();
        assert_eq!(reloaded.explicit(), reloaded.defaults());
    }

    #[test]
    fn test_load_or_create_default_keeps_existing_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = resolver(&tmp);
        config
            .update(BTreeMap::from([(THEME.to_string(), ConfigValue::from("dark"))]))
            .unwrap();

        let mut reloaded = resolver(&tmp);
        reloaded.load_or_create_default().unwrap();
        assert_eq!(reloaded.explicit().len(), 1);
        assert_eq!(reloaded.get(THEME), Some(ConfigValue::from("dark")));
    }

    #[test]
    fn test_set_is_not_persisted_until_save() {
        let tmp = TempDir::new().unwrap();
        let mut config = resolver(&tmp);
        config.set(LANGUAGE, "de");
        assert!(!config.path().exists());

        config.save().unwrap();
        let mut reloaded = resolver(&tmp);
        reloaded.load().unwrap();
        assert_eq!(reloaded.get(LANGUAGE), Some(ConfigValue::from("de")));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let tmp = TempDir::new().unwrap();
        let mut config = resolver(&tmp);
        config
            .update(BTreeMap::from([
                (THEME.to_string(), ConfigValue::from("dark")),
                ("EXTRA".to_string(), ConfigValue::Bool(false)),
            ]))
            .unwrap();

        config.reset().unwrap();
        let mut reloaded = resolver(&tmp);
        reloaded.load().unwrap();
        assert_eq!(reloaded.explicit(), reloaded.defaults());
    }

    #[test]
    fn test_mixed_types_roundtrip_through_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = resolver(&tmp);
        config.set("FLAG", true);
        config.set("COUNT", 3i64);
        config.set("RATIO", ConfigValue::Float(0.5));
        config.save().unwrap();

        let mut reloaded = resolver(&tmp);
        reloaded.load().unwrap();
        assert_eq!(reloaded.get("FLAG").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(reloaded.get("COUNT"), Some(ConfigValue::Int(3)));
        assert_eq!(reloaded.get("RATIO"), Some(ConfigValue::Float(0.5)));
    }
}
