use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tablecache_types::{CacheError, traits::Result};

/// Table holding one row per user.
pub const DEFAULT_TABLE_NAME: &str = "usertokencaches";

/// Prefix for environment overrides, e.g. `TABLECACHE_STORAGE__TABLE_NAME`.
const ENV_PREFIX: &str = "TABLECACHE_";

fn default_connection_string() -> String {
    "sqlite://tokencache.db".to_string()
}
fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Where the token-cache table lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `sqlite://...` URL, or `memory` for a process-local table.
    #[serde(default = "default_connection_string")]
    pub connection_string: String,
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
            table_name: default_table_name(),
        }
    }
}

/// Key material for the protect/unprotect primitive.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProtectionConfig {
    /// Base64-encoded 32-byte master key.
    #[serde(default)]
    pub master_key: Option<String>,
}

impl fmt::Debug for ProtectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionConfig")
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Top-level adapter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub protection: ProtectionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &Path) -> std::result::Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .extract()
    }

    /// Defaults, then the optional YAML file, then `TABLECACHE_*` variables.
    ///
    /// Nested keys use `__` as separator.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if a source cannot be parsed.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()
    }

    /// Checks values the storage layer relies on.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for an empty connection string or an
    /// invalid table name.
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()
    }
}

impl StorageConfig {
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for an empty connection string or an
    /// invalid table name.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(CacheError::Config(
                "storage.connection_string must not be empty".into(),
            ));
        }
        validate_table_name(&self.table_name)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
///
/// # Errors
///
/// Returns [`CacheError::Config`] unless the name starts with an ASCII letter
/// and contains only ASCII alphanumerics and `_`.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let starts_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if starts_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(CacheError::Config(format!("invalid table name: '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
storage:
  connection_string: "sqlite:///var/lib/app/tokens.db"
  table_name: "webtokens"
protection:
  master_key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
log:
  level: "debug"
"#;

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert_eq!(c.storage.connection_string, "sqlite://tokencache.db");
        assert_eq!(c.storage.table_name, DEFAULT_TABLE_NAME);
        assert!(c.protection.master_key.is_none());
        assert_eq!(c.log.level, "info");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(
            c.storage.connection_string,
            "sqlite:///var/lib/app/tokens.db"
        );
        assert_eq!(c.storage.table_name, "webtokens");
        assert!(c.protection.master_key.is_some());
        assert_eq!(c.log.level, "debug");
    }

    #[test]
    fn test_from_yaml_defaults_applied() {
        let c = Config::from_yaml("storage:\n  connection_string: memory\n").unwrap();
        assert_eq!(c.storage.connection_string, "memory");
        assert_eq!(c.storage.table_name, DEFAULT_TABLE_NAME); // default preserved
        assert_eq!(c.log.level, "info");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tablecache.yaml");
        std::fs::write(&path, SAMPLE_YAML).unwrap();
        let c = Config::from_file(&path).unwrap();
        assert_eq!(c.storage.table_name, "webtokens");
    }

    #[test]
    fn test_load_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("tablecache.yaml", SAMPLE_YAML)?;
            jail.set_env("TABLECACHE_STORAGE__TABLE_NAME", "fromenv");
            let c = Config::load(Some(Path::new("tablecache.yaml")))?;
            assert_eq!(c.storage.table_name, "fromenv");
            assert_eq!(
                c.storage.connection_string,
                "sqlite:///var/lib/app/tokens.db"
            );
            Ok(())
        });
    }

    #[test]
    fn test_load_without_file() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TABLECACHE_STORAGE__CONNECTION_STRING", "memory");
            let c = Config::load(None)?;
            assert_eq!(c.storage.connection_string, "memory");
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_empty_connection_string() {
        let mut c = Config::default();
        c.storage.connection_string = "  ".into();
        assert!(matches!(c.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("usertokencaches").is_ok());
        assert!(validate_table_name("user_tokens2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2tokens").is_err());
        assert!(validate_table_name("tokens; DROP TABLE x").is_err());
    }

    #[test]
    fn test_debug_redacts_master_key() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        let dbg = format!("{:?}", c.protection);
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("AAAA"));
    }
}
