//! Settings.
//!
//! Supports both programmatic and file-based configuration. Nothing here is
//! global: the exemption settings are handed to the functions and backends
//! that need them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::EXEMPT_WILDCARD;
use crate::model::ObjectType;

/// Environment variable overriding `db_path`
pub const DB_PATH_ENV: &str = "OBJPERM_DB";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Models whose `view` permission is not enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemptSettings {
    /// `"*"` for every model, or `app_label.model_name` entries.
    #[serde(default)]
    pub view_permissions: Vec<String>,

    /// `(app_label, model_name)` pairs the `"*"` wildcard does not cover.
    #[serde(default)]
    pub exclude_models: Vec<(String, String)>,
}

impl ExemptSettings {
    /// Exempt every model's view permission
    pub fn all() -> Self {
        Self {
            view_permissions: vec![EXEMPT_WILDCARD.to_string()],
            exclude_models: Vec::new(),
        }
    }

    /// Exempt the listed `app_label.model_name` entries
    pub fn models<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            view_permissions: models.into_iter().map(Into::into).collect(),
            exclude_models: Vec::new(),
        }
    }

    /// Keep `app_label.model_name` out of the wildcard
    pub fn exclude(mut self, app_label: &str, model_name: &str) -> Self {
        self.exclude_models.push((app_label.to_string(), model_name.to_string()));
        self
    }

    #[inline]
    pub fn has_wildcard(&self) -> bool {
        self.view_permissions.iter().any(|p| p == EXEMPT_WILDCARD)
    }

    #[inline]
    pub fn lists(&self, app_label: &str, model_name: &str) -> bool {
        self.view_permissions.iter().any(|p| {
            p.split_once('.')
                .map(|(a, m)| a == app_label && m == model_name)
                .unwrap_or(false)
        })
    }

    #[inline]
    pub fn is_excluded(&self, app_label: &str, model_name: &str) -> bool {
        self.exclude_models
            .iter()
            .any(|(a, m)| a == app_label && m == model_name)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.view_permissions {
            if entry != EXEMPT_WILDCARD && ObjectType::parse(entry).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "Exempt view permission '{}' must be '*' or 'app_label.model_name'",
                    entry
                )));
            }
        }
        for (app_label, model_name) in &self.exclude_models {
            if app_label.is_empty() || model_name.is_empty() {
                return Err(ConfigError::Invalid(
                    "Excluded models need both an app label and a model name".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// LMDB directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub exempt: ExemptSettings,
}

fn default_db_path() -> String {
    "./data/objperm.mdb".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            exempt: ExemptSettings::default(),
        }
    }
}

impl Settings {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            self.db_path = path;
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.is_empty() {
            return Err(ConfigError::Invalid("db_path cannot be empty".into()));
        }
        self.exempt.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.log_level, "info");
        assert!(s.exempt.view_permissions.is_empty());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let s = Settings::from_toml(
            r#"
            db_path = "/tmp/perms"

            [exempt]
            view_permissions = ["*"]
            exclude_models = [["dcim", "site"], ["users", "token"]]
            "#,
        )
        .unwrap();
        assert_eq!(s.db_path, "/tmp/perms");
        assert!(s.exempt.has_wildcard());
        assert!(s.exempt.is_excluded("dcim", "site"));
        assert!(s.exempt.is_excluded("users", "token"));
        assert!(!s.exempt.is_excluded("dcim", "device"));
    }

    #[test]
    fn test_invalid_exempt_entry() {
        let r = Settings::from_toml(
            r#"
            [exempt]
            view_permissions = ["dcim"]
            "#,
        );
        assert!(matches!(r, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(Settings::from_toml("db_path = "), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_lists() {
        let e = ExemptSettings::models(["dcim.site", "ipam.vlan"]);
        assert!(e.lists("dcim", "site"));
        assert!(e.lists("ipam", "vlan"));
        assert!(!e.lists("dcim", "device"));
        assert!(!e.has_wildcard());
    }
}
