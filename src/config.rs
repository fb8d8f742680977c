use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration, loadable from a TOML file with every key
/// defaulted. `LOG_LEVEL` in the environment overrides the configured log
/// level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub collect: CollectSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub plugins: PluginSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectSettings {
    /// Source URIs (`file://...`, `http(s)://...`).
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_storage")]
    pub storage: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_storage")]
    pub storage: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySettings {
    #[serde(default = "default_storage")]
    pub storage: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_output")]
    pub output: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginSettings {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> String {
    "json".to_owned()
}

fn default_workers() -> usize {
    4
}

fn default_storage() -> String {
    "memory".to_owned()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_batch_size() -> usize {
    100
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_limit() -> usize {
    100
}

fn default_output() -> String {
    "json".to_owned()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            workers: default_workers(),
            storage: default_storage(),
            storage_path: default_storage_path(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            storage: default_storage(),
            storage_path: default_storage_path(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            storage_path: default_storage_path(),
            limit: default_limit(),
            output: default_output(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file, applies the `LOG_LEVEL`
    /// environment override, and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    Error::InvalidArgument(format!(
                        "failed to read config file {}: {e}",
                        path.display()
                    ))
                })?;
                toml::from_str(&content)
                    .map_err(|e| Error::InvalidArgument(format!("invalid config file: {e}")))?
            }
            None => Settings::default(),
        };

        if let Ok(level) = env::var("LOG_LEVEL") {
            settings.log.level = level;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        validate_log_level(&self.log.level)?;
        validate_storage_kind(&self.collect.storage)?;
        validate_storage_kind(&self.api.storage)?;
        validate_storage_kind(&self.query.storage)?;
        validate_workers(self.collect.workers)?;
        validate_port(self.api.port)?;
        Ok(())
    }
}

fn validate_log_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(Error::InvalidArgument(format!(
            "invalid log level: {other}"
        ))),
    }
}

fn validate_storage_kind(kind: &str) -> Result<()> {
    match kind.to_lowercase().as_str() {
        "memory" | "disk" => Ok(()),
        other => Err(Error::InvalidArgument(format!(
            "invalid storage type: {other}"
        ))),
    }
}

fn validate_workers(workers: usize) -> Result<()> {
    if workers == 0 {
        return Err(Error::InvalidArgument(
            "worker count must be at least 1".to_owned(),
        ));
    }
    Ok(())
}

fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(Error::InvalidArgument("port cannot be 0".to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.collect.workers, 4);
        assert_eq!(settings.api.port, 8000);
        assert_eq!(settings.query.limit, 100);
        assert_eq!(settings.collect.storage, "memory");
    }

    #[test]
    fn validate_log_level_rejects_unknown() {
        assert!(validate_log_level("info").is_ok());
        assert!(validate_log_level("WARN").is_ok());
        let err = validate_log_level("verbose").unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }

    #[test]
    fn validate_storage_kind_rejects_unknown() {
        assert!(validate_storage_kind("memory").is_ok());
        assert!(validate_storage_kind("disk").is_ok());
        assert!(validate_storage_kind("s3").is_err());
    }

    #[test]
    fn validate_workers_rejects_zero() {
        assert!(validate_workers(1).is_ok());
        assert!(validate_workers(0).is_err());
    }

    #[test]
    fn validate_port_rejects_zero() {
        assert!(validate_port(8000).is_ok());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("havn.toml");
        fs::write(
            &path,
            r#"
[log]
level = "debug"

[collect]
sources = ["file:///var/log/app.log"]
workers = 8
storage = "disk"
storage_path = "/tmp/havn-logs"

[plugins]
enabled = ["tag"]

[plugins.config]
field = "env"
value = "prod"
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.log.level, "debug");
        assert_eq!(settings.collect.workers, 8);
        assert_eq!(settings.collect.storage, "disk");
        assert_eq!(settings.collect.sources.len(), 1);
        assert_eq!(settings.plugins.enabled, vec!["tag"]);
        assert_eq!(
            settings.plugins.config.get("field").map(String::as_str),
            Some("env")
        );
        // Untouched groups keep their defaults.
        assert_eq!(settings.api.port, 8000);
    }

    #[test]
    fn invalid_file_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "collect = 17").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn missing_file_is_rejected() {
        assert!(Settings::load(Some(Path::new("/nonexistent/havn.toml"))).is_err());
    }
}
