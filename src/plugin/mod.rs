use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::domain::LogEntry;
use crate::error::{Error, Result};

/// A named extension point invoked once per entry between transformation and
/// storage.
///
/// Plugins are statically linked and register by name; configuration arrives
/// as a string map through `init`.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn version(&self) -> &str;

    fn init(&self, config: &HashMap<String, String>) -> Result<()>;

    fn process(&self, entry: &mut LogEntry) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Plugin metadata returned by the registry listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub version: String,
}

/// Shared name/description/version/config storage for plugin
/// implementations.
pub struct BasePlugin {
    info: PluginInfo,
    config: RwLock<HashMap<String, String>>,
}

impl BasePlugin {
    pub fn new(name: &str, description: &str, version: &str) -> Self {
        Self {
            info: PluginInfo {
                name: name.to_owned(),
                description: description.to_owned(),
                version: version.to_owned(),
            },
            config: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }

    pub fn set_config(&self, config: &HashMap<String, String>) {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config.clone();
    }

    pub fn get_config(&self, key: &str) -> Option<String> {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn get_config_or(&self, key: &str, default: &str) -> String {
        self.get_config(key).unwrap_or_else(|| default.to_owned())
    }
}

/// Name-keyed plugin registry with a read-write lock.
#[derive(Default)]
pub struct Registry {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin; a second plugin under the same name is rejected.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let mut plugins = self
            .plugins
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let name = plugin.name().to_owned();
        if plugins.contains_key(&name) {
            return Err(Error::InvalidArgument(format!(
                "plugin {name} is already registered"
            )));
        }

        info!(name = %name, version = plugin.version(), "registered plugin");
        plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plugin {name} not found")))
    }

    /// Passes configuration to a registered plugin's `init`.
    pub fn configure(&self, name: &str, config: &HashMap<String, String>) -> Result<()> {
        let plugin = self.get(name)?;
        debug!(name, "configuring plugin");
        plugin.init(config)
    }

    pub fn list(&self) -> Vec<PluginInfo> {
        self.plugins
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(|p| PluginInfo {
                name: p.name().to_owned(),
                description: p.description().to_owned(),
                version: p.version().to_owned(),
            })
            .collect()
    }

    /// Closes every plugin, logging failures without aborting.
    pub fn close_all(&self) {
        let mut plugins = self
            .plugins
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for (name, plugin) in plugins.drain() {
            debug!(name = %name, "closing plugin");
            if let Err(e) = plugin.close() {
                error!(name = %name, error = %e, "error closing plugin");
            }
        }
    }
}

/// Instantiates a built-in plugin by name, for `plugins.enabled` lookups.
pub fn builtin(name: &str) -> Option<Arc<dyn Plugin>> {
    match name {
        "tag" => Some(Arc::new(TagPlugin::new())),
        "redact" => Some(Arc::new(RedactPlugin::new())),
        _ => None,
    }
}

/// Adds a configured field to every entry. Config keys: `field`, `value`.
pub struct TagPlugin {
    base: BasePlugin,
}

impl TagPlugin {
    pub fn new() -> Self {
        Self {
            base: BasePlugin::new("tag", "Adds a static field to every entry", "1.0.0"),
        }
    }
}

impl Default for TagPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for TagPlugin {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.base.description()
    }

    fn version(&self) -> &str {
        self.base.version()
    }

    fn init(&self, config: &HashMap<String, String>) -> Result<()> {
        if !config.contains_key("field") {
            return Err(Error::InvalidArgument(
                "tag plugin requires a 'field' config key".to_owned(),
            ));
        }
        self.base.set_config(config);
        Ok(())
    }

    fn process(&self, entry: &mut LogEntry) -> Result<()> {
        if let Some(field) = self.base.get_config("field") {
            let value = self.base.get_config_or("value", "true");
            entry.fields.insert(field, Value::String(value));
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Replaces matches of a configured pattern in the message. Config keys:
/// `pattern`, `replacement` (default `[redacted]`).
pub struct RedactPlugin {
    base: BasePlugin,
    pattern: RwLock<Option<Regex>>,
}

impl RedactPlugin {
    pub fn new() -> Self {
        Self {
            base: BasePlugin::new("redact", "Masks matches of a pattern in messages", "1.0.0"),
            pattern: RwLock::new(None),
        }
    }
}

impl Default for RedactPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for RedactPlugin {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.base.description()
    }

    fn version(&self) -> &str {
        self.base.version()
    }

    fn init(&self, config: &HashMap<String, String>) -> Result<()> {
        let Some(raw) = config.get("pattern") else {
            return Err(Error::InvalidArgument(
                "redact plugin requires a 'pattern' config key".to_owned(),
            ));
        };
        let compiled = Regex::new(raw)
            .map_err(|e| Error::InvalidArgument(format!("invalid redact pattern: {e}")))?;

        self.base.set_config(config);
        *self
            .pattern
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(compiled);
        Ok(())
    }

    fn process(&self, entry: &mut LogEntry) -> Result<()> {
        let guard = self
            .pattern
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(pattern) = guard.as_ref() {
            let replacement = self.base.get_config_or("replacement", "[redacted]");
            entry.message = pattern
                .replace_all(&entry.message, replacement.as_str())
                .into_owned();
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_duplicates() {
        let registry = Registry::new();
        registry.register(Arc::new(TagPlugin::new())).unwrap();
        let err = registry.register(Arc::new(TagPlugin::new())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn get_unknown_plugin_is_not_found() {
        let registry = Registry::new();
        assert!(matches!(registry.get("ghost"), Err(Error::NotFound(_))));
    }

    #[test]
    fn configure_and_process_tag_plugin() {
        let registry = Registry::new();
        registry.register(Arc::new(TagPlugin::new())).unwrap();

        let config = HashMap::from([
            ("field".to_owned(), "env".to_owned()),
            ("value".to_owned(), "prod".to_owned()),
        ]);
        registry.configure("tag", &config).unwrap();

        let plugin = registry.get("tag").unwrap();
        let mut entry = LogEntry::new("s", "m");
        plugin.process(&mut entry).unwrap();
        assert_eq!(entry.get_string_field("env").as_deref(), Some("prod"));
    }

    #[test]
    fn tag_plugin_requires_field_key() {
        let plugin = TagPlugin::new();
        assert!(plugin.init(&HashMap::new()).is_err());
    }

    #[test]
    fn redact_plugin_masks_matches() {
        let plugin = RedactPlugin::new();
        plugin
            .init(&HashMap::from([(
                "pattern".to_owned(),
                r"\d{4}-\d{4}".to_owned(),
            )]))
            .unwrap();

        let mut entry = LogEntry::new("s", "card 1234-5678 used");
        plugin.process(&mut entry).unwrap();
        assert_eq!(entry.message, "card [redacted] used");
    }

    #[test]
    fn list_and_close_all() {
        let registry = Registry::new();
        registry.register(Arc::new(TagPlugin::new())).unwrap();
        registry.register(Arc::new(RedactPlugin::new())).unwrap();

        let mut names: Vec<String> = registry.list().into_iter().map(|p| p.name).collect();
        names.sort();
        assert_eq!(names, vec!["redact", "tag"]);

        registry.close_all();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn builtin_lookup() {
        assert!(builtin("tag").is_some());
        assert!(builtin("redact").is_some());
        assert!(builtin("nope").is_none());
    }
}
