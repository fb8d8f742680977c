use chrono::SecondsFormat;
use regex::Regex;
use serde_json::Value;

use crate::domain::LogEntry;
use crate::domain::log_entry::field_to_string;
use crate::error::{Error, Result};

/// Mutates entries in place between filtering and storage.
pub trait Transformer: Send + Sync {
    fn transform(&self, entry: &mut LogEntry);
}

/// Sets a field to a fixed value.
pub struct AddFieldTransformer {
    name: String,
    value: Value,
}

impl AddFieldTransformer {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Transformer for AddFieldTransformer {
    fn transform(&self, entry: &mut LogEntry) {
        entry.fields.insert(self.name.clone(), self.value.clone());
    }
}

/// Removes a field if present.
pub struct RemoveFieldTransformer {
    name: String,
}

impl RemoveFieldTransformer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transformer for RemoveFieldTransformer {
    fn transform(&self, entry: &mut LogEntry) {
        entry.fields.remove(&self.name);
    }
}

/// Renames a field, keeping its value.
pub struct RenameFieldTransformer {
    from: String,
    to: String,
}

impl RenameFieldTransformer {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Transformer for RenameFieldTransformer {
    fn transform(&self, entry: &mut LogEntry) {
        if let Some(value) = entry.fields.remove(&self.from) {
            entry.fields.insert(self.to.clone(), value);
        }
    }
}

/// Extracts named capture groups from the message into fields.
pub struct RegexExtractTransformer {
    pattern: Regex,
}

impl RegexExtractTransformer {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("invalid extract pattern: {e}")))?;
        Ok(Self { pattern })
    }
}

impl Transformer for RegexExtractTransformer {
    fn transform(&self, entry: &mut LogEntry) {
        let Some(captures) = self.pattern.captures(&entry.message) else {
            return;
        };

        let mut extracted = Vec::new();
        for name in self.pattern.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                extracted.push((name.to_owned(), value.as_str().to_owned()));
            }
        }
        for (name, value) in extracted {
            entry.fields.insert(name, Value::String(value));
        }
    }
}

/// Stores the formatted timestamp in a field. The canonical timestamp is
/// untouched.
pub struct TimestampFormatTransformer {
    format: String,
}

impl TimestampFormatTransformer {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }
}

impl Transformer for TimestampFormatTransformer {
    fn transform(&self, entry: &mut LogEntry) {
        let formatted = entry.timestamp.format(&self.format).to_string();
        entry
            .fields
            .insert("formatted_timestamp".to_owned(), Value::String(formatted));
    }
}

/// Rewrites the message from a template with `{field}`, `{timestamp}`,
/// `{source}`, and `{level}` placeholders.
pub struct MessageTemplateTransformer {
    template: String,
}

impl MessageTemplateTransformer {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Transformer for MessageTemplateTransformer {
    fn transform(&self, entry: &mut LogEntry) {
        let mut message = self.template.clone();

        for (key, value) in &entry.fields {
            let placeholder = format!("{{{key}}}");
            if message.contains(&placeholder) {
                message = message.replace(&placeholder, &field_to_string(value));
            }
        }

        message = message.replace(
            "{timestamp}",
            &entry
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        message = message.replace("{source}", &entry.source);
        message = message.replace("{level}", &entry.level);

        entry.message = message;
    }
}
