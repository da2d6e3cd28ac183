//! Structured logging and redaction of credentials in logged values.
//!
//! - JSON output for production, pretty or compact for development
//! - Per-module level directives layered over the global level
//! - A process-wide [`SensitiveFieldRedactor`] used for audit metadata

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global filter directive (`info`, `rolegate_core=debug`, ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Extra `module=level` directives
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    #[serde(default = "default_true")]
    pub include_location: bool,

    #[serde(default = "default_true")]
    pub include_target: bool,

    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: true,
            include_target: true,
            redaction: RedactionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// Redaction rules for values that end up in logs and audit events.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_redaction_patterns")]
    pub patterns: Vec<RedactionPattern>,

    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: default_redaction_patterns(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// Matches on a key name substring, a value regex, or both.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionPattern {
    pub name: String,

    /// Case-insensitive substrings of key names
    #[serde(default)]
    pub field_names: Vec<String>,

    #[serde(default)]
    pub value_pattern: Option<String>,
}

/// Compiled redaction rules.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    field_names: Vec<String>,
    value_patterns: Vec<regex::Regex>,
    replacement: String,
    enabled: bool,
}

impl SensitiveFieldRedactor {
    /// Compile the configured rules. Patterns that fail to compile are
    /// skipped with a warning.
    pub fn new(config: &RedactionConfig) -> Self {
        let field_names = config
            .patterns
            .iter()
            .flat_map(|p| p.field_names.iter().map(|f| f.to_lowercase()))
            .collect();

        let value_patterns = config
            .patterns
            .iter()
            .filter_map(|p| {
                let source = p.value_pattern.as_ref()?;
                match regex::Regex::new(source) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p.name, error = %e, "Invalid redaction pattern");
                        None
                    }
                }
            })
            .collect();

        Self {
            field_names,
            value_patterns,
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    pub fn should_redact_field(&self, field_name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let lower = field_name.to_lowercase();
        self.field_names.iter().any(|f| lower.contains(f.as_str()))
    }

    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }
        self.value_patterns
            .iter()
            .fold(value.to_string(), |acc, re| {
                re.replace_all(&acc, self.replacement.as_str()).into_owned()
            })
    }

    /// Whole-value replacement for sensitive keys, pattern scrubbing otherwise.
    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            return self.replacement.clone();
        }
        self.redact_value(value)
    }

    /// Redact a JSON value, descending into arrays and objects.
    pub fn redact_json(&self, field_name: &str, value: serde_json::Value) -> serde_json::Value {
        use serde_json::Value;

        if self.should_redact_field(field_name) {
            return Value::String(self.replacement.clone());
        }
        match value {
            Value::String(s) => Value::String(self.redact_value(&s)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| self.redact_json(field_name, v))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = self.redact_json(&k, v);
                        (k, v)
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_true() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_redaction_patterns() -> Vec<RedactionPattern> {
    let names = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
    vec![
        RedactionPattern {
            name: "bearer_tokens".to_string(),
            field_names: names(&["authorization", "bearer", "token", "jwt"]),
            value_pattern: Some(r"eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+".to_string()),
        },
        RedactionPattern {
            name: "secrets".to_string(),
            field_names: names(&["password", "secret", "credential", "private_key"]),
            value_pattern: None,
        },
        RedactionPattern {
            name: "api_keys".to_string(),
            field_names: names(&["api_key", "apikey", "x-api-key"]),
            value_pattern: Some(r"\b(?:sk|rk|pk)_[a-zA-Z0-9]{20,}\b".to_string()),
        },
    ]
}

/// Install the global subscriber and redactor.
///
/// In `development` the JSON default is swapped for the pretty format.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let _ = REDACTOR.set(SensitiveFieldRedactor::new(&config.redaction));

    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(format!("{module}={level}").parse()?);
    }

    let format = if environment == "development" && config.format == LogFormat::Json {
        LogFormat::Pretty
    } else {
        config.format
    };

    let base = fmt::layer()
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target);

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(base.json()).try_init()?,
        LogFormat::Pretty => registry.with(base.pretty()).try_init()?,
        LogFormat::Compact => registry.with(base.compact()).try_init()?,
    }

    Ok(())
}
