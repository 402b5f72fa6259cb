//! SSO server configuration file parser
//!
//! This crate parses INI-style configuration files (`sso.conf`) and exposes
//! typed options to the rest of the server. Values written as `ENC(...)` are
//! ciphertext and are replaced with plaintext by [`SsoConfig::decrypt_with`]
//! using an explicitly constructed [`KeyManager`].
//!
//! # Example
//!
//! ```
//! use ssoconfig::{define_options, Count, Duration, SsoConfig};
//!
//! define_options! {
//!     /// Cleaner settings
//!     pub struct CleanerOptions {
//!         /// Delay before the first sweep
//!         cleaner_start_delay: Duration = Duration(std::time::Duration::from_secs(20)),
//!         /// Expected number of live tickets
//!         initial_capacity: Count = Count(1000),
//!     }
//! }
//!
//! let config = SsoConfig::parse("[registry]\ncleaner_start_delay = 5s\n").unwrap();
//! let options = CleanerOptions::from_config(&config, &["registry", "global"]);
//! assert_eq!(options.cleaner_start_delay.0, std::time::Duration::from_secs(5));
//! assert_eq!(options.initial_capacity.0, 1000);
//! ```

pub mod keys;

pub use keys::{AesKeyManager, KeyError, KeyManager};

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Missing required option: {0}")]
    MissingOption(String),

    #[error("Failed to decrypt value of '{key}': {reason}")]
    DecryptionError { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Trait for types that can be parsed from sso.conf values
pub trait ConfigValue: Sized + Clone {
    /// Parse from a string value in sso.conf
    fn parse_config_value(s: &str) -> Result<Self>;

    /// Get the type name for error messages
    fn type_name() -> &'static str;
}

/// Duration value (supports time units: s, ms, us, m, h, d; bare numbers are seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration(pub std::time::Duration);

impl ConfigValue for Duration {
    fn parse_config_value(s: &str) -> Result<Self> {
        parse_duration(s).map(Duration)
    }

    fn type_name() -> &'static str {
        "duration"
    }
}

/// Count value (plain integer)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count(pub u64);

impl ConfigValue for Count {
    fn parse_config_value(s: &str) -> Result<Self> {
        s.trim()
            .replace('_', "")
            .parse()
            .map(Count)
            .map_err(|_| ConfigError::ParseError(format!("Invalid count: {}", s)))
    }

    fn type_name() -> &'static str {
        "count"
    }
}

/// Ratio value (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratio(pub f64);

impl ConfigValue for Ratio {
    fn parse_config_value(s: &str) -> Result<Self> {
        let val: f64 = s
            .trim()
            .parse()
            .map_err(|_| ConfigError::ParseError(format!("Invalid ratio: {}", s)))?;
        if !(0.0..=1.0).contains(&val) {
            return Err(ConfigError::ParseError(
                "ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(Ratio(val))
    }

    fn type_name() -> &'static str {
        "ratio"
    }
}

impl ConfigValue for bool {
    fn parse_config_value(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ConfigError::ParseError(format!("Invalid bool: {}", s))),
        }
    }

    fn type_name() -> &'static str {
        "bool"
    }
}

impl ConfigValue for String {
    fn parse_config_value(s: &str) -> Result<Self> {
        Ok(s.to_string())
    }

    fn type_name() -> &'static str {
        "string"
    }
}

/// A configuration option with name, type, and default value
pub struct ConfigOption<T: ConfigValue> {
    name: &'static str,
    default: T,
    description: Option<&'static str>,
}

impl<T: ConfigValue> ConfigOption<T> {
    pub const fn new(name: &'static str, default: T) -> Self {
        Self {
            name,
            default,
            description: None,
        }
    }

    pub const fn with_description(mut self, desc: &'static str) -> Self {
        self.description = Some(desc);
        self
    }

    /// Get the value from config, falling back to the default when the
    /// option is absent or does not parse
    pub fn get(&self, config: &SsoConfig, sections: &[&str]) -> T {
        match config.get_with_fallback(sections, self.name) {
            Some(raw) => T::parse_config_value(raw).unwrap_or_else(|e| {
                tracing::warn!(
                    "Ignoring invalid {} for {}: {}",
                    T::type_name(),
                    self.name,
                    e
                );
                self.default.clone()
            }),
            None => self.default.clone(),
        }
    }

    /// Get the value from config, failing on values that do not parse
    pub fn try_get(&self, config: &SsoConfig, sections: &[&str]) -> Result<T> {
        match config.get_with_fallback(sections, self.name) {
            Some(raw) => T::parse_config_value(raw),
            None => Ok(self.default.clone()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    pub fn description(&self) -> Option<&'static str> {
        self.description
    }
}

/// Parse duration string with time units
fn parse_duration(s: &str) -> Result<std::time::Duration> {
    let s = s.trim();

    let num_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let num_str = &s[..num_end];
    let unit = s[num_end..].trim().to_lowercase();

    let num: f64 = num_str
        .parse()
        .map_err(|_| ConfigError::ParseError(format!("Invalid number: {}", num_str)))?;

    let seconds = match unit.as_str() {
        "" | "s" | "sec" | "second" | "seconds" => num,
        "ms" | "msec" | "millisecond" | "milliseconds" => num / 1000.0,
        "us" | "usec" | "microsecond" | "microseconds" => num / 1_000_000.0,
        "m" | "min" | "minute" | "minutes" => num * 60.0,
        "h" | "hr" | "hour" | "hours" => num * 3600.0,
        "d" | "day" | "days" => num * 86400.0,
        _ => {
            return Err(ConfigError::ParseError(format!(
                "Unknown time unit: {}",
                unit
            )))
        }
    };

    Ok(std::time::Duration::from_secs_f64(seconds))
}

/// Option keys are matched with spaces and underscores treated alike
fn normalize_key(key: &str) -> String {
    key.trim().replace(' ', "_")
}

/// Marker for ciphertext values: `ENC(<base64>)`
fn encrypted_payload(value: &str) -> Option<&str> {
    value
        .strip_prefix("ENC(")
        .and_then(|rest| rest.strip_suffix(')'))
}

/// Represents a parsed SSO configuration
#[derive(Debug, Clone, Default)]
pub struct SsoConfig {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SsoConfig {
    /// Parse a configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a configuration from a string
    pub fn parse(content: &str) -> Result<Self> {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current_section = String::from("global");

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') {
                if !line.ends_with(']') {
                    return Err(ConfigError::ParseError(format!(
                        "line {}: unterminated section header",
                        lineno + 1
                    )));
                }
                current_section = line[1..line.len() - 1].trim().to_string();
                sections.entry(current_section.clone()).or_default();
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(normalize_key(key), value.trim().to_string());
            } else {
                return Err(ConfigError::ParseError(format!(
                    "line {}: expected 'key = value'",
                    lineno + 1
                )));
            }
        }

        Ok(Self { sections })
    }

    /// Get a configuration value from a specific section
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(&normalize_key(key)))
            .map(|v| v.as_str())
    }

    /// Get a configuration value, checking multiple sections in order
    pub fn get_with_fallback(&self, sections: &[&str], key: &str) -> Option<&str> {
        sections
            .iter()
            .find_map(|section| self.get(section, key))
    }

    /// Get a value that has no sensible default
    pub fn require(&self, sections: &[&str], key: &str) -> Result<&str> {
        self.get_with_fallback(sections, key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingOption(key.to_string()))
    }

    /// Set a value, creating the section if needed
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(normalize_key(key), value.into());
    }

    /// Replace every `ENC(...)` value with its plaintext
    ///
    /// Returns the number of values decrypted. The first failure aborts and
    /// names the offending `section.key`.
    pub fn decrypt_with(&mut self, key_manager: &dyn KeyManager) -> Result<usize> {
        let mut decrypted = 0;
        for (section, entries) in self.sections.iter_mut() {
            for (key, value) in entries.iter_mut() {
                let Some(payload) = encrypted_payload(value) else {
                    continue;
                };
                let plaintext = key_manager.decrypt(payload).map_err(|e| {
                    ConfigError::DecryptionError {
                        key: format!("{}.{}", section, key),
                        reason: e.to_string(),
                    }
                })?;
                debug!("Decrypted configuration value {}.{}", section, key);
                *value = plaintext;
                decrypted += 1;
            }
        }
        Ok(decrypted)
    }

    /// Whether any value still holds ciphertext
    pub fn has_encrypted_values(&self) -> bool {
        self.sections
            .values()
            .flat_map(|s| s.values())
            .any(|v| encrypted_payload(v).is_some())
    }

    /// Get all sections in the configuration
    pub fn sections(&self) -> Vec<&str> {
        self.sections.keys().map(|s| s.as_str()).collect()
    }

    /// Get all keys in a section
    pub fn keys(&self, section: &str) -> Vec<&str> {
        self.sections
            .get(section)
            .map(|s| s.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Define a configuration struct with typed options
///
/// Each field name doubles as the option key in sso.conf.
#[macro_export]
macro_rules! define_options {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident: $ty:ty = $default:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $name {
            /// Create with default values
            pub fn new() -> Self {
                Self {
                    $(
                        $field: $default,
                    )*
                }
            }

            /// Load from sso.conf with section fallback
            pub fn from_config(
                config: &$crate::SsoConfig,
                sections: &[&str],
            ) -> Self {
                Self {
                    $(
                        $field: {
                            let opt = $crate::ConfigOption::new(stringify!($field), $default);
                            opt.get(config, sections)
                        },
                    )*
                }
            }

            /// Load from sso.conf, failing on the first value that does not parse
            pub fn try_from_config(
                config: &$crate::SsoConfig,
                sections: &[&str],
            ) -> $crate::Result<Self> {
                Ok(Self {
                    $(
                        $field: {
                            let opt = $crate::ConfigOption::new(stringify!($field), $default);
                            opt.try_get(config, sections)?
                        },
                    )*
                })
            }

            /// Get option names (for introspection)
            pub fn option_names() -> &'static [&'static str] {
                &[
                    $(stringify!($field),)*
                ]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}
