//! Flat dotted-key configuration
//!
//! Configuration is a flat map of dotted keys to scalars, loaded once at
//! startup. TOML tables flatten into key prefixes:
//!
//! ```toml
//! debug = true
//!
//! [global]
//! retry_after = 60
//! heartbeat_page = "__heartbeat__"
//!
//! ["host:example.com"]
//! storage.quota = 5000
//! ```
//!
//! yields `debug`, `global.retry_after`, `global.heartbeat_page` and
//! `host:example.com.storage.quota`. Arrays are not configuration values and
//! are skipped, so a route table can live in the same file.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Default `Retry-After` seconds for backend failures
pub const DEFAULT_RETRY_AFTER: u64 = 1800;

/// Default heartbeat path segment
pub const DEFAULT_HEARTBEAT_PAGE: &str = "__heartbeat__";

/// Scalar configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    /// Convert a raw string the way ini-style settings are read:
    /// booleans and numbers are recognized, everything else stays text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => return Value::Boolean(true),
            "false" => return Value::Boolean(false),
            _ => {}
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        Value::String(raw.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            Value::Float(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Flat configuration mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    values: BTreeMap<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Build from raw string pairs, converting each value with [`Value::parse`]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::parse(v.as_ref())))
            .collect();
        Self { values }
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let table: toml::Table = source.parse()?;
        let mut config = Config::new();
        config.flatten("", &table)?;
        Ok(config)
    }

    /// Load a TOML file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    fn flatten(&mut self, prefix: &str, table: &toml::Table) -> Result<()> {
        for (key, value) in table {
            let full = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                toml::Value::Table(inner) => self.flatten(&full, inner)?,
                toml::Value::String(s) => self.insert(full, s.clone()),
                toml::Value::Integer(i) => self.insert(full, *i),
                toml::Value::Float(f) => self.insert(full, *f),
                toml::Value::Boolean(b) => self.insert(full, *b),
                toml::Value::Datetime(d) => self.insert(full, d.to_string()),
                toml::Value::Array(_) => {
                    tracing::debug!(key = %full, "skipping non-scalar config entry");
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries under `prefix.`, with the prefix stripped
    pub fn section(&self, prefix: &str) -> Config {
        let head = format!("{}.", prefix);
        let values = self
            .values
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&head).map(|rest| (rest.to_string(), v.clone())))
            .collect();
        Config { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Config {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let values = iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { values }
    }
}

/// Dispatcher settings read from the global section
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// `global.retry_after`
    pub retry_after: u64,
    /// `global.heartbeat_page`; an empty value disables the page
    pub heartbeat_page: Option<String>,
    /// `global.debug_page`; disabled unless configured
    pub debug_page: Option<String>,
    /// `debug`: log one line per request
    pub debug: bool,
    /// `client_debug`: show fault details to the client
    pub client_debug: bool,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        let page = |key: &str| {
            config
                .get(key)
                .map(|v| v.to_string())
                .filter(|s| !s.is_empty())
        };

        Self {
            retry_after: config
                .get_int("global.retry_after")
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(DEFAULT_RETRY_AFTER),
            heartbeat_page: match config.get("global.heartbeat_page") {
                Some(_) => page("global.heartbeat_page"),
                None => Some(DEFAULT_HEARTBEAT_PAGE.to_string()),
            },
            debug_page: page("global.debug_page"),
            debug: config.get_bool("debug").unwrap_or(false),
            client_debug: config.get_bool("client_debug").unwrap_or(false),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::new())
    }
}
