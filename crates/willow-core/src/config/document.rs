//! Parsed configuration document and its typed, defaulted accessors.

use alloc::string::{String, ToString};
use core::fmt;

use serde_json::{Map, Value};

use super::ConfigError;

/// Top-level key/value map of the persisted configuration.
///
/// Never mutated after parsing; a new document replaces the old one whole.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigDocument {
    entries: Map<String, Value>,
}

impl ConfigDocument {
    pub fn parse<E>(bytes: &[u8]) -> Result<Self, ConfigError<E>> {
        let value: Value = serde_json::from_slice(bytes).map_err(|err| ConfigError::Parse {
            line: err.line(),
            column: err.column(),
        })?;

        match value {
            Value::Object(entries) => Ok(Self { entries }),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.entries.get(key)?.as_bool()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key)?.as_str()
    }

    /// Integral JSON numbers that fit in `i32`; fractions and overflow are mismatches.
    pub fn get_int(&self, key: &str) -> Option<i32> {
        let raw = self.entries.get(key)?.as_i64()?;
        i32::try_from(raw).ok()
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "\n  {:?}: {}", key, value)?;
        }
        if !self.entries.is_empty() {
            f.write_str("\n")?;
        }
        f.write_str("}")
    }
}

/// Read view over an optional document: every lookup is total.
///
/// A missing document, a missing key and a key of the wrong kind all resolve
/// to the caller's default.
#[derive(Clone, Copy, Debug)]
pub struct ConfigAccessor<'a> {
    document: Option<&'a ConfigDocument>,
}

impl<'a> ConfigAccessor<'a> {
    pub const fn new(document: Option<&'a ConfigDocument>) -> Self {
        Self { document }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.document
            .and_then(|doc| doc.get_bool(key))
            .unwrap_or(default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.document
            .and_then(|doc| doc.get_str(key))
            .unwrap_or(default)
            .to_string()
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.document
            .and_then(|doc| doc.get_int(key))
            .unwrap_or(default)
    }
}
