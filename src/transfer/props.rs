//! Read-only configuration bag handed to transfer functions.

use crate::error::{CoreError, Result};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// String key/value options of a transfer stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageProps {
    entries: BTreeMap<String, String>,
}

impl StageProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a TOML table; scalars are stringified, arrays become comma lists
    pub fn from_toml(table: &toml::Table) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (key, value) in table {
            entries.insert(key.clone(), toml_to_prop(key, value)?);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The value of `key`, `InvalidArgument` if missing
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| CoreError::invalid(format!("Missing required property '{}'", key)))
    }

    /// Parse `key` if present
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    CoreError::invalid(format!("Invalid value '{}' for property '{}': {}", raw, key, e))
                })
            })
            .transpose()
    }

    /// Comma separated list, empty entries dropped
    pub fn list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for StageProps
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for StageProps {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

impl From<std::collections::HashMap<String, String>> for StageProps {
    fn from(entries: std::collections::HashMap<String, String>) -> Self {
        entries.into_iter().collect()
    }
}

fn toml_to_prop(key: &str, value: &toml::Value) -> Result<String> {
    Ok(match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                toml::Value::Array(_) | toml::Value::Table(_) => Err(CoreError::Config(format!(
                    "Property '{}' can't contain nested arrays or tables",
                    key
                ))),
                other => toml_to_prop(key, other),
            })
            .collect::<Result<Vec<_>>>()?
            .join(","),
        toml::Value::Table(_) => {
            return Err(CoreError::Config(format!(
                "Property '{}' can't be a table",
                key
            )))
        }
    })
}
