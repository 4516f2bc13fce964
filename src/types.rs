//! Core value types for monitor points
//!
//! This module contains the closed enumerations and the payload union that
//! every [`Sample`](crate::sample::Sample) is built from.
//!
//! # Main Types
//!
//! - [`ValueType`] - Tag identifying which kind of payload a sample carries
//! - [`OperationalMode`] - Operating state of the producer of a sample
//! - [`Value`] - The payload itself, one variant per [`ValueType`]
//! - [`Payload`] - Capability trait mapping Rust types onto [`ValueType`]s
//!
//! # Value Types
//!
//! - Integers: INT64, INT32
//! - Floating point: FLOAT64, FLOAT32
//! - BOOLEAN, CHAR, STRING
//! - TIMESTAMP (UTC)
//! - ALARM ([`AlarmState`])
//!
//! The set is closed. New kinds are added as new tags and variants, never by
//! wrapping an existing one.

use crate::alarm::AlarmState;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents the type of a monitor point payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    /// 64-bit signed integer
    Int64,
    /// 32-bit signed integer
    Int32,
    /// 64-bit floating point
    Float64,
    /// 32-bit floating point
    Float32,
    /// Boolean value
    Boolean,
    /// Single unicode character
    Char,
    /// UTF-8 string
    String,
    /// Point in time (UTC)
    Timestamp,
    /// Alarm state
    Alarm,
}

impl ValueType {
    /// Get all value types
    pub fn all() -> &'static [ValueType] {
        &[
            ValueType::Int64,
            ValueType::Int32,
            ValueType::Float64,
            ValueType::Float32,
            ValueType::Boolean,
            ValueType::Char,
            ValueType::String,
            ValueType::Timestamp,
            ValueType::Alarm,
        ]
    }

    /// Upper-case tag name used at the boundary
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int64 => "INT64",
            ValueType::Int32 => "INT32",
            ValueType::Float64 => "FLOAT64",
            ValueType::Float32 => "FLOAT32",
            ValueType::Boolean => "BOOLEAN",
            ValueType::Char => "CHAR",
            ValueType::String => "STRING",
            ValueType::Timestamp => "TIMESTAMP",
            ValueType::Alarm => "ALARM",
        }
    }

    /// Returns true for the integer and floating point tags
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Int64 | ValueType::Int32 | ValueType::Float64 | ValueType::Float32
        )
    }

    /// The payload a freshly declared point of this type starts with
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Int64 => Value::Int64(0),
            ValueType::Int32 => Value::Int32(0),
            ValueType::Float64 => Value::Float64(0.0),
            ValueType::Float32 => Value::Float32(0.0),
            ValueType::Boolean => Value::Boolean(false),
            ValueType::Char => Value::Char('\0'),
            ValueType::String => Value::String(String::new()),
            ValueType::Timestamp => Value::Timestamp(DateTime::<Utc>::default()),
            ValueType::Alarm => Value::Alarm(AlarmState::CLEARED),
        }
    }

    /// Parse a textual payload into a value of this type.
    ///
    /// Timestamps use RFC 3339, alarms use the [`AlarmState`] display form.
    /// Surrounding whitespace is ignored except for `STRING` and `CHAR`,
    /// whose text is taken as is.
    pub fn parse_value(&self, text: &str) -> Result<Value, CoreError> {
        let bad = |e: String| {
            CoreError::invalid(format!("Cannot parse '{}' as {}: {}", text, self, e))
        };
        let trimmed = text.trim();
        Ok(match self {
            ValueType::Int64 => {
                Value::Int64(trimmed.parse::<i64>().map_err(|e| bad(e.to_string()))?)
            }
            ValueType::Int32 => {
                Value::Int32(trimmed.parse::<i32>().map_err(|e| bad(e.to_string()))?)
            }
            ValueType::Float64 => {
                Value::Float64(trimmed.parse::<f64>().map_err(|e| bad(e.to_string()))?)
            }
            ValueType::Float32 => {
                Value::Float32(trimmed.parse::<f32>().map_err(|e| bad(e.to_string()))?)
            }
            ValueType::Boolean => {
                Value::Boolean(trimmed.parse::<bool>().map_err(|e| bad(e.to_string()))?)
            }
            ValueType::Char => Value::Char(text.parse::<char>().map_err(|e| bad(e.to_string()))?),
            ValueType::String => Value::String(text.to_string()),
            ValueType::Timestamp => Value::Timestamp(
                DateTime::parse_from_rfc3339(trimmed)
                    .map_err(|e| bad(e.to_string()))?
                    .with_timezone(&Utc),
            ),
            ValueType::Alarm => Value::Alarm(trimmed.parse::<AlarmState>()?),
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = CoreError;

    /// Accepts the tag names case-insensitively, plus the legacy aliases
    /// `LONG`, `INT`, `DOUBLE`, `FLOAT` and `BOOL`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "LONG" => return Ok(ValueType::Int64),
            "INT" => return Ok(ValueType::Int32),
            "DOUBLE" => return Ok(ValueType::Float64),
            "FLOAT" => return Ok(ValueType::Float32),
            "BOOL" => return Ok(ValueType::Boolean),
            _ => {}
        }
        ValueType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| CoreError::invalid(format!("Unknown value type '{}'", s)))
    }
}

/// Operating state of the producer of a sample.
///
/// Ordered from healthy to least trustworthy, so `max` over a set of modes
/// yields the worst one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationalMode {
    /// Producing trustworthy values
    Operational,
    /// Working with reduced quality
    Degraded,
    /// Values may not reflect reality
    Unreliable,
    /// The producer has been shut down
    Shutdown,
    /// Mode could not be determined
    #[default]
    Unknown,
}

impl OperationalMode {
    /// Get all modes, healthiest first
    pub fn all() -> &'static [OperationalMode] {
        &[
            OperationalMode::Operational,
            OperationalMode::Degraded,
            OperationalMode::Unreliable,
            OperationalMode::Shutdown,
            OperationalMode::Unknown,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalMode::Operational => "OPERATIONAL",
            OperationalMode::Degraded => "DEGRADED",
            OperationalMode::Unreliable => "UNRELIABLE",
            OperationalMode::Shutdown => "SHUTDOWN",
            OperationalMode::Unknown => "UNKNOWN",
        }
    }

    /// The least trustworthy of `modes`, `None` if there are none
    pub fn worst<I>(modes: I) -> Option<OperationalMode>
    where
        I: IntoIterator<Item = OperationalMode>,
    {
        modes.into_iter().max()
    }
}

impl fmt::Display for OperationalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationalMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationalMode::all()
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::invalid(format!("Unknown operational mode '{}'", s)))
    }
}

/// The payload of a sample, one variant per [`ValueType`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum Value {
    Int64(i64),
    Int32(i32),
    Float64(f64),
    Float32(f32),
    Boolean(bool),
    Char(char),
    String(String),
    Timestamp(DateTime<Utc>),
    Alarm(AlarmState),
}

impl Value {
    /// The tag of this payload
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int64(_) => ValueType::Int64,
            Value::Int32(_) => ValueType::Int32,
            Value::Float64(_) => ValueType::Float64,
            Value::Float32(_) => ValueType::Float32,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Char(_) => ValueType::Char,
            Value::String(_) => ValueType::String,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Alarm(_) => ValueType::Alarm,
        }
    }

    /// Numeric view of integer and floating point payloads
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Int32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Float32(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_alarm(&self) -> Option<&AlarmState> {
        AlarmState::from_value(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Alarm(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// A Rust type that can be carried as a sample payload.
///
/// This is the typed-update capability: code that knows the concrete type of
/// a point reads and replaces payloads through it instead of matching on
/// [`Value`] by hand.
pub trait Payload: Sized {
    /// The tag every value of this type is stored under
    const VALUE_TYPE: ValueType;

    /// Wrap into the payload union
    fn into_value(self) -> Value;

    /// Borrow out of the payload union, `None` on a type mismatch
    fn from_value(value: &Value) -> Option<&Self>;
}

macro_rules! impl_payload {
    ($ty:ty, $variant:ident) => {
        impl Payload for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<&Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_payload!(i64, Int64);
impl_payload!(i32, Int32);
impl_payload!(f64, Float64);
impl_payload!(f32, Float32);
impl_payload!(bool, Boolean);
impl_payload!(char, Char);
impl_payload!(String, String);
impl_payload!(DateTime<Utc>, Timestamp);
impl_payload!(AlarmState, Alarm);
