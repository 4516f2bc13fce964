//! Alarm payload and its state machine
//!
//! [`AlarmState`] is the payload carried by `ALARM` typed samples. It tracks
//! activation (with a priority while set), operator acknowledgement and
//! shelving. The only way to move between states is the pure
//! [`AlarmState::transition`] function, driven by a set of [`Trigger`]s.
//!
//! # Resolution rules
//!
//! Triggers in one set are resolved independently of their order:
//!
//! - Any `Set(p)` activates the alarm with the highest requested priority.
//!   `Set` dominates `Clear` when both are present.
//! - Activating a cleared alarm, or raising its priority, resets the
//!   acknowledgement.
//! - `Clear` without `Set` deactivates the alarm and keeps the acknowledgement.
//! - `Acknowledge` is applied after activation changes.
//! - `Shelve` and `Unshelve` in the same set cancel out.
//! - An empty set returns the current state unchanged.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Severity of an active alarm
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Get all priorities, lowest first
    pub fn all() -> &'static [Priority] {
        &[
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Critical,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::all()
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::invalid(format!("Unknown alarm priority '{}'", s)))
    }
}

/// Whether the alarm condition is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Activation {
    #[default]
    Cleared,
    Set(Priority),
}

/// Operator acknowledgement of the alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Acknowledgement {
    #[default]
    Acknowledged,
    Unacknowledged,
}

/// A condition that drives an alarm transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trigger {
    Set(Priority),
    Clear,
    Acknowledge,
    Shelve,
    Unshelve,
}

impl Trigger {
    /// Parse a comma separated list such as `"set:high, ack"`.
    ///
    /// Blank input yields the empty set.
    pub fn parse_list(s: &str) -> Result<BTreeSet<Trigger>, CoreError> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Trigger::from_str)
            .collect()
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Set(p) => write!(f, "set:{}", p.as_str().to_ascii_lowercase()),
            Trigger::Clear => write!(f, "clear"),
            Trigger::Acknowledge => write!(f, "ack"),
            Trigger::Shelve => write!(f, "shelve"),
            Trigger::Unshelve => write!(f, "unshelve"),
        }
    }
}

impl FromStr for Trigger {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "set" => Ok(Trigger::Set(Priority::default())),
            "clear" => Ok(Trigger::Clear),
            "ack" | "acknowledge" => Ok(Trigger::Acknowledge),
            "shelve" => Ok(Trigger::Shelve),
            "unshelve" => Ok(Trigger::Unshelve),
            other => match other.strip_prefix("set:") {
                Some(priority) => Ok(Trigger::Set(priority.parse()?)),
                None => Err(CoreError::invalid(format!("Unknown alarm trigger '{}'", s))),
            },
        }
    }
}

/// State of an alarm monitor point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct AlarmState {
    pub activation: Activation,
    pub acknowledgement: Acknowledgement,
    pub shelved: bool,
}

impl AlarmState {
    /// A cleared, acknowledged, unshelved alarm
    pub const CLEARED: AlarmState = AlarmState {
        activation: Activation::Cleared,
        acknowledgement: Acknowledgement::Acknowledged,
        shelved: false,
    };

    /// A freshly raised alarm waiting for acknowledgement
    pub fn set(priority: Priority) -> Self {
        Self {
            activation: Activation::Set(priority),
            acknowledgement: Acknowledgement::Unacknowledged,
            shelved: false,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self.activation, Activation::Set(_))
    }

    /// Priority of an active alarm, `None` when cleared
    pub fn priority(&self) -> Option<Priority> {
        match self.activation {
            Activation::Set(p) => Some(p),
            Activation::Cleared => None,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledgement == Acknowledgement::Acknowledged
    }

    /// Set and not shelved: the alarm an operator should see
    pub fn is_annunciated(&self) -> bool {
        self.is_set() && !self.shelved
    }

    /// Compute the next state from `current` and a set of triggers.
    ///
    /// Pure and total: the same arguments always give the same result, and
    /// the empty set maps `current` to itself.
    pub fn transition(current: AlarmState, triggers: &BTreeSet<Trigger>) -> AlarmState {
        if triggers.is_empty() {
            return current;
        }

        let mut next = current;

        let requested = triggers
            .iter()
            .filter_map(|t| match t {
                Trigger::Set(p) => Some(*p),
                _ => None,
            })
            .max();

        match requested {
            Some(priority) => {
                let raised = match current.activation {
                    Activation::Cleared => true,
                    Activation::Set(old) => priority > old,
                };
                next.activation = Activation::Set(priority);
                if raised {
                    next.acknowledgement = Acknowledgement::Unacknowledged;
                }
            }
            None if triggers.contains(&Trigger::Clear) => {
                next.activation = Activation::Cleared;
            }
            None => {}
        }

        if triggers.contains(&Trigger::Acknowledge) {
            next.acknowledgement = Acknowledgement::Acknowledged;
        }

        match (
            triggers.contains(&Trigger::Shelve),
            triggers.contains(&Trigger::Unshelve),
        ) {
            (true, false) => next.shelved = true,
            (false, true) => next.shelved = false,
            _ => {}
        }

        next
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.activation {
            Activation::Cleared => write!(f, "CLEARED")?,
            Activation::Set(p) => write!(f, "SET:{}", p)?,
        }
        if !self.is_acknowledged() {
            write!(f, "/UNACK")?;
        }
        if self.shelved {
            write!(f, "/SHELVED")?;
        }
        Ok(())
    }
}

impl FromStr for AlarmState {
    type Err = CoreError;

    /// Parses the [`Display`](fmt::Display) form, e.g. `SET:HIGH/UNACK`.
    /// A bare `SET` means medium priority.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('/');
        let head = parts.next().unwrap_or_default().trim().to_ascii_uppercase();

        let activation = match head.as_str() {
            "CLEARED" => Activation::Cleared,
            "SET" => Activation::Set(Priority::default()),
            other => match other.strip_prefix("SET:") {
                Some(p) => Activation::Set(p.parse()?),
                None => {
                    return Err(CoreError::invalid(format!(
                        "Unknown alarm state '{}'",
                        s
                    )))
                }
            },
        };

        let mut state = AlarmState {
            activation,
            ..AlarmState::CLEARED
        };
        for flag in parts {
            match flag.trim().to_ascii_uppercase().as_str() {
                "UNACK" => state.acknowledgement = Acknowledgement::Unacknowledged,
                "SHELVED" => state.shelved = true,
                other => {
                    return Err(CoreError::invalid(format!(
                        "Unknown alarm flag '{}' in '{}'",
                        other, s
                    )))
                }
            }
        }
        Ok(state)
    }
}
