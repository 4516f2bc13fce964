//! Hierarchical identifiers.
//!
//! Every monitor point and computing element has an id and a running id: the
//! ids of its ancestors and itself joined root first. The rest of the crate
//! treats both as opaque strings; this type is the reference way to build
//! them.

use crate::error::{CoreError, Result};
use std::fmt;
use std::sync::Arc;

/// Separator between the levels of a running id.
pub const RUNNING_ID_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    id: Arc<str>,
    running_id: Arc<str>,
    parent: Option<Arc<Identifier>>,
}

impl Identifier {
    /// A root identifier
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = validate(id.as_ref())?;
        Ok(Self {
            running_id: Arc::clone(&id),
            id,
            parent: None,
        })
    }

    /// An identifier nested under `parent`
    pub fn with_parent(id: impl AsRef<str>, parent: Identifier) -> Result<Self> {
        let id = validate(id.as_ref())?;
        let running_id: Arc<str> =
            format!("{}{}{}", parent.running_id, RUNNING_ID_SEPARATOR, id).into();
        Ok(Self {
            id,
            running_id,
            parent: Some(Arc::new(parent)),
        })
    }

    /// Build a hierarchy from ids given root first, e.g. `["obs", "temp1"]`
    pub fn from_path<I, S>(path: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut current: Option<Identifier> = None;
        for part in path {
            current = Some(match current {
                None => Identifier::new(part)?,
                Some(parent) => Identifier::with_parent(part, parent)?,
            });
        }
        current.ok_or_else(|| CoreError::invalid("An identifier path can't be empty"))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn running_id(&self) -> &str {
        &self.running_id
    }

    pub fn parent(&self) -> Option<&Identifier> {
        self.parent.as_deref()
    }

    /// Number of ancestors
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |p| p.depth() + 1)
    }

    pub(crate) fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub(crate) fn running_id_arc(&self) -> Arc<str> {
        Arc::clone(&self.running_id)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.running_id)
    }
}

fn validate(id: &str) -> Result<Arc<str>> {
    if id.trim().is_empty() {
        return Err(CoreError::invalid("An identifier can't be empty"));
    }
    if id.contains(RUNNING_ID_SEPARATOR) {
        return Err(CoreError::invalid(format!(
            "Identifier '{}' can't contain '{}'",
            id, RUNNING_ID_SEPARATOR
        )));
    }
    Ok(Arc::from(id))
}
