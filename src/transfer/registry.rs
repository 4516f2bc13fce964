//! Name to factory table for transfer functions.
//!
//! Components select their transfer function by name in the configuration.
//! The registry is the single source of truth for those names.

use crate::error::{CoreError, Result};
use crate::transfer::functions::{ModeOverride, ScriptTransfer};
use crate::transfer::stage::{StageContext, TransferFunction, TransferStage};
use std::collections::BTreeMap;
use std::fmt;

/// Builds a fresh transfer function for one stage
pub type TransferFactory = fn(&StageContext) -> Result<Box<dyn TransferFunction>>;

#[derive(Clone, Default)]
pub struct TransferRegistry {
    factories: BTreeMap<String, TransferFactory>,
}

impl TransferRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `script` and `mode_override`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ScriptTransfer::NAME, |_| Ok(Box::new(ScriptTransfer::new())));
        registry.register(ModeOverride::NAME, |_| Ok(Box::new(ModeOverride::new())));
        registry
    }

    /// Add or replace the factory for `name`
    pub fn register(&mut self, name: impl Into<String>, factory: TransferFactory) {
        let name = name.into();
        if self.factories.insert(name.clone(), factory).is_some() {
            tracing::debug!("Replaced transfer function factory '{}'", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the function registered as `name`
    pub fn create(&self, name: &str, ctx: &StageContext) -> Result<Box<dyn TransferFunction>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            CoreError::Config(format!(
                "Unknown transfer function '{}' for '{}' (known: {})",
                name,
                ctx.running_id(),
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })?;
        factory(ctx)
    }

    /// Instantiate `name` and wrap it in a stage bound to `ctx`
    pub fn build_stage(&self, name: &str, ctx: StageContext) -> Result<TransferStage> {
        let function = self.create(name, &ctx)?;
        TransferStage::new(function, ctx)
    }
}

impl fmt::Debug for TransferRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
