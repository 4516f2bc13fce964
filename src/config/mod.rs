//! Configuration module for monitor-core
//!
//! A project file is a TOML document describing computing elements:
//!
//! ```toml
//! [[component]]
//! id = "temp_avg"
//! parent = "obs"
//! value_type = "FLOAT64"
//! value = "0.0"
//! mode = "UNKNOWN"
//! function = "script"
//! inputs = ["t1", "t2"]
//!
//! [component.props]
//! script = "#{ value: (inputs.t1.value + inputs.t2.value) / 2.0 }"
//! ```
//!
//! `parent` is the running id of the parent, its levels separated by `:`.
//!
//! # Example
//!
//! ```ignore
//! use monitor_core::{ProjectConfig, SystemClock, TransferRegistry};
//! use std::sync::Arc;
//!
//! let config = ProjectConfig::load("observatory.toml")?;
//! let mut elements = config.build_elements(&TransferRegistry::with_builtins(), Arc::new(SystemClock))?;
//! for element in &mut elements {
//!     element.start()?;
//! }
//! ```

use crate::clock::SharedClock;
use crate::error::{CoreError, Result, ResultExt};
use crate::identifier::{Identifier, RUNNING_ID_SEPARATOR};
use crate::sample::Sample;
use crate::transfer::{ComputingElement, StageContext, StageProps, TransferRegistry};
use crate::types::{OperationalMode, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Description of one computing element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub id: String,
    /// Running id of the parent, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub value_type: ValueType,
    /// Initial payload in text form; the type's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub mode: OperationalMode,
    /// Name of the transfer function in the registry
    pub function: String,
    /// Ids of the input samples
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub props: toml::Table,
}

impl ComponentConfig {
    pub fn new(id: impl Into<String>, value_type: ValueType, function: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            value_type,
            value: None,
            mode: OperationalMode::default(),
            function: function.into(),
            inputs: Vec::new(),
            props: toml::Table::new(),
        }
    }

    /// Identifier built from `parent` and `id`
    pub fn identifier(&self) -> Result<Identifier> {
        match &self.parent {
            Some(parent) => Identifier::from_path(
                parent
                    .split(RUNNING_ID_SEPARATOR)
                    .chain(std::iter::once(self.id.as_str())),
            ),
            None => Identifier::new(&self.id),
        }
    }

    /// The initial output sample, stamped with `clock`
    pub fn initial_output(&self, identifier: &Identifier, clock: &SharedClock) -> Result<Sample> {
        let payload = match &self.value {
            Some(text) => self.value_type.parse_value(text)?,
            None => self.value_type.default_value(),
        };
        Sample::builder_for(identifier, self.value_type)
            .payload(payload)
            .mode(self.mode)
            .build_with(clock)
    }

    /// Build a ready-to-start element
    pub fn build_element(
        &self,
        registry: &TransferRegistry,
        clock: SharedClock,
    ) -> Result<ComputingElement> {
        let identifier = self.identifier()?;
        let output = self.initial_output(&identifier, &clock)?;
        let props = StageProps::from_toml(&self.props)?;
        let ctx = StageContext::for_identifier(&identifier, props, clock);
        let stage = registry.build_stage(&self.function, ctx)?;
        Ok(ComputingElement::new(stage, output)?.with_expected_inputs(self.inputs.iter().cloned()))
    }
}

/// A project file: the set of computing elements to host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(rename = "component", default)]
    pub components: Vec<ComponentConfig>,
}

impl ProjectConfig {
    /// Load a project file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("Failed to read project file {:?}: {}", path, e))
        })?;
        Self::from_str(&content).with_context(|| format!("Loading {:?}", path))
    }

    /// Parse and validate a project from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CoreError::Config(format!("Failed to parse project file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save as TOML, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Config(format!("Failed to create project directory: {}", e))
            })?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content)
            .map_err(|e| CoreError::Config(format!("Failed to write project file: {}", e)))?;
        tracing::info!("Saved project with {} components to {:?}", self.components.len(), path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("Failed to serialize project: {}", e)))
    }

    /// Running ids must be unique and every id valid
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for component in &self.components {
            let identifier = component
                .identifier()
                .with_context(|| format!("Component '{}'", component.id))?;
            if !seen.insert(identifier.running_id().to_string()) {
                return Err(CoreError::Config(format!(
                    "Duplicate component '{}'",
                    identifier.running_id()
                )));
            }
        }
        Ok(())
    }

    /// Build every component, failing on the first bad one
    pub fn build_elements(
        &self,
        registry: &TransferRegistry,
        clock: SharedClock,
    ) -> Result<Vec<ComputingElement>> {
        self.components
            .iter()
            .map(|component| {
                component
                    .build_element(registry, clock.clone())
                    .with_context(|| format!("Building component '{}'", component.id))
            })
            .collect()
    }
}
