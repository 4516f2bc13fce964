//! Computing element: a stage plus the samples it works on.
//!
//! The element owns the committed output and the latest value of each input.
//! `update` evaluates the stage and commits the result; when evaluation fails
//! the previous output stays committed.

use crate::error::{CoreError, Result, ResultExt};
use crate::sample::Sample;
use crate::transfer::stage::{Inputs, LifecycleState, TransferStage};
use std::collections::BTreeSet;

#[derive(Debug)]
pub struct ComputingElement {
    stage: TransferStage,
    output: Sample,
    inputs: Inputs,
    /// Accepted input ids, empty means any
    expected_inputs: BTreeSet<String>,
}

impl ComputingElement {
    /// Create an element whose initial output is `initial_output`.
    ///
    /// The output must belong to the stage's element.
    pub fn new(stage: TransferStage, initial_output: Sample) -> Result<Self> {
        let ctx = stage.context();
        if initial_output.id() != ctx.id() || initial_output.running_id() != ctx.running_id() {
            return Err(CoreError::invalid(format!(
                "Initial output '{}' does not belong to element '{}'",
                initial_output.running_id(),
                ctx.running_id()
            )));
        }
        Ok(Self {
            stage,
            output: initial_output,
            inputs: Inputs::new(),
            expected_inputs: BTreeSet::new(),
        })
    }

    /// Restrict the accepted inputs to `ids`
    pub fn with_expected_inputs<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_inputs = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> &str {
        self.stage.context().id()
    }

    pub fn running_id(&self) -> &str {
        self.stage.context().running_id()
    }

    pub fn state(&self) -> LifecycleState {
        self.stage.state()
    }

    pub fn stage(&self) -> &TransferStage {
        &self.stage
    }

    /// The committed output
    pub fn output(&self) -> &Sample {
        &self.output
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    pub fn expected_inputs(&self) -> impl Iterator<Item = &str> {
        self.expected_inputs.iter().map(String::as_str)
    }

    /// Initialize the stage
    pub fn start(&mut self) -> Result<()> {
        self.stage
            .initialize()
            .with_context(|| format!("Failed to start element {}", self.running_id()))
    }

    /// Store `sample` as the latest value of the input with its id
    pub fn submit(&mut self, sample: Sample) -> Result<()> {
        if !self.expected_inputs.is_empty() && !self.expected_inputs.contains(sample.id()) {
            return Err(CoreError::invalid(format!(
                "Element {} has no input '{}'",
                self.running_id(),
                sample.id()
            )));
        }
        self.inputs.insert(sample.id().to_string(), sample);
        Ok(())
    }

    /// Evaluate the stage and commit its output
    pub fn update(&mut self) -> Result<&Sample> {
        match self.stage.evaluate(&self.inputs, &self.output) {
            Ok(next) => {
                self.output = next;
                Ok(&self.output)
            }
            Err(e) => {
                tracing::debug!(
                    "Element {} keeps its previous output {}",
                    self.running_id(),
                    self.output
                );
                Err(e)
            }
        }
    }

    /// Shut the stage down
    pub fn stop(&mut self) -> Result<()> {
        self.stage.shutdown()
    }
}
