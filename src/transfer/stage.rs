//! Transfer function contract and its lifecycle guard.
//!
//! A [`TransferFunction`] computes the new output of a computing element from
//! the element's inputs and its current output. It is never called directly
//! by the host: it is wrapped in a [`TransferStage`] that enforces the
//! lifecycle
//!
//! ```text
//! Created -> Initialized -> (evaluate)* -> ShutDown
//!    \-> Failed -> ShutDown
//! ```
//!
//! and validates every output before handing it back.

use crate::clock::{Clock, SharedClock};
use crate::error::{CoreError, Result};
use crate::identifier::Identifier;
use crate::sample::Sample;
use crate::transfer::props::StageProps;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Input samples of an evaluation, keyed by sample id
pub type Inputs = HashMap<String, Sample>;

/// Property holding the slow evaluation threshold in milliseconds
pub const EVAL_WARN_PROP: &str = "eval_warn_ms";

const DEFAULT_EVAL_WARN: Duration = Duration::from_millis(10);

/// Everything a transfer function knows about the element it runs for
#[derive(Clone)]
pub struct StageContext {
    id: Arc<str>,
    running_id: Arc<str>,
    props: StageProps,
    clock: SharedClock,
}

impl StageContext {
    pub fn new(
        id: impl AsRef<str>,
        running_id: impl AsRef<str>,
        props: StageProps,
        clock: SharedClock,
    ) -> Result<Self> {
        let (id, running_id) = (id.as_ref(), running_id.as_ref());
        if id.trim().is_empty() {
            return Err(CoreError::invalid("A transfer stage needs a non-empty id"));
        }
        if running_id.trim().is_empty() {
            return Err(CoreError::invalid(format!(
                "Transfer stage '{}' needs a non-empty running id",
                id
            )));
        }
        Ok(Self {
            id: Arc::from(id),
            running_id: Arc::from(running_id),
            props,
            clock,
        })
    }

    pub fn for_identifier(identifier: &Identifier, props: StageProps, clock: SharedClock) -> Self {
        Self {
            id: identifier.id_arc(),
            running_id: identifier.running_id_arc(),
            props,
            clock,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn running_id(&self) -> &str {
        &self.running_id
    }

    pub fn props(&self) -> &StageProps {
        &self.props
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// An `Evaluation` error attributed to this stage
    pub fn evaluation_error(&self, message: impl Into<String>) -> CoreError {
        CoreError::evaluation(self.running_id.as_ref(), message)
    }

    /// The input with id `id`, or an `Evaluation` error naming it
    pub fn require_input<'a>(&self, inputs: &'a Inputs, id: &str) -> Result<&'a Sample> {
        inputs
            .get(id)
            .ok_or_else(|| self.evaluation_error(format!("Missing input '{}'", id)))
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("id", &self.id)
            .field("running_id", &self.running_id)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

/// User supplied computation of a computing element.
///
/// Implementations only see shared references to their inputs and return a
/// new output sample; they never mutate samples in place.
pub trait TransferFunction: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Acquire resources and read configuration. Called once before any
    /// evaluation.
    fn initialize(&mut self, _ctx: &StageContext) -> Result<()> {
        Ok(())
    }

    /// Compute the next output from `inputs` and the current output
    fn evaluate(
        &mut self,
        ctx: &StageContext,
        inputs: &Inputs,
        current_output: &Sample,
    ) -> Result<Sample>;

    /// Release resources. No evaluation follows.
    fn shutdown(&mut self, _ctx: &StageContext) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle state of a [`TransferStage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialized,
    ShutDown,
    /// `initialize` failed
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Created => "Created",
            LifecycleState::Initialized => "Initialized",
            LifecycleState::ShutDown => "ShutDown",
            LifecycleState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// A transfer function bound to its element and guarded by its lifecycle
pub struct TransferStage {
    function: Box<dyn TransferFunction>,
    ctx: StageContext,
    state: LifecycleState,
    eval_warn: Duration,
    evaluations: u64,
}

impl TransferStage {
    /// Bind `function` to `ctx`.
    ///
    /// Fails with `InvalidArgument` if the `eval_warn_ms` property is not a
    /// number.
    pub fn new(function: Box<dyn TransferFunction>, ctx: StageContext) -> Result<Self> {
        let eval_warn = ctx
            .props()
            .parse::<u64>(EVAL_WARN_PROP)?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_EVAL_WARN);
        Ok(Self {
            function,
            ctx,
            state: LifecycleState::Created,
            eval_warn,
            evaluations: 0,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    pub fn function_name(&self) -> &str {
        self.function.name()
    }

    /// Number of successful evaluations
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state(&[LifecycleState::Created], "initialize")?;

        match self.function.initialize(&self.ctx) {
            Ok(()) => {
                self.state = LifecycleState::Initialized;
                tracing::debug!(
                    "Stage {} ({}) initialized",
                    self.ctx.running_id(),
                    self.function.name()
                );
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                tracing::warn!(
                    "Stage {} ({}) failed to initialize: {}",
                    self.ctx.running_id(),
                    self.function.name(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Run the transfer function once.
    ///
    /// The output must keep the id, running id and value type of
    /// `current_output`.
    pub fn evaluate(&mut self, inputs: &Inputs, current_output: &Sample) -> Result<Sample> {
        self.expect_state(&[LifecycleState::Initialized], "evaluate")?;

        let started = Instant::now();
        let result = self.function.evaluate(&self.ctx, inputs, current_output);
        let elapsed = started.elapsed();

        if elapsed > self.eval_warn {
            tracing::warn!(
                "Stage {} took {:?} to evaluate (threshold {:?})",
                self.ctx.running_id(),
                elapsed,
                self.eval_warn
            );
        }

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Stage {} evaluation failed: {}", self.ctx.running_id(), e);
                return Err(e);
            }
        };
        self.check_output(&output, current_output)?;

        self.evaluations += 1;
        tracing::trace!(
            stage = self.ctx.running_id(),
            inputs = inputs.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Evaluated {}",
            output
        );
        Ok(output)
    }

    /// Shut the stage down; allowed after a successful or a failed
    /// initialization. The stage is `ShutDown` afterwards even if the
    /// function reports an error.
    pub fn shutdown(&mut self) -> Result<()> {
        self.expect_state(
            &[LifecycleState::Initialized, LifecycleState::Failed],
            "shutdown",
        )?;

        let result = self.function.shutdown(&self.ctx);
        self.state = LifecycleState::ShutDown;
        match &result {
            Ok(()) => tracing::debug!(
                "Stage {} shut down after {} evaluations",
                self.ctx.running_id(),
                self.evaluations
            ),
            Err(e) => tracing::warn!("Stage {} shut down with error: {}", self.ctx.running_id(), e),
        }
        result
    }

    fn expect_state(&self, allowed: &[LifecycleState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(CoreError::LifecycleViolation {
            stage: self.ctx.running_id().to_string(),
            state: self.state.to_string(),
            operation,
        })
    }

    fn check_output(&self, output: &Sample, current: &Sample) -> Result<()> {
        if output.id() != current.id() || output.running_id() != current.running_id() {
            return Err(self.ctx.evaluation_error(format!(
                "{} returned a sample for '{}' instead of '{}'",
                self.function.name(),
                output.running_id(),
                current.running_id()
            )));
        }
        if output.value_type() != current.value_type() {
            return Err(self.ctx.evaluation_error(format!(
                "{} returned a {} sample, expected {}",
                self.function.name(),
                output.value_type(),
                current.value_type()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferStage")
            .field("function", &self.function.name())
            .field("running_id", &self.ctx.running_id())
            .field("state", &self.state)
            .field("evaluations", &self.evaluations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{OperationalMode, Value};
    use chrono::Duration as ChronoDuration;

    /// Echoes the current output with a fresh timestamp, or fails on demand
    struct Echo {
        fail_init: bool,
        rename: Option<&'static str>,
    }

    impl TransferFunction for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn initialize(&mut self, _ctx: &StageContext) -> Result<()> {
            if self.fail_init {
                return Err(CoreError::Config("no resources".into()));
            }
            Ok(())
        }

        fn evaluate(
            &mut self,
            ctx: &StageContext,
            inputs: &Inputs,
            current_output: &Sample,
        ) -> Result<Sample> {
            if let Some(id) = self.rename {
                return Sample::new(
                    current_output.value().clone(),
                    current_output.mode(),
                    id,
                    id,
                    ctx.now(),
                );
            }
            if let Some(input) = inputs.get("in") {
                return current_output.with_value(input.value().clone(), ctx.clock());
            }
            current_output.with_mode(current_output.mode(), ctx.clock())
        }
    }

    fn ctx() -> StageContext {
        let start = "2024-05-01T12:00:00Z".parse().unwrap();
        let clock = ManualClock::ticking(start, ChronoDuration::milliseconds(1));
        StageContext::new("asce", "obs:asce", StageProps::new(), Arc::new(clock)).unwrap()
    }

    fn stage(fail_init: bool) -> TransferStage {
        TransferStage::new(
            Box::new(Echo {
                fail_init,
                rename: None,
            }),
            ctx(),
        )
        .unwrap()
    }

    fn output() -> Sample {
        Sample::new(
            Value::Float64(1.0),
            OperationalMode::Operational,
            "asce",
            "obs:asce",
            "2024-05-01T11:00:00Z".parse().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_context_rejects_empty_ids() {
        let clock: SharedClock = Arc::new(ManualClock::default());
        assert!(StageContext::new("", "x", StageProps::new(), clock.clone())
            .unwrap_err()
            .is_invalid_argument());
        assert!(StageContext::new("x", "", StageProps::new(), clock).is_err());
    }

    #[test]
    fn test_happy_lifecycle() {
        let mut stage = stage(false);
        assert_eq!(stage.state(), LifecycleState::Created);
        stage.initialize().unwrap();
        assert_eq!(stage.state(), LifecycleState::Initialized);

        let mut inputs = Inputs::new();
        inputs.insert(
            "in".into(),
            Sample::new(
                Value::Float64(7.5),
                OperationalMode::Operational,
                "in",
                "obs:in",
                "2024-05-01T11:00:00Z".parse().unwrap(),
            )
            .unwrap(),
        );
        let out = stage.evaluate(&inputs, &output()).unwrap();
        assert_eq!(out.get::<f64>(), Some(&7.5));
        assert_eq!(stage.evaluations(), 1);

        stage.shutdown().unwrap();
        assert_eq!(stage.state(), LifecycleState::ShutDown);
    }

    #[test]
    fn test_evaluate_before_initialize_is_rejected() {
        let mut stage = stage(false);
        let err = stage.evaluate(&Inputs::new(), &output()).unwrap_err();
        assert!(err.is_lifecycle_violation());
        assert_eq!(stage.state(), LifecycleState::Created);
    }

    #[test]
    fn test_double_initialize_is_rejected() {
        let mut stage = stage(false);
        stage.initialize().unwrap();
        assert!(stage.initialize().unwrap_err().is_lifecycle_violation());
        assert_eq!(stage.state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_evaluate_after_shutdown_is_rejected() {
        let mut stage = stage(false);
        stage.initialize().unwrap();
        stage.shutdown().unwrap();
        assert!(stage
            .evaluate(&Inputs::new(), &output())
            .unwrap_err()
            .is_lifecycle_violation());
        assert!(stage.shutdown().unwrap_err().is_lifecycle_violation());
    }

    #[test]
    fn test_failed_initialize() {
        let mut stage = stage(true);
        assert!(stage.initialize().is_err());
        assert_eq!(stage.state(), LifecycleState::Failed);
        assert!(stage
            .evaluate(&Inputs::new(), &output())
            .unwrap_err()
            .is_lifecycle_violation());
        stage.shutdown().unwrap();
        assert_eq!(stage.state(), LifecycleState::ShutDown);
    }

    #[test]
    fn test_shutdown_from_created_is_rejected() {
        let mut stage = stage(false);
        assert!(stage.shutdown().unwrap_err().is_lifecycle_violation());
        assert_eq!(stage.state(), LifecycleState::Created);
    }

    #[test]
    fn test_output_identity_is_checked() {
        let mut stage = TransferStage::new(
            Box::new(Echo {
                fail_init: false,
                rename: Some("other"),
            }),
            ctx(),
        )
        .unwrap();
        stage.initialize().unwrap();
        let err = stage.evaluate(&Inputs::new(), &output()).unwrap_err();
        assert!(err.is_evaluation());
        assert_eq!(stage.evaluations(), 0);
    }

    #[test]
    fn test_require_input() {
        let ctx = ctx();
        let inputs = Inputs::new();
        let err = ctx.require_input(&inputs, "temp").unwrap_err();
        assert!(err.is_evaluation());
        assert!(err.to_string().contains("temp"));
    }

    #[test]
    fn test_bad_warn_threshold_prop() {
        let clock: SharedClock = Arc::new(ManualClock::default());
        let props: StageProps = [(EVAL_WARN_PROP, "soon")].into_iter().collect();
        let ctx = StageContext::new("a", "a", props, clock).unwrap();
        let err = TransferStage::new(
            Box::new(Echo {
                fail_init: false,
                rename: None,
            }),
            ctx,
        )
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
