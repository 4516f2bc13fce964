//! ModeOverride: forces the output into a fixed operational mode.
//!
//! Props:
//! - `mode` - mode to force, default `SHUTDOWN`
//! - `triggers` - alarm triggers applied to alarm outputs, e.g. `"set:high, ack"`.
//!   Default is none, which leaves the alarm unchanged.

use crate::alarm::{AlarmState, Trigger};
use crate::error::{Result, ResultExt};
use crate::sample::Sample;
use crate::transfer::stage::{Inputs, StageContext, TransferFunction};
use crate::types::{OperationalMode, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct ModeOverride {
    mode: OperationalMode,
    triggers: BTreeSet<Trigger>,
}

impl ModeOverride {
    pub const NAME: &'static str = "mode_override";

    pub fn new() -> Self {
        Self {
            mode: OperationalMode::Shutdown,
            triggers: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> OperationalMode {
        self.mode
    }
}

impl Default for ModeOverride {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferFunction for ModeOverride {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&mut self, ctx: &StageContext) -> Result<()> {
        let props = ctx.props();
        if let Some(mode) = props
            .parse::<OperationalMode>("mode")
            .with_context(|| format!("Configuring {}", ctx.running_id()))?
        {
            self.mode = mode;
        }
        if let Some(triggers) = props.get("triggers") {
            self.triggers = Trigger::parse_list(triggers)
                .with_context(|| format!("Configuring {}", ctx.running_id()))?;
        }
        tracing::debug!(
            "{} forces mode {} with {} trigger(s)",
            ctx.running_id(),
            self.mode,
            self.triggers.len()
        );
        Ok(())
    }

    fn evaluate(
        &mut self,
        ctx: &StageContext,
        _inputs: &Inputs,
        current_output: &Sample,
    ) -> Result<Sample> {
        let value = match current_output.alarm() {
            Some(alarm) => Value::Alarm(AlarmState::transition(alarm, &self.triggers)),
            None => current_output.value().clone(),
        };
        current_output.with_value_and_mode(value, self.mode, ctx.clock())
    }
}
