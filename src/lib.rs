//! # monitor-core: monitor-point values and transfer functions
//!
//! The value model and computation contract of a monitoring system. Monitor
//! points publish immutable [`Sample`]s; computing elements derive new samples
//! from their inputs through pluggable transfer functions.
//!
//! ## Architecture
//!
//! - **Values**: [`Sample`] carries a typed [`Value`], an [`OperationalMode`],
//!   a timestamp and the identity of its source. Updates return new samples.
//! - **Alarms**: [`AlarmState`] is a value type driven by [`Trigger`]s through
//!   the pure [`AlarmState::transition`].
//! - **Transfer functions**: the [`TransferFunction`] trait, guarded by a
//!   [`TransferStage`] lifecycle and hosted by a [`ComputingElement`].
//! - **Scripting**: Rhai scripts as transfer functions ([`ScriptTransfer`]).
//! - **Configuration**: TOML project files ([`ProjectConfig`]).
//!
//! Time never comes from the wall clock directly: every update takes a
//! [`Clock`], so tests can use [`ManualClock`].
//!
//! ## Example
//!
//! ```
//! use monitor_core::{
//!     ComputingElement, ManualClock, OperationalMode, Sample, StageContext, StageProps,
//!     TransferRegistry, Value, ValueType,
//! };
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::default());
//! let props: StageProps = [("script", r#"#{ value: inputs["raw"].value * 10 }"#)]
//!     .into_iter()
//!     .collect();
//! let ctx = StageContext::new("scaled", "obs:scaled", props, clock.clone())?;
//! let stage = TransferRegistry::with_builtins().build_stage("script", ctx)?;
//!
//! let initial = Sample::builder("scaled", "obs:scaled", ValueType::Int64)
//!     .payload(Value::Int64(0))
//!     .mode(OperationalMode::Unknown)
//!     .build_with(&clock)?;
//! let mut element = ComputingElement::new(stage, initial)?;
//! element.start()?;
//!
//! element.submit(Sample::new(
//!     Value::Int64(4),
//!     OperationalMode::Operational,
//!     "raw",
//!     "obs:raw",
//!     clock.peek(),
//! )?)?;
//! assert_eq!(element.update()?.get::<i64>(), Some(&40));
//! element.stop()?;
//! # Ok::<(), monitor_core::CoreError>(())
//! ```

pub mod alarm;
pub mod clock;
pub mod config;
pub mod error;
pub mod identifier;
pub mod logging;
pub mod sample;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use alarm::{AlarmState, Priority, Trigger};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ComponentConfig, ProjectConfig};
pub use error::{CoreError, Result, ResultExt};
pub use identifier::Identifier;
pub use sample::{Sample, SampleBuilder};
pub use transfer::{
    ComputingElement, Inputs, LifecycleState, ModeOverride, ScriptLimits, ScriptTransfer,
    StageContext, StageProps, TransferFunction, TransferRegistry, TransferStage,
};
pub use types::{OperationalMode, Payload, Value, ValueType};
