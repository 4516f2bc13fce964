//! Transfer functions and their hosting.
//!
//! Two layers:
//! - **`TransferFunction` trait** - the user computation, see [`stage`].
//! - **`TransferStage`** - wraps a function and enforces its lifecycle.
//!
//! [`ComputingElement`] is the reference host: it keeps the committed output
//! and the latest inputs and feeds them to its stage.

pub mod element;
pub mod functions;
pub mod props;
pub mod registry;
pub mod stage;

pub use element::ComputingElement;
pub use functions::{ModeOverride, ScriptLimits, ScriptTransfer};
pub use props::StageProps;
pub use registry::{TransferFactory, TransferRegistry};
pub use stage::{
    Inputs, LifecycleState, StageContext, TransferFunction, TransferStage, EVAL_WARN_PROP,
};
