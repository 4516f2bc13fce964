//! Built-in transfer functions.

mod mode_override;
mod script;

pub use mode_override::ModeOverride;
pub use script::{ScriptLimits, ScriptTransfer};
