//! Execution: deciding when orders fill and who confirms them.
//!
//! - **Trigger**: tick price vs. order trigger, per side and type
//! - **Source**: local simulation or broker confirmation of requests

pub mod source;
pub mod trigger;

pub use source::{BrokerConfirmed, Confirmation, ExecutionSource, LocalSimulated, SourceKind};
pub use trigger::{check_trigger, is_triggered, TriggerResult};
