//! Order lifecycle engine — the facade plus the pieces it chains on every fill.
//!
//! For each triggered order:
//!
//! 1. Fill: order → Filled, one execution recorded
//! 2. Position update: open / increase / reduce / close or reverse
//! 3. Brackets: activate the order's children, resize or cancel the position's
//! 4. Notify: order, execution, realized PnL and position events to the host

pub mod brackets;
pub mod order_engine;
pub mod position_update;

pub use brackets::BracketCoordinator;
pub use order_engine::OrderEngine;
pub use position_update::{apply_fill, FillOutcome, FillResult, PositionFill};
