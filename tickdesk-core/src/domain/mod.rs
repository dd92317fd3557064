//! Domain types for TickDesk

pub mod execution;
pub mod ids;
pub mod order;
pub mod position;
pub mod request;
pub mod tick;

pub use execution::Execution;
pub use ids::{ExecutionId, IdGenerator, OrderId, PositionId, SequentialIds};
pub use order::{BracketKind, Order, OrderStatus, OrderType, ParentRef, ParentType, Side};
pub use position::{Position, PositionPatch};
pub use request::{Brackets, ModifyRequest, OrderRequest};
pub use tick::{Tick, TickStatus};

/// Symbol type alias
pub type Symbol = String;
