//! Engine error taxonomy.
//!
//! Validation and lookup failures are raised before any remote call and never
//! mutate state. Remote rejections and transport failures are raised only
//! after the affected order has been moved to `Rejected`.

use crate::domain::{OrderId, OrderStatus};
use thiserror::Error;

/// Errors surfaced by every fallible engine operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("broker rejected request: {0}")]
    RemoteRejection(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("invalid transition for order {id}: {from:?} → {to:?}")]
    InvalidTransition {
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn order_not_found(id: &OrderId) -> Self {
        Self::NotFound(format!("order {id}"))
    }

    pub fn position_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("position {id}"))
    }

    /// Whether the failure came back from the remote side of a request.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteRejection(_) | Self::TransportFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
