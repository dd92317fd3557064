//! Remote broker transport — request/response shapes of the REST collaborator.
//!
//! The core knows nothing about URLs or retry policy. A transport turns a
//! payload into a `BrokerResponse` and the engine only looks at the success
//! flag and the fields it needs to confirm an order.

use crate::config::Session;
use crate::domain::{OrderStatus, OrderType, Side};
use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broker status code meaning "accepted and working".
pub const STATUS_CODE_WORKING: i32 = 2;

/// Network-level failure: the request never produced a broker answer.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        EngineError::TransportFailure(err.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadAction {
    Place,
    Modify,
    ModifyPosition,
}

/// Request body sent to the broker. Volumes are in wire units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub action: PayloadAction,
    pub login: u64,
    pub source: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub volume: f64,
    pub price_order: Option<f64>,
    pub price_tp: Option<f64>,
    pub price_sl: Option<f64>,
    pub order_id: Option<String>,
    pub position_id: Option<String>,
}

impl OrderPayload {
    pub fn new(
        action: PayloadAction,
        session: &Session,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        volume: f64,
    ) -> Self {
        Self {
            action,
            login: session.login,
            source: session.source_tag.clone(),
            symbol: symbol.to_string(),
            side,
            order_type,
            volume,
            price_order: None,
            price_tp: None,
            price_sl: None,
            order_id: None,
            position_id: None,
        }
    }
}

/// Order fields echoed back by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrderData {
    pub id: String,
    /// Wire units.
    pub quantity: f64,
    /// Wire units.
    pub filled_quantity: f64,
    pub status_code: i32,
    pub avg_price: Option<f64>,
}

impl BrokerOrderData {
    pub fn is_working(&self) -> bool {
        self.status_code == STATUS_CODE_WORKING
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerResponse {
    pub success: bool,
    pub data: Option<BrokerOrderData>,
    pub message: Option<String>,
}

impl BrokerResponse {
    pub fn accepted(data: BrokerOrderData) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Turn `success = false` into a `RemoteRejection`.
    pub fn into_result(self) -> Result<Option<BrokerOrderData>, EngineError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(EngineError::RemoteRejection(
                self.message.unwrap_or_else(|| "unknown error".into()),
            ))
        }
    }
}

/// Broker-side view of an open position. Quantity in wire units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPosition {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub avg_price: f64,
}

/// Broker-side status of an order it knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOrder {
    pub broker_id: String,
    pub status: OrderStatus,
    pub avg_price: Option<f64>,
}

/// Account state as last reported by the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub positions: Vec<SnapshotPosition>,
    pub orders: Vec<SnapshotOrder>,
}

#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn send_order(&self, payload: &OrderPayload) -> Result<BrokerResponse, TransportError>;

    async fn modify_order(&self, payload: &OrderPayload)
        -> Result<BrokerResponse, TransportError>;

    async fn cancel_order(&self, broker_id: &str) -> Result<BrokerResponse, TransportError>;

    /// Freshly fetched account state, if the transport supports it.
    async fn fetch_snapshot(
        &self,
        _session: &Session,
    ) -> Result<Option<AccountSnapshot>, TransportError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_response_maps_to_remote_rejection() {
        let err = BrokerResponse::rejected("market closed")
            .into_result()
            .unwrap_err();
        assert_eq!(err, EngineError::RemoteRejection("market closed".into()));

        let err = BrokerResponse {
            success: false,
            data: None,
            message: None,
        }
        .into_result()
        .unwrap_err();
        assert_eq!(err, EngineError::RemoteRejection("unknown error".into()));
    }

    #[test]
    fn transport_error_maps_to_transport_failure() {
        let err: EngineError = TransportError("connection reset".into()).into();
        assert_eq!(err, EngineError::TransportFailure("connection reset".into()));
    }

    #[test]
    fn status_code_two_is_working() {
        let data = BrokerOrderData {
            id: "77".into(),
            quantity: 10_000.0,
            filled_quantity: 0.0,
            status_code: STATUS_CODE_WORKING,
            avg_price: None,
        };
        assert!(data.is_working());
        assert!(!BrokerOrderData { status_code: 4, ..data }.is_working());
    }
}
