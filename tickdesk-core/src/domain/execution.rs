use crate::domain::ids::{ExecutionId, OrderId};
use crate::domain::order::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fill record. One per fill, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub time: DateTime<Utc>,
}

impl Execution {
    /// Signed cash flow of the fill: negative for buys, positive for sells.
    pub fn cash_flow(&self) -> f64 {
        -self.side.sign() * self.quantity * self.price
    }
}
