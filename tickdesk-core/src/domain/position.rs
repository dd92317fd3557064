use super::ids::PositionId;
use super::order::{BracketKind, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An open, netted position. Quantity is always positive; `side` carries direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub avg_price: f64,
    pub last: Option<f64>,
    /// Mark-to-market profit, recomputed on every tick.
    pub profit: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub time_setup: DateTime<Utc>,
}

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        side: Side,
        quantity: f64,
        avg_price: f64,
        time_setup: DateTime<Utc>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            id: PositionId::for_symbol(&symbol),
            symbol,
            side,
            quantity,
            avg_price,
            last: None,
            profit: 0.0,
            take_profit: None,
            stop_loss: None,
            time_setup,
        }
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.avg_price) * self.quantity * self.side.sign()
    }

    /// Cache the tick price and recompute profit. Returns false if the price is unchanged.
    pub fn mark(&mut self, last: f64) -> bool {
        if self.last == Some(last) {
            return false;
        }
        self.last = Some(last);
        self.profit = self.unrealized_pnl(last);
        true
    }

    /// Price a closing fill would use when no broker price is available.
    pub fn reference_price(&self) -> f64 {
        self.last.unwrap_or(self.avg_price)
    }

    pub fn set_mirror(&mut self, kind: BracketKind, price: Option<f64>) {
        match kind {
            BracketKind::TakeProfit => self.take_profit = price,
            BracketKind::StopLoss => self.stop_loss = price,
        }
    }

    pub fn patch(&self) -> PositionPatch {
        PositionPatch {
            last: self.last,
            profit: self.profit,
        }
    }
}

/// Partial update pushed to the host on every mark-to-market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionPatch {
    pub last: Option<f64>,
    pub profit: f64,
}
