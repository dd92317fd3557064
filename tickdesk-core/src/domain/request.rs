//! Requests accepted by the engine facade.

use super::ids::{OrderId, PositionId};
use super::order::{Order, OrderType, Side};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

fn default_side() -> Side {
    Side::Buy
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

/// A new order as submitted by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    #[serde(default = "default_side")]
    pub side: Side,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    pub quantity: f64,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    /// Set when the order trades against an existing position instead of resting.
    #[serde(default)]
    pub position_id: Option<PositionId>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            take_profit: None,
            stop_loss: None,
            position_id: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: Side, quantity: f64, limit_price: f64) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn stop(symbol: impl Into<String>, side: Side, quantity: f64, stop_price: f64) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn against_position(mut self, position_id: PositionId) -> Self {
        self.position_id = Some(position_id);
        self
    }

    /// Local checks that must pass before anything is sent anywhere.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(EngineError::Validation("symbol is required".into()));
        }
        validate_quantity(self.quantity)?;

        match self.order_type {
            OrderType::Market => {}
            OrderType::Limit => require_price("limit price", self.limit_price)?,
            OrderType::Stop => require_price("stop price", self.stop_price)?,
            OrderType::StopLimit => {
                return Err(EngineError::Validation(
                    "unsupported order type: stop_limit".into(),
                ))
            }
        }

        optional_price("take profit", self.take_profit)?;
        optional_price("stop loss", self.stop_loss)?;
        Ok(())
    }
}

/// Changes to an existing order.
///
/// `quantity`, `limit_price` and `stop_price` keep their current value when `None`.
/// `take_profit` and `stop_loss` describe the desired brackets: `None` removes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub id: OrderId,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
}

impl ModifyRequest {
    /// Start from the order as it currently stands, brackets included.
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id.clone(),
            quantity: Some(order.quantity),
            limit_price: order.limit_price,
            stop_price: order.stop_price,
            take_profit: order.take_profit,
            stop_loss: order.stop_loss,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        optional_price("limit price", self.limit_price)?;
        optional_price("stop price", self.stop_price)?;
        optional_price("take profit", self.take_profit)?;
        optional_price("stop loss", self.stop_loss)
    }
}

/// Desired take-profit / stop-loss for a position. `None` removes the bracket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Brackets {
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
}

fn validate_quantity(quantity: f64) -> Result<()> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "quantity must be positive, got {quantity}"
        )))
    }
}

fn require_price(name: &str, price: Option<f64>) -> Result<()> {
    match price {
        Some(_) => optional_price(name, price),
        None => Err(EngineError::Validation(format!("{name} is required"))),
    }
}

fn optional_price(name: &str, price: Option<f64>) -> Result<()> {
    match price {
        Some(p) if !p.is_finite() || p <= 0.0 => Err(EngineError::Validation(format!(
            "{name} must be a positive price, got {p}"
        ))),
        _ => Ok(()),
    }
}
