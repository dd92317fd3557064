//! Orders, the order status state machine, and bracket links.

use super::ids::{OrderId, PositionId};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction of an order or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for Buy, -1 for Sell.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

/// What kind of order; trigger prices live on the order itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Bracket waiting for its parent order to fill.
    Inactive,
    /// Eligible for trigger evaluation.
    Working,
    /// A cancel or modify request is in flight.
    Placing,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    /// Inactive or Working: the statuses a live bracket can hold.
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Inactive | OrderStatus::Working)
    }

    /// Whether `self → to` is an allowed edge. Terminal states absorb.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Inactive, Working | Canceled | Rejected)
                | (Working, Placing | Filled | Canceled | Rejected)
                | (Placing, Working | Canceled | Rejected)
        )
    }
}

/// Whether a bracket hangs off a pending order or an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentType {
    Order,
    Position,
}

/// Link from a bracket to its parent entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    Order(OrderId),
    Position(PositionId),
}

impl ParentRef {
    pub fn parent_type(&self) -> ParentType {
        match self {
            ParentRef::Order(_) => ParentType::Order,
            ParentRef::Position(_) => ParentType::Position,
        }
    }
}

/// The two bracket roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketKind {
    TakeProfit,
    StopLoss,
}

impl BracketKind {
    /// Take-profit rests as a limit, stop-loss as a stop.
    pub fn order_type(self) -> OrderType {
        match self {
            BracketKind::TakeProfit => OrderType::Limit,
            BracketKind::StopLoss => OrderType::Stop,
        }
    }
}

/// A single order in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    /// Fill price once traded.
    pub price: Option<f64>,
    pub avg_price: Option<f64>,
    /// Most recent tick price seen for the symbol.
    pub last: Option<f64>,
    pub status: OrderStatus,
    pub parent: Option<ParentRef>,
    /// Mirror of the active take-profit bracket's limit price.
    pub take_profit: Option<f64>,
    /// Mirror of the active stop-loss bracket's stop price.
    pub stop_loss: Option<f64>,
    /// Identifier assigned by a remote broker, when one confirmed the order.
    pub broker_id: Option<String>,
    pub time_setup: DateTime<Utc>,
}

impl Order {
    /// Create a Working order with no trigger prices and no parent.
    pub fn new(
        id: OrderId,
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        quantity: f64,
        time_setup: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            limit_price: None,
            stop_price: None,
            price: None,
            avg_price: None,
            last: None,
            status: OrderStatus::Working,
            parent: None,
            take_profit: None,
            stop_loss: None,
            broker_id: None,
            time_setup,
        }
    }

    /// Move to `to`, refusing any edge outside the state machine.
    pub fn transition(&mut self, to: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn is_bracket(&self) -> bool {
        self.parent.is_some()
    }

    pub fn parent_type(&self) -> Option<ParentType> {
        self.parent.as_ref().map(ParentRef::parent_type)
    }

    /// The role this order plays for its parent, if it is a bracket.
    pub fn bracket_kind(&self) -> Option<BracketKind> {
        if !self.is_bracket() {
            return None;
        }
        match (self.limit_price, self.stop_price) {
            (Some(_), _) => Some(BracketKind::TakeProfit),
            (None, Some(_)) => Some(BracketKind::StopLoss),
            (None, None) => None,
        }
    }

    /// Set the trigger field that belongs to `kind`.
    pub fn set_trigger(&mut self, kind: BracketKind, price: f64) {
        match kind {
            BracketKind::TakeProfit => self.limit_price = Some(price),
            BracketKind::StopLoss => self.stop_price = Some(price),
        }
    }

    /// Record a mirrored bracket price on a parent order.
    pub fn set_mirror(&mut self, kind: BracketKind, price: Option<f64>) {
        match kind {
            BracketKind::TakeProfit => self.take_profit = price,
            BracketKind::StopLoss => self.stop_loss = price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus) -> Order {
        let mut order = Order::new(
            OrderId::from(1),
            "EURUSD",
            Side::Buy,
            OrderType::Limit,
            1.0,
            Utc::now(),
        );
        order.status = status;
        order
    }

    #[test]
    fn side_opposite_and_sign() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
        assert_eq!(Side::Buy.sign(), 1.0);
        assert_eq!(Side::Sell.sign(), -1.0);
    }

    #[test]
    fn lifecycle_edges() {
        let mut o = order(OrderStatus::Inactive);
        o.transition(OrderStatus::Working).unwrap();
        o.transition(OrderStatus::Placing).unwrap();
        o.transition(OrderStatus::Canceled).unwrap();
        assert!(o.status.is_terminal());
    }

    #[test]
    fn terminal_states_absorb() {
        for terminal in [
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::Rejected,
        ] {
            let mut o = order(terminal);
            let err = o.transition(OrderStatus::Working).unwrap_err();
            assert!(matches!(err, EngineError::InvalidTransition { .. }));
            assert_eq!(o.status, terminal);
        }
    }

    #[test]
    fn placing_cannot_fill() {
        let mut o = order(OrderStatus::Placing);
        assert!(o.transition(OrderStatus::Filled).is_err());
        o.transition(OrderStatus::Working).unwrap();
        o.transition(OrderStatus::Filled).unwrap();
    }

    #[test]
    fn inactive_cannot_fill_directly() {
        assert!(!OrderStatus::Inactive.can_transition_to(OrderStatus::Filled));
    }

    #[test]
    fn bracket_kind_follows_trigger_field() {
        let mut o = order(OrderStatus::Inactive);
        assert_eq!(o.bracket_kind(), None);

        o.parent = Some(ParentRef::Order(OrderId::from(9)));
        o.set_trigger(BracketKind::StopLoss, 90.0);
        assert_eq!(o.bracket_kind(), Some(BracketKind::StopLoss));
        assert_eq!(o.parent_type(), Some(ParentType::Order));

        o.set_trigger(BracketKind::TakeProfit, 110.0);
        assert_eq!(o.bracket_kind(), Some(BracketKind::TakeProfit));
    }

    #[test]
    fn parent_ref_serializes_tagged() {
        let parent = ParentRef::Position(PositionId::for_symbol("XAUUSD"));
        let json = serde_json::to_string(&parent).unwrap();
        assert_eq!(json, r#"{"type":"position","id":"XAUUSD"}"#);
    }
}
