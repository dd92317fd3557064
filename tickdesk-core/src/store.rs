//! Entity store — keyed containers for orders, positions and executions.
//!
//! Multi-match queries return entities in insertion order, so the first
//! attached bracket is always the first one found. Orders are never removed;
//! positions are removed exactly when they go flat.

use crate::domain::{
    BracketKind, Execution, Order, OrderId, OrderStatus, ParentRef, Position, PositionId,
};
use crate::error::{EngineError, Result};
use std::collections::HashMap;

/// In-memory store of every entity the engine owns.
#[derive(Debug, Default)]
pub struct EntityStore {
    orders: HashMap<OrderId, Order>,
    order_seq: Vec<OrderId>,
    positions: HashMap<PositionId, Position>,
    position_seq: Vec<PositionId>,
    executions: Vec<Execution>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Orders ───────────────────────────────────────────────────────

    /// Insert or replace an order by id. Returns true if the id was new.
    ///
    /// A replaced order keeps its original insertion slot.
    pub fn upsert_order(&mut self, order: Order) -> bool {
        let id = order.id.clone();
        let is_new = self.orders.insert(id.clone(), order).is_none();
        if is_new {
            self.order_seq.push(id);
        }
        is_new
    }

    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn require_order(&self, id: &OrderId) -> Result<&Order> {
        self.orders
            .get(id)
            .ok_or_else(|| EngineError::order_not_found(id))
    }

    /// Read-modify-write of a stored order. The closure sees every field,
    /// so nothing it does not touch is lost. On error the order is unchanged.
    pub fn update_order<F>(&mut self, id: &OrderId, f: F) -> Result<&Order>
    where
        F: FnOnce(&mut Order) -> Result<()>,
    {
        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| EngineError::order_not_found(id))?;
        let mut draft = order.clone();
        f(&mut draft)?;
        *order = draft;
        Ok(order)
    }

    /// All orders in insertion order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.order_seq.iter().filter_map(|id| self.orders.get(id))
    }

    /// Non-terminal orders on a symbol, in insertion order.
    pub fn active_orders_for(&self, symbol: &str) -> Vec<OrderId> {
        self.orders()
            .filter(|o| o.symbol == symbol && !o.status.is_terminal())
            .map(|o| o.id.clone())
            .collect()
    }

    /// Active (Inactive or Working) brackets attached to `parent`, in insertion order.
    pub fn brackets_of(&self, parent: &ParentRef) -> Vec<&Order> {
        self.orders()
            .filter(|o| o.parent.as_ref() == Some(parent) && o.status.is_active())
            .collect()
    }

    /// First active bracket of `parent` carrying the trigger field of `kind`.
    pub fn bracket_of_kind(&self, parent: &ParentRef, kind: BracketKind) -> Option<&Order> {
        self.brackets_of(parent)
            .into_iter()
            .find(|o| match kind {
                BracketKind::TakeProfit => o.limit_price.is_some(),
                BracketKind::StopLoss => o.stop_price.is_some(),
            })
    }

    pub fn take_profit_of(&self, parent: &ParentRef) -> Option<&Order> {
        self.bracket_of_kind(parent, BracketKind::TakeProfit)
    }

    pub fn stop_loss_of(&self, parent: &ParentRef) -> Option<&Order> {
        self.bracket_of_kind(parent, BracketKind::StopLoss)
    }

    /// Orders that reached a terminal status, in insertion order.
    pub fn order_history(&self) -> Vec<&Order> {
        self.orders().filter(|o| o.status.is_terminal()).collect()
    }

    pub fn order_by_broker_id(&self, broker_id: &str) -> Option<&Order> {
        self.orders()
            .find(|o| o.broker_id.as_deref() == Some(broker_id))
    }

    // ── Positions ────────────────────────────────────────────────────

    /// Insert or replace a position by id. Returns true if the id was new.
    pub fn upsert_position(&mut self, position: Position) -> bool {
        let id = position.id.clone();
        let is_new = self.positions.insert(id.clone(), position).is_none();
        if is_new {
            self.position_seq.push(id);
        }
        is_new
    }

    pub fn position(&self, id: &PositionId) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn position_mut(&mut self, id: &PositionId) -> Option<&mut Position> {
        self.positions.get_mut(id)
    }

    pub fn require_position(&self, id: &PositionId) -> Result<&Position> {
        self.positions
            .get(id)
            .ok_or_else(|| EngineError::position_not_found(id))
    }

    pub fn remove_position(&mut self, id: &PositionId) -> Option<Position> {
        let removed = self.positions.remove(id);
        if removed.is_some() {
            self.position_seq.retain(|p| p != id);
        }
        removed
    }

    /// Open positions in the order they were first opened.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.position_seq
            .iter()
            .filter_map(|id| self.positions.get(id))
    }

    /// Whether anything still needs quotes for `symbol`.
    pub fn has_exposure(&self, symbol: &str) -> bool {
        self.positions.contains_key(&PositionId::for_symbol(symbol))
            || self
                .orders
                .values()
                .any(|o| o.symbol == symbol && !o.status.is_terminal())
    }

    // ── Executions ───────────────────────────────────────────────────

    pub fn record_execution(&mut self, execution: Execution) {
        self.executions.push(execution);
    }

    pub fn executions(&self) -> &[Execution] {
        &self.executions
    }

    pub fn executions_for(&self, symbol: &str) -> Vec<&Execution> {
        self.executions
            .iter()
            .filter(|e| e.symbol == symbol)
            .collect()
    }

    pub fn count_orders_with_status(&self, status: OrderStatus) -> usize {
        self.orders.values().filter(|o| o.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderType, Side};
    use chrono::Utc;

    fn order(id: u64, symbol: &str) -> Order {
        Order::new(
            OrderId::from(id),
            symbol,
            Side::Buy,
            OrderType::Market,
            1.0,
            Utc::now(),
        )
    }

    fn bracket(id: u64, parent: ParentRef, kind: BracketKind, price: f64) -> Order {
        let mut o = order(id, "SPY");
        o.side = Side::Sell;
        o.order_type = kind.order_type();
        o.status = OrderStatus::Inactive;
        o.parent = Some(parent);
        o.set_trigger(kind, price);
        o
    }

    #[test]
    fn upsert_is_idempotent_and_keeps_slot() {
        let mut store = EntityStore::new();
        assert!(store.upsert_order(order(1, "SPY")));
        assert!(store.upsert_order(order(2, "QQQ")));

        let mut changed = order(1, "SPY");
        changed.quantity = 5.0;
        assert!(!store.upsert_order(changed));

        let ids: Vec<_> = store.orders().map(|o| o.id.clone()).collect();
        assert_eq!(ids, vec![OrderId::from(1), OrderId::from(2)]);
        assert_eq!(store.order(&OrderId::from(1)).unwrap().quantity, 5.0);
    }

    #[test]
    fn lookup_missing_is_not_found() {
        let store = EntityStore::new();
        assert!(store.order(&OrderId::from(42)).is_none());
        assert!(matches!(
            store.require_order(&OrderId::from(42)),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            store.require_position(&PositionId::for_symbol("SPY")),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn failed_update_leaves_order_untouched() {
        let mut store = EntityStore::new();
        store.upsert_order(order(1, "SPY"));

        let result = store.update_order(&OrderId::from(1), |o| {
            o.quantity = 99.0;
            o.transition(OrderStatus::Inactive)
        });
        assert!(result.is_err());
        assert_eq!(store.order(&OrderId::from(1)).unwrap().quantity, 1.0);
    }

    #[test]
    fn brackets_of_filters_status_and_keeps_order() {
        let mut store = EntityStore::new();
        let parent = ParentRef::Order(OrderId::from(1));
        store.upsert_order(order(1, "SPY"));
        store.upsert_order(bracket(2, parent.clone(), BracketKind::TakeProfit, 110.0));
        store.upsert_order(bracket(3, parent.clone(), BracketKind::StopLoss, 90.0));
        let mut dead = bracket(4, parent.clone(), BracketKind::TakeProfit, 120.0);
        dead.status = OrderStatus::Canceled;
        store.upsert_order(dead);

        let brackets: Vec<_> = store.brackets_of(&parent).iter().map(|o| o.id.clone()).collect();
        assert_eq!(brackets, vec![OrderId::from(2), OrderId::from(3)]);
        assert_eq!(store.take_profit_of(&parent).unwrap().id, OrderId::from(2));
        assert_eq!(store.stop_loss_of(&parent).unwrap().id, OrderId::from(3));

        let other = ParentRef::Position(PositionId::for_symbol("SPY"));
        assert!(store.brackets_of(&other).is_empty());
    }

    #[test]
    fn first_attached_bracket_wins_ties() {
        let mut store = EntityStore::new();
        let parent = ParentRef::Order(OrderId::from(1));
        store.upsert_order(bracket(5, parent.clone(), BracketKind::TakeProfit, 110.0));
        store.upsert_order(bracket(6, parent.clone(), BracketKind::TakeProfit, 115.0));
        assert_eq!(store.take_profit_of(&parent).unwrap().id, OrderId::from(5));
    }

    #[test]
    fn positions_and_exposure() {
        let mut store = EntityStore::new();
        assert!(!store.has_exposure("SPY"));

        store.upsert_position(Position::open("SPY", Side::Buy, 1.0, 100.0, Utc::now()));
        assert!(store.has_exposure("SPY"));
        assert_eq!(store.positions().count(), 1);

        assert!(store.remove_position(&PositionId::for_symbol("SPY")).is_some());
        assert!(!store.has_exposure("SPY"));
        assert_eq!(store.positions().count(), 0);
        assert!(store.remove_position(&PositionId::for_symbol("SPY")).is_none());
    }

    #[test]
    fn history_and_active_lists() {
        let mut store = EntityStore::new();
        store.upsert_order(order(1, "SPY"));
        let mut filled = order(2, "SPY");
        filled.status = OrderStatus::Filled;
        store.upsert_order(filled);

        assert_eq!(store.active_orders_for("SPY"), vec![OrderId::from(1)]);
        assert_eq!(store.order_history().len(), 1);
        assert_eq!(store.count_orders_with_status(OrderStatus::Working), 1);
    }
}
