//! Host notifications — how the engine tells the UI layer what changed.
//!
//! The engine queues `EngineEvent`s while it mutates the store and hands them
//! to the host once the operation is complete, in the order they happened.

use crate::config::AccountConfig;
use crate::domain::{Execution, Order, OrderId, Position, PositionId, PositionPatch};
use serde::Serialize;
use std::collections::HashMap;

/// One notification, as queued by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderUpdated(Order),
    OrderLast { id: OrderId, last: f64 },
    /// A position that went flat is reported once with quantity 0.
    PositionUpdated(Position),
    PositionPatched { id: PositionId, patch: PositionPatch },
    ExecutionRecorded(Execution),
    RealizedPl { symbol: String, delta: f64 },
}

pub trait Host: Send {
    fn order_updated(&mut self, order: &Order);

    fn position_updated(&mut self, position: &Position);

    fn position_partially_updated(&mut self, id: &PositionId, patch: &PositionPatch);

    fn execution_recorded(&mut self, execution: &Execution);

    fn realized_pl_changed(&mut self, symbol: &str, delta: f64);

    /// Latest tick price for a live order.
    fn order_partially_updated(&mut self, _id: &OrderId, _last: f64) {}

    fn dispatch(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::OrderUpdated(order) => self.order_updated(order),
            EngineEvent::OrderLast { id, last } => self.order_partially_updated(id, *last),
            EngineEvent::PositionUpdated(position) => self.position_updated(position),
            EngineEvent::PositionPatched { id, patch } => {
                self.position_partially_updated(id, patch)
            }
            EngineEvent::ExecutionRecorded(execution) => self.execution_recorded(execution),
            EngineEvent::RealizedPl { symbol, delta } => self.realized_pl_changed(symbol, *delta),
        }
    }
}

// ── EventLog ─────────────────────────────────────────────────────────

/// Host that keeps every event it receives.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<EngineEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Every emitted version of order `id`, oldest first.
    pub fn order_updates(&self, id: &OrderId) -> Vec<&Order> {
        self.events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::OrderUpdated(order) if &order.id == id => Some(order),
                _ => None,
            })
            .collect()
    }

    pub fn last_order_update(&self, id: &OrderId) -> Option<&Order> {
        self.order_updates(id).pop()
    }

    pub fn position_updates(&self, id: &PositionId) -> Vec<&Position> {
        self.events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::PositionUpdated(position) if &position.id == id => Some(position),
                _ => None,
            })
            .collect()
    }

    pub fn executions(&self) -> Vec<&Execution> {
        self.events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ExecutionRecorded(execution) => Some(execution),
                _ => None,
            })
            .collect()
    }

    pub fn realized_deltas(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::RealizedPl { delta, .. } => Some(*delta),
                _ => None,
            })
            .collect()
    }

    pub fn realized_total(&self) -> f64 {
        self.realized_deltas().iter().sum()
    }
}

impl Host for EventLog {
    fn order_updated(&mut self, order: &Order) {
        self.events.push(EngineEvent::OrderUpdated(order.clone()));
    }

    fn position_updated(&mut self, position: &Position) {
        self.events.push(EngineEvent::PositionUpdated(position.clone()));
    }

    fn position_partially_updated(&mut self, id: &PositionId, patch: &PositionPatch) {
        self.events.push(EngineEvent::PositionPatched {
            id: id.clone(),
            patch: *patch,
        });
    }

    fn execution_recorded(&mut self, execution: &Execution) {
        self.events
            .push(EngineEvent::ExecutionRecorded(execution.clone()));
    }

    fn realized_pl_changed(&mut self, symbol: &str, delta: f64) {
        self.events.push(EngineEvent::RealizedPl {
            symbol: symbol.to_string(),
            delta,
        });
    }

    fn order_partially_updated(&mut self, id: &OrderId, last: f64) {
        self.events.push(EngineEvent::OrderLast {
            id: id.clone(),
            last,
        });
    }
}

// ── AccountTracker ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub title: String,
    pub balance: f64,
    /// Open (unrealized) profit across positions.
    pub pl: f64,
    pub equity: f64,
}

/// Account summary arithmetic layered over another host.
///
/// balance += every realized delta; pl = sum of open position profit;
/// equity = balance + pl.
#[derive(Debug)]
pub struct AccountTracker<H> {
    title: String,
    balance: f64,
    open_profit: HashMap<PositionId, f64>,
    inner: H,
}

impl<H: Host> AccountTracker<H> {
    pub fn new(config: &AccountConfig, inner: H) -> Self {
        Self {
            title: config.title.clone(),
            balance: config.initial_balance,
            open_profit: HashMap::new(),
            inner,
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn pl(&self) -> f64 {
        self.open_profit.values().sum()
    }

    pub fn equity(&self) -> f64 {
        self.balance + self.pl()
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            title: self.title.clone(),
            balance: self.balance,
            pl: self.pl(),
            equity: self.equity(),
        }
    }
}

impl<H: Host> Host for AccountTracker<H> {
    fn order_updated(&mut self, order: &Order) {
        self.inner.order_updated(order);
    }

    fn position_updated(&mut self, position: &Position) {
        if position.quantity > 0.0 {
            self.open_profit.insert(position.id.clone(), position.profit);
        } else {
            self.open_profit.remove(&position.id);
        }
        self.inner.position_updated(position);
    }

    fn position_partially_updated(&mut self, id: &PositionId, patch: &PositionPatch) {
        self.open_profit.insert(id.clone(), patch.profit);
        self.inner.position_partially_updated(id, patch);
    }

    fn execution_recorded(&mut self, execution: &Execution) {
        self.inner.execution_recorded(execution);
    }

    fn realized_pl_changed(&mut self, symbol: &str, delta: f64) {
        self.balance += delta;
        self.inner.realized_pl_changed(symbol, delta);
    }

    fn order_partially_updated(&mut self, id: &OrderId, last: f64) {
        self.inner.order_partially_updated(id, last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use chrono::Utc;

    fn tracker() -> AccountTracker<EventLog> {
        let config = AccountConfig {
            title: "Test".into(),
            initial_balance: 1_000.0,
        };
        AccountTracker::new(&config, EventLog::new())
    }

    #[test]
    fn realized_moves_balance() {
        let mut account = tracker();
        account.realized_pl_changed("X", 25.0);
        account.realized_pl_changed("X", -5.0);
        assert!((account.balance() - 1_020.0).abs() < 1e-10);
        assert_eq!(account.inner().realized_deltas(), vec![25.0, -5.0]);
    }

    #[test]
    fn equity_includes_open_profit() {
        let mut account = tracker();
        let mut pos = Position::open("X", Side::Buy, 2.0, 100.0, Utc::now());
        account.position_updated(&pos);
        pos.mark(110.0);
        account.position_partially_updated(&pos.id, &pos.patch());

        assert!((account.pl() - 20.0).abs() < 1e-10);
        assert!((account.equity() - 1_020.0).abs() < 1e-10);

        pos.quantity = 0.0;
        account.position_updated(&pos);
        assert_eq!(account.pl(), 0.0);

        let summary = account.summary();
        assert_eq!(summary.title, "Test");
        assert_eq!(summary.equity, 1_000.0);
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(EngineEvent::RealizedPl {
            symbol: "X".into(),
            delta: -5.0,
        })
        .unwrap();
        assert_eq!(json["event"], "realized_pl");
        assert_eq!(json["symbol"], "X");
        assert_eq!(json["delta"], -5.0);
    }

    #[test]
    fn dispatch_routes_to_methods() {
        let mut log = EventLog::new();
        let event = EngineEvent::RealizedPl {
            symbol: "X".into(),
            delta: 3.0,
        };
        log.dispatch(&event);
        assert_eq!(log.events(), &[event]);
        assert_eq!(log.realized_total(), 3.0);
    }
}
