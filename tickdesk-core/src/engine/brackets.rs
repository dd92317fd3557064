//! Bracket coordination — take-profit / stop-loss children of orders and positions.
//!
//! A bracket is an ordinary `Order` whose `parent` points at a pending order
//! or at an open position. While the parent is a pending order the bracket
//! rests Inactive; once the parent fills it is re-parented to the position
//! and goes Working. Brackets are never deleted, only Canceled or Filled.
//!
//! Every change to a bracket refreshes the `take_profit` / `stop_loss`
//! mirror on its parent. That refresh touches exactly one parent and never
//! recurses: a bracket can't be the parent of another bracket.

use crate::domain::{
    BracketKind, IdGenerator, Order, OrderId, OrderStatus, ParentRef, Position, PositionId, Side,
};
use crate::error::{EngineError, Result};
use crate::host::EngineEvent;
use crate::store::EntityStore;
use chrono::Utc;
use tracing::debug;

/// Borrowed view over the engine state needed to manage brackets.
pub struct BracketCoordinator<'a> {
    store: &'a mut EntityStore,
    ids: &'a mut dyn IdGenerator,
    outbox: &'a mut Vec<EngineEvent>,
}

/// What a new bracket copies from its parent.
struct ParentInfo {
    symbol: String,
    side: Side,
    quantity: f64,
    last: Option<f64>,
    status: OrderStatus,
}

impl<'a> BracketCoordinator<'a> {
    pub fn new(
        store: &'a mut EntityStore,
        ids: &'a mut dyn IdGenerator,
        outbox: &'a mut Vec<EngineEvent>,
    ) -> Self {
        Self { store, ids, outbox }
    }

    // ── Public API ───────────────────────────────────────────────────

    /// Create the `kind` bracket of `parent`, or move the trigger of the one
    /// already there. Returns the bracket id.
    pub fn attach_or_replace(
        &mut self,
        parent: &ParentRef,
        kind: BracketKind,
        price: f64,
    ) -> Result<OrderId> {
        let info = self.parent_info(parent)?;

        if let Some(existing) = self.store.bracket_of_kind(parent, kind) {
            let id = existing.id.clone();
            let updated = self.store.update_order(&id, |o| {
                o.set_trigger(kind, price);
                Ok(())
            })?;
            self.outbox.push(EngineEvent::OrderUpdated(updated.clone()));
            debug!(bracket = %id, ?kind, price, "bracket trigger replaced");
            self.refresh_mirror(parent, kind)?;
            return Ok(id);
        }

        let id = self.ids.next_order_id();
        let mut bracket = Order::new(
            id.clone(),
            info.symbol,
            info.side.opposite(),
            kind.order_type(),
            info.quantity,
            Utc::now(),
        );
        bracket.status = info.status;
        bracket.parent = Some(parent.clone());
        bracket.last = info.last;
        bracket.set_trigger(kind, price);

        self.outbox.push(EngineEvent::OrderUpdated(bracket.clone()));
        self.store.upsert_order(bracket);
        debug!(bracket = %id, ?kind, price, "bracket attached");
        self.refresh_mirror(parent, kind)?;
        Ok(id)
    }

    /// Desired state of one bracket: `Some` creates or replaces, `None` cancels.
    pub fn sync(&mut self, parent: &ParentRef, kind: BracketKind, price: Option<f64>) -> Result<()> {
        match price {
            Some(price) => {
                self.attach_or_replace(parent, kind, price)?;
            }
            None => {
                if let Some(existing) = self.store.bracket_of_kind(parent, kind) {
                    let id = existing.id.clone();
                    self.cancel(&id)?;
                }
            }
        }
        Ok(())
    }

    /// Cancel one bracket and refresh its parent's mirror.
    pub fn cancel(&mut self, id: &OrderId) -> Result<()> {
        self.close(id, OrderStatus::Canceled)
    }

    /// Mark one bracket Rejected (its remote cancel failed) and refresh the mirror.
    pub fn reject(&mut self, id: &OrderId) -> Result<()> {
        self.close(id, OrderStatus::Rejected)
    }

    /// Cancel every active bracket of `parent`. Used when the parent goes away.
    pub fn cancel_all(&mut self, parent: &ParentRef) -> Result<()> {
        let ids = self.bracket_ids(parent);
        for id in &ids {
            self.settle(id, OrderStatus::Canceled)?;
        }
        if ids.is_empty() {
            return Ok(());
        }
        debug!(?parent, count = ids.len(), "brackets cancelled with parent");
        self.refresh_mirrors(parent)
    }

    /// Hand the brackets of a filled order over to the resulting position.
    ///
    /// Brackets only survive if the position now points the way the order
    /// traded; a bracket of that kind already on the position is replaced.
    pub fn activate(&mut self, filled: &Order, position: Option<&Position>) -> Result<()> {
        let order_parent = ParentRef::Order(filled.id.clone());
        let ids = self.bracket_ids(&order_parent);

        let target = position.filter(|p| p.side == filled.side);
        let Some(position) = target else {
            for id in &ids {
                self.settle(id, OrderStatus::Canceled)?;
            }
            return Ok(());
        };

        let position_parent = ParentRef::Position(position.id.clone());
        for id in ids {
            let kind = self.store.require_order(&id)?.bracket_kind();
            if let Some(kind) = kind {
                if let Some(existing) = self.store.bracket_of_kind(&position_parent, kind) {
                    let existing = existing.id.clone();
                    self.settle(&existing, OrderStatus::Canceled)?;
                }
            }

            let updated = self.store.update_order(&id, |o| {
                o.parent = Some(position_parent.clone());
                o.side = position.side.opposite();
                o.quantity = position.quantity;
                if o.status == OrderStatus::Inactive {
                    o.transition(OrderStatus::Working)?;
                }
                Ok(())
            })?;
            self.outbox.push(EngineEvent::OrderUpdated(updated.clone()));
            debug!(bracket = %id, position = %position.id, "bracket activated");
        }

        self.refresh_mirrors(&position_parent)
    }

    /// Re-pin the brackets of `parent` to its current size, opposite `side`.
    pub fn resize(&mut self, parent: &ParentRef, side: Side, quantity: f64) -> Result<()> {
        let bracket_side = side.opposite();
        for id in self.bracket_ids(parent) {
            let current = self.store.require_order(&id)?;
            if current.quantity == quantity && current.side == bracket_side {
                continue;
            }
            let updated = self.store.update_order(&id, |o| {
                o.quantity = quantity;
                o.side = bracket_side;
                Ok(())
            })?;
            self.outbox.push(EngineEvent::OrderUpdated(updated.clone()));
        }
        Ok(())
    }

    /// Re-derive both mirrors of `parent` from its active brackets.
    pub fn refresh_mirrors(&mut self, parent: &ParentRef) -> Result<()> {
        self.refresh_mirror(parent, BracketKind::TakeProfit)?;
        self.refresh_mirror(parent, BracketKind::StopLoss)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn parent_info(&self, parent: &ParentRef) -> Result<ParentInfo> {
        match parent {
            ParentRef::Order(id) => {
                let order = self.store.require_order(id)?;
                if order.is_bracket() {
                    return Err(EngineError::Validation(format!(
                        "order {id} is a bracket and cannot carry brackets"
                    )));
                }
                Ok(ParentInfo {
                    symbol: order.symbol.clone(),
                    side: order.side,
                    quantity: order.quantity,
                    last: order.last,
                    status: OrderStatus::Inactive,
                })
            }
            ParentRef::Position(id) => {
                let position = self.store.require_position(id)?;
                Ok(ParentInfo {
                    symbol: position.symbol.clone(),
                    side: position.side,
                    quantity: position.quantity,
                    last: position.last,
                    status: OrderStatus::Working,
                })
            }
        }
    }

    fn bracket_ids(&self, parent: &ParentRef) -> Vec<OrderId> {
        self.store
            .brackets_of(parent)
            .into_iter()
            .map(|o| o.id.clone())
            .collect()
    }

    fn close(&mut self, id: &OrderId, status: OrderStatus) -> Result<()> {
        let order = self.store.require_order(id)?;
        let (parent, kind) = match (order.parent.clone(), order.bracket_kind()) {
            (Some(parent), Some(kind)) => (parent, kind),
            _ => {
                return Err(EngineError::Validation(format!(
                    "order {id} is not a bracket"
                )))
            }
        };
        self.settle(id, status)?;
        self.refresh_mirror(&parent, kind)
    }

    /// Terminal status without touching the parent.
    fn settle(&mut self, id: &OrderId, status: OrderStatus) -> Result<()> {
        let updated = self.store.update_order(id, |o| o.transition(status))?;
        self.outbox.push(EngineEvent::OrderUpdated(updated.clone()));
        Ok(())
    }

    /// Copy the active bracket's trigger onto the parent; clear it if none.
    /// A parent that no longer exists is skipped.
    fn refresh_mirror(&mut self, parent: &ParentRef, kind: BracketKind) -> Result<()> {
        let price = self
            .store
            .bracket_of_kind(parent, kind)
            .and_then(|b| match kind {
                BracketKind::TakeProfit => b.limit_price,
                BracketKind::StopLoss => b.stop_price,
            });

        match parent {
            ParentRef::Order(id) => {
                let Some(order) = self.store.order(id) else {
                    return Ok(());
                };
                if mirror_of(order.take_profit, order.stop_loss, kind) == price {
                    return Ok(());
                }
                let updated = self.store.update_order(id, |o| {
                    o.set_mirror(kind, price);
                    Ok(())
                })?;
                self.outbox.push(EngineEvent::OrderUpdated(updated.clone()));
            }
            ParentRef::Position(id) => self.refresh_position_mirror(id, kind, price),
        }
        Ok(())
    }

    fn refresh_position_mirror(&mut self, id: &PositionId, kind: BracketKind, price: Option<f64>) {
        let Some(position) = self.store.position_mut(id) else {
            return;
        };
        if mirror_of(position.take_profit, position.stop_loss, kind) == price {
            return;
        }
        position.set_mirror(kind, price);
        self.outbox.push(EngineEvent::PositionUpdated(position.clone()));
    }
}

fn mirror_of(take_profit: Option<f64>, stop_loss: Option<f64>, kind: BracketKind) -> Option<f64> {
    match kind {
        BracketKind::TakeProfit => take_profit,
        BracketKind::StopLoss => stop_loss,
    }
}
