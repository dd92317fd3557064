//! The order engine facade.
//!
//! Owns the entity store and drives the tick → trigger → position →
//! bracket chain. Every mutating method takes `&mut self`, and remote
//! confirmations are awaited inside that borrow, so a tick can never observe
//! a half-applied request. Notifications are queued while the store is
//! mutated and handed to the host when the operation returns, error or not.

use crate::config::Session;
use crate::domain::{
    BracketKind, Brackets, Execution, IdGenerator, ModifyRequest, Order, OrderId, OrderRequest,
    OrderStatus, ParentRef, Position, PositionId, SequentialIds, Side, Symbol, Tick,
};
use crate::engine::brackets::BracketCoordinator;
use crate::engine::position_update::{apply_fill, FillOutcome, PositionFill};
use crate::error::{EngineError, Result};
use crate::execution::{check_trigger, ExecutionSource, TriggerResult};
use crate::feed::{QuoteFeed, SubscriptionId};
use crate::host::{EngineEvent, EventLog, Host};
use crate::store::EntityStore;
use crate::transport::AccountSnapshot;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct OrderEngine<H: Host = EventLog> {
    session: Session,
    source: Box<dyn ExecutionSource>,
    host: H,
    ids: Box<dyn IdGenerator>,
    feed: Option<Box<dyn QuoteFeed>>,
    subscriptions: HashMap<Symbol, SubscriptionId>,
    last_prices: HashMap<Symbol, f64>,
    store: EntityStore,
    outbox: Vec<EngineEvent>,
}

impl<H: Host> OrderEngine<H> {
    pub fn new(session: Session, source: Box<dyn ExecutionSource>, host: H) -> Self {
        Self {
            session,
            source,
            host,
            ids: Box::new(SequentialIds::default()),
            feed: None,
            subscriptions: HashMap::new(),
            last_prices: HashMap::new(),
            store: EntityStore::new(),
            outbox: Vec::new(),
        }
    }

    pub fn with_ids(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_feed(mut self, feed: Box<dyn QuoteFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Validate, confirm and store a new order with its brackets.
    ///
    /// An order routed against a position fills immediately; otherwise it
    /// rests Working until a tick triggers it.
    pub async fn place_order(&mut self, request: OrderRequest) -> Result<OrderId> {
        let result = self.place_inner(request).await;
        self.flush();
        result
    }

    pub async fn modify_order(&mut self, request: ModifyRequest) -> Result<()> {
        let result = self.modify_inner(request).await;
        self.flush();
        result
    }

    /// Cancel an order. A parent takes its brackets with it.
    pub async fn cancel_order(&mut self, id: &OrderId) -> Result<()> {
        let result = self.cancel_inner(id).await;
        self.flush();
        result
    }

    /// Cancel a batch, stopping at the first failure.
    ///
    /// Orders must be on `symbol` and, when given, on `side`. Orders already
    /// settled by an earlier cancel in the batch are skipped.
    pub async fn cancel_orders(
        &mut self,
        symbol: &str,
        side: Option<Side>,
        ids: &[OrderId],
    ) -> Result<()> {
        for id in ids {
            let order = self.store.require_order(id)?;
            if order.symbol != symbol || side.is_some_and(|s| s != order.side) {
                return Err(EngineError::Validation(format!(
                    "order {id} does not belong to {symbol}"
                )));
            }
            if order.status.is_terminal() {
                continue;
            }
            self.cancel_order(id).await?;
        }
        Ok(())
    }

    /// Flatten a position with a market order against it.
    pub async fn close_position(&mut self, id: &PositionId) -> Result<OrderId> {
        let position = self.store.require_position(id)?;
        let request = OrderRequest::market(
            position.symbol.clone(),
            position.side.opposite(),
            position.quantity,
        )
        .against_position(id.clone());
        self.place_order(request).await
    }

    /// Flip a position to the other side at the same size.
    pub async fn reverse_position(&mut self, id: &PositionId) -> Result<OrderId> {
        let position = self.store.require_position(id)?;
        let request = OrderRequest::market(
            position.symbol.clone(),
            position.side.opposite(),
            position.quantity * 2.0,
        )
        .against_position(id.clone());
        self.place_order(request).await
    }

    /// Set, move or remove the take-profit / stop-loss of an open position.
    pub async fn edit_position_brackets(
        &mut self,
        id: &PositionId,
        brackets: Brackets,
    ) -> Result<()> {
        let result = self.edit_position_inner(id, brackets).await;
        self.flush();
        result
    }

    // ── Ticks ────────────────────────────────────────────────────────

    /// Apply one quote: refresh `last`, fill whatever triggers, mark to market.
    ///
    /// Error ticks and ticks without a usable price are ignored.
    pub fn on_tick(&mut self, tick: &Tick) -> Result<()> {
        let result = self.tick_inner(tick);
        self.flush();
        result
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// All orders, after reconciling against the source's snapshot.
    pub async fn orders(&mut self) -> Result<Vec<Order>> {
        self.reconcile().await?;
        Ok(self.store.orders().cloned().collect())
    }

    /// Open positions, after reconciling against the source's snapshot.
    pub async fn positions(&mut self) -> Result<Vec<Position>> {
        self.reconcile().await?;
        Ok(self.store.positions().cloned().collect())
    }

    pub fn executions(&self, symbol: &str) -> Vec<Execution> {
        self.store.executions_for(symbol).into_iter().cloned().collect()
    }

    /// Filled, cancelled and rejected orders.
    pub fn order_history(&self) -> Vec<Order> {
        self.store.order_history().into_iter().cloned().collect()
    }

    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.store.order(id)
    }

    pub fn position(&self, id: &PositionId) -> Option<&Position> {
        self.store.position(id)
    }

    /// Symbols currently subscribed on the quote feed.
    pub fn subscribed_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.subscriptions.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    // ── Internals ────────────────────────────────────────────────────

    fn brackets(&mut self) -> BracketCoordinator<'_> {
        BracketCoordinator::new(&mut self.store, self.ids.as_mut(), &mut self.outbox)
    }

    fn flush(&mut self) {
        for event in self.outbox.drain(..) {
            self.host.dispatch(&event);
        }
    }

    fn emit_order(&mut self, id: &OrderId) -> Result<()> {
        let order = self.store.require_order(id)?.clone();
        self.outbox.push(EngineEvent::OrderUpdated(order));
        Ok(())
    }

    fn set_status(&mut self, id: &OrderId, status: OrderStatus) -> Result<()> {
        self.store.update_order(id, |o| o.transition(status))?;
        self.emit_order(id)
    }

    fn new_order(&mut self, request: &OrderRequest) -> Order {
        let mut order = Order::new(
            self.ids.next_order_id(),
            request.symbol.clone(),
            request.side,
            request.order_type,
            request.quantity,
            Utc::now(),
        );
        order.limit_price = request.limit_price;
        order.stop_price = request.stop_price;
        order.last = self.last_prices.get(&request.symbol).copied();
        order
    }

    async fn place_inner(&mut self, request: OrderRequest) -> Result<OrderId> {
        request.validate()?;
        if let Some(position_id) = &request.position_id {
            if *position_id != PositionId::for_symbol(&request.symbol) {
                return Err(EngineError::Validation(format!(
                    "position {position_id} is not on {}",
                    request.symbol
                )));
            }
            self.store.require_position(position_id)?;
        }

        let confirmation = match self.source.submit(&self.session, &request).await {
            Ok(confirmation) => confirmation,
            Err(err) => {
                let mut order = self.new_order(&request);
                order.transition(OrderStatus::Rejected)?;
                warn!(order = %order.id, symbol = %order.symbol, error = %err, "order rejected");
                self.outbox.push(EngineEvent::OrderUpdated(order.clone()));
                self.store.upsert_order(order);
                return Err(err);
            }
        };

        let mut order = self.new_order(&request);
        order.broker_id = confirmation.broker_id;
        let id = order.id.clone();
        let symbol = order.symbol.clone();
        info!(
            order = %id,
            symbol = %symbol,
            side = ?order.side,
            order_type = ?order.order_type,
            quantity = order.quantity,
            "order placed"
        );
        self.outbox.push(EngineEvent::OrderUpdated(order.clone()));
        self.store.upsert_order(order);

        let parent = ParentRef::Order(id.clone());
        if let Some(price) = request.take_profit {
            self.brackets()
                .attach_or_replace(&parent, BracketKind::TakeProfit, price)?;
        }
        if let Some(price) = request.stop_loss {
            self.brackets()
                .attach_or_replace(&parent, BracketKind::StopLoss, price)?;
        }

        if let Some(position_id) = &request.position_id {
            let position = self.store.require_position(position_id)?;
            let price = confirmation
                .fill_price
                .unwrap_or_else(|| position.reference_price());
            self.fill_order(&id, price)?;
        }

        self.refresh_subscription(&symbol);
        Ok(id)
    }

    async fn modify_inner(&mut self, request: ModifyRequest) -> Result<()> {
        request.validate()?;
        let current = self.store.require_order(&request.id)?.clone();
        if !current.status.is_active() {
            return Err(EngineError::Validation(format!(
                "order {} is {:?} and cannot be modified",
                current.id, current.status
            )));
        }

        let mut draft = current.clone();
        draft.quantity = request.quantity.unwrap_or(current.quantity);
        draft.limit_price = request.limit_price.or(current.limit_price);
        draft.stop_price = request.stop_price.or(current.stop_price);
        if !current.is_bracket() {
            draft.take_profit = request.take_profit;
            draft.stop_loss = request.stop_loss;
        }

        let guarded = current.status == OrderStatus::Working;
        if guarded {
            self.set_status(&current.id, OrderStatus::Placing)?;
        }

        let confirmation = match self.source.modify(&self.session, &draft).await {
            Ok(confirmation) => confirmation,
            Err(err) => {
                warn!(order = %current.id, error = %err, "modify rejected");
                self.reject(&current)?;
                self.refresh_subscription(&current.symbol);
                return Err(err);
            }
        };

        self.store.update_order(&current.id, |o| {
            o.quantity = draft.quantity;
            o.limit_price = draft.limit_price;
            o.stop_price = draft.stop_price;
            if let Some(broker_id) = confirmation.broker_id {
                o.broker_id = Some(broker_id);
            }
            if guarded {
                o.transition(OrderStatus::Working)?;
            }
            Ok(())
        })?;
        self.emit_order(&current.id)?;
        debug!(order = %current.id, quantity = draft.quantity, "order modified");

        match &current.parent {
            Some(parent) => self.brackets().refresh_mirrors(parent)?,
            None => {
                let parent = ParentRef::Order(current.id.clone());
                let mut brackets = self.brackets();
                brackets.sync(&parent, BracketKind::TakeProfit, request.take_profit)?;
                brackets.sync(&parent, BracketKind::StopLoss, request.stop_loss)?;
                brackets.resize(&parent, current.side, draft.quantity)?;
            }
        }
        Ok(())
    }

    async fn cancel_inner(&mut self, id: &OrderId) -> Result<()> {
        let order = self.store.require_order(id)?.clone();
        if !order.status.is_active() {
            return Err(EngineError::Validation(format!(
                "order {id} is {:?} and cannot be cancelled",
                order.status
            )));
        }

        if !order.is_bracket() {
            let children: Vec<Order> = self
                .store
                .brackets_of(&ParentRef::Order(id.clone()))
                .into_iter()
                .cloned()
                .collect();
            for child in children {
                match self.source.cancel(&self.session, &child).await {
                    Ok(()) => self.brackets().cancel(&child.id)?,
                    Err(err) => {
                        warn!(bracket = %child.id, error = %err, "bracket cancel rejected");
                        self.brackets().reject(&child.id)?;
                    }
                }
            }
        }

        if order.status == OrderStatus::Working {
            self.set_status(id, OrderStatus::Placing)?;
        }
        match self.source.cancel(&self.session, &order).await {
            Ok(()) => {
                if order.is_bracket() {
                    self.brackets().cancel(id)?;
                } else {
                    self.set_status(id, OrderStatus::Canceled)?;
                }
                info!(order = %id, "order cancelled");
                self.refresh_subscription(&order.symbol);
                Ok(())
            }
            Err(err) => {
                warn!(order = %id, error = %err, "cancel rejected");
                self.reject(&order)?;
                self.refresh_subscription(&order.symbol);
                Err(err)
            }
        }
    }

    /// Settle a failed request as Rejected, keeping the parent mirror honest.
    /// A rejected parent takes its brackets with it.
    fn reject(&mut self, order: &Order) -> Result<()> {
        if order.is_bracket() {
            self.brackets().reject(&order.id)
        } else {
            self.set_status(&order.id, OrderStatus::Rejected)?;
            self.brackets()
                .cancel_all(&ParentRef::Order(order.id.clone()))
        }
    }

    async fn edit_position_inner(&mut self, id: &PositionId, brackets: Brackets) -> Result<()> {
        for (name, price) in [
            ("take profit", brackets.take_profit),
            ("stop loss", brackets.stop_loss),
        ] {
            if let Some(p) = price {
                if !p.is_finite() || p <= 0.0 {
                    return Err(EngineError::Validation(format!(
                        "{name} must be a positive price, got {p}"
                    )));
                }
            }
        }
        let position = self.store.require_position(id)?.clone();
        self.source
            .modify_position(&self.session, &position, &brackets)
            .await?;

        let parent = ParentRef::Position(id.clone());
        let mut coordinator = self.brackets();
        coordinator.sync(&parent, BracketKind::TakeProfit, brackets.take_profit)?;
        coordinator.sync(&parent, BracketKind::StopLoss, brackets.stop_loss)?;
        debug!(position = %id, ?brackets, "position brackets edited");
        Ok(())
    }

    fn tick_inner(&mut self, tick: &Tick) -> Result<()> {
        let Some(last) = tick.actionable_price() else {
            debug!(symbol = %tick.symbol, status = ?tick.status, "tick ignored");
            return Ok(());
        };
        let symbol = tick.symbol.as_str();
        self.last_prices.insert(symbol.to_string(), last);

        // Snapshot up front: brackets activated below are picked up on this
        // same tick because they come after their parent in store order.
        let candidates = self.store.active_orders_for(symbol);
        for id in &candidates {
            let order = self.store.update_order(id, |o| {
                o.last = Some(last);
                Ok(())
            })?;
            if order.status.is_active() {
                self.outbox.push(EngineEvent::OrderLast {
                    id: id.clone(),
                    last,
                });
            }
        }

        for id in &candidates {
            let Some(order) = self.store.order(id) else {
                continue;
            };
            if let TriggerResult::Fill { fill_price } = check_trigger(order, last) {
                self.fill_order(id, fill_price)?;
            }
        }

        let position_id = PositionId::for_symbol(symbol);
        if let Some(position) = self.store.position_mut(&position_id) {
            if position.mark(last) {
                self.outbox.push(EngineEvent::PositionPatched {
                    id: position_id.clone(),
                    patch: position.patch(),
                });
            }
        }

        self.refresh_subscription(symbol);
        Ok(())
    }

    /// Fill one order at `price` and run the position / bracket chain to completion.
    fn fill_order(&mut self, id: &OrderId, price: f64) -> Result<()> {
        let order = self
            .store
            .update_order(id, |o| {
                o.transition(OrderStatus::Filled)?;
                o.price = Some(price);
                o.avg_price = Some(price);
                Ok(())
            })?
            .clone();
        self.outbox.push(EngineEvent::OrderUpdated(order.clone()));

        let now = Utc::now();
        let execution = Execution {
            id: self.ids.next_execution_id(),
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            time: now,
        };
        self.outbox
            .push(EngineEvent::ExecutionRecorded(execution.clone()));
        self.store.record_execution(execution);

        let position_id = PositionId::for_symbol(&order.symbol);
        let result = apply_fill(
            self.store.position(&position_id),
            &order.symbol,
            &PositionFill {
                side: order.side,
                quantity: order.quantity,
                price,
                time: now,
            },
        );
        info!(
            order = %order.id,
            symbol = %order.symbol,
            price,
            outcome = ?result.outcome,
            realized = result.realized_pl,
            "order filled"
        );
        if result.closed_quantity > 0.0 {
            self.outbox.push(EngineEvent::RealizedPl {
                symbol: order.symbol.clone(),
                delta: result.realized_pl,
            });
        }

        let parent = ParentRef::Position(position_id.clone());
        match (result.outcome, result.position) {
            (FillOutcome::ClosedOrReversed, next) => {
                if let Some(mut flat) = self.store.remove_position(&position_id) {
                    flat.quantity = 0.0;
                    flat.profit = 0.0;
                    flat.take_profit = None;
                    flat.stop_loss = None;
                    self.outbox.push(EngineEvent::PositionUpdated(flat));
                }
                self.brackets().cancel_all(&parent)?;
                if let Some(next) = next {
                    self.outbox.push(EngineEvent::PositionUpdated(next.clone()));
                    self.store.upsert_position(next);
                }
            }
            (_, Some(next)) => {
                let (side, quantity) = (next.side, next.quantity);
                self.outbox.push(EngineEvent::PositionUpdated(next.clone()));
                self.store.upsert_position(next);
                self.brackets().resize(&parent, side, quantity)?;
            }
            (_, None) => {}
        }

        if !order.is_bracket() {
            let position = self.store.position(&position_id).cloned();
            self.brackets().activate(&order, position.as_ref())?;
        }
        Ok(())
    }

    /// Overwrite local state with the source's snapshot, when it has one.
    ///
    /// Positions are replaced by value, so a fill already applied locally is
    /// never counted twice.
    async fn reconcile(&mut self) -> Result<()> {
        let Some(snapshot) = self.source.snapshot(&self.session).await? else {
            return Ok(());
        };
        let result = self.apply_snapshot(snapshot);
        self.flush();
        result
    }

    fn apply_snapshot(&mut self, snapshot: AccountSnapshot) -> Result<()> {
        let reported: Vec<PositionId> = snapshot
            .positions
            .iter()
            .map(|p| PositionId::for_symbol(&p.symbol))
            .collect();
        let stale: Vec<PositionId> = self
            .store
            .positions()
            .map(|p| p.id.clone())
            .filter(|id| !reported.contains(id))
            .collect();
        for id in stale {
            if let Some(mut flat) = self.store.remove_position(&id) {
                debug!(position = %id, "position closed by snapshot");
                flat.quantity = 0.0;
                flat.profit = 0.0;
                flat.take_profit = None;
                flat.stop_loss = None;
                self.outbox.push(EngineEvent::PositionUpdated(flat));
            }
            self.brackets().cancel_all(&ParentRef::Position(id))?;
        }

        for remote in snapshot.positions {
            let id = PositionId::for_symbol(&remote.symbol);
            let mut position = match self.store.position(&id) {
                Some(local)
                    if local.side == remote.side
                        && local.quantity == remote.quantity
                        && local.avg_price == remote.avg_price =>
                {
                    continue;
                }
                Some(local) => local.clone(),
                None => Position::open(
                    remote.symbol.clone(),
                    remote.side,
                    remote.quantity,
                    remote.avg_price,
                    Utc::now(),
                ),
            };
            position.side = remote.side;
            position.quantity = remote.quantity;
            position.avg_price = remote.avg_price;
            if let Some(last) = position.last {
                position.profit = position.unrealized_pnl(last);
            }
            debug!(position = %id, quantity = position.quantity, "position reconciled");
            self.outbox.push(EngineEvent::PositionUpdated(position.clone()));
            self.store.upsert_position(position);
            self.brackets()
                .resize(&ParentRef::Position(id), remote.side, remote.quantity)?;
        }

        for remote in snapshot.orders {
            let Some(local) = self.store.order_by_broker_id(&remote.broker_id) else {
                continue;
            };
            if local.status == remote.status || !local.status.can_transition_to(remote.status) {
                continue;
            }
            let id = local.id.clone();
            let updated = self
                .store
                .update_order(&id, |o| {
                    o.transition(remote.status)?;
                    if remote.status == OrderStatus::Filled {
                        o.price = remote.avg_price.or(o.price);
                        o.avg_price = remote.avg_price.or(o.avg_price);
                    }
                    Ok(())
                })?
                .clone();
            debug!(order = %id, status = ?remote.status, "order reconciled");
            self.outbox.push(EngineEvent::OrderUpdated(updated.clone()));

            match remote.status {
                OrderStatus::Filled if !updated.is_bracket() => {
                    let position = self
                        .store
                        .position(&PositionId::for_symbol(&updated.symbol))
                        .cloned();
                    self.brackets().activate(&updated, position.as_ref())?;
                }
                OrderStatus::Canceled | OrderStatus::Rejected if !updated.is_bracket() => {
                    self.brackets().cancel_all(&ParentRef::Order(id))?;
                }
                _ => {
                    if let Some(parent) = &updated.parent {
                        self.brackets().refresh_mirrors(parent)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Keep exactly one feed subscription per symbol with live exposure.
    fn refresh_subscription(&mut self, symbol: &str) {
        let Some(feed) = self.feed.as_mut() else {
            return;
        };
        let exposed = self.store.has_exposure(symbol);
        match (exposed, self.subscriptions.get(symbol).copied()) {
            (true, None) => {
                let id = feed.subscribe(&[symbol.to_string()]);
                debug!(symbol, subscription = id.0, "quotes subscribed");
                self.subscriptions.insert(symbol.to_string(), id);
            }
            (false, Some(id)) => {
                feed.unsubscribe(id);
                debug!(symbol, subscription = id.0, "quotes unsubscribed");
                self.subscriptions.remove(symbol);
            }
            _ => {}
        }
    }
}
