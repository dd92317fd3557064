//! Integration tests for the engine running on broker confirmation.
//!
//! A scripted transport stands in for the REST broker. Covers accepted and
//! rejected placement, transport failure, rejected cancel and modify, and
//! reconciliation against a broker snapshot.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tickdesk_core::domain::{
    ModifyRequest, OrderRequest, OrderStatus, ParentRef, PositionId, Side, Tick,
};
use tickdesk_core::execution::BrokerConfirmed;
use tickdesk_core::feed::StaticFeed;
use tickdesk_core::host::EventLog;
use tickdesk_core::transport::{
    AccountSnapshot, BrokerOrderData, BrokerResponse, BrokerTransport, OrderPayload,
    SnapshotOrder, SnapshotPosition, TransportError,
};
use tickdesk_core::{EngineError, OrderEngine, Session};

// ──────────────────────────────────────────────
// Scripted transport
// ──────────────────────────────────────────────

#[derive(Default)]
struct Script {
    next_id: u64,
    status_code: i32,
    reject_orders: bool,
    fail_transport: bool,
    reject_cancels: bool,
    refuse_modify: bool,
    sent: Vec<OrderPayload>,
    cancelled: Vec<String>,
    snapshot: Option<AccountSnapshot>,
}

#[derive(Clone, Default)]
struct ScriptedBroker(Arc<Mutex<Script>>);

impl ScriptedBroker {
    fn new() -> Self {
        let broker = Self::default();
        broker.0.lock().unwrap().status_code = 2;
        broker
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.0.lock().unwrap()
    }
}

#[async_trait]
impl BrokerTransport for ScriptedBroker {
    async fn send_order(&self, payload: &OrderPayload) -> Result<BrokerResponse, TransportError> {
        let mut script = self.script();
        if script.fail_transport {
            return Err(TransportError("connection refused".into()));
        }
        script.sent.push(payload.clone());
        if script.reject_orders {
            return Ok(BrokerResponse::rejected("not enough money"));
        }
        script.next_id += 1;
        Ok(BrokerResponse::accepted(BrokerOrderData {
            id: format!("B-{}", script.next_id),
            quantity: payload.volume,
            filled_quantity: 0.0,
            status_code: script.status_code,
            avg_price: None,
        }))
    }

    async fn modify_order(&self, payload: &OrderPayload) -> Result<BrokerResponse, TransportError> {
        let mut script = self.script();
        script.sent.push(payload.clone());
        if script.refuse_modify {
            return Ok(BrokerResponse::accepted(BrokerOrderData {
                id: "0".into(),
                quantity: payload.volume,
                filled_quantity: 0.0,
                status_code: 2,
                avg_price: None,
            }));
        }
        Ok(BrokerResponse::ok())
    }

    async fn cancel_order(&self, broker_id: &str) -> Result<BrokerResponse, TransportError> {
        let mut script = self.script();
        script.cancelled.push(broker_id.to_string());
        if script.reject_cancels {
            return Ok(BrokerResponse::rejected("order already executed"));
        }
        Ok(BrokerResponse::ok())
    }

    async fn fetch_snapshot(
        &self,
        _session: &Session,
    ) -> Result<Option<AccountSnapshot>, TransportError> {
        Ok(self.script().snapshot.clone())
    }
}

fn engine(broker: &ScriptedBroker) -> OrderEngine<EventLog> {
    let source = BrokerConfirmed::new(broker.clone(), 10_000.0);
    OrderEngine::new(Session::new(1001, "desk"), Box::new(source), EventLog::new())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[tokio::test]
async fn accepted_order_keeps_broker_id() {
    let broker = ScriptedBroker::new();
    let mut engine = engine(&broker);

    let id = engine
        .place_order(OrderRequest::limit("EURUSD", Side::Buy, 0.1, 1.08).with_take_profit(1.1))
        .await
        .unwrap();

    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::Working);
    assert_eq!(order.broker_id.as_deref(), Some("B-1"));

    let script = broker.script();
    assert_eq!(script.sent.len(), 1);
    assert!((script.sent[0].volume - 1_000.0).abs() < 1e-9);
    assert_eq!(script.sent[0].login, 1001);
    assert_eq!(script.sent[0].price_tp, Some(1.1));
}

#[tokio::test]
async fn remote_rejection_stores_rejected_order() {
    let broker = ScriptedBroker::new();
    broker.script().reject_orders = true;
    let mut engine = engine(&broker);

    let err = engine
        .place_order(OrderRequest::market("EURUSD", Side::Buy, 1.0))
        .await
        .unwrap_err();

    assert_eq!(err, EngineError::RemoteRejection("not enough money".into()));
    let orders: Vec<_> = engine.store().orders().collect();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Rejected);
    let reported = engine.host().last_order_update(&orders[0].id).unwrap();
    assert_eq!(reported.status, OrderStatus::Rejected);
}

#[tokio::test]
async fn non_working_status_code_is_rejected() {
    let broker = ScriptedBroker::new();
    broker.script().status_code = 5;
    let mut engine = engine(&broker);

    let err = engine
        .place_order(OrderRequest::market("EURUSD", Side::Buy, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RemoteRejection(_)));
    assert_eq!(engine.store().count_orders_with_status(OrderStatus::Rejected), 1);
}

#[tokio::test]
async fn transport_failure_rejects_like_a_rejection() {
    let broker = ScriptedBroker::new();
    broker.script().fail_transport = true;
    let mut engine = engine(&broker);

    let err = engine
        .place_order(OrderRequest::market("EURUSD", Side::Sell, 1.0))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::TransportFailure("connection refused".into()));
    assert!(err.is_remote());
    assert_eq!(engine.store().count_orders_with_status(OrderStatus::Rejected), 1);
}

#[tokio::test]
async fn rejected_cancel_marks_order_rejected() {
    let broker = ScriptedBroker::new();
    let mut engine = engine(&broker);
    let id = engine
        .place_order(OrderRequest::limit("EURUSD", Side::Buy, 1.0, 1.05))
        .await
        .unwrap();
    broker.script().reject_cancels = true;

    let err = engine.cancel_order(&id).await.unwrap_err();

    assert!(matches!(err, EngineError::RemoteRejection(_)));
    assert_eq!(engine.order(&id).unwrap().status, OrderStatus::Rejected);
    let statuses: Vec<_> = engine
        .host()
        .order_updates(&id)
        .iter()
        .map(|o| o.status)
        .collect();
    assert_eq!(
        statuses,
        vec![OrderStatus::Working, OrderStatus::Placing, OrderStatus::Rejected]
    );
    assert_eq!(broker.script().cancelled, vec!["B-1"]);
}

#[tokio::test]
async fn refused_modify_marks_order_rejected() {
    let broker = ScriptedBroker::new();
    let mut engine = engine(&broker);
    let id = engine
        .place_order(OrderRequest::limit("EURUSD", Side::Buy, 1.0, 1.05))
        .await
        .unwrap();
    broker.script().refuse_modify = true;

    let mut request = ModifyRequest::from_order(engine.order(&id).unwrap());
    request.limit_price = Some(1.04);
    let err = engine.modify_order(request).await.unwrap_err();

    assert!(matches!(err, EngineError::RemoteRejection(_)));
    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.limit_price, Some(1.05));
}

#[tokio::test]
async fn refused_modify_cancels_brackets_of_rejected_parent() {
    let broker = ScriptedBroker::new();
    let mut engine = engine(&broker).with_feed(Box::new(StaticFeed::new()));
    let id = engine
        .place_order(
            OrderRequest::limit("EURUSD", Side::Buy, 1.0, 1.05)
                .with_take_profit(1.10)
                .with_stop_loss(1.00),
        )
        .await
        .unwrap();
    let parent = ParentRef::Order(id.clone());
    let children: Vec<_> = engine
        .store()
        .brackets_of(&parent)
        .iter()
        .map(|o| o.id.clone())
        .collect();
    assert_eq!(children.len(), 2);
    assert_eq!(engine.subscribed_symbols(), vec!["EURUSD"]);
    broker.script().refuse_modify = true;

    let mut request = ModifyRequest::from_order(engine.order(&id).unwrap());
    request.limit_price = Some(1.04);
    let err = engine.modify_order(request).await.unwrap_err();

    assert!(matches!(err, EngineError::RemoteRejection(_)));
    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.take_profit, None);
    assert_eq!(order.stop_loss, None);
    for child in &children {
        assert_eq!(engine.order(child).unwrap().status, OrderStatus::Canceled);
    }
    assert!(engine.store().brackets_of(&parent).is_empty());
    assert!(engine.subscribed_symbols().is_empty());
}

#[tokio::test]
async fn snapshot_overwrites_positions_by_value() {
    let broker = ScriptedBroker::new();
    let mut engine = engine(&broker);
    let id = engine
        .place_order(OrderRequest::limit("EURUSD", Side::Buy, 1.0, 1.05).with_stop_loss(1.0))
        .await
        .unwrap();
    let sl = engine
        .store()
        .stop_loss_of(&ParentRef::Order(id.clone()))
        .unwrap()
        .id
        .clone();

    // The broker filled the order before any local tick did.
    broker.script().snapshot = Some(AccountSnapshot {
        positions: vec![SnapshotPosition {
            symbol: "EURUSD".into(),
            side: Side::Buy,
            quantity: 10_000.0,
            avg_price: 1.049,
        }],
        orders: vec![SnapshotOrder {
            broker_id: "B-1".into(),
            status: OrderStatus::Filled,
            avg_price: Some(1.049),
        }],
    });

    let positions = engine.positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].quantity, 1.0);
    assert_eq!(positions[0].avg_price, 1.049);

    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.avg_price, Some(1.049));
    let stop = engine.order(&sl).unwrap();
    assert_eq!(stop.status, OrderStatus::Working);
    assert_eq!(
        stop.parent,
        Some(ParentRef::Position(PositionId::for_symbol("EURUSD")))
    );

    // Reading again does not apply the fill twice.
    let positions = engine.positions().await.unwrap();
    assert_eq!(positions[0].quantity, 1.0);

    // A later tick cannot fill the already-filled order again.
    engine.on_tick(&Tick::ok("EURUSD", 1.04)).unwrap();
    assert_eq!(engine.position(&PositionId::for_symbol("EURUSD")).unwrap().quantity, 1.0);
}

#[tokio::test]
async fn snapshot_without_position_closes_local_one() {
    let broker = ScriptedBroker::new();
    let mut engine = engine(&broker);
    engine
        .place_order(OrderRequest::market("EURUSD", Side::Buy, 1.0))
        .await
        .unwrap();
    engine.on_tick(&Tick::ok("EURUSD", 1.05)).unwrap();
    assert_eq!(engine.positions().await.unwrap().len(), 1);

    broker.script().snapshot = Some(AccountSnapshot::default());
    assert!(engine.positions().await.unwrap().is_empty());
    assert!(engine.position(&PositionId::for_symbol("EURUSD")).is_none());
}
