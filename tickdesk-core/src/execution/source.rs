//! Execution sources: who confirms an order request.
//!
//! `LocalSimulated` accepts everything and leaves fills to the tick loop.
//! `BrokerConfirmed` forwards each request through a `BrokerTransport` and
//! maps the broker answer onto accept / reject.

use crate::config::Session;
use crate::domain::{Brackets, Order, OrderRequest, OrderType, Position};
use crate::error::{EngineError, Result};
use crate::transport::{AccountSnapshot, BrokerTransport, OrderPayload, PayloadAction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    LocalSimulated,
    BrokerConfirmed,
}

/// What an accepted request came back with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confirmation {
    pub broker_id: Option<String>,
    /// Broker fill price, when the broker traded immediately.
    pub fill_price: Option<f64>,
}

#[async_trait]
pub trait ExecutionSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn submit(&self, session: &Session, request: &OrderRequest) -> Result<Confirmation>;

    /// `order` already carries the requested changes, brackets included.
    async fn modify(&self, session: &Session, order: &Order) -> Result<Confirmation>;

    async fn cancel(&self, session: &Session, order: &Order) -> Result<()>;

    async fn modify_position(
        &self,
        session: &Session,
        position: &Position,
        brackets: &Brackets,
    ) -> Result<()>;

    /// Authoritative account state, if this source has one.
    async fn snapshot(&self, _session: &Session) -> Result<Option<AccountSnapshot>> {
        Ok(None)
    }
}

/// Offline source. Every request is accepted as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSimulated;

#[async_trait]
impl ExecutionSource for LocalSimulated {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalSimulated
    }

    async fn submit(&self, _session: &Session, _request: &OrderRequest) -> Result<Confirmation> {
        Ok(Confirmation::default())
    }

    async fn modify(&self, _session: &Session, _order: &Order) -> Result<Confirmation> {
        Ok(Confirmation::default())
    }

    async fn cancel(&self, _session: &Session, _order: &Order) -> Result<()> {
        Ok(())
    }

    async fn modify_position(
        &self,
        _session: &Session,
        _position: &Position,
        _brackets: &Brackets,
    ) -> Result<()> {
        Ok(())
    }
}

/// Remote source. Bracket legs travel inside their parent's payload, so
/// requests about a bracket alone are settled locally.
pub struct BrokerConfirmed<T> {
    transport: T,
    volume_scale: f64,
}

impl<T: BrokerTransport> BrokerConfirmed<T> {
    pub fn new(transport: T, volume_scale: f64) -> Self {
        Self {
            transport,
            volume_scale,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn to_wire(&self, quantity: f64) -> f64 {
        quantity * self.volume_scale
    }

    fn from_wire(&self, volume: f64) -> f64 {
        volume / self.volume_scale
    }
}

fn trigger_price(order_type: OrderType, limit: Option<f64>, stop: Option<f64>) -> Option<f64> {
    match order_type {
        OrderType::Limit => limit,
        OrderType::Stop => stop,
        OrderType::StopLimit => limit.or(stop),
        OrderType::Market => None,
    }
}

#[async_trait]
impl<T: BrokerTransport> ExecutionSource for BrokerConfirmed<T> {
    fn kind(&self) -> SourceKind {
        SourceKind::BrokerConfirmed
    }

    async fn submit(&self, session: &Session, request: &OrderRequest) -> Result<Confirmation> {
        let mut payload = OrderPayload::new(
            PayloadAction::Place,
            session,
            &request.symbol,
            request.side,
            request.order_type,
            self.to_wire(request.quantity),
        );
        payload.price_order =
            trigger_price(request.order_type, request.limit_price, request.stop_price);
        payload.price_tp = request.take_profit;
        payload.price_sl = request.stop_loss;
        payload.position_id = request.position_id.as_ref().map(|id| id.0.clone());

        let data = self
            .transport
            .send_order(&payload)
            .await?
            .into_result()?
            .ok_or_else(|| EngineError::RemoteRejection("broker returned no order data".into()))?;

        if !data.is_working() {
            return Err(EngineError::RemoteRejection(format!(
                "order {} returned status code {}",
                data.id, data.status_code
            )));
        }
        Ok(Confirmation {
            broker_id: Some(data.id),
            fill_price: data.avg_price.filter(|p| p.is_finite() && *p > 0.0),
        })
    }

    async fn modify(&self, session: &Session, order: &Order) -> Result<Confirmation> {
        if order.is_bracket() {
            return Ok(Confirmation::default());
        }
        let mut payload = OrderPayload::new(
            PayloadAction::Modify,
            session,
            &order.symbol,
            order.side,
            order.order_type,
            self.to_wire(order.quantity),
        );
        payload.price_order = trigger_price(order.order_type, order.limit_price, order.stop_price);
        payload.price_tp = order.take_profit;
        payload.price_sl = order.stop_loss;
        payload.order_id = Some(order.broker_id.clone().unwrap_or_else(|| order.id.0.clone()));

        let data = self.transport.modify_order(&payload).await?.into_result()?;
        match data {
            Some(data) if data.id == "0" => Err(EngineError::RemoteRejection(format!(
                "broker refused to modify order {}",
                order.id
            ))),
            Some(data) => Ok(Confirmation {
                broker_id: Some(data.id),
                fill_price: None,
            }),
            None => Ok(Confirmation {
                broker_id: order.broker_id.clone(),
                fill_price: None,
            }),
        }
    }

    async fn cancel(&self, _session: &Session, order: &Order) -> Result<()> {
        if order.is_bracket() {
            return Ok(());
        }
        let id = order.broker_id.as_deref().unwrap_or(&order.id.0);
        self.transport.cancel_order(id).await?.into_result()?;
        Ok(())
    }

    async fn modify_position(
        &self,
        session: &Session,
        position: &Position,
        brackets: &Brackets,
    ) -> Result<()> {
        let mut payload = OrderPayload::new(
            PayloadAction::ModifyPosition,
            session,
            &position.symbol,
            position.side,
            OrderType::Market,
            self.to_wire(position.quantity),
        );
        payload.price_tp = brackets.take_profit;
        payload.price_sl = brackets.stop_loss;
        payload.position_id = Some(position.id.0.clone());

        self.transport.modify_order(&payload).await?.into_result()?;
        Ok(())
    }

    async fn snapshot(&self, session: &Session) -> Result<Option<AccountSnapshot>> {
        let snapshot = self.transport.fetch_snapshot(session).await?;
        Ok(snapshot.map(|mut snapshot| {
            for position in &mut snapshot.positions {
                position.quantity = self.from_wire(position.quantity);
            }
            snapshot
        }))
    }
}
