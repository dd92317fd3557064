//! Trigger checking — does a tick price trigger a given order?
//!
//! Pure decision table keyed by `(Side, OrderType)`. Only Working orders are
//! evaluated; a missing trigger price never triggers.

use crate::domain::{Order, OrderStatus, OrderType, Side};

/// Result of checking one order against one price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerResult {
    NoTrigger,
    /// Fill at the tick price, no tolerance.
    Fill { fill_price: f64 },
}

/// Check whether `order` triggers at `last`.
pub fn check_trigger(order: &Order, last: f64) -> TriggerResult {
    if order.status != OrderStatus::Working {
        return TriggerResult::NoTrigger;
    }
    if is_triggered(
        order.side,
        order.order_type,
        order.limit_price,
        order.stop_price,
        last,
    ) {
        TriggerResult::Fill { fill_price: last }
    } else {
        TriggerResult::NoTrigger
    }
}

/// The execution condition for a side/type pair.
///
/// Buy limit: last <= limit. Sell limit: last >= limit.
/// Buy stop: last >= stop. Sell stop: last <= stop.
/// Market triggers on any reference price; stop-limit is not simulated.
pub fn is_triggered(
    side: Side,
    order_type: OrderType,
    limit_price: Option<f64>,
    stop_price: Option<f64>,
    last: f64,
) -> bool {
    match (side, order_type) {
        (_, OrderType::Market) => last.is_finite(),
        (Side::Buy, OrderType::Limit) => limit_price.is_some_and(|limit| last <= limit),
        (Side::Sell, OrderType::Limit) => limit_price.is_some_and(|limit| last >= limit),
        (Side::Buy, OrderType::Stop) => stop_price.is_some_and(|stop| last >= stop),
        (Side::Sell, OrderType::Stop) => stop_price.is_some_and(|stop| last <= stop),
        (_, OrderType::StopLimit) => false,
    }
}
