//! Position update — applies one fill to the netted position of a symbol.
//!
//! Handles opening, averaging in, partial reduction, full close and
//! reversal, and reports the realized PnL of the closed part. Pure: the
//! caller writes the result back to the store.

use crate::domain::{Position, Side};
use chrono::{DateTime, Utc};

/// Quantities at or below this are treated as flat.
const FLAT_EPSILON: f64 = 1e-10;

/// A fill as seen by the position layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFill {
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Opened,
    Increased,
    Reduced,
    /// Flat afterwards, or flipped to the fill's side.
    ClosedOrReversed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillResult {
    pub outcome: FillOutcome,
    pub realized_pl: f64,
    pub closed_quantity: f64,
    /// The position after the fill; `None` when it went flat.
    pub position: Option<Position>,
}

impl FillResult {
    /// Whether the symbol still holds a position on the fill's side.
    pub fn is_reversal(&self) -> bool {
        self.outcome == FillOutcome::ClosedOrReversed && self.position.is_some()
    }
}

/// Apply `fill` on `symbol` to the existing position, if any.
///
/// - no position: open at the fill price
/// - same side: weighted average price, quantity grows
/// - opposite side: realize `(fill - avg) * closed * sign(position side)`,
///   then reduce, close, or reverse with the remainder at the fill price
pub fn apply_fill(existing: Option<&Position>, symbol: &str, fill: &PositionFill) -> FillResult {
    let Some(pos) = existing else {
        return FillResult {
            outcome: FillOutcome::Opened,
            realized_pl: 0.0,
            closed_quantity: 0.0,
            position: Some(Position::open(
                symbol,
                fill.side,
                fill.quantity,
                fill.price,
                fill.time,
            )),
        };
    };

    if pos.side == fill.side {
        let total_qty = pos.quantity + fill.quantity;
        let mut next = pos.clone();
        next.avg_price = (pos.avg_price * pos.quantity + fill.price * fill.quantity) / total_qty;
        next.quantity = total_qty;
        remark(&mut next);
        return FillResult {
            outcome: FillOutcome::Increased,
            realized_pl: 0.0,
            closed_quantity: 0.0,
            position: Some(next),
        };
    }

    let closed = fill.quantity.min(pos.quantity);
    let realized_pl = (fill.price - pos.avg_price) * closed * pos.side.sign();
    let net = pos.quantity - fill.quantity;

    if net > FLAT_EPSILON {
        let mut next = pos.clone();
        next.quantity = net;
        remark(&mut next);
        return FillResult {
            outcome: FillOutcome::Reduced,
            realized_pl,
            closed_quantity: closed,
            position: Some(next),
        };
    }

    let position = (net < -FLAT_EPSILON).then(|| {
        let mut reversed = Position::open(symbol, fill.side, -net, fill.price, fill.time);
        reversed.last = pos.last;
        remark(&mut reversed);
        reversed
    });
    FillResult {
        outcome: FillOutcome::ClosedOrReversed,
        realized_pl,
        closed_quantity: closed,
        position,
    }
}

fn remark(pos: &mut Position) {
    if let Some(last) = pos.last {
        pos.profit = pos.unrealized_pnl(last);
    }
}
