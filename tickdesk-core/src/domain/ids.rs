use serde::{Deserialize, Serialize};
use std::fmt;

/// Order ID, minted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position ID. There is at most one open position per symbol, so the ID is the symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn for_symbol(symbol: &str) -> Self {
        Self(symbol.to_string())
    }
}

impl From<&str> for PositionId {
    fn from(symbol: &str) -> Self {
        Self::for_symbol(symbol)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution (fill record) ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of fresh identifiers.
///
/// Injected into the engine so tests can supply deterministic ids.
pub trait IdGenerator: Send {
    fn next_order_id(&mut self) -> OrderId;
    fn next_execution_id(&mut self) -> ExecutionId;
}

/// Monotonic counter shared by orders and executions, starting at 1.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    next: u64,
}

impl SequentialIds {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    fn bump(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequentialIds {
    fn next_order_id(&mut self) -> OrderId {
        OrderId::from(self.bump())
    }

    fn next_execution_id(&mut self) -> ExecutionId {
        ExecutionId(self.bump().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_share_one_counter() {
        let mut ids = SequentialIds::default();
        assert_eq!(ids.next_order_id(), OrderId::from(1));
        assert_eq!(ids.next_execution_id(), ExecutionId("2".into()));
        assert_eq!(ids.next_order_id(), OrderId::from(3));
    }

    #[test]
    fn position_id_is_symbol() {
        assert_eq!(PositionId::for_symbol("XAUUSD").to_string(), "XAUUSD");
        assert_eq!(PositionId::from("BTCUSD"), PositionId("BTCUSD".into()));
    }
}
