//! Quote feed collaborator.
//!
//! The engine subscribes a symbol when it first holds an order or position on
//! it and drops the subscription once nothing remains. Ticks themselves are
//! pushed into `OrderEngine::on_tick` by whoever owns the feed.

use crate::domain::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

pub trait QuoteFeed: Send {
    fn subscribe(&mut self, symbols: &[Symbol]) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);
}

/// In-process feed that only books subscriptions. Used for replays and tests.
#[derive(Debug, Default)]
pub struct StaticFeed {
    next: u64,
    active: BTreeMap<SubscriptionId, Vec<Symbol>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.active
            .values()
            .any(|symbols| symbols.iter().any(|s| s == symbol))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl QuoteFeed for StaticFeed {
    fn subscribe(&mut self, symbols: &[Symbol]) -> SubscriptionId {
        self.next += 1;
        let id = SubscriptionId(self.next);
        self.active.insert(id, symbols.to_vec());
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.active.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_then_unsubscribe() {
        let mut feed = StaticFeed::new();
        let a = feed.subscribe(&["EURUSD".to_string()]);
        let b = feed.subscribe(&["XAUUSD".to_string()]);
        assert_ne!(a, b);
        assert!(feed.is_subscribed("EURUSD"));

        feed.unsubscribe(a);
        assert!(!feed.is_subscribed("EURUSD"));
        assert!(feed.is_subscribed("XAUUSD"));
        assert_eq!(feed.active_count(), 1);

        // Unknown ids are ignored.
        feed.unsubscribe(SubscriptionId(99));
        assert_eq!(feed.active_count(), 1);
    }
}
