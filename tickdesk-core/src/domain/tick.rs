use serde::{Deserialize, Serialize};

/// Quote status as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    Ok,
    Error,
}

/// One quote update for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub status: TickStatus,
    pub last_price: Option<f64>,
}

impl Tick {
    pub fn ok(symbol: impl Into<String>, last_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            status: TickStatus::Ok,
            last_price: Some(last_price),
        }
    }

    pub fn error(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            status: TickStatus::Error,
            last_price: None,
        }
    }

    /// The price the engine may act on: only `ok` ticks that carry a finite price.
    pub fn actionable_price(&self) -> Option<f64> {
        match self.status {
            TickStatus::Ok => self.last_price.filter(|p| p.is_finite()),
            TickStatus::Error => None,
        }
    }
}
