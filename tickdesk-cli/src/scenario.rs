//! Replay inputs: a TOML scenario of orders and a CSV tick tape.
//!
//! ```toml
//! [[orders]]
//! at_tick = 0
//! symbol = "EURUSD"
//! side = "buy"
//! order_type = "limit"
//! quantity = 1.0
//! limit_price = 1.08
//! take_profit = 1.10
//! ```
//!
//! ```csv
//! symbol,status,last_price
//! EURUSD,ok,1.0812
//! EURUSD,error,
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tickdesk_core::domain::{OrderRequest, Tick};

/// An order submitted just before tick `at_tick` is applied.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledOrder {
    #[serde(default)]
    pub at_tick: usize,
    #[serde(flatten)]
    pub request: OrderRequest,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub orders: Vec<ScheduledOrder>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read scenario {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("parse scenario TOML")
    }

    /// Orders due before tick `index`, in file order.
    pub fn due_at(&self, index: usize) -> impl Iterator<Item = &OrderRequest> {
        self.orders
            .iter()
            .filter(move |o| o.at_tick == index)
            .map(|o| &o.request)
    }
}

pub fn read_ticks(path: &Path) -> Result<Vec<Tick>> {
    let reader = csv::Reader::from_path(path)
        .with_context(|| format!("open tick tape {}", path.display()))?;
    parse_ticks(reader)
}

fn parse_ticks<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<Tick>> {
    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("tick row {}", i + 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickdesk_core::domain::{OrderType, Side, TickStatus};

    #[test]
    fn scenario_parses_scheduled_orders() {
        let scenario = Scenario::from_toml(
            r#"
            [[orders]]
            symbol = "X"
            quantity = 1.0

            [[orders]]
            at_tick = 3
            symbol = "X"
            side = "sell"
            order_type = "stop"
            quantity = 2.0
            stop_price = 95.0
            "#,
        )
        .unwrap();

        assert_eq!(scenario.due_at(0).count(), 1);
        let later: Vec<_> = scenario.due_at(3).collect();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].side, Side::Sell);
        assert_eq!(later[0].order_type, OrderType::Stop);
        assert_eq!(later[0].stop_price, Some(95.0));
        assert_eq!(scenario.due_at(1).count(), 0);
    }

    #[test]
    fn tick_tape_handles_error_rows() {
        let data = "symbol,status,last_price\nX,ok,100.5\nX,error,\n";
        let ticks = parse_ticks(csv::Reader::from_reader(data.as_bytes())).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0], Tick::ok("X", 100.5));
        assert_eq!(ticks[1].status, TickStatus::Error);
        assert_eq!(ticks[1].last_price, None);
    }

    #[test]
    fn bad_tick_row_names_the_row() {
        let data = "symbol,status,last_price\nX,ok,abc\n";
        let err = parse_ticks(csv::Reader::from_reader(data.as_bytes())).unwrap_err();
        assert!(err.to_string().contains("tick row 1"));
    }
}
