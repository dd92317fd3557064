//! TickDesk Core — client-side order lifecycle engine.
//!
//! This crate contains everything between the trading UI and the broker:
//! - Domain types (orders, positions, executions, ticks, requests)
//! - Entity store with insertion-ordered lookups
//! - Trigger evaluation of limit / stop / market orders against ticks
//! - Netted position updates with realized PnL, close and reversal
//! - Take-profit / stop-loss bracket coordination
//! - Execution sources: local simulation or broker confirmation
//! - Host notifications and account summary

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feed;
pub mod host;
pub mod store;
pub mod transport;

pub use config::{EngineConfig, Session};
pub use engine::OrderEngine;
pub use error::{EngineError, Result};
