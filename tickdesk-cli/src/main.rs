//! TickDesk CLI — replay and config commands.
//!
//! Commands:
//! - `replay` — run a scenario of orders against a CSV tick tape on the
//!   locally simulated engine and write a JSON report
//! - `check-config` — validate an engine config and print it normalized

mod scenario;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tickdesk_core::domain::{Execution, Order, Position, Tick};
use tickdesk_core::execution::{LocalSimulated, SourceKind};
use tickdesk_core::host::{AccountSummary, AccountTracker, EventLog};
use tickdesk_core::{EngineConfig, OrderEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::scenario::{read_ticks, Scenario};

#[derive(Parser)]
#[command(
    name = "tickdesk",
    about = "TickDesk CLI — client-side order management engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a tick tape through the engine with a scenario of orders.
    Replay {
        /// Engine config (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Scenario file (TOML) with `[[orders]]` entries.
        #[arg(long)]
        scenario: PathBuf,

        /// Tick tape (CSV: symbol,status,last_price).
        #[arg(long)]
        ticks: PathBuf,

        /// Write the JSON report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate an engine config and print it with defaults filled in.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    account: AccountSummary,
    orders: Vec<Order>,
    positions: Vec<Position>,
    executions: Vec<Execution>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            config,
            scenario,
            ticks,
            output,
        } => run_replay(config.as_deref(), &scenario, &ticks, output.as_deref()).await,
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tickdesk_core=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}

async fn run_replay(
    config: Option<&Path>,
    scenario: &Path,
    ticks: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    if config.source == SourceKind::BrokerConfirmed {
        bail!("replay runs on local simulation only; set source = \"local_simulated\"");
    }

    let scenario = Scenario::from_file(scenario)?;
    let ticks = read_ticks(ticks)?;
    let report = replay(&config, &scenario, &ticks).await?;

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("write report {}", path.display()))?;
            println!("Report saved to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Run `scenario` over `ticks` on a simulated engine. Orders still resting
/// when the tape ends are part of the report.
async fn replay(
    config: &EngineConfig,
    scenario: &Scenario,
    ticks: &[Tick],
) -> Result<ReplayReport> {
    info!(
        orders = scenario.orders.len(),
        ticks = ticks.len(),
        "starting replay"
    );

    let host = AccountTracker::new(&config.account, EventLog::new());
    let mut engine = OrderEngine::new(config.session.clone(), Box::new(LocalSimulated), host);

    for (index, tick) in ticks.iter().enumerate() {
        for request in scenario.due_at(index) {
            if let Err(err) = engine.place_order(request.clone()).await {
                warn!(tick = index, symbol = %request.symbol, %err, "order not placed");
            }
        }
        engine.on_tick(tick)?;
    }

    let report = ReplayReport {
        account: engine.host().summary(),
        orders: engine.orders().await?,
        positions: engine.positions().await?,
        executions: engine.store().executions().to_vec(),
    };
    info!(
        orders = report.orders.len(),
        executions = report.executions.len(),
        balance = report.account.balance,
        equity = report.account.equity,
        "replay finished"
    );
    Ok(report)
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = EngineConfig::from_file(path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickdesk_core::domain::OrderStatus;

    #[tokio::test]
    async fn report_keeps_resting_orders() {
        let scenario = Scenario::from_toml(
            r#"
            [[orders]]
            symbol = "X"
            quantity = 1.0

            [[orders]]
            symbol = "X"
            order_type = "limit"
            quantity = 1.0
            limit_price = 90.0
            "#,
        )
        .unwrap();
        let ticks = vec![Tick::ok("X", 100.0), Tick::ok("X", 101.0)];

        let report = replay(&EngineConfig::default(), &scenario, &ticks)
            .await
            .unwrap();

        let statuses: Vec<_> = report.orders.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Filled, OrderStatus::Working]);
        assert_eq!(report.positions.len(), 1);
        assert_eq!(report.executions.len(), 1);
    }
}
