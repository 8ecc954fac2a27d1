//! Trade engine binary.
//!
//! Wires telemetry, config, the file store, and (for now) the mock broker,
//! then replays a scripted session so the whole lifecycle can be watched in
//! the logs: activation, entry trigger, fill, stop trigger, OCA cancel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use trade_engine::broker::MockBrokerAdapter;
use trade_engine::{
    Direction, Engine, EngineConfig, JsonFileStore, TradeDefinition, init_telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry();

    let config = EngineConfig::load().context("loading configuration")?;
    let store = Arc::new(JsonFileStore::open(&config.data_dir).context("opening trade store")?);
    let broker = Arc::new(MockBrokerAdapter::new());
    broker.set_buying_power(Decimal::new(1_000_000, 0));

    let (engine, report) = Engine::start(config, store, Arc::clone(&broker) as _)
        .await
        .context("starting engine")?;
    if !report.clean() {
        info!(
            flagged = report.orders_flagged,
            "recovery flagged orders; see log above"
        );
    }
    let handle = engine.handle();

    let trade_id = handle
        .activate(TradeDefinition {
            symbol: "ABC".to_string(),
            direction: Direction::Long,
            quantity: Decimal::new(100, 0),
            entry_trigger: Decimal::new(150, 0),
            initial_stop: Some(Decimal::new(140, 0)),
            trailing_stop: None,
            take_profit: Some(Decimal::new(180, 0)),
            portfolio_filter: None,
        })
        .await?;
    info!(%trade_id, "demo trade activated");

    // Below the trigger: nothing happens.
    handle.on_tick("ABC", 145.0, Utc::now()).await?;
    // Through the trigger: the entry order goes out.
    handle.on_tick("ABC", 151.0, Utc::now()).await?;
    settle().await;

    if let Some(broker_id) = broker.last_broker_id() {
        broker.confirm_fill(&broker_id, Decimal::new(100, 0), Decimal::new(15050, 2))?;
    }
    settle().await;

    // Through the stop: the exit goes out, the target gets OCA-cancelled.
    handle.on_tick("ABC", 135.0, Utc::now()).await?;
    settle().await;
    if let Some(broker_id) = broker.last_broker_id() {
        broker.confirm_fill(&broker_id, Decimal::new(100, 0), Decimal::new(13980, 2))?;
    }
    settle().await;

    if let Some(view) = handle.get_trade(trade_id).await? {
        info!(
            status = %view.trade_status,
            filled_qty = %view.filled_quantity,
            "demo trade final state"
        );
    }

    engine.shutdown().await;
    Ok(())
}

/// Give spawned placement/fill tasks a moment to land in the mailbox.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
