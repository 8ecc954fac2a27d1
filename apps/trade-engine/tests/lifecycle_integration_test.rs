//! End-to-end lifecycle tests through a running engine.
//!
//! Each test drives the public handle only: activate, ticks, broker fill
//! confirmations, and read-back via `get_trade`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;

use trade_engine::broker::MockBrokerAdapter;
use trade_engine::{
    ActivationError, Direction, Engine, EngineConfig, EngineError, EngineHandle, InMemoryStore,
    OrderKind, OrderSide, OrderStatus, TradeDefinition, TradeId, TradeStatus, TrailBy,
};

fn abc_definition() -> TradeDefinition {
    TradeDefinition {
        symbol: "ABC".to_string(),
        direction: Direction::Long,
        quantity: dec!(100),
        entry_trigger: dec!(150),
        initial_stop: Some(dec!(140)),
        trailing_stop: None,
        take_profit: Some(dec!(180)),
        portfolio_filter: None,
    }
}

async fn start_engine() -> (Engine, EngineHandle, Arc<MockBrokerAdapter>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(MockBrokerAdapter::new());
    let (engine, report) = Engine::start(
        EngineConfig::default(),
        Arc::clone(&store) as _,
        Arc::clone(&broker) as _,
    )
    .await
    .expect("engine starts");
    assert!(report.clean());
    let handle = engine.handle();
    (engine, handle, broker, store)
}

/// Poll until `check` passes or a second elapses.
async fn wait_for<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

async fn wait_for_status(handle: &EngineHandle, trade_id: &TradeId, want: TradeStatus) {
    for _ in 0..200 {
        let view = handle
            .get_trade(trade_id.clone())
            .await
            .expect("engine running")
            .expect("trade exists");
        if view.trade_status == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("trade never reached {want}");
}

#[tokio::test]
async fn full_lifecycle_entry_stop_and_oca() {
    let (engine, handle, broker, _store) = start_engine().await;

    let trade_id = handle.activate(abc_definition()).await.expect("accepted");

    // Tick below the trigger: everything stays virtual.
    handle.on_tick("ABC", 145.0, Utc::now()).await.unwrap();
    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    assert_eq!(view.trade_status, TradeStatus::Blank);
    assert_eq!(view.entry_order.status, OrderStatus::Working);
    assert!(broker.placed_orders().is_empty());

    // Tick through the trigger: exactly one order crosses the boundary.
    handle.on_tick("ABC", 151.0, Utc::now()).await.unwrap();
    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    assert_eq!(view.trade_status, TradeStatus::Pending);
    assert_eq!(view.entry_order.status, OrderStatus::EntryOrderSubmitted);
    wait_for(|| broker.placed_orders().len() == 1).await;

    // Broker confirms the entry fill.
    let entry_broker_id = broker.last_broker_id().unwrap();
    broker
        .confirm_fill(&entry_broker_id, dec!(100), dec!(150.50))
        .unwrap();
    wait_for_status(&handle, &trade_id, TradeStatus::Filled).await;

    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    assert_eq!(view.filled_quantity, dec!(100));
    assert_eq!(view.entry_order.fill_price, Some(dec!(150.50)));
    for child in &view.child_orders {
        assert_eq!(child.status, OrderStatus::Working);
        assert!(child.oca_group.is_some());
    }
    // With only a static stop configured, it is the binding stop.
    let active = view.active_stop.expect("open position has a stop");
    assert_eq!(active.kind, OrderKind::InitialStop);
    assert_eq!(active.price, dec!(140));

    // Tick through the stop: only the stop is submitted, the target is not.
    handle.on_tick("ABC", 135.0, Utc::now()).await.unwrap();
    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    let stop = view
        .child_orders
        .iter()
        .find(|child| child.kind == OrderKind::InitialStop)
        .unwrap();
    let target = view
        .child_orders
        .iter()
        .find(|child| child.kind == OrderKind::TakeProfit)
        .unwrap();
    assert_eq!(stop.status, OrderStatus::ContingentOrderSubmitted);
    assert_eq!(target.status, OrderStatus::Working);
    wait_for(|| broker.placed_orders().len() == 2).await;

    // Broker confirms the stop fill: the target is OCA-cancelled in the same
    // cycle, and since it was never transmitted there is no broker call for it.
    let stop_broker_id = broker.last_broker_id().unwrap();
    broker
        .confirm_fill(&stop_broker_id, dec!(100), dec!(139.80))
        .unwrap();
    wait_for_status(&handle, &trade_id, TradeStatus::Closed).await;

    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    let target = view
        .child_orders
        .iter()
        .find(|child| child.kind == OrderKind::TakeProfit)
        .unwrap();
    assert_eq!(target.status, OrderStatus::Cancelled);
    assert!(target.broker_order_id.is_none());
    assert_eq!(broker.placed_orders().len(), 2);
    assert!(broker.cancelled_orders().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn take_profit_fill_cancels_stop() {
    let (engine, handle, broker, _store) = start_engine().await;
    let trade_id = handle.activate(abc_definition()).await.unwrap();

    handle.on_tick("ABC", 151.0, Utc::now()).await.unwrap();
    wait_for(|| broker.placed_orders().len() == 1).await;
    let entry_broker_id = broker.last_broker_id().unwrap();
    broker
        .confirm_fill(&entry_broker_id, dec!(100), dec!(150.50))
        .unwrap();
    wait_for_status(&handle, &trade_id, TradeStatus::Filled).await;

    // Price runs to the target instead.
    handle.on_tick("ABC", 181.0, Utc::now()).await.unwrap();
    wait_for(|| broker.placed_orders().len() == 2).await;
    let target_broker_id = broker.last_broker_id().unwrap();
    broker
        .confirm_fill(&target_broker_id, dec!(100), dec!(180.20))
        .unwrap();
    wait_for_status(&handle, &trade_id, TradeStatus::Closed).await;

    let view = handle.get_trade(trade_id).await.unwrap().unwrap();
    let stop = view
        .child_orders
        .iter()
        .find(|child| child.kind == OrderKind::InitialStop)
        .unwrap();
    assert_eq!(stop.status, OrderStatus::Cancelled);
    // The stop was virtual the whole time: nothing to cancel at the broker.
    assert!(broker.cancelled_orders().is_empty());
    assert_eq!(broker.placed_orders().len(), 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn partial_fill_drives_exit_sizing() {
    let (engine, handle, broker, _store) = start_engine().await;
    let trade_id = handle.activate(abc_definition()).await.unwrap();

    handle.on_tick("ABC", 151.0, Utc::now()).await.unwrap();
    wait_for(|| broker.placed_orders().len() == 1).await;

    // Broker fills only 60 of the requested 100.
    let entry_broker_id = broker.last_broker_id().unwrap();
    broker
        .confirm_fill(&entry_broker_id, dec!(60), dec!(150.50))
        .unwrap();
    wait_for_status(&handle, &trade_id, TradeStatus::Filled).await;

    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    assert_eq!(view.filled_quantity, dec!(60));
    assert_eq!(view.quantity, dec!(100));
    for child in &view.child_orders {
        assert_eq!(child.requested_qty, dec!(60));
    }

    // The stop exit goes out for the confirmed 60, never the requested 100.
    handle.on_tick("ABC", 135.0, Utc::now()).await.unwrap();
    wait_for(|| broker.placed_orders().len() == 2).await;
    assert_eq!(broker.placed_orders()[1].quantity, dec!(60));

    engine.shutdown().await;
}

#[tokio::test]
async fn terminal_trade_ignores_ticks() {
    let (engine, handle, broker, _store) = start_engine().await;
    let trade_id = handle.activate(abc_definition()).await.unwrap();

    handle.cancel(trade_id.clone()).await.unwrap();
    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    assert_eq!(view.trade_status, TradeStatus::Cancelled);

    // Any further tick is a no-op: no evaluator, no status change, no broker.
    handle.on_tick("ABC", 151.0, Utc::now()).await.unwrap();
    handle.on_tick("ABC", 135.0, Utc::now()).await.unwrap();
    let after = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    assert_eq!(after.trade_status, TradeStatus::Cancelled);
    assert_eq!(after.updated_at, view.updated_at);
    assert!(broker.placed_orders().is_empty());

    // Terminal-state guard also refuses user actions.
    let err = handle.cancel(trade_id).await.unwrap_err();
    assert!(matches!(err, EngineError::TradeTerminal(_)));

    engine.shutdown().await;
}

#[tokio::test]
async fn broker_rejection_is_surfaced_not_retried() {
    let (engine, handle, broker, _store) = start_engine().await;
    let trade_id = handle.activate(abc_definition()).await.unwrap();

    broker.reject_next("insufficient buying power");
    handle.on_tick("ABC", 151.0, Utc::now()).await.unwrap();

    wait_for_status(&handle, &trade_id, TradeStatus::Pending).await;

    // The rejection is visible on the order; the trade keeps its last
    // known-good derived status.
    let mut rejected = false;
    for _ in 0..200 {
        let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
        if view.entry_order.status == OrderStatus::Rejected {
            assert_eq!(view.trade_status, TradeStatus::Pending);
            rejected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(rejected, "entry never reported Rejected");

    // Feeding another trigger tick must not resubmit a rejected order.
    handle.on_tick("ABC", 152.0, Utc::now()).await.unwrap();
    let view = handle.get_trade(trade_id).await.unwrap().unwrap();
    assert_eq!(view.entry_order.status, OrderStatus::Rejected);
    assert!(broker.placed_orders().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn out_of_order_tick_is_dropped() {
    let (engine, handle, broker, _store) = start_engine().await;
    let _trade_id = handle.activate(abc_definition()).await.unwrap();

    let now = Utc::now();
    handle.on_tick_decimal("ABC", dec!(145), now).await.unwrap();
    // Older timestamp with a triggering price: dropped, no state change.
    handle
        .on_tick_decimal("ABC", dec!(155), now - chrono::Duration::seconds(60))
        .await
        .unwrap();

    // A get_trade after both ticks proves they were processed in order.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(broker.placed_orders().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn trailing_stop_ratchets_and_overtakes_initial_stop() {
    let (engine, handle, broker, _store) = start_engine().await;
    let trade_id = handle
        .activate(TradeDefinition {
            trailing_stop: Some(TrailBy::Percent(dec!(2))),
            take_profit: None,
            ..abc_definition()
        })
        .await
        .unwrap();

    handle.on_tick("ABC", 151.0, Utc::now()).await.unwrap();
    wait_for(|| broker.placed_orders().len() == 1).await;
    let entry_broker_id = broker.last_broker_id().unwrap();
    broker
        .confirm_fill(&entry_broker_id, dec!(100), dec!(150.50))
        .unwrap();
    wait_for_status(&handle, &trade_id, TradeStatus::Filled).await;

    // First post-fill tick anchors the trail 2% behind 160 = 156.80,
    // which is tighter than the static 140 stop.
    handle.on_tick_decimal("ABC", dec!(160), Utc::now()).await.unwrap();
    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    let active = view.active_stop.unwrap();
    assert_eq!(active.kind, OrderKind::TrailingStop);
    assert_eq!(active.price, dec!(156.80));

    // A pullback does not loosen the trail.
    handle.on_tick_decimal("ABC", dec!(158), Utc::now()).await.unwrap();
    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    assert_eq!(view.active_stop.unwrap().price, dec!(156.80));

    // Crossing the trailing level fires the trailing stop, not the static one.
    handle.on_tick_decimal("ABC", dec!(156), Utc::now()).await.unwrap();
    let view = handle.get_trade(trade_id).await.unwrap().unwrap();
    let trailing = view
        .child_orders
        .iter()
        .find(|child| child.kind == OrderKind::TrailingStop)
        .unwrap();
    let initial = view
        .child_orders
        .iter()
        .find(|child| child.kind == OrderKind::InitialStop)
        .unwrap();
    assert_eq!(trailing.status, OrderStatus::ContingentOrderSubmitted);
    assert_eq!(initial.status, OrderStatus::Working);

    engine.shutdown().await;
}

#[tokio::test]
async fn persistence_failure_halts_the_trade() {
    let (engine, handle, broker, store) = start_engine().await;
    let trade_id = handle.activate(abc_definition()).await.unwrap();

    // Every save from here on fails.
    store.fail_saves(true);

    // Entry triggers, the persist fails, and the broker must never be called.
    handle.on_tick("ABC", 151.0, Utc::now()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(broker.placed_orders().is_empty());

    // The trade is halted: user actions are refused with a clear reason.
    let err = handle.cancel(trade_id).await.unwrap_err();
    assert!(matches!(err, EngineError::TradeHalted(_)));

    engine.shutdown().await;
}

#[tokio::test]
async fn activation_validation_reports_every_reason() {
    let (engine, handle, _broker, _store) = start_engine().await;

    let err = handle
        .activate(TradeDefinition {
            symbol: String::new(),
            quantity: dec!(0),
            initial_stop: None,
            ..abc_definition()
        })
        .await
        .unwrap_err();

    match err {
        ActivationError::Invalid(reasons) => {
            assert_eq!(reasons.len(), 3);
        }
        other => panic!("unexpected error: {other}"),
    }

    engine.shutdown().await;
}

#[tokio::test]
async fn short_trade_selects_lower_stop_and_exits_on_rise() {
    let (engine, handle, broker, _store) = start_engine().await;
    let trade_id = handle
        .activate(TradeDefinition {
            symbol: "XYZ".to_string(),
            direction: Direction::Short,
            quantity: dec!(50),
            entry_trigger: dec!(150),
            initial_stop: Some(dec!(160)),
            trailing_stop: Some(TrailBy::Amount(dec!(4))),
            take_profit: Some(dec!(120)),
            portfolio_filter: None,
        })
        .await
        .unwrap();

    // Short entry fires at-or-below the trigger.
    handle.on_tick("XYZ", 149.0, Utc::now()).await.unwrap();
    wait_for(|| broker.placed_orders().len() == 1).await;
    let entry_broker_id = broker.last_broker_id().unwrap();
    broker
        .confirm_fill(&entry_broker_id, dec!(50), dec!(148.90))
        .unwrap();
    wait_for_status(&handle, &trade_id, TradeStatus::Filled).await;

    // Trail anchors 4 above 148 = 152, tighter than the 160 static stop.
    handle.on_tick_decimal("XYZ", dec!(148), Utc::now()).await.unwrap();
    let view = handle.get_trade(trade_id.clone()).await.unwrap().unwrap();
    let active = view.active_stop.unwrap();
    assert_eq!(active.kind, OrderKind::TrailingStop);
    assert_eq!(active.price, dec!(152));

    // Price rising through the trail exits the short.
    handle.on_tick_decimal("XYZ", dec!(153), Utc::now()).await.unwrap();
    wait_for(|| broker.placed_orders().len() == 2).await;
    let exit = &broker.placed_orders()[1];
    assert_eq!(exit.side, OrderSide::Buy);
    assert_eq!(exit.quantity, dec!(50));

    engine.shutdown().await;
}
