//! End-to-end engine lifecycle with scripted stream input: startup
//! checks, subscriptions, grid build-up and a controlled shutdown.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use weir_core::config::{DbConfig, NotificationConfig, StrategyKind};
use weir_core::core::{State, Ticker};
use weir_core::db::Database;
use weir_core::engine::Engine;
use weir_core::exchange::{ExecutionsKind, StreamMessage, Subscription};
use weir_core::grid::Timing;
use weir_core::notify::NotificationService;
use weir_core::testing::{test_config, MockExchange, ScriptedStream};
use weir_strategies::GridHodl;

#[test]
fn test_engine_runs_and_shuts_down_cleanly() {
    let exchange = Arc::new(MockExchange::new());
    let stream = ScriptedStream::new(vec![
        StreamMessage::Ticker(Ticker {
            symbol: "BTC/USD".into(),
            last: dec!(50000),
        }),
        StreamMessage::Executions {
            kind: ExecutionsKind::Snapshot,
            executions: vec![],
        },
    ]);
    let subscriptions = stream.subscriptions();

    let db = Database::open(&DbConfig {
        sqlite_file: None,
        in_memory: true,
    })
    .unwrap();
    let notifications = Arc::new(NotificationService::new(&NotificationConfig::default()));
    let mut engine = Engine::with_ports(
        test_config(StrategyKind::GridHodl),
        db,
        exchange.clone(),
        Box::new(stream),
        notifications,
        Box::new(GridHodl),
    )
    .unwrap();
    engine.strategy().lock().set_timing(Timing::none());
    let state_machine = engine.state_machine().clone();

    let worker = std::thread::spawn(move || engine.run());

    // Wait for the grid to come up, then request a shutdown
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(state_machine.state(), State::Running);
    state_machine
        .transition_to(State::ShutdownRequested)
        .unwrap();

    let outcome = worker.join().unwrap();
    assert!(outcome.is_ok());

    // The ladder was built against the exchange
    assert_eq!(exchange.open_order_count(), 5);

    // Ticker and executions channels were both requested
    let subscriptions = subscriptions.lock();
    assert_eq!(subscriptions.len(), 2);
    assert!(
        matches!(&subscriptions[0], Subscription::Ticker { symbol } if symbol == "BTC/USD")
    );
    assert!(matches!(subscriptions[1], Subscription::Executions));
}
