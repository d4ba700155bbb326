//! A fully wired strategy + bus + state machine around the mock
//! exchange, driven by synthetic stream messages.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::{BotConfig, DbConfig, NotificationConfig, StrategyKind};
use crate::core::{Event, EventBus, ExecType, Result, StateMachine, Ticker};
use crate::db::{ConfigurationTable, Database, Orderbook, PendingTxids, UnsoldBuyTxids};
use crate::engine::{route_stream_message, wire_handlers};
use crate::exchange::{ExecutionUpdate, ExecutionsKind, StreamMessage};
use crate::grid::{GridStrategy, Policy, Timing};
use crate::notify::{NotificationChannel, NotificationService};
use crate::testing::MockExchange;

/// Notification channel that records every message it accepts.
pub struct RecordingChannel {
    messages: Arc<Mutex<Vec<String>>>,
}

impl NotificationChannel for RecordingChannel {
    fn send(&self, message: &str) -> bool {
        self.messages.lock().push(message.to_owned());
        true
    }
}

/// The standard test configuration: BTC/USD, 1 % interval, 100 quote
/// per level, five open buys, 10_000 investment cap.
pub fn test_config(strategy: StrategyKind) -> BotConfig {
    BotConfig {
        api_public_key: "key".into(),
        api_secret_key: "secret".into(),
        exchange: "Kraken".into(),
        userref: 123_456_789,
        strategy,
        name: "TestBot".into(),
        base_currency: "BTC".into(),
        quote_currency: "USD".into(),
        interval: Decimal::new(1, 2),
        amount_per_grid: Decimal::ONE_HUNDRED,
        max_investment: Decimal::new(10_000, 0),
        n_open_buy_orders: 5,
        fee: None,
        dry_run: false,
    }
}

/// Everything integration tests need in one place.
pub struct TestRig {
    pub bus: Arc<EventBus>,
    pub state_machine: Arc<StateMachine>,
    pub strategy: Arc<Mutex<GridStrategy>>,
    pub exchange: Arc<MockExchange>,
    pub orderbook: Orderbook,
    pub configuration: ConfigurationTable,
    pub pending: PendingTxids,
    pub unsold: UnsoldBuyTxids,
    pub notifications: Arc<Mutex<Vec<String>>>,
    db: Database,
    prepared: Arc<AtomicBool>,
    userref: i64,
}

impl TestRig {
    pub fn new(config: BotConfig, policy: Box<dyn Policy>) -> Self {
        Self::with_exchange(config, policy, Arc::new(MockExchange::new()))
    }

    pub fn with_exchange(
        config: BotConfig,
        policy: Box<dyn Policy>,
        exchange: Arc<MockExchange>,
    ) -> Self {
        let db = Database::open(&DbConfig {
            sqlite_file: None,
            in_memory: true,
        })
        .expect("in-memory database");
        Self::with_database(config, policy, exchange, db)
    }

    /// Build a rig on an existing database and exchange - the restart
    /// scenario: everything volatile is fresh, everything durable stays.
    pub fn with_database(
        config: BotConfig,
        policy: Box<dyn Policy>,
        exchange: Arc<MockExchange>,
        db: Database,
    ) -> Self {
        db.init(config.userref).expect("schema");

        let bus = Arc::new(EventBus::new());
        let state_machine = Arc::new(StateMachine::new());
        let messages = Arc::new(Mutex::new(Vec::new()));
        let mut service = NotificationService::new(&NotificationConfig::default());
        service.add_channel(Box::new(RecordingChannel {
            messages: messages.clone(),
        }));
        let notifications = Arc::new(service);

        let userref = config.userref;
        let strategy = GridStrategy::new(
            config,
            policy,
            exchange.clone(),
            bus.clone(),
            state_machine.clone(),
            &db,
        )
        .expect("strategy")
        .with_timing(Timing::none());
        let strategy = Arc::new(Mutex::new(strategy));

        wire_handlers(&bus, &state_machine, &strategy, &notifications);

        Self {
            bus,
            state_machine,
            strategy,
            exchange,
            orderbook: Orderbook::new(db.clone(), userref),
            configuration: ConfigurationTable::new(db.clone(), userref),
            pending: PendingTxids::new(db.clone(), userref),
            unsold: UnsoldBuyTxids::new(db.clone(), userref),
            notifications: messages,
            db,
            prepared: Arc::new(AtomicBool::new(false)),
            userref,
        }
    }

    pub fn userref(&self) -> i64 {
        self.userref
    }

    /// Handle to the underlying database, e.g. to simulate a restart.
    pub fn database(&self) -> Database {
        self.db.clone()
    }

    /// Feed one stream message through the real router.
    pub fn message(&self, message: StreamMessage) -> Result<()> {
        route_stream_message(&self.bus, &self.state_machine, &self.prepared, &message)
    }

    /// Feed a ticker update.
    pub fn ticker(&self, last: Decimal) -> Result<()> {
        self.message(StreamMessage::Ticker(Ticker {
            symbol: "BTC/USD".into(),
            last,
        }))
    }

    /// Simulate the executions channel coming up (the snapshot that
    /// triggers `prepare_for_trading`).
    pub fn connect_executions(&self) -> Result<()> {
        self.message(StreamMessage::Executions {
            kind: ExecutionsKind::Snapshot,
            executions: vec![ExecutionUpdate {
                order_id: "TX000000".into(),
                exec_type: ExecType::Canceled,
            }],
        })
    }

    /// Fill upstream, then notify downstream - like a real exchange.
    pub fn fill(&self, txid: &str) -> Result<()> {
        self.exchange.fill_order(txid);
        self.execution(txid, ExecType::Filled)
    }

    /// Feed a single execution report.
    pub fn execution(&self, txid: &str, exec_type: ExecType) -> Result<()> {
        self.message(StreamMessage::Executions {
            kind: ExecutionsKind::Update,
            executions: vec![ExecutionUpdate {
                order_id: txid.into(),
                exec_type,
            }],
        })
    }

    /// Publish a bare notification on the bus.
    pub fn notify(&self, message: &str) -> Result<()> {
        self.bus.publish(Event::Notification {
            message: message.into(),
        })
    }
}
