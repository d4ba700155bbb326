//! The engine owns the lifecycle: it wires bus, state machine,
//! persistence, exchange ports, notifier and strategy, drives the event
//! loop and the watchdog, and coordinates shutdown.

use crossbeam::channel::{tick, unbounded};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{BotConfig, DbConfig, NotificationConfig};
use crate::core::{
    unix_now, Error, Event, EventBus, EventKind, ExecType, Order, Result, Side, State,
    StateMachine,
};
use crate::db::{ConfigurationTable, Database, Orderbook};
use crate::exchange::kraken::{KrakenRest, KrakenStream};
use crate::exchange::{ExchangeRest, ExchangeStream, ExecutionsKind, StreamMessage, Subscription};
use crate::grid::{GridStrategy, Policy};
use crate::notify::NotificationService;

/// Watchdog cadence.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(6);
/// Seconds between periodic status notifications.
const STATUS_NOTIFICATION_INTERVAL: i64 = 3600;
/// Seconds without a price update before the stream is presumed dead.
const MAX_TICKER_SILENCE: i64 = 600;

/// Lifecycle owner for one bot instance.
pub struct Engine {
    config: BotConfig,
    bus: Arc<EventBus>,
    state_machine: Arc<StateMachine>,
    rest: Arc<dyn ExchangeRest>,
    stream: Box<dyn ExchangeStream>,
    strategy: Arc<Mutex<GridStrategy>>,
    configuration: ConfigurationTable,
    orderbook: Orderbook,
}

impl Engine {
    /// Build an engine with the adapter named in the configuration.
    pub fn new(
        config: BotConfig,
        db_config: &DbConfig,
        notification_config: &NotificationConfig,
        policy: Box<dyn Policy>,
    ) -> Result<Self> {
        config.validate()?;
        let db = Database::open(db_config)?;
        let (rest, stream): (Arc<dyn ExchangeRest>, Box<dyn ExchangeStream>) =
            match config.exchange.as_str() {
                "Kraken" => {
                    let rest = Arc::new(KrakenRest::new(
                        config.api_public_key.clone(),
                        config.api_secret_key.clone(),
                    ));
                    (rest.clone(), Box::new(KrakenStream::new(rest)))
                }
                other => {
                    return Err(Error::Validation(format!("unsupported exchange '{other}'")))
                }
            };
        let notifications = Arc::new(NotificationService::new(notification_config));
        Self::with_ports(config, db, rest, stream, notifications, policy)
    }

    /// Build an engine from explicit ports (used by tests and tools).
    pub fn with_ports(
        config: BotConfig,
        db: Database,
        rest: Arc<dyn ExchangeRest>,
        stream: Box<dyn ExchangeStream>,
        notifications: Arc<NotificationService>,
        policy: Box<dyn Policy>,
    ) -> Result<Self> {
        info!("Initiating a weir grid engine instance ({})", config.name);
        debug!(?config, "Engine configuration");
        db.init(config.userref)?;

        let bus = Arc::new(EventBus::new());
        let state_machine = Arc::new(StateMachine::new());
        let strategy = Arc::new(Mutex::new(GridStrategy::new(
            config.clone(),
            policy,
            rest.clone(),
            bus.clone(),
            state_machine.clone(),
            &db,
        )?));
        wire_handlers(&bus, &state_machine, &strategy, &notifications);

        Ok(Self {
            configuration: ConfigurationTable::new(db.clone(), config.userref),
            orderbook: Orderbook::new(db, config.userref),
            config,
            bus,
            state_machine,
            rest,
            stream,
            strategy,
        })
    }

    pub fn state_machine(&self) -> &Arc<StateMachine> {
        &self.state_machine
    }

    pub fn strategy(&self) -> &Arc<Mutex<GridStrategy>> {
        &self.strategy
    }

    /// Run until shutdown or error. Returns an error iff the engine
    /// stopped for any reason other than a requested shutdown.
    pub fn run(&mut self) -> anyhow::Result<()> {
        info!("Starting the grid engine...");

        // A SIGINT/SIGTERM initiates a controlled shutdown: handlers run
        // to completion, then the event loop stops picking up messages.
        let signal_target = self.state_machine.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            warn!("Initiating a controlled shutdown of the engine...");
            let _ = signal_target.transition_to(State::ShutdownRequested);
        }) {
            warn!("Could not install the signal handler: {err}");
        }

        let outcome = self.startup().and_then(|()| self.event_loop());

        let (reason, failed) = match (&outcome, self.state_machine.state()) {
            (Ok(()), State::ShutdownRequested) => {
                ("The engine was shut down successfully!".to_string(), false)
            }
            (Ok(()), _) => ("The engine was shut down due to an error!".to_string(), true),
            (Err(err), _) => {
                let _ = self.state_machine.transition_to(State::Error);
                (format!("The engine was interrupted: {err}"), true)
            }
        };

        self.terminate(&reason);
        if failed {
            anyhow::bail!("{reason}");
        }
        Ok(())
    }

    /// Probe the exchange and validate the API key before going live.
    fn startup(&mut self) -> Result<()> {
        self.check_exchange_status()?;
        self.rest.check_api_key_permissions()
    }

    fn check_exchange_status(&self) -> Result<()> {
        for attempt in 1..=3u32 {
            match self.rest.system_status() {
                Ok(status) if status == "online" => {
                    info!("- Exchange API status: online");
                    return Ok(());
                }
                Ok(status) => warn!("- Exchange API status: {status} (try {attempt}/3)"),
                Err(err) => warn!("- Exchange not available: {err} (try {attempt}/3)"),
            }
            if attempt < 3 {
                std::thread::sleep(Duration::from_secs(u64::from(2 * attempt)));
            }
        }
        Err(Error::Unavailable(
            "could not connect to the exchange API after 3 tries".into(),
        ))
    }

    fn event_loop(&mut self) -> Result<()> {
        self.stream.subscribe(Subscription::Ticker {
            symbol: self.config.symbol(),
        })?;
        self.stream.subscribe(Subscription::Executions)?;

        info!("Starting the stream connection...");
        let (sender, receiver) = unbounded();
        self.stream.start(sender)?;

        // Seed the watchdog clock; a stale persisted value must not trip
        // it right away.
        self.configuration.touch_last_price_time()?;

        let watchdog = tick(WATCHDOG_INTERVAL);
        loop {
            if self.state_machine.state().is_terminal() {
                return Ok(());
            }
            crossbeam::select! {
                recv(receiver) -> message => match message {
                    Ok(message) => self.bus.publish(Event::Message(message))?,
                    Err(_) => {
                        return Err(Error::Unavailable("exchange stream disconnected".into()));
                    }
                },
                recv(watchdog) -> _ => self.watchdog_tick()?,
            }
        }
    }

    /// Periodic health check: hourly status notification, and an ERROR
    /// transition when the ticker has been silent for too long.
    fn watchdog_tick(&self) -> Result<()> {
        let row = self.configuration.get()?;
        let now = unix_now();

        if self.state_machine.state() == State::Running
            && now - row.last_notification_time >= STATUS_NOTIFICATION_INTERVAL
        {
            self.bus.publish(Event::Notification {
                message: self.status_message()?,
            })?;
            self.configuration.set_last_notification_time(now)?;
        }

        if now - row.last_price_time > MAX_TICKER_SILENCE {
            error!(
                "No price update for {}s, the exchange stream is presumed dead!",
                now - row.last_price_time
            );
            self.state_machine.transition_to(State::Error)?;
        }
        Ok(())
    }

    fn status_message(&self) -> Result<String> {
        let orders = self.orderbook.all()?;
        let open_buys = orders.iter().filter(|o| o.side == Side::Buy).count();
        let open_sells = orders.iter().filter(|o| o.side == Side::Sell).count();
        let investment: Decimal = orders.iter().map(Order::notional).sum();
        Ok(format!(
            "{} ({} on {})\n - open buy orders: {open_buys}\n - open sell orders: {open_sells}\n - investment: {investment} / {} {}",
            self.config.name,
            self.config.strategy,
            self.config.symbol(),
            self.config.max_investment,
            self.config.quote_currency,
        ))
    }

    fn terminate(&mut self, reason: &str) {
        if let Err(err) = self.stream.close() {
            warn!("Closing the stream failed: {err}");
        }
        let _ = self.bus.publish(Event::Notification {
            message: format!("{} terminated.\nReason: {reason}", self.config.name),
        });
        info!("{reason}");
    }
}

/// Subscribe the strategy, the notification service and the stream
/// router on the bus. Shared between the engine and the test harness.
pub fn wire_handlers(
    bus: &Arc<EventBus>,
    state_machine: &Arc<StateMachine>,
    strategy: &Arc<Mutex<GridStrategy>>,
    notifications: &Arc<NotificationService>,
) {
    let handler = strategy.clone();
    bus.subscribe(EventKind::PrepareForTrading, move |_| {
        handler.lock().on_prepare_for_trading()
    });

    let handler = strategy.clone();
    bus.subscribe(EventKind::TickerUpdate, move |event| match event {
        Event::TickerUpdate(ticker) => handler.lock().on_ticker(ticker),
        _ => Ok(()),
    });

    let handler = strategy.clone();
    bus.subscribe(EventKind::OrderPlaced, move |event| match event {
        Event::OrderPlaced { txid } => handler.lock().on_order_placed(txid),
        _ => Ok(()),
    });

    let handler = strategy.clone();
    bus.subscribe(EventKind::OrderFilled, move |event| match event {
        Event::OrderFilled { txid } => handler.lock().on_order_filled(txid),
        _ => Ok(()),
    });

    let handler = strategy.clone();
    bus.subscribe(EventKind::OrderCancelled, move |event| match event {
        Event::OrderCancelled { txid } => handler.lock().on_order_cancelled(txid),
        _ => Ok(()),
    });

    let service = notifications.clone();
    bus.subscribe(EventKind::Notification, move |event| {
        service.on_notification(event)
    });

    let router_bus = bus.clone();
    let router_sm = state_machine.clone();
    let prepared = Arc::new(AtomicBool::new(false));
    bus.subscribe(EventKind::Message, move |event| match event {
        Event::Message(message) => {
            route_stream_message(&router_bus, &router_sm, &prepared, message)
        }
        _ => Ok(()),
    });
}

/// Convert a parsed stream message into bus events. Messages are dropped
/// once the lifecycle is terminal. The first executions message (the
/// snapshot confirming the channel is live) triggers the one-shot
/// `PrepareForTrading` event; snapshot contents are not processed.
pub fn route_stream_message(
    bus: &EventBus,
    state_machine: &StateMachine,
    prepared: &AtomicBool,
    message: &StreamMessage,
) -> Result<()> {
    if state_machine.state().is_terminal() {
        debug!("Shutdown requested, not processing incoming messages.");
        return Ok(());
    }

    match message {
        StreamMessage::Control => Ok(()),
        StreamMessage::SubscriptionAck { channel, success } => {
            if !success {
                error!("The engine was not able to subscribe to channel '{channel}'!");
                state_machine.transition_to(State::Error)?;
            }
            Ok(())
        }
        StreamMessage::Ticker(ticker) => bus.publish(Event::TickerUpdate(ticker.clone())),
        StreamMessage::Executions { kind, executions } => {
            if !prepared.swap(true, Ordering::SeqCst) {
                bus.publish(Event::PrepareForTrading)?;
            }
            if *kind == ExecutionsKind::Update {
                for execution in executions {
                    let txid = execution.order_id.clone();
                    let event = match execution.exec_type {
                        ExecType::New => Some(Event::OrderPlaced { txid }),
                        ExecType::Filled => Some(Event::OrderFilled { txid }),
                        ExecType::Canceled | ExecType::Expired => {
                            Some(Event::OrderCancelled { txid })
                        }
                        _ => None,
                    };
                    if let Some(event) = event {
                        bus.publish(event)?;
                    }
                }
            }
            Ok(())
        }
    }
}
