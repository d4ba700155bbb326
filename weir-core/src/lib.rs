//! Weir Core - Price-Reactive Grid Trading Engine
//!
//! Weir maintains a geometric grid of limit orders on a spot exchange and
//! keeps it aligned with the live last price. The engine reacts to ticker
//! and execution events, reconciles its local orderbook against the
//! upstream one, and guarantees that no filled buy order ever remains
//! without an attempted counter-sell - even across restarts.
//!
//! ## Architecture
//! - **Single-threaded decision loop**: one strategy state transition at a
//!   time, guarded by a single mutex. Exchange REST calls and database
//!   calls are synchronous and block the loop on purpose.
//! - **Typed event bus** fanning stream messages out to subscribers.
//! - **Lifecycle state machine** with guarded transitions and a one-shot
//!   shutdown waiter.
//! - **Durable bookkeeping**: orderbook, configuration, pending and
//!   unsold-buy transaction ids live in SQLite, keyed by `userref`.
//!
//! ## Core Modules
//! - `core`: event bus, state machine, domain types, errors
//! - `config`: runtime configuration and validation
//! - `db`: SQLite-backed persistence tables
//! - `exchange`: REST/stream ports and the Kraken adapter
//! - `grid`: the grid strategy core and its pricing policy trait
//! - `engine`: lifecycle owner, stream routing, watchdog
//! - `notify`: notification fan-out (Telegram)

pub mod config;
pub mod core;
pub mod db;
pub mod engine;
pub mod exchange;
pub mod grid;
pub mod notify;
pub mod testing;

// Re-export the types almost every consumer needs
pub use crate::core::{Error, Event, EventBus, EventKind, Result, State, StateMachine};
pub use config::{BotConfig, DbConfig, NotificationConfig, StrategyKind};
pub use engine::Engine;
pub use grid::{GridStrategy, Policy, PriceCtx};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{BotConfig, DbConfig, NotificationConfig, StrategyKind};
    pub use crate::core::{
        Error, Event, EventBus, EventKind, Order, OrderStatus, Result, Side, State, StateMachine,
        Ticker,
    };
    pub use crate::engine::Engine;
    pub use crate::exchange::{ExchangeRest, ExchangeStream};
    pub use crate::grid::{GridStrategy, Policy, PriceCtx};
}
