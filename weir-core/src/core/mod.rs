//! Core building blocks: domain types, errors, event bus, state machine.

pub mod errors;
pub mod event_bus;
pub mod state_machine;
pub mod types;

pub use errors::{Error, Result};
pub use event_bus::{Event, EventBus, EventKind};
pub use state_machine::{State, StateMachine};
pub use types::{
    AssetBalance, AssetPairInfo, ExecType, Order, OrderStatus, PairBalances, Side, Ticker,
    truncate_to_scale, unix_now,
};
