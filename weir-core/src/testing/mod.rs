//! Test doubles and harnesses.
//!
//! [`MockExchange`] simulates the upstream exchange (order store,
//! balances, fills) behind the [`crate::exchange::ExchangeRest`] port;
//! [`TestRig`] wires a full strategy + bus + state machine around it so
//! integration tests can drive the engine with synthetic stream
//! messages.

mod mock_exchange;
mod rig;
mod stream;

pub use mock_exchange::MockExchange;
pub use rig::{test_config, RecordingChannel, TestRig};
pub use stream::ScriptedStream;
