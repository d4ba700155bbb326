//! Exchange ports and adapters.
//!
//! The grid core talks to the exchange exclusively through the
//! [`ExchangeRest`] and [`ExchangeStream`] traits. The Kraken adapter
//! implements them against the spot REST API and the v2 websocket API.

pub mod kraken;
mod traits;
mod types;

pub use traits::{ExchangeRest, ExchangeStream};
pub use types::{
    AmountKind, CreateOrderResponse, ExecutionUpdate, ExecutionsKind, OrderRequest, StreamMessage,
    Subscription,
};
