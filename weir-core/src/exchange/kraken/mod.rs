//! Kraken spot adapter: REST (order management) and websocket v2
//! (ticker + execution streams).

mod rest;
mod stream;

pub use rest::KrakenRest;
pub use stream::KrakenStream;
