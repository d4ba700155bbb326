//! Request/response and stream message shapes used by the exchange ports.

use rust_decimal::Decimal;

use crate::core::{ExecType, Side, Ticker};

/// Which precision applies when truncating an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountKind {
    Price,
    Volume,
}

/// A new-order request. Only limit orders exist in this engine; buys are
/// placed post-only so they never pay taker fees.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    /// Slash-separated pair symbol, e.g. "BTC/USD".
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
    pub userref: i64,
    /// Validate-only flag (used in dry-run mode).
    pub validate: bool,
    pub post_only: bool,
}

/// Response to a successful order placement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderResponse {
    pub txid: String,
}

/// Channel subscriptions the engine requests from the stream adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Subscription {
    Ticker { symbol: String },
    Executions,
}

/// Whether an executions message is the initial snapshot or an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionsKind {
    Snapshot,
    Update,
}

/// One execution report from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUpdate {
    pub order_id: String,
    pub exec_type: ExecType,
}

/// A parsed message from the exchange stream. Control messages
/// (heartbeat, status, pong) arrive as [`StreamMessage::Control`] and are
/// dropped by the router.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Ticker(Ticker),
    Executions {
        kind: ExecutionsKind,
        executions: Vec<ExecutionUpdate>,
    },
    SubscriptionAck {
        channel: String,
        success: bool,
    },
    Control,
}
