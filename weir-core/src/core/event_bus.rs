//! Typed in-process event bus.
//!
//! Handlers for an event kind run in subscription order on the
//! publisher's thread. The bus does not catch handler errors: the first
//! failing handler aborts the publish and the error propagates to the
//! caller (the engine turns it into an ERROR transition).

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::core::errors::Result;
use crate::core::types::Ticker;
use crate::exchange::StreamMessage;

/// Events flowing through the engine.
#[derive(Debug, Clone)]
pub enum Event {
    /// A raw (already parsed) message from the exchange stream.
    Message(StreamMessage),
    TickerUpdate(Ticker),
    OrderPlaced { txid: String },
    OrderFilled { txid: String },
    OrderCancelled { txid: String },
    /// One-shot startup trigger once the execution stream is live.
    PrepareForTrading,
    Notification { message: String },
}

/// Discriminant used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    TickerUpdate,
    OrderPlaced,
    OrderFilled,
    OrderCancelled,
    PrepareForTrading,
    Notification,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Message(_) => EventKind::Message,
            Event::TickerUpdate(_) => EventKind::TickerUpdate,
            Event::OrderPlaced { .. } => EventKind::OrderPlaced,
            Event::OrderFilled { .. } => EventKind::OrderFilled,
            Event::OrderCancelled { .. } => EventKind::OrderCancelled,
            Event::PrepareForTrading => EventKind::PrepareForTrading,
            Event::Notification { .. } => EventKind::Notification,
        }
    }
}

type Handler = Box<dyn Fn(&Event) -> Result<()> + Send + Sync>;

/// Central event bus for communication between components.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe a handler to an event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    /// Publish an event to all subscribers of its kind, in subscription
    /// order. Handlers may publish further events re-entrantly.
    pub fn publish(&self, event: Event) -> Result<()> {
        let subscribers = self.subscribers.read_recursive();
        if let Some(handlers) = subscribers.get(&event.kind()) {
            for handler in handlers {
                handler(&event)?;
            }
        }
        Ok(())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
