//! A scripted stream adapter for end-to-end engine tests.

use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::core::Result;
use crate::exchange::{ExchangeStream, StreamMessage, Subscription};

/// Plays a fixed list of messages, then keeps the connection alive with
/// control messages until closed.
pub struct ScriptedStream {
    messages: Vec<StreamMessage>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ScriptedStream {
    pub fn new(messages: Vec<StreamMessage>) -> Self {
        Self {
            messages,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// The subscriptions the engine requested.
    pub fn subscriptions(&self) -> Arc<Mutex<Vec<Subscription>>> {
        self.subscriptions.clone()
    }
}

impl ExchangeStream for ScriptedStream {
    fn subscribe(&mut self, subscription: Subscription) -> Result<()> {
        self.subscriptions.lock().push(subscription);
        Ok(())
    }

    fn start(&mut self, sender: Sender<StreamMessage>) -> Result<()> {
        let messages = self.messages.clone();
        let shutdown = self.shutdown.clone();
        self.worker = Some(std::thread::spawn(move || {
            for message in messages {
                if sender.send(message).is_err() {
                    return;
                }
            }
            // Keepalive so the engine loop wakes promptly on shutdown
            while !shutdown.load(Ordering::SeqCst) {
                if sender.send(StreamMessage::Control).is_err() {
                    return;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }
}
