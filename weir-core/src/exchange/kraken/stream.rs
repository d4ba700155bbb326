//! Kraken websocket v2 stream adapter.
//!
//! Ticker updates arrive on the public endpoint, execution reports on
//! the authenticated one. Each connection runs on its own thread with a
//! current-thread tokio runtime and forwards parsed messages into the
//! engine's crossbeam channel. The engine never sees raw JSON.

use crossbeam::channel::Sender;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::core::{ExecType, Result, Ticker};
use crate::exchange::kraken::KrakenRest;
use crate::exchange::types::{ExecutionUpdate, ExecutionsKind, StreamMessage, Subscription};
use crate::exchange::ExchangeStream;
use rust_decimal::Decimal;

const PUBLIC_URL: &str = "wss://ws.kraken.com/v2";
const AUTH_URL: &str = "wss://ws-auth.kraken.com/v2";

/// Streaming client for the Kraken websocket v2 API.
pub struct KrakenStream {
    rest: Arc<KrakenRest>,
    subscriptions: Vec<Subscription>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl KrakenStream {
    pub fn new(rest: Arc<KrakenRest>) -> Self {
        Self {
            rest,
            subscriptions: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    fn spawn_connection(
        &mut self,
        url: &'static str,
        subscribe_payloads: Vec<Value>,
        sender: Sender<StreamMessage>,
    ) {
        let shutdown = self.shutdown.clone();
        self.workers.push(std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("Failed to build websocket runtime: {err}");
                    return;
                }
            };
            runtime.block_on(run_connection(url, subscribe_payloads, sender, shutdown));
        }));
    }
}

impl ExchangeStream for KrakenStream {
    fn subscribe(&mut self, subscription: Subscription) -> Result<()> {
        self.subscriptions.push(subscription);
        Ok(())
    }

    fn start(&mut self, sender: Sender<StreamMessage>) -> Result<()> {
        let mut public_payloads = Vec::new();
        let mut auth_payloads = Vec::new();
        for subscription in &self.subscriptions {
            match subscription {
                Subscription::Ticker { symbol } => public_payloads.push(json!({
                    "method": "subscribe",
                    "params": {"channel": "ticker", "symbol": [symbol]},
                })),
                Subscription::Executions => {
                    let token = self.rest.websocket_token()?;
                    // Snapshots are only used to confirm the channel is
                    // connected.
                    auth_payloads.push(json!({
                        "method": "subscribe",
                        "params": {
                            "channel": "executions",
                            "token": token,
                            "snap_orders": true,
                            "snap_trades": true,
                        },
                    }));
                }
            }
        }
        if !public_payloads.is_empty() {
            self.spawn_connection(PUBLIC_URL, public_payloads, sender.clone());
        }
        if !auth_payloads.is_empty() {
            self.spawn_connection(AUTH_URL, auth_payloads, sender);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        info!("Closing the websocket connections...");
        self.shutdown.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        Ok(())
    }
}

async fn run_connection(
    url: &str,
    subscribe_payloads: Vec<Value>,
    sender: Sender<StreamMessage>,
    shutdown: Arc<AtomicBool>,
) {
    let (mut socket, _) = match connect_async(url).await {
        Ok(connected) => connected,
        Err(err) => {
            error!("Websocket connection to {url} failed: {err}");
            drop(sender);
            return;
        }
    };
    for payload in &subscribe_payloads {
        if let Err(err) = socket.send(Message::Text(payload.to_string())).await {
            error!("Websocket subscribe failed: {err}");
            return;
        }
    }

    let mut poll_shutdown = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = poll_shutdown.tick() => {
                if shutdown.load(Ordering::SeqCst) {
                    let _ = socket.close(None).await;
                    return;
                }
            }
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(message) = parse_stream_message(&text) {
                            if sender.send(message).is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = socket.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Websocket connection to {url} closed by peer");
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        error!("Websocket receive error: {err}");
                        return;
                    }
                }
            }
        }
    }
}

/// Parse one websocket v2 text frame into a stream message. Unknown
/// shapes yield `None` and are dropped.
fn parse_stream_message(text: &str) -> Option<StreamMessage> {
    let value: Value = serde_json::from_str(text).ok()?;

    if let Some(method) = value["method"].as_str() {
        if method == "subscribe" {
            return Some(StreamMessage::SubscriptionAck {
                channel: value["result"]["channel"]
                    .as_str()
                    .unwrap_or_default()
                    .to_owned(),
                success: value["success"].as_bool().unwrap_or(false),
            });
        }
        return Some(StreamMessage::Control);
    }

    match value["channel"].as_str()? {
        "heartbeat" | "status" | "pong" => Some(StreamMessage::Control),
        "ticker" => {
            let data = value["data"].as_array()?.first()?;
            let last = Decimal::from_str(&data["last"].to_string()).ok()?;
            Some(StreamMessage::Ticker(Ticker {
                symbol: data["symbol"].as_str().unwrap_or_default().to_owned(),
                last,
            }))
        }
        "executions" => {
            let kind = match value["type"].as_str() {
                Some("snapshot") => ExecutionsKind::Snapshot,
                _ => ExecutionsKind::Update,
            };
            let executions = value["data"]
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| {
                            Some(ExecutionUpdate {
                                order_id: entry["order_id"].as_str()?.to_owned(),
                                exec_type: ExecType::from_wire(
                                    entry["exec_type"].as_str().unwrap_or_default(),
                                ),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(StreamMessage::Executions { kind, executions })
        }
        other => {
            debug!("Ignoring message on unknown channel '{other}'");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_ticker() {
        let msg = parse_stream_message(
            r#"{"channel":"ticker","type":"update","data":[{"symbol":"BTC/USD","last":50000.0}]}"#,
        )
        .unwrap();
        match msg {
            StreamMessage::Ticker(ticker) => {
                assert_eq!(ticker.symbol, "BTC/USD");
                assert_eq!(ticker.last, dec!(50000.0));
            }
            other => panic!("expected ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_executions_update() {
        let msg = parse_stream_message(
            r#"{"channel":"executions","type":"update","data":[{"order_id":"TX1","exec_type":"filled"}]}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            StreamMessage::Executions {
                kind: ExecutionsKind::Update,
                executions: vec![ExecutionUpdate {
                    order_id: "TX1".into(),
                    exec_type: ExecType::Filled,
                }],
            }
        );
    }

    #[test]
    fn test_parse_executions_snapshot_with_unknown_exec_type() {
        let msg = parse_stream_message(
            r#"{"channel":"executions","type":"snapshot","data":[{"order_id":"TX0","exec_type":"restated"}]}"#,
        )
        .unwrap();
        match msg {
            StreamMessage::Executions { kind, executions } => {
                assert_eq!(kind, ExecutionsKind::Snapshot);
                assert_eq!(executions[0].exec_type, ExecType::Other);
            }
            other => panic!("expected executions, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_control_and_acks() {
        assert_eq!(
            parse_stream_message(r#"{"channel":"heartbeat"}"#),
            Some(StreamMessage::Control)
        );
        assert_eq!(
            parse_stream_message(
                r#"{"method":"subscribe","success":false,"result":{"channel":"executions"}}"#
            ),
            Some(StreamMessage::SubscriptionAck {
                channel: "executions".into(),
                success: false,
            })
        );
    }

    #[test]
    fn test_unknown_shapes_are_dropped() {
        assert_eq!(parse_stream_message("not json"), None);
        assert_eq!(parse_stream_message(r#"{"channel":"book"}"#), None);
        assert_eq!(parse_stream_message(r#"{"foo":"bar"}"#), None);
    }
}
