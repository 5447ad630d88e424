//! WebSocket subscription client.
//!
//! Holds one logical stream per topic query. A background task owns the
//! connection, reconnects with capped exponential backoff, and re-issues
//! every active subscription after a reconnect, so consumers just read from
//! their channel for the process lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use crate::error::RpcError;
use crate::types::SubscriptionEvent;

/// Configuration for the WebSocket client.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// Command sent from callers to the background WS task.
enum WsCommand {
    Subscribe { query: String },
    Close,
}

/// Tracks active subscriptions so they can be re-issued after a reconnect.
#[derive(Clone, Default)]
struct SubscriptionManager {
    entries: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<SubscriptionEvent>>>>,
}

impl SubscriptionManager {
    fn register(&self, query: String) -> mpsc::UnboundedReceiver<SubscriptionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.entries.lock().unwrap().insert(query, tx);
        rx
    }

    fn dispatch(&self, query: &str, event: SubscriptionEvent) {
        if let Some(tx) = self.entries.lock().unwrap().get(query) {
            let _ = tx.send(event);
        }
    }

    fn active_queries(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }
}

/// WebSocket subscription client for the node's event bus.
///
/// Topic queries are boolean filter expressions over event type and
/// message-action fields, e.g.
/// `tm.event = 'Tx' AND message.action = '/directory.v1.MsgBondProvider'`.
pub struct SubscriptionClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionManager,
}

impl SubscriptionClient {
    /// Connect to `url` and start the background task.
    ///
    /// Fails if the first connection attempt does not succeed, so a
    /// misconfigured endpoint surfaces at startup rather than as an
    /// endless reconnect loop.
    pub async fn connect(url: impl Into<String>, config: WsConfig) -> Result<Self, RpcError> {
        let url = url.into();

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| RpcError::WebSocket(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::default();

        let task_url = url.clone();
        let task_subs = subscriptions.clone();
        tokio::spawn(async move {
            ws_task(task_url, Some(ws_stream), cmd_rx, task_subs, config).await;
        });

        Ok(Self { url, cmd_tx, subscriptions })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open one logical event stream for `query`.
    ///
    /// Events arrive on the returned channel until the client is dropped.
    /// The subscription survives reconnects.
    pub fn subscribe(
        &self,
        query: &str,
    ) -> Result<mpsc::UnboundedReceiver<SubscriptionEvent>, RpcError> {
        let rx = self.subscriptions.register(query.to_string());
        self.cmd_tx
            .send(WsCommand::Subscribe { query: query.to_string() })
            .map_err(|_| RpcError::WebSocket("subscription task closed".into()))?;
        Ok(rx)
    }
}

impl Drop for SubscriptionClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn subscribe_frame(query: &str) -> Message {
    let req = json!({
        "jsonrpc": "2.0",
        "method": "subscribe",
        "id": 0,
        "params": { "query": query },
    });
    Message::Text(req.to_string())
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    url: String,
    mut initial: Option<WsStream>,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: SubscriptionManager,
    config: WsConfig,
) {
    let mut backoff = config.reconnect_initial;

    loop {
        let ws_stream = match initial.take() {
            Some(s) => s,
            None => {
                tracing::info!(url = %url, "connecting via WebSocket");
                match tokio_tungstenite::connect_async(&url).await {
                    Ok((s, _)) => s,
                    Err(e) => {
                        tracing::warn!(error = %e, "WS connect failed, retrying in {backoff:?}");
                        time::sleep(backoff).await;
                        backoff = (backoff * 2).min(config.reconnect_max);
                        continue;
                    }
                }
            }
        };
        backoff = config.reconnect_initial; // reset on success

        let (mut sink, mut stream) = ws_stream.split();

        // Re-subscribe any active subscriptions
        for query in subscriptions.active_queries() {
            if sink.send(subscribe_frame(&query)).await.is_err() {
                break;
            }
        }

        // Main dispatch loop
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None | Some(WsCommand::Close) => return,
                        Some(WsCommand::Subscribe { query }) => {
                            if sink.send(subscribe_frame(&query)).await.is_err() {
                                break; // connection dropped, reconnect re-subscribes
                            }
                        }
                    }
                }
                msg = stream.next() => {
                    match msg {
                        None => break,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WS receive error");
                            break;
                        }
                        Some(Ok(Message::Text(text))) => {
                            handle_message(&text, &subscriptions);
                        }
                        Some(Ok(Message::Close(_))) => break,
                        _ => {}
                    }
                }
            }
        }

        tracing::warn!(url = %url, "WS disconnected, reconnecting in {backoff:?}");
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

fn handle_message(text: &str, subscriptions: &SubscriptionManager) {
    let Ok(val) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("failed to parse WS message as JSON");
        return;
    };

    // Subscribe confirmations carry an empty result; notifications carry
    // the query they match plus the event payload.
    let Some(result) = val.get("result") else {
        if let Some(err) = val.get("error") {
            tracing::warn!(error = %err, "WS request rejected by node");
        }
        return;
    };
    if result.get("query").is_none() {
        return;
    }

    match serde_json::from_value::<SubscriptionEvent>(result.clone()) {
        Ok(event) => {
            let query = event.query.clone();
            subscriptions.dispatch(&query, event);
        }
        Err(e) => tracing::debug!(error = %e, "unparseable subscription notification"),
    }
}
