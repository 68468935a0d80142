//! Raw Chrome-DevTools-Protocol connection.
//!
//! One websocket per browser. Commands are correlated by id; events are
//! fanned out to every subscriber with their session id attached, and the
//! per-page adapters filter on that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::facade::{FacadeError, FacadeResult};

#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub session_id: Option<String>,
    pub method: String,
    pub params: Value,
}

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>;

pub struct CdpTransport {
    next_id: AtomicU64,
    pending: PendingMap,
    outgoing: mpsc::UnboundedSender<String>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>,
}

impl CdpTransport {
    pub async fn connect(ws_url: &str) -> FacadeResult<Arc<Self>> {
        let (ws, _) = connect_async(ws_url)
            .await
            .map_err(|e| FacadeError::Connect(format!("{}: {}", ws_url, e)))?;
        let (mut sink, mut stream) = ws.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let transport = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outgoing,
            subscribers: Mutex::new(Vec::new()),
        });

        tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let reader = Arc::clone(&transport);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => reader.handle_message(&text),
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            debug!(target: "spel.cdp", "websocket closed");
            reader.fail_all_pending("browser connection closed");
        });

        Ok(transport)
    }

    /// Issue one CDP command and await its result. `session_id` scopes the
    /// command to an attached target; `None` addresses the browser itself.
    pub async fn call(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> FacadeResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let mut msg = json!({ "id": id, "method": method, "params": params });
        if let Some(sid) = session_id {
            msg["sessionId"] = json!(sid);
        }
        trace!(target: "spel.cdp", method, id, "send");
        if self.outgoing.send(msg.to_string()).is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(FacadeError::Protocol("browser connection closed".into()));
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(FacadeError::Protocol(format!("{}: {}", method, message))),
            Err(_) => Err(FacadeError::Protocol("browser connection closed".into())),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CdpEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn handle_message(&self, text: &str) {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            warn!(target: "spel.cdp", "unparseable frame: {}", &text[..text.len().min(200)]);
            return;
        };

        if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
            let Some(tx) = self.pending.lock().unwrap().remove(&id) else {
                return;
            };
            let outcome = match value.get("error") {
                Some(err) => Err(err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown CDP error")
                    .to_string()),
                None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
            return;
        }

        let Some(method) = value.get("method").and_then(|v| v.as_str()) else {
            return;
        };
        let event = CdpEvent {
            session_id: value
                .get("sessionId")
                .and_then(|v| v.as_str())
                .map(String::from),
            method: method.to_string(),
            params: value.get("params").cloned().unwrap_or(Value::Null),
        };
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn fail_all_pending(&self, reason: &str) {
        let mut pending = self.pending.lock().unwrap();
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }
}
