//! Bridge to the external markup rendering surface
//!
//! The engine never lays out EPUB content itself. It pushes commands to
//! whatever owns the layout engine (a web view, a test harness) over a
//! bounded channel, and asks coordinate questions through `Query`
//! commands that carry a oneshot reply.
//!
//! Only one query may be outstanding per engine; `query` holds an async
//! gate for the whole exchange, including the wait for the reply.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::document::{DocumentError, ModeSettings, ReadingMode, Rect, Result};

/// Coordinate questions the surface answers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SurfaceQuery {
    TextInRect { rect: Rect },
    WordAt { x: f32, y: f32 },
    LinkAt { x: f32, y: f32 },
}

impl SurfaceQuery {
    /// Script call a web-view surface can evaluate directly
    pub fn script(&self) -> String {
        match self {
            SurfaceQuery::TextInRect { rect } => format!(
                "getTextInRect({}, {}, {}, {})",
                rect.x, rect.y, rect.width, rect.height
            ),
            SurfaceQuery::WordAt { x, y } => format!("getWordAtPosition({}, {})", x, y),
            SurfaceQuery::LinkAt { x, y } => format!("getLinkAtPosition({}, {})", x, y),
        }
    }
}

/// Everything the engine tells the surface
#[derive(Debug)]
pub enum SurfaceCommand {
    /// Replace the displayed unit with styled markup
    Load {
        page_number: usize,
        href: String,
        html: String,
    },
    /// Swap the injected stylesheet in place
    ApplyStyles { stylesheet: String },
    SetReadingMode {
        mode: ReadingMode,
        settings: ModeSettings,
    },
    Query {
        query: SurfaceQuery,
        reply: oneshot::Sender<Value>,
    },
}

/// Reply to a `WordAt` query
#[derive(Debug, Deserialize)]
pub struct WordReply {
    pub text: String,
    pub rect: Rect,
}

/// Reply to a `LinkAt` query
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReply {
    pub rect: Rect,
    #[serde(default)]
    pub href: Option<String>,
}

/// Engine side of the surface channel
#[derive(Debug, Clone)]
pub struct SurfaceBridge {
    tx: mpsc::Sender<SurfaceCommand>,
    gate: Arc<Mutex<()>>,
    timeout: Duration,
}

impl SurfaceBridge {
    /// Create a bridge and the receiver the surface drains
    pub fn channel(capacity: usize, timeout: Duration) -> (Self, mpsc::Receiver<SurfaceCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                gate: Arc::new(Mutex::new(())),
                timeout,
            },
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Fire-and-forget command; a full or closed channel only warns
    pub fn notify(&self, command: SurfaceCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                warn!(command = command_name(&cmd), "surface channel full, command dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(cmd)) => {
                debug!(command = command_name(&cmd), "surface closed, command dropped");
                false
            }
        }
    }

    /// Ask the surface a question and wait for its answer
    ///
    /// Waits for any earlier query to resolve first. The timeout covers
    /// sending the request and receiving the reply.
    pub async fn query(&self, query: SurfaceQuery) -> Result<Value> {
        let _outstanding = self.gate.lock().await;
        let limit_ms = self.timeout.as_millis() as u64;
        let (reply, answer) = oneshot::channel();
        let script = query.script();

        let exchange = async {
            self.tx
                .send(SurfaceCommand::Query { query, reply })
                .await
                .map_err(|_| DocumentError::SurfaceClosed)?;
            answer.await.map_err(|_| DocumentError::SurfaceClosed)
        };

        match timeout(self.timeout, exchange).await {
            Ok(Ok(value)) => {
                debug!(%script, "surface answered");
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!(%script, "surface went away during query");
                Err(e)
            }
            Err(_) => {
                warn!(%script, timeout_ms = limit_ms, "surface query timed out");
                Err(DocumentError::SurfaceTimeout(limit_ms))
            }
        }
    }

    pub async fn text_in_rect(&self, rect: Rect) -> Result<String> {
        match self.query(SurfaceQuery::TextInRect { rect }).await? {
            Value::Null => Ok(String::new()),
            Value::String(text) => Ok(text),
            other => Err(DocumentError::SurfaceProtocol(format!(
                "expected text, got {}",
                other
            ))),
        }
    }

    pub async fn word_at(&self, x: f32, y: f32) -> Result<Option<WordReply>> {
        decode_optional(self.query(SurfaceQuery::WordAt { x, y }).await?)
    }

    pub async fn link_at(&self, x: f32, y: f32) -> Result<Option<LinkReply>> {
        decode_optional(self.query(SurfaceQuery::LinkAt { x, y }).await?)
    }
}

fn decode_optional<T: for<'de> Deserialize<'de>>(value: Value) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| DocumentError::SurfaceProtocol(e.to_string()))
}

fn command_name(command: &SurfaceCommand) -> &'static str {
    match command {
        SurfaceCommand::Load { .. } => "load",
        SurfaceCommand::ApplyStyles { .. } => "apply_styles",
        SurfaceCommand::SetReadingMode { .. } => "set_reading_mode",
        SurfaceCommand::Query { .. } => "query",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_query_round_trip() {
        let (bridge, mut rx) = SurfaceBridge::channel(4, Duration::from_secs(1));
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                if let SurfaceCommand::Query { query, reply } = cmd {
                    let value = match query {
                        SurfaceQuery::TextInRect { .. } => json!("selected words"),
                        SurfaceQuery::WordAt { .. } => {
                            json!({"text": "word", "rect": {"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}})
                        }
                        SurfaceQuery::LinkAt { .. } => Value::Null,
                    };
                    let _ = reply.send(value);
                }
            }
        });

        assert_eq!(
            bridge.text_in_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).await.unwrap(),
            "selected words"
        );
        let word = bridge.word_at(1.0, 2.0).await.unwrap().unwrap();
        assert_eq!(word.text, "word");
        assert_eq!(word.rect, Rect::new(1.0, 2.0, 3.0, 4.0));
        assert!(bridge.link_at(0.0, 0.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_outstanding_query() {
        let (bridge, mut rx) = SurfaceBridge::channel(8, Duration::from_secs(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (flight, top) = (in_flight.clone(), peak.clone());
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                if let SurfaceCommand::Query { reply, .. } = cmd {
                    let flight = flight.clone();
                    let top = top.clone();
                    // Answer asynchronously so overlapping queries would be visible
                    tokio::spawn(async move {
                        let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                        top.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        flight.fetch_sub(1, Ordering::SeqCst);
                        let _ = reply.send(json!("ok"));
                    });
                }
            }
        });

        let queries = (0..4).map(|i| {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.text_in_rect(Rect::new(i as f32, 0.0, 1.0, 1.0)).await })
        });
        for handle in queries.collect::<Vec<_>>() {
            assert_eq!(handle.await.unwrap().unwrap(), "ok");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_and_closed() {
        let (bridge, rx) = SurfaceBridge::channel(4, Duration::from_millis(50));
        // Receiver alive but never answering
        let err = bridge.word_at(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, DocumentError::SurfaceTimeout(50)));

        drop(rx);
        assert!(bridge.is_closed());
        let err = bridge.word_at(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, DocumentError::SurfaceClosed));
        assert!(!bridge.notify(SurfaceCommand::ApplyStyles {
            stylesheet: String::new()
        }));
    }

    #[tokio::test]
    async fn test_malformed_reply() {
        let (bridge, mut rx) = SurfaceBridge::channel(1, Duration::from_secs(1));
        tokio::spawn(async move {
            if let Some(SurfaceCommand::Query { reply, .. }) = rx.recv().await {
                let _ = reply.send(json!(42));
            }
        });
        let err = bridge.text_in_rect(Rect::default()).await.unwrap_err();
        assert!(matches!(err, DocumentError::SurfaceProtocol(_)));
    }

    #[test]
    fn test_query_script() {
        assert_eq!(
            SurfaceQuery::WordAt { x: 10.5, y: 3.0 }.script(),
            "getWordAtPosition(10.5, 3)"
        );
        let json = serde_json::to_value(SurfaceQuery::LinkAt { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(json["kind"], "linkAt");
    }
}
