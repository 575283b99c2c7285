use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wabridge_core::{Error, EventEnvelope, Result, SessionEvent};

/// Pushes every session event to the one registered listener as
/// `{type, data}`. Delivery is fire-and-forget: no retry, no ordering across
/// deliveries, failures are only logged.
#[derive(Clone)]
pub struct EventForwarder {
    http: reqwest::Client,
    listener: Arc<RwLock<Option<String>>>,
}

fn validate_listener(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url.trim())
        .map_err(|e| Error::Validation(format!("invalid callback url: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(Error::Validation(format!(
            "callback url must be http or https, got '{}'",
            other
        ))),
    }
}

impl EventForwarder {
    pub fn new(timeout: Duration, listener: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        let listener = listener.and_then(|url| match validate_listener(&url) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "Ignoring configured callback url");
                None
            }
        });
        Self {
            http,
            listener: Arc::new(RwLock::new(listener)),
        }
    }

    /// Replace the listener. `None` or an empty string unregisters it.
    pub async fn set_listener(&self, url: Option<&str>) -> Result<()> {
        let next = match url.map(str::trim) {
            Some(u) if !u.is_empty() => Some(validate_listener(u)?),
            _ => None,
        };
        match &next {
            Some(u) => info!(callback_url = %u, "Event listener registered"),
            None => info!("Event listener cleared"),
        }
        *self.listener.write().await = next;
        Ok(())
    }

    pub async fn listener(&self) -> Option<String> {
        self.listener.read().await.clone()
    }

    /// Spawn delivery of one event. Returns `None` when nobody is listening.
    pub async fn dispatch(&self, event: &SessionEvent) -> Option<JoinHandle<()>> {
        let url = self.listener().await?;
        let envelope = event.envelope();
        let http = self.http.clone();
        Some(tokio::spawn(async move {
            match deliver(&http, &url, &envelope).await {
                Ok(()) => debug!(event = envelope.event_type, "Event forwarded"),
                Err(e) => warn!(event = envelope.event_type, error = %e, "Event delivery failed"),
            }
        }))
    }

    pub async fn run(
        self,
        mut events: broadcast::Receiver<SessionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Event forwarder started");
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        self.dispatch(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event forwarder lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        info!("Event forwarder stopped");
    }
}

async fn deliver(http: &reqwest::Client, url: &str, envelope: &EventEnvelope) -> Result<()> {
    let resp = http
        .post(url)
        .json(envelope)
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Http(format!("listener responded {}", status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::Value;
    use tokio::sync::mpsc;

    async fn listener_server() -> (String, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(8);
        async fn receive(State(tx): State<mpsc::Sender<Value>>, Json(body): Json<Value>) -> &'static str {
            let _ = tx.send(body).await;
            "ok"
        }
        let app = Router::new().route("/webhook", post(receive)).with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{}/webhook", addr), rx)
    }

    #[tokio::test]
    async fn test_delivers_envelope_to_listener() {
        let (url, mut rx) = listener_server().await;
        let forwarder = EventForwarder::new(Duration::from_secs(5), Some(url));

        let handle = forwarder
            .dispatch(&SessionEvent::ChangeState { state: "CONNECTED".to_string() })
            .await
            .expect("listener registered");
        handle.await.unwrap();

        let body = rx.recv().await.unwrap();
        assert_eq!(body["type"], "change_state");
        assert_eq!(body["data"]["state"], "CONNECTED");
    }

    #[tokio::test]
    async fn test_no_listener_drops_event() {
        let forwarder = EventForwarder::new(Duration::from_secs(1), None);
        assert!(forwarder.dispatch(&SessionEvent::Ready).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_listener_is_absorbed() {
        let forwarder = EventForwarder::new(
            Duration::from_millis(500),
            Some("http://127.0.0.1:9/unreachable".to_string()),
        );
        let handle = forwarder.dispatch(&SessionEvent::Ready).await.unwrap();
        // The task logs the failure and finishes normally.
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_set_listener_validates_and_clears() {
        let forwarder = EventForwarder::new(Duration::from_secs(1), None);
        assert!(matches!(
            forwarder.set_listener(Some("ftp://example.com/hook")).await,
            Err(Error::Validation(_))
        ));
        forwarder.set_listener(Some("http://localhost:5000/webhook")).await.unwrap();
        assert_eq!(forwarder.listener().await.as_deref(), Some("http://localhost:5000/webhook"));
        forwarder.set_listener(Some("  ")).await.unwrap();
        assert!(forwarder.listener().await.is_none());
    }
}
