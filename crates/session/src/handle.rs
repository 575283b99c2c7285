use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use wabridge_core::{Error, Result, SessionEvent, SessionState};

use crate::client::SessionClient;

/// Owns the session client together with its authentication lifecycle.
///
/// Outward-facing operations go through [`SessionHandle::client`], which only
/// hands out the client once the session is `Ready`.
pub struct SessionHandle {
    client: Arc<dyn SessionClient>,
    state: RwLock<SessionState>,
}

/// State reached from `current` after `event`.
pub fn next_state(current: SessionState, event: &SessionEvent) -> SessionState {
    match event {
        SessionEvent::Qr { .. } | SessionEvent::AuthFailure { .. } => SessionState::AwaitingAuth,
        SessionEvent::Ready => SessionState::Ready,
        SessionEvent::Disconnected { .. } => SessionState::Disconnected,
        // `authenticated` precedes `ready`; the session is not usable until then.
        _ => current,
    }
}

impl SessionHandle {
    pub fn new(client: Arc<dyn SessionClient>) -> Self {
        Self::with_state(client, SessionState::Initializing)
    }

    pub fn with_state(client: Arc<dyn SessionClient>, state: SessionState) -> Self {
        Self {
            client,
            state: RwLock::new(state),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn client(&self) -> Result<Arc<dyn SessionClient>> {
        match *self.state.read().await {
            SessionState::Ready => Ok(Arc::clone(&self.client)),
            other => Err(Error::NotReady(other)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.client.subscribe()
    }

    /// Apply one event. Returns the previous state when it changed.
    pub async fn apply(&self, event: &SessionEvent) -> Option<SessionState> {
        let mut state = self.state.write().await;
        let previous = *state;
        let next = next_state(previous, event);
        if next == previous {
            return None;
        }
        *state = next;
        Some(previous)
    }

    /// Follow the event stream and keep the lifecycle state current.
    ///
    /// `events` should come from [`SessionHandle::subscribe`] before the
    /// driver starts so an early `ready` is not missed.
    pub async fn track(
        self: Arc<Self>,
        mut events: broadcast::Receiver<SessionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        if let SessionEvent::AuthFailure { message } = &event {
                            warn!(message = %message, "Session authentication failed");
                        }
                        if let Some(previous) = self.apply(&event).await {
                            info!(
                                from = %previous,
                                to = %next_state(previous, &event),
                                event = event.event_type(),
                                "Session state changed"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Lifecycle tracker lagged behind session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSession;

    #[test]
    fn test_transitions() {
        let qr = SessionEvent::Qr { qr: "x".to_string() };
        assert_eq!(next_state(SessionState::Initializing, &qr), SessionState::AwaitingAuth);
        assert_eq!(
            next_state(SessionState::AwaitingAuth, &SessionEvent::Authenticated),
            SessionState::AwaitingAuth
        );
        assert_eq!(next_state(SessionState::AwaitingAuth, &SessionEvent::Ready), SessionState::Ready);
        let gone = SessionEvent::Disconnected { reason: "LOGOUT".to_string() };
        assert_eq!(next_state(SessionState::Ready, &gone), SessionState::Disconnected);
        let state = SessionEvent::ChangeState { state: "CONFLICT".to_string() };
        assert_eq!(next_state(SessionState::Ready, &state), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_client_requires_ready() {
        let handle = SessionHandle::new(Arc::new(MockSession::new()));
        assert!(matches!(
            handle.client().await,
            Err(Error::NotReady(SessionState::Initializing))
        ));

        assert_eq!(handle.apply(&SessionEvent::Ready).await, Some(SessionState::Initializing));
        assert!(handle.client().await.is_ok());
        assert_eq!(handle.apply(&SessionEvent::Ready).await, None);
    }

    #[tokio::test]
    async fn test_tracker_follows_events() {
        let mock = Arc::new(MockSession::new());
        let handle = Arc::new(SessionHandle::new(mock.clone()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let events = handle.subscribe();

        // Emitted before the tracker task runs; the receiver already holds it.
        mock.emit(SessionEvent::Ready);
        let tracker = tokio::spawn(Arc::clone(&handle).track(events, shutdown_rx));

        for _ in 0..100 {
            if handle.state().await == SessionState::Ready {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.state().await, SessionState::Ready);

        shutdown_tx.send(()).unwrap();
        tracker.await.unwrap();
    }
}
