use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::credentials::{clear_credentials, CredentialStore};

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend rejected the stored credential.
    Invalidated,
}

/// Broadcast hub for session events. Created once by the application and
/// shared by the client and every listener.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Broadcast `Invalidated`. Returns how many subscribers were reached;
    /// having none is fine.
    pub fn notify_invalidated(&self) -> usize {
        self.tx.send(SessionEvent::Invalidated).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the standard reaction to an invalid session: drop the stored
/// credential so the next request goes out unauthenticated and the user is
/// asked to log in again. The task ends when every sender is dropped.
pub fn spawn_invalidation_listener(
    events: &SessionEvents,
    store: Arc<dyn CredentialStore>,
) -> JoinHandle<()> {
    let mut receiver = events.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(SessionEvent::Invalidated) => match clear_credentials(store.as_ref()) {
                    Ok(()) => info!("Session invalidated, stored credential cleared"),
                    Err(e) => warn!(error = %e, "Failed to clear credential after invalidation"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Session listener lagged, missed {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{MemoryStore, ACCESS_TOKEN_KEY, LEGACY_TOKEN_KEY};

    #[tokio::test]
    async fn test_notify_reaches_every_subscriber() {
        let events = SessionEvents::new();
        let mut first = events.subscribe();
        let mut second = events.subscribe();

        assert_eq!(events.notify_invalidated(), 2);
        assert_eq!(first.recv().await.unwrap(), SessionEvent::Invalidated);
        assert_eq!(second.recv().await.unwrap(), SessionEvent::Invalidated);
    }

    #[test]
    fn test_notify_without_subscribers() {
        let events = SessionEvents::new();
        assert_eq!(events.receiver_count(), 0);
        assert_eq!(events.notify_invalidated(), 0);
    }

    #[tokio::test]
    async fn test_listener_clears_credentials() {
        let store = Arc::new(MemoryStore::new());
        store.write(ACCESS_TOKEN_KEY, "abc123").unwrap();
        store.write(LEGACY_TOKEN_KEY, "old").unwrap();

        let events = SessionEvents::new();
        let listener = spawn_invalidation_listener(&events, store.clone());

        events.notify_invalidated();
        // Closing the channel lets the listener drain the event and exit
        drop(events);
        listener.await.unwrap();

        assert_eq!(store.read(ACCESS_TOKEN_KEY).unwrap(), None);
        assert_eq!(store.read(LEGACY_TOKEN_KEY).unwrap(), None);
    }
}
