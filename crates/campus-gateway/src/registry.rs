use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use campus_types::events::GatewayEvent;

/// Connection registry for real-time push.
///
/// Maps recipient id → live session senders. Push is a convenience channel:
/// nothing here is persisted, a restart drops all routing until clients
/// reconnect, and sending to an absent recipient is a silent no-op.
///
/// An explicit instance, cloned into whoever needs it — never a module-level
/// singleton.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// System-wide events go to every connected client.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Targeted sends: user_id -> (session_id -> sender). A user may hold
    /// several live sessions (multiple tabs/devices); all of them receive.
    sessions: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Registry {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RegistryInner {
                broadcast_tx,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to system-wide events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Deliver an event to every currently connected client.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a session for a user. Returns (session_id, receiver).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .sessions
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(session_id, tx);
        (session_id, rx)
    }

    /// Drop one session. The user stays routable while other sessions remain.
    pub async fn unregister(&self, user_id: Uuid, session_id: Uuid) {
        let mut sessions = self.inner.sessions.write().await;
        if let Some(user_sessions) = sessions.get_mut(&user_id) {
            user_sessions.remove(&session_id);
            if user_sessions.is_empty() {
                sessions.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to every live session of one user.
    /// No-op when the user has no sessions — dropped, never queued.
    /// Returns true when at least one session accepted the event.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let sessions = self.inner.sessions.read().await;
        let Some(user_sessions) = sessions.get(&user_id) else {
            return false;
        };

        let mut delivered = false;
        for tx in user_sessions.values() {
            if tx.send(event.clone()).is_ok() {
                delivered = true;
            }
        }
        delivered
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_types::models::Role;

    fn ready(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::Ready {
            user_id,
            username: "t".into(),
            role: Role::Student,
        }
    }

    #[tokio::test]
    async fn targeted_send_reaches_every_session() {
        let registry = Registry::new();
        let user = Uuid::new_v4();

        let (_s1, mut rx1) = registry.register(user).await;
        let (_s2, mut rx2) = registry.register(user).await;

        assert!(registry.send_to_user(user, ready(user)).await);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_absent_user_is_a_noop() {
        let registry = Registry::new();
        let connected = Uuid::new_v4();
        let absent = Uuid::new_v4();

        let (_sid, mut rx) = registry.register(connected).await;
        assert!(!registry.send_to_user(absent, ready(absent)).await);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_keeps_remaining_sessions() {
        let registry = Registry::new();
        let user = Uuid::new_v4();

        let (s1, mut rx1) = registry.register(user).await;
        let (_s2, mut rx2) = registry.register(user).await;

        registry.unregister(user, s1).await;

        assert!(registry.send_to_user(user, ready(user)).await);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn last_unregister_removes_routing() {
        let registry = Registry::new();
        let user = Uuid::new_v4();

        let (sid, _rx) = registry.register(user).await;
        registry.unregister(user, sid).await;

        assert!(!registry.send_to_user(user, ready(user)).await);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let registry = Registry::new();
        let mut a = registry.subscribe();
        let mut b = registry.subscribe();

        registry.broadcast(ready(Uuid::new_v4()));

        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }
}
