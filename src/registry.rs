use std::collections::HashMap;
use std::sync::Arc;

use log::warn;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use warp::ws::Message;

use crate::messages::ServerEvent;

/// One live connection: the outbound channel plus the id of the socket
/// behind it, so a stale connection can be told apart from its
/// replacement.
#[derive(Clone)]
pub struct SessionHandle {
    pub connection_id: String,
    sender: mpsc::UnboundedSender<Message>,
}

impl SessionHandle {
    pub fn new(connection_id: String, sender: mpsc::UnboundedSender<Message>) -> Self {
        SessionHandle {
            connection_id,
            sender,
        }
    }

    /// Fire-and-forget delivery. A closed channel means the socket is
    /// gone, which is an expected condition, not an error.
    pub fn send(&self, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(text) => {
                let _ = self.sender.send(Message::text(text));
            }
            Err(e) => warn!("failed to serialize server event: {e}"),
        }
    }
}

type Sessions = Arc<RwLock<HashMap<String, SessionHandle>>>;

/// Maps a user id to its single live session. A newer connection for
/// the same user replaces the old entry; the old socket is not closed
/// here, it simply stops being routable.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Sessions,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, user_id: &str, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(user_id.to_string(), handle);
    }

    /// Removes the entry only while it still belongs to the caller's
    /// connection. A disconnect racing a fresh register must not evict
    /// the newer session.
    pub async fn unregister(&self, user_id: &str, connection_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(user_id) {
            Some(handle) if handle.connection_id == connection_id => {
                sessions.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).cloned()
    }

    pub async fn send_to(&self, user_id: &str, event: &ServerEvent) {
        let sessions = self.sessions.read().await;
        if let Some(handle) = sessions.get(user_id) {
            handle.send(event);
        }
    }

    pub async fn send_to_all(&self, event: &ServerEvent) {
        let sessions = self.sessions.read().await;
        for handle in sessions.values() {
            handle.send(event);
        }
    }
}
