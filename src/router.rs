use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::Rng;
use tokio::sync::Mutex;

use crate::auth::UserDirectory;
use crate::messages::{ChatMessage, ClientEvent, RoomPresence, ServerEvent, UserRef, Whisper};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::responder;
use crate::rooms::RoomStore;

/// Delay before the assistant greets a new room member.
const WELCOME_DELAY: Duration = Duration::from_millis(1000);

/// Fans inbound events out to the store and the right sessions. Clones
/// share the underlying stores, so spawned timer tasks can carry one.
#[derive(Clone)]
pub struct ChatRouter {
    rooms: RoomStore,
    registry: SessionRegistry,
    users: UserDirectory,
    delivery: Arc<Mutex<()>>,
}

impl ChatRouter {
    pub fn new(rooms: RoomStore, registry: SessionRegistry, users: UserDirectory) -> Self {
        ChatRouter {
            rooms,
            registry,
            users,
            delivery: Arc::new(Mutex::new(())),
        }
    }

    pub async fn dispatch(&self, user: &UserRef, handle: &SessionHandle, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom { room_id } => self.handle_join_room(user, &room_id).await,
            ClientEvent::LeaveRoom { room_id } => self.handle_leave_room(user, &room_id).await,
            ClientEvent::ChatMessage { room_id, text } => {
                self.handle_chat_message(user, &room_id, text).await;
            }
            ClientEvent::WhisperMessage { text, to_user } => {
                self.handle_whisper(user, to_user, text).await;
            }
            ClientEvent::TypingIndicator { room_id, is_typing } => {
                self.handle_typing(user, &room_id, is_typing).await;
            }
            ClientEvent::Heartbeat => handle.send(&ServerEvent::HeartbeatAck),
        }
    }

    async fn handle_join_room(&self, user: &UserRef, room_id: &str) {
        match self.rooms.join(room_id, &user.username).await {
            Ok(true) => {}
            Ok(false) => return, // already a member, nothing to announce
            Err(e) => {
                debug!("join_room {room_id} ignored: {e}");
                return;
            }
        }

        let presence = RoomPresence::now(room_id, user.clone());
        self.broadcast_to_room(room_id, &ServerEvent::UserJoined(presence))
            .await;

        let notice = ChatMessage::system(room_id, format!("{} has joined the room.", user.username));
        self.append_and_broadcast(room_id, notice).await;

        self.schedule_welcome(room_id.to_string(), user.username.clone());
    }

    async fn handle_leave_room(&self, user: &UserRef, room_id: &str) {
        match self.rooms.leave(room_id, &user.username).await {
            Ok(true) => {}
            Ok(false) => return, // never a member, stay silent
            Err(e) => {
                debug!("leave_room {room_id} ignored: {e}");
                return;
            }
        }

        let presence = RoomPresence::now(room_id, user.clone());
        self.broadcast_to_room(room_id, &ServerEvent::UserLeft(presence))
            .await;

        let notice = ChatMessage::system(room_id, format!("{} has left the room.", user.username));
        self.append_and_broadcast(room_id, notice).await;
    }

    async fn handle_chat_message(&self, user: &UserRef, room_id: &str, text: String) {
        let message = ChatMessage::from_user(user.clone(), room_id, text.clone());
        if !self.append_and_broadcast(room_id, message).await {
            debug!("chat_message for unknown room {room_id} dropped");
            return;
        }

        if responder::wants_reply(&text) {
            self.schedule_reply(room_id.to_string(), text);
        }
    }

    async fn handle_whisper(&self, user: &UserRef, to_user: UserRef, text: String) {
        let whisper = Whisper::new(user.clone(), to_user.clone(), text);
        let event = ServerEvent::WhisperMessage(whisper);
        // Recipient plus an echo to the sender; nobody else, nothing stored.
        self.registry.send_to(&to_user.id, &event).await;
        self.registry.send_to(&user.id, &event).await;
    }

    async fn handle_typing(&self, user: &UserRef, room_id: &str, is_typing: bool) {
        let event = ServerEvent::TypingIndicator {
            room_id: room_id.to_string(),
            user_id: user.id.clone(),
            username: user.username.clone(),
            is_typing,
        };
        self.broadcast_to_room(room_id, &event).await;
    }

    /// Connection teardown: presence off and a `user_left` note to every
    /// room the user belongs to. Membership itself is kept, so a
    /// reconnect lands back in the same rooms.
    pub async fn handle_disconnect(&self, user: &UserRef, connection_id: &str) {
        self.users.set_online(&user.id, false).await;
        self.registry.unregister(&user.id, connection_id).await;

        for room_id in self.rooms.rooms_with_member(&user.username).await {
            let presence = RoomPresence::now(&room_id, user.clone());
            self.broadcast_to_room(&room_id, &ServerEvent::UserLeft(presence))
                .await;
        }
        info!("user disconnected: {} ({})", user.username, user.id);
    }

    pub async fn announce_room(&self, event: &ServerEvent) {
        self.registry.send_to_all(event).await;
    }

    /// Delivers to every member with a live session; offline members are
    /// skipped and catch up through the history read.
    pub async fn broadcast_to_room(&self, room_id: &str, event: &ServerEvent) {
        for username in self.rooms.members(room_id).await {
            if let Some(user_id) = self.users.id_for_username(&username).await {
                self.registry.send_to(&user_id, event).await;
            }
        }
    }

    /// The delivery guard serializes append plus fan-out, so the order
    /// sessions receive messages in is the order history records them.
    async fn append_and_broadcast(&self, room_id: &str, message: ChatMessage) -> bool {
        let _ordering = self.delivery.lock().await;
        if self
            .rooms
            .append_message(room_id, message.clone())
            .await
            .is_err()
        {
            return false;
        }
        self.broadcast_to_room(room_id, &ServerEvent::ChatMessage(message))
            .await;
        true
    }

    fn schedule_welcome(&self, room_id: String, username: String) {
        let router = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(WELCOME_DELAY).await;
            let message =
                ChatMessage::from_user(responder::ai_user(), &room_id, responder::welcome(&username));
            router.append_and_broadcast(&room_id, message).await;
        });
    }

    /// One deferred reply per triggering message, 1-3s out. The timer is
    /// never cancelled; delivery simply no-ops for sessions that are gone
    /// by the time it fires.
    fn schedule_reply(&self, room_id: String, text: String) {
        let delay = Duration::from_millis(rand::thread_rng().gen_range(1000..=3000));
        let router = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let reply = responder::respond(&text);
            let message = ChatMessage::from_user(responder::ai_user(), &room_id, reply);
            router.append_and_broadcast(&room_id, message).await;
        });
    }
}
