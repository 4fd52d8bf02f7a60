use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::messages::ChatMessage;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoomError {
    #[error("name and topic are required")]
    Validation,
    #[error("room not found")]
    NotFound,
}

/// A topic channel. Membership is insertion-ordered and the first entry
/// is the owner; `total_users` tracks `members.len()` through every
/// mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub topic: String,
    pub description: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub members: Vec<String>,
    pub messages: Vec<ChatMessage>,
    pub total_users: usize,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// The listing view of a room: everything except its history, which can
/// grow far too large to ship with every room list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub topic: String,
    pub description: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub members: Vec<String>,
    pub total_users: usize,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl Room {
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            topic: self.topic.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            is_public: self.is_public,
            members: self.members.clone(),
            total_users: self.total_users,
            created_at: self.created_at,
            created_by: self.created_by.clone(),
        }
    }

    fn snapshot(&self, limit: usize) -> Room {
        let mut room = self.clone();
        let start = room.messages.len().saturating_sub(limit);
        room.messages = room.messages.split_off(start);
        room
    }
}

/// Fields a caller supplies when creating a room.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub name: String,
    pub topic: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

type Rooms = Arc<RwLock<HashMap<String, Room>>>;

/// Owns every room record. All mutation goes through these methods, so
/// the members/total_users invariant can only be touched under the
/// write lock.
#[derive(Clone, Default)]
pub struct RoomStore {
    rooms: Rooms,
}

impl RoomStore {
    pub fn new() -> Self {
        RoomStore {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, params: NewRoom, creator: &str) -> Result<Room, RoomError> {
        if params.name.trim().is_empty() || params.topic.trim().is_empty() {
            return Err(RoomError::Validation);
        }

        let room = Room {
            id: Uuid::new_v4().to_string(),
            name: params.name,
            topic: params.topic,
            description: params.description,
            tags: params.tags,
            is_public: params.is_public,
            members: vec![creator.to_string()],
            messages: Vec::new(),
            total_users: 1,
            created_at: Utc::now(),
            created_by: creator.to_string(),
        };

        let mut rooms = self.rooms.write().await;
        rooms.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    pub async fn find(&self, id: &str, history_limit: usize) -> Option<Room> {
        let rooms = self.rooms.read().await;
        rooms.get(id).map(|room| room.snapshot(history_limit))
    }

    pub async fn list_public(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read().await;
        let mut summaries: Vec<RoomSummary> = rooms
            .values()
            .filter(|room| room.is_public)
            .map(Room::summary)
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    /// Adds `username` to the room. Returns whether membership actually
    /// changed; joining a room twice is a no-op, not an error.
    pub async fn join(&self, room_id: &str, username: &str) -> Result<bool, RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;

        if room.members.iter().any(|m| m == username) {
            return Ok(false);
        }
        room.members.push(username.to_string());
        room.total_users = room.members.len();
        Ok(true)
    }

    /// Removes `username` if present; returns whether anything was
    /// removed. Leaving a room one never joined is a silent no-op.
    pub async fn leave(&self, room_id: &str, username: &str) -> Result<bool, RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;

        let Some(position) = room.members.iter().position(|m| m == username) else {
            return Ok(false);
        };
        room.members.remove(position);
        room.total_users = room.members.len();
        Ok(true)
    }

    pub async fn append_message(
        &self,
        room_id: &str,
        message: ChatMessage,
    ) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        room.messages.push(message);
        Ok(())
    }

    pub async fn messages(&self, room_id: &str, limit: usize) -> Result<Vec<ChatMessage>, RoomError> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id).ok_or(RoomError::NotFound)?;
        let start = room.messages.len().saturating_sub(limit);
        Ok(room.messages[start..].to_vec())
    }

    pub async fn members(&self, room_id: &str) -> Vec<String> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    pub async fn rooms_with_member(&self, username: &str) -> Vec<String> {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .filter(|room| room.members.iter().any(|m| m == username))
            .map(|room| room.id.clone())
            .collect()
    }

    /// Moves `username` to the front of the member list, making them the
    /// owner. Membership order elsewhere is preserved.
    pub async fn promote_owner(&self, room_id: &str, username: &str) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        let Some(position) = room.members.iter().position(|m| m == username) else {
            return Err(RoomError::NotFound);
        };
        let member = room.members.remove(position);
        room.members.insert(0, member);
        Ok(())
    }

    /// Lounge rooms available out of the box, owned by the seeded admin.
    pub async fn seed_defaults(&self) {
        let defaults = [
            (
                "1",
                "AI Research Lounge",
                "Discussing Future of Artificial Intelligence",
                "A deep dive into the cutting-edge advancements in artificial intelligence.",
                vec!["Technology", "AI Research"],
            ),
            (
                "2",
                "Tech Innovations",
                "Exploring Cutting-Edge Technologies",
                "Discussions about the latest technological advancements and innovations.",
                vec!["Technology", "Innovation"],
            ),
            (
                "3",
                "Machine Learning Hub",
                "Deep Dive into ML Algorithms",
                "An interactive learning space for machine learning enthusiasts.",
                vec!["Data Science", "Learning"],
            ),
        ];

        let mut rooms = self.rooms.write().await;
        for (id, name, topic, description, tags) in defaults {
            rooms.insert(
                id.to_string(),
                Room {
                    id: id.to_string(),
                    name: name.to_string(),
                    topic: topic.to_string(),
                    description: description.to_string(),
                    tags: tags.into_iter().map(String::from).collect(),
                    is_public: true,
                    members: vec!["admin".to_string()],
                    messages: Vec::new(),
                    total_users: 1,
                    created_at: Utc::now(),
                    created_by: "admin".to_string(),
                },
            );
        }
    }
}
