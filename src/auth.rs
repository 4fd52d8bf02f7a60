use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::messages::UserRef;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("username or email already exists")]
    Duplicate,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("user not found")]
    NotFound,
}

/// Full account record. Only ever serialized through the profile views
/// below, so the credential fields cannot leak.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    password_hash: String,
    pub bio: String,
    pub avatar_color: String,
    pub created_at: DateTime<Utc>,
    pub is_online: bool,
}

/// What `/api/users/me` and the login response return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub avatar_color: String,
    pub created_at: DateTime<Utc>,
    pub is_online: bool,
}

/// What other users may see: the profile minus the email address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub bio: String,
    pub avatar_color: String,
    pub created_at: DateTime<Utc>,
    pub is_online: bool,
}

impl UserRecord {
    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            bio: self.bio.clone(),
            avatar_color: self.avatar_color.clone(),
            created_at: self.created_at,
            is_online: self.is_online,
        }
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            bio: self.bio.clone(),
            avatar_color: self.avatar_color.clone(),
            created_at: self.created_at,
            is_online: self.is_online,
        }
    }

    pub fn user_ref(&self) -> UserRef {
        UserRef {
            id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `salt$hex-digest`, salted per user.
fn hash_password(password: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("{salt}${}", digest(&salt, password))
}

fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn random_avatar_color() -> String {
    let hue = rand::thread_rng().gen_range(0..360);
    format!("hsl({hue}, 70%, 50%)")
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    exp: i64,
}

pub fn issue_token(user: &UserRecord, secret: &str, ttl_hours: i64) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user.id.clone(),
        username: user.username.clone(),
        exp: (Utc::now() + Duration::hours(ttl_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

pub fn verify_token(token: &str, secret: &str) -> Result<UserRef, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::InvalidToken)?;

    Ok(UserRef {
        id: data.claims.sub,
        username: data.claims.username,
    })
}

type Users = Arc<RwLock<HashMap<String, UserRecord>>>;

/// Process-wide account store, keyed by user id.
#[derive(Clone, Default)]
pub struct UserDirectory {
    users: Users,
}

impl UserDirectory {
    pub fn new() -> Self {
        UserDirectory {
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let mut users = self.users.write().await;
        let taken = users
            .values()
            .any(|u| u.username == username || u.email == email);
        if taken {
            return Err(AuthError::Duplicate);
        }

        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password),
            bio: String::new(),
            avatar_color: random_avatar_color(),
            created_at: Utc::now(),
            is_online: false,
        };
        users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub async fn login(&self, login: &str, password: &str) -> Result<UserRecord, AuthError> {
        let users = self.users.read().await;
        let record = users
            .values()
            .find(|u| u.username == login || u.email == login)
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&record.password_hash, password) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(record.clone())
    }

    pub async fn by_id(&self, id: &str) -> Option<UserRecord> {
        let users = self.users.read().await;
        users.get(id).cloned()
    }

    /// Lookup by id first, then by username, matching the profile route.
    pub async fn by_id_or_username(&self, key: &str) -> Option<UserRecord> {
        let users = self.users.read().await;
        users
            .get(key)
            .or_else(|| users.values().find(|u| u.username == key))
            .cloned()
    }

    /// Resolves a room member's username to the id sessions are keyed by.
    pub async fn id_for_username(&self, username: &str) -> Option<String> {
        let users = self.users.read().await;
        users
            .values()
            .find(|u| u.username == username)
            .map(|u| u.id.clone())
    }

    pub async fn set_online(&self, id: &str, online: bool) {
        let mut users = self.users.write().await;
        if let Some(record) = users.get_mut(id) {
            record.is_online = online;
        }
    }

    pub async fn seed_admin(&self) {
        if self.by_id_or_username("admin").await.is_some() {
            return;
        }
        if let Ok(admin) = self.register("admin", "admin@example.com", "admin123").await {
            let mut users = self.users.write().await;
            if let Some(record) = users.get_mut(&admin.id) {
                record.bio = "System Administrator".to_string();
                record.avatar_color = "hsl(260, 70%, 50%)".to_string();
            }
        }
    }
}
