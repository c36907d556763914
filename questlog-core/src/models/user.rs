use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account. `password_hash` is an Argon2id PHC string and is
/// never serialized; clients only ever see [`UserProfile`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub experience: i64,
    pub level: i64,
    pub created_at: DateTime<Utc>,
}

/// Public projection of a [`User`]: everything a client may see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub experience: i64,
    pub level: i64,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            experience: user.experience,
            level: user.level,
        }
    }
}

/// Register/login request body. Both fields default to empty so missing
/// keys surface as a validation error, not a deserialization rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}
