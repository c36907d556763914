use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A server-issued login session. The token is an opaque random hex string
/// handed to the client once at register/login; requests present it back as
/// `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
