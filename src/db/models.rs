use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbSavedAccount {
    pub id: i64,
    pub username: String,
    pub secret: String,
    pub device_id: String,
    pub saved_at: DateTime<Utc>,
}

/// Login details remembered for one device.
#[derive(Clone, PartialEq, Eq)]
pub struct SavedCredential {
    pub username: String,
    pub secret: String,
    pub device_id: String,
    pub saved_at: DateTime<Utc>,
}

impl SavedCredential {
    /// `(username, secret)` as the authentication flow consumes it.
    pub fn into_login(self) -> (String, String) {
        (self.username, self.secret)
    }
}

// Keeps secrets out of log lines.
impl fmt::Debug for SavedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedCredential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("saved_at", &self.saved_at)
            .finish()
    }
}

impl From<DbSavedAccount> for SavedCredential {
    fn from(d: DbSavedAccount) -> Self {
        SavedCredential {
            username: d.username,
            secret: d.secret,
            device_id: d.device_id,
            saved_at: d.saved_at,
        }
    }
}
