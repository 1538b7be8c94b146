use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repositories::Document;

/// Single-use token keyed by a user's stable key. Only the SHA-256 digest
/// of the token is stored.
pub trait OneTimeToken: Document {
    /// Path segment of the link sent to the user.
    const VERB: &'static str;

    fn issue(key: String, token_hash: String, expires_at: DateTime<Utc>) -> Self;
    fn key(&self) -> &str;
    fn token_hash(&self) -> &str;
    fn expires_at(&self) -> DateTime<Utc>;
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerification {
    pub id: Uuid,
    pub key: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for EmailVerification {
    const COLLECTION: &'static str = "email_verifications";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl OneTimeToken for EmailVerification {
    const VERB: &'static str = "verify-email";

    fn issue(key: String, token_hash: String, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        EmailVerification {
            id: Uuid::new_v4(),
            key,
            token: token_hash,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn token_hash(&self) -> &str {
        &self.token
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPassword {
    pub id: Uuid,
    pub key: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for ResetPassword {
    const COLLECTION: &'static str = "reset_passwords";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl OneTimeToken for ResetPassword {
    const VERB: &'static str = "reset-password";

    fn issue(key: String, token_hash: String, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        ResetPassword {
            id: Uuid::new_v4(),
            key,
            token: token_hash,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn token_hash(&self) -> &str {
        &self.token
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
