use std::time::Duration;

use chrono::{DateTime, Utc};
use clustermsi_domain::DocumentKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Time-bounded exclusive ownership of a document key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub key: DocumentKey,
    pub holder: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// A fresh lease with a random holder id, valid for `ttl` from now.
    pub fn new(key: DocumentKey, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        Self {
            key,
            holder: Uuid::new_v4(),
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True if `self` is the live lease recorded as `current`.
    pub fn is_current(&self, current: Option<&Lease>, now: DateTime<Utc>) -> bool {
        current.is_some_and(|c| c.holder == self.holder && !c.is_expired_at(now))
    }
}
