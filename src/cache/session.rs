//! Session storage
//!
//! Sessions live at `session:{id}` with a pointer from `user_session:{user_id}`
//! to the user's latest session. Revoked tokens are recorded under
//! `blacklist:{sha256}` so raw tokens never reach the store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::keys;
use super::service::CacheService;

/// Stored session document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Caller-supplied fields
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Session metadata keys; caller data may not overwrite them
const RESERVED_FIELDS: &[&str] = &["session_id", "user_id", "created_at", "last_activity"];

fn without_reserved(mut data: Map<String, Value>) -> Map<String, Value> {
    let before = data.len();
    data.retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));
    if data.len() != before {
        debug!(dropped = before - data.len(), "Ignoring reserved session fields");
    }
    data
}

/// Hash a token for use in a cache key
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Session and token-blacklist store
#[derive(Clone)]
pub struct SessionStore {
    cache: CacheService,
    blacklist_ttl: Duration,
}

impl SessionStore {
    pub fn new(cache: CacheService, blacklist_ttl: Duration) -> Self {
        Self {
            cache,
            blacklist_ttl,
        }
    }

    fn session_ttl(&self) -> Duration {
        self.cache.ttls().session
    }

    /// Create a session and point the user at it.
    ///
    /// Returns the new session id, or `None` when it could not be stored.
    #[instrument(skip(self, data))]
    pub async fn create_session(
        &self,
        user_id: &str,
        data: Map<String, Value>,
        expires_in: Option<Duration>,
    ) -> Option<String> {
        let now = Utc::now();
        let session_id = format!("{}_{}", user_id, Uuid::new_v4().simple());
        let session = Session {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            created_at: now,
            last_activity: now,
            data: without_reserved(data),
        };
        let ttl = expires_in.unwrap_or_else(|| self.session_ttl());

        if !self
            .cache
            .set(&keys::session(&session_id), &session, Some(ttl))
            .await
        {
            return None;
        }
        self.cache
            .set(&keys::user_session(user_id), session_id.as_str(), Some(ttl))
            .await;

        info!(session_id = %session_id, "Created session");
        Some(session_id)
    }

    /// Fetch a session, refreshing its last activity and TTL
    #[instrument(skip(self))]
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        let key = keys::session(session_id);
        let mut session: Session = self.cache.get_json(&key).await?;

        session.last_activity = Utc::now();
        self.cache.set(&key, &session, Some(self.session_ttl())).await;
        Some(session)
    }

    /// The user's current session, if any
    pub async fn get_user_session(&self, user_id: &str) -> Option<Session> {
        let session_id = self.session_id_for(user_id).await?;
        self.get_session(&session_id).await
    }

    async fn session_id_for(&self, user_id: &str) -> Option<String> {
        match self.cache.get(&keys::user_session(user_id)).await? {
            Value::String(id) => Some(id),
            other => Some(other.to_string()),
        }
    }

    /// Merge `data` into an existing session
    #[instrument(skip(self, data))]
    pub async fn update_session(&self, session_id: &str, data: Map<String, Value>) -> bool {
        let key = keys::session(session_id);
        let Some(mut session) = self.cache.get_json::<Session>(&key).await else {
            return false;
        };

        session.data.extend(without_reserved(data));
        session.last_activity = Utc::now();
        self.cache.set(&key, &session, Some(self.session_ttl())).await
    }

    /// Delete a session and, if it is still the user's current one, the pointer
    #[instrument(skip(self))]
    pub async fn delete_session(&self, session_id: &str) -> bool {
        let key = keys::session(session_id);
        let Some(session) = self.cache.get_json::<Session>(&key).await else {
            return false;
        };

        self.cache.delete(&key).await;
        if self.session_id_for(&session.user_id).await.as_deref() == Some(session_id) {
            self.cache.delete(&keys::user_session(&session.user_id)).await;
        }

        info!(session_id = %session_id, "Deleted session");
        true
    }

    /// Delete the user's current session
    pub async fn delete_user_sessions(&self, user_id: &str) -> bool {
        match self.session_id_for(user_id).await {
            Some(session_id) => {
                self.delete_session(&session_id).await;
                self.cache.delete(&keys::user_session(user_id)).await;
                true
            }
            None => false,
        }
    }

    /// Push a session's expiry out to `extend_by` (session TTL by default)
    pub async fn extend_session(&self, session_id: &str, extend_by: Option<Duration>) -> bool {
        let ttl = extend_by.unwrap_or_else(|| self.session_ttl());
        self.cache
            .store()
            .expire(&keys::session(session_id), ttl)
            .await
    }

    /// Revoke a token until `expires_in` (blacklist TTL by default) elapses
    #[instrument(skip_all)]
    pub async fn blacklist_token(&self, token: &str, expires_in: Option<Duration>) -> bool {
        let ttl = expires_in.unwrap_or(self.blacklist_ttl);
        let marker = json!({ "blacklisted_at": Utc::now().to_rfc3339() });
        let stored = self
            .cache
            .set(&keys::blacklist(&token_digest(token)), &marker, Some(ttl))
            .await;
        debug!(stored, "Blacklisted token");
        stored
    }

    #[instrument(skip_all)]
    pub async fn is_token_blacklisted(&self, token: &str) -> bool {
        self.cache
            .exists(&keys::blacklist(&token_digest(token)))
            .await
    }
}
