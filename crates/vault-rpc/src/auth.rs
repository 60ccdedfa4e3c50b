//! Credentials and sessions.
//!
//! Passwords are stored as bcrypt hashes. Hashing and verification run on the
//! blocking pool. A successful login issues an opaque bearer token that maps
//! to a [`Principal`] for [`SESSION_TTL`].

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use bcrypt::{hash, verify, DEFAULT_COST};
use model_vault::{Principal, VaultError};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How long a session token stays valid.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Bcrypt cost factor for stored passwords.
pub const BCRYPT_COST: u32 = DEFAULT_COST;

/// Minimum accepted password length at registration.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Maximum accepted password length in bytes (bcrypt reads at most 72).
pub const MAX_PASSWORD_LEN: usize = 72;

/// Hash a password with bcrypt, `cost` defaulting to [`BCRYPT_COST`].
pub async fn hash_password(password: &str, cost: Option<u32>) -> model_vault::Result<String> {
    let password = password.to_string();
    let cost = cost.unwrap_or(BCRYPT_COST);

    tokio::task::spawn_blocking(move || {
        hash(password, cost)
            .map_err(|e| VaultError::Other(format!("Password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| VaultError::Other(format!("Password hashing task failed: {}", e)))?
}

/// Check a password against a bcrypt hash.
///
/// A stored value that is not a bcrypt hash never matches.
pub async fn verify_password(password: &str, stored: &str) -> bool {
    let password = password.to_string();
    let stored = stored.to_string();

    match tokio::task::spawn_blocking(move || verify(password, &stored)).await {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => {
            debug!("Stored credential rejected by bcrypt: {}", e);
            false
        }
        Err(e) => {
            warn!("Password verification task failed: {}", e);
            false
        }
    }
}

/// Extract the bearer token from an Authorization header.
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
        .filter(|t| !t.is_empty())
}

struct Session {
    principal: Principal,
    issued_at: Instant,
}

/// Live sessions keyed by bearer token.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a session for `principal` and return its token.
    pub async fn issue(&self, principal: Principal) -> String {
        let token = hex::encode(rand::random::<[u8; 32]>());
        let mut sessions = self.sessions.write().await;

        // Drop expired sessions while the write lock is held anyway
        let ttl = self.ttl;
        sessions.retain(|_, s| s.issued_at.elapsed() < ttl);

        debug!("Issued {} session", principal.role_str());
        sessions.insert(
            token.clone(),
            Session {
                principal,
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Principal behind a token, if the session exists and has not expired.
    pub async fn resolve(&self, token: &str) -> Option<Principal> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(s) if s.issued_at.elapsed() < self.ttl => {
                    return Some(s.principal.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        self.sessions.write().await.remove(token);
        None
    }

    /// End every session scoped to an archive, returning how many ended.
    pub async fn revoke_archive(&self, archive_id: u64) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.principal.archive_scope() != Some(archive_id));
        before - sessions.len()
    }
}
