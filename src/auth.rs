use actix_web::{
    dev::Payload, error::ErrorUnauthorized, FromRequest, HttpRequest,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use futures_util::future::{ready, Ready};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::state::AdminStateManager;

pub const SESSION_COOKIE: &str = "session";

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?
        .to_string();
    Ok(password_hash)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

#[derive(Debug, Clone)]
struct SessionRecord {
    expires_ts: i64,
    ip_address: Option<String>,
}

/// In-memory admin sessions keyed by token.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session and sweeps out any that have expired.
    pub fn create_session(&self, ip_address: Option<String>, duration_hours: i64) -> String {
        let now = Utc::now();
        self.sessions.retain(|_, record| record.expires_ts >= now.timestamp());
        let session_token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        let expires_ts = (now + Duration::hours(duration_hours)).timestamp();
        tracing::info!("Admin session opened from {:?}", ip_address);
        self.sessions.insert(
            session_token.clone(),
            SessionRecord { expires_ts, ip_address },
        );
        session_token
    }

    /// True when the token exists and has not expired. Expired tokens are
    /// dropped on sight.
    pub fn verify_session(&self, session_token: &str) -> bool {
        let now = Utc::now().timestamp();
        let expired = match self.sessions.get(session_token) {
            Some(record) if now <= record.expires_ts => return true,
            Some(record) => {
                tracing::debug!("Session from {:?} expired", record.ip_address);
                true
            }
            None => false,
        };
        if expired {
            self.invalidate_session(session_token);
        }
        false
    }

    pub fn invalidate_session(&self, session_token: &str) {
        self.sessions.remove(session_token);
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

// Extractor for the admin session cookie
pub struct AdminSession {
    pub session_token: String,
}

impl FromRequest for AdminSession {
    type Error = actix_web::Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.cookie(SESSION_COOKIE) {
            Some(cookie) => ready(Ok(AdminSession {
                session_token: cookie.value().to_owned(),
            })),
            None => {
                tracing::debug!("Session cookie missing.");
                ready(Err(ErrorUnauthorized("Authentication credentials missing")))
            }
        }
    }
}

impl AdminSession {
    // The extractor only reads the cookie; handlers call this to check it
    pub fn validate(&self, state: &Arc<AdminStateManager>) -> std::result::Result<(), actix_web::Error> {
        if state.sessions.verify_session(&self.session_token) {
            Ok(())
        } else {
            Err(ErrorUnauthorized("Invalid or expired session"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("workshop-admin").unwrap();
        assert!(verify_password("workshop-admin", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn sessions_expire_and_invalidate() {
        let store = SessionStore::new();
        let token = store.create_session(Some("127.0.0.1".into()), 1);
        assert_eq!(token.len(), 64);
        assert!(store.verify_session(&token));

        let stale = store.create_session(None, -1);
        assert!(!store.verify_session(&stale));
        assert_eq!(store.active_count(), 1);

        store.invalidate_session(&token);
        assert!(!store.verify_session(&token));
    }

    #[test]
    fn new_sessions_sweep_expired_ones() {
        let store = SessionStore::new();
        for _ in 0..3 {
            store.create_session(None, -1);
        }
        let live = store.create_session(None, 1);
        assert_eq!(store.active_count(), 1);
        assert!(store.verify_session(&live));
    }
}
