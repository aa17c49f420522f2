//! Shared-password gate: plain equality, no hashing, no lockout.

use crate::errors::AuthError;
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub const SESSION_COOKIE: &str = "dashboard_session";

const SESSION_ID_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionContext {
    authenticated: bool,
    last_seen: Instant,
}

impl SessionContext {
    fn new() -> Self {
        Self {
            authenticated: false,
            last_seen: Instant::now(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    password: String,
    bypass_token: Option<String>,
}

impl Authenticator {
    pub fn new(password: impl Into<String>, bypass_token: Option<String>) -> Self {
        Self {
            password: password.into(),
            bypass_token: bypass_token.filter(|token| !token.is_empty()),
        }
    }

    pub fn token_matches(&self, supplied: Option<&str>) -> bool {
        match (&self.bypass_token, supplied) {
            (Some(expected), Some(supplied)) => expected == supplied,
            _ => false,
        }
    }

    pub fn grant_by_token(&self, session: &mut SessionContext, supplied: Option<&str>) -> bool {
        if !self.token_matches(supplied) {
            return false;
        }
        session.authenticated = true;
        true
    }

    /// Checks a submitted password. A session that already got in stays in,
    /// whatever is submitted afterwards.
    pub fn submit_password(
        &self,
        session: &mut SessionContext,
        submitted: &str,
    ) -> Result<(), AuthError> {
        if session.authenticated {
            return Ok(());
        }
        if submitted == self.password {
            session.authenticated = true;
            Ok(())
        } else {
            Err(AuthError::IncorrectPassword)
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<String, SessionContext>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            idle_ttl,
        }
    }

    /// Looks up a live session and marks it as seen.
    pub fn touch(&mut self, id: &str) -> Option<&mut SessionContext> {
        let now = Instant::now();
        let idle_ttl = self.idle_ttl;
        let expired = self
            .sessions
            .get(id)
            .is_some_and(|session| now.duration_since(session.last_seen) > idle_ttl);
        if expired {
            debug!("session expired");
            self.sessions.remove(id);
            return None;
        }
        let session = self.sessions.get_mut(id)?;
        session.last_seen = now;
        Some(session)
    }

    /// Checks a password against the caller's live session, if any. A new
    /// session is stored only once the password is accepted.
    pub fn log_in(
        &mut self,
        id: Option<&str>,
        authenticator: &Authenticator,
        password: &str,
    ) -> Result<String, AuthError> {
        if let Some(id) = id {
            if let Some(session) = self.touch(id) {
                authenticator.submit_password(session, password)?;
                return Ok(id.to_string());
            }
        }
        let mut session = SessionContext::new();
        authenticator.submit_password(&mut session, password)?;
        let id = new_session_id();
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    /// Authenticates the caller's session from a bypass token. Nothing is
    /// stored unless the token matches.
    pub fn grant_by_token(
        &mut self,
        id: Option<&str>,
        authenticator: &Authenticator,
        token: Option<&str>,
    ) -> Option<String> {
        if !authenticator.token_matches(token) {
            return None;
        }
        let id = self.get_or_create(id);
        let session = self.touch(&id)?;
        authenticator.grant_by_token(session, token);
        Some(id)
    }

    /// Returns the id of an existing live session, or starts a new one.
    fn get_or_create(&mut self, id: Option<&str>) -> String {
        if let Some(id) = id {
            if self.touch(id).is_some() {
                return id.to_string();
            }
        }
        let id = new_session_id();
        self.sessions.insert(id.clone(), SessionContext::new());
        id
    }

    pub fn is_authenticated(&mut self, id: Option<&str>) -> bool {
        id.and_then(|id| self.touch(id))
            .is_some_and(|session| session.is_authenticated())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Drops sessions idle for longer than the TTL; returns how many went.
    pub fn prune(&mut self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        let idle_ttl = self.idle_ttl;
        self.sessions
            .retain(|_, session| now.duration_since(session.last_seen) <= idle_ttl);
        let removed = before - self.sessions.len();
        if removed > 0 {
            info!(removed, remaining = self.sessions.len(), "pruned idle sessions");
        }
        removed
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.len()
    }
}

fn new_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

/// Pulls our session id out of a `Cookie` header value.
pub fn session_id_from_cookie(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
    })
}

pub fn session_cookie(id: &str) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        Authenticator::new("hunter2", Some("tv-secret".to_string()))
    }

    #[test]
    fn wrong_then_right_password() {
        let auth = authenticator();
        let mut session = SessionContext::new();
        assert!(!session.is_authenticated());

        assert_eq!(
            auth.submit_password(&mut session, "guess"),
            Err(AuthError::IncorrectPassword)
        );
        assert!(!session.is_authenticated());

        assert!(auth.submit_password(&mut session, "hunter2").is_ok());
        assert!(session.is_authenticated());
    }

    #[test]
    fn access_is_not_revoked_by_later_wrong_password() {
        let auth = authenticator();
        let mut session = SessionContext::new();
        auth.submit_password(&mut session, "hunter2").unwrap();
        assert!(auth.submit_password(&mut session, "nope").is_ok());
        assert!(session.is_authenticated());
    }

    #[test]
    fn password_comparison_is_exact() {
        let auth = authenticator();
        let mut session = SessionContext::new();
        assert!(auth.submit_password(&mut session, "hunter2 ").is_err());
        assert!(auth.submit_password(&mut session, "Hunter2").is_err());
    }

    #[test]
    fn bypass_token_grants_access() {
        let auth = authenticator();
        let mut session = SessionContext::new();
        assert!(!auth.grant_by_token(&mut session, Some("wrong")));
        assert!(!auth.grant_by_token(&mut session, None));
        assert!(auth.grant_by_token(&mut session, Some("tv-secret")));
        assert!(session.is_authenticated());
    }

    #[test]
    fn empty_bypass_token_never_matches() {
        let auth = Authenticator::new("pw", Some(String::new()));
        assert!(!auth.token_matches(Some("")));
        let auth = Authenticator::new("pw", None);
        assert!(!auth.token_matches(Some("anything")));
    }

    #[test]
    fn session_ids_come_back_from_cookie_header() {
        let header = format!("theme=dark; {SESSION_COOKIE}=abc123; other=1");
        assert_eq!(session_id_from_cookie(&header), Some("abc123"));
        assert_eq!(session_id_from_cookie("theme=dark"), None);
        assert_eq!(session_id_from_cookie(&format!("{SESSION_COOKIE}=")), None);
    }

    #[test]
    fn store_reuses_live_sessions() {
        let mut store = SessionStore::new(Duration::from_secs(60));
        let id = store.get_or_create(None);
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert_eq!(store.get_or_create(Some(&id)), id);
        assert_ne!(store.get_or_create(Some("unknown")), id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn failed_logins_store_nothing() {
        let auth = authenticator();
        let mut store = SessionStore::new(Duration::from_secs(60));
        for _ in 0..5 {
            assert_eq!(store.log_in(None, &auth, "guess"), Err(AuthError::IncorrectPassword));
            assert_eq!(store.log_in(Some("forged"), &auth, "guess"), Err(AuthError::IncorrectPassword));
        }
        assert_eq!(store.len(), 0);

        let id = store.log_in(None, &auth, "hunter2").unwrap();
        assert!(store.is_authenticated(Some(&id)));
        assert_eq!(store.log_in(Some(&id), &auth, "typo"), Ok(id.clone()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn only_a_matching_token_opens_a_session() {
        let auth = authenticator();
        let mut store = SessionStore::new(Duration::from_secs(60));
        assert_eq!(store.grant_by_token(None, &auth, Some("guess")), None);
        assert_eq!(store.grant_by_token(None, &auth, None), None);
        assert_eq!(store.len(), 0);

        let id = store.grant_by_token(None, &auth, Some("tv-secret")).unwrap();
        assert!(store.is_authenticated(Some(&id)));
        assert_eq!(store.grant_by_token(Some(&id), &auth, Some("tv-secret")), Some(id));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let mut store = SessionStore::new(Duration::from_secs(60));
        let stale = store.get_or_create(None);
        store.touch(&stale).unwrap().authenticated = true;

        tokio::time::advance(Duration::from_secs(45)).await;
        let fresh = store.get_or_create(None);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(store.prune(), 1);
        assert!(!store.is_authenticated(Some(&stale)));
        assert!(store.touch(&fresh).is_some());
    }
}
