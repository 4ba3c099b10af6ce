use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use softhouse_types::User;

use crate::provider::{AuthError, AuthProvider, OAuthProvider, Session};

/// In-process identity service.
///
/// Used by tests and by the offline demo mode of the terminal client, where
/// a sign-in request completes immediately as a fixed demo user.
pub struct MemoryAuth {
    session: Mutex<Option<Session>>,
    changes: broadcast::Sender<Option<Session>>,
    demo_user: Option<User>,
    fail_get_session: AtomicBool,
    fail_sign_out: AtomicBool,
    sign_in_requests: Mutex<Vec<(OAuthProvider, String)>>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            session: Mutex::new(None),
            changes,
            demo_user: None,
            fail_get_session: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            sign_in_requests: Mutex::new(Vec::new()),
        }
    }

    /// Start with an existing session for `user`.
    pub fn with_user(user: User) -> Self {
        let auth = Self::new();
        *auth.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session_for(user));
        auth
    }

    /// Make sign-in requests complete immediately as `user`.
    pub fn signing_in_as(mut self, user: User) -> Self {
        self.demo_user = Some(user);
        self
    }

    /// Simulate an external sign-in (or account switch).
    pub fn set_user(&self, user: User) {
        self.replace(Some(session_for(user)));
    }

    /// Simulate an external sign-out or session expiry.
    pub fn clear_session(&self) {
        self.replace(None);
    }

    pub fn fail_next_get_session(&self) {
        self.fail_get_session.store(true, Ordering::Release);
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::Release);
    }

    pub fn sign_in_requests(&self) -> Vec<(OAuthProvider, String)> {
        self.sign_in_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, session: Option<Session>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session.clone();
        let _ = self.changes.send(session);
    }
}

fn session_for(user: User) -> Session {
    Session {
        access_token: format!("memory-{}", user.id),
        user,
        expires_at: None,
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        if self.fail_get_session.swap(false, Ordering::AcqRel) {
            return Err(AuthError::Provider("session lookup unavailable".into()));
        }
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<Option<Session>> {
        self.changes.subscribe()
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        self.sign_in_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((provider, redirect_to.to_string()));

        if let Some(user) = self.demo_user.clone() {
            info!("Demo sign-in as {}", user.email);
            self.set_user(user);
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.fail_sign_out.load(Ordering::Acquire) {
            return Err(AuthError::Provider("sign-out unavailable".into()));
        }
        self.clear_session();
        Ok(())
    }
}
