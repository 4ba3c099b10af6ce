use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use softhouse_types::User;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid access token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("invalid auth url: {0}")]
    Url(#[from] url::ParseError),

    #[error("auth service rejected the request (HTTP {status})")]
    Rejected { status: u16 },

    #[error("auth provider error: {0}")]
    Provider(String),
}

/// An authenticated session as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp <= Utc::now())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }
}

/// External identity service.
///
/// Change notifications carry the new session (or `None` on sign-out and
/// expiry). Receivers obtained from `subscribe` see every change published
/// after the call.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<Option<Session>>;

    /// Start a redirect-based sign-in. Completion arrives later as a change
    /// notification, never as the return value.
    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}
