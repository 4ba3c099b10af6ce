//! Supabase GoTrue identity service over its REST API.
//!
//! Sign-in is a browser redirect: `sign_in_with_oauth` produces the
//! authorize URL and hands it to a redirect handler. The access token that
//! comes back on the redirect target is fed to [`GoTrueAuth::complete_sign_in`].

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use softhouse_types::User;

use crate::provider::{AuthError, AuthProvider, OAuthProvider, Session};

type RedirectHandler = Box<dyn Fn(&Url) + Send + Sync>;

/// Access token claims. The signature is not checked client-side; the token
/// is confirmed against `/auth/v1/user` instead.
#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

pub struct GoTrueAuth {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    on_redirect: RedirectHandler,
    shared: Arc<Shared>,
}

struct Shared {
    session: Mutex<Option<Session>>,
    changes: broadcast::Sender<Option<Session>>,
    expiry: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn replace(self: &Arc<Self>, session: Option<Session>) {
        if let Some(timer) = self
            .expiry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }

        if let Some(expires_at) = session.as_ref().and_then(|s| s.expires_at) {
            let shared = Arc::downgrade(self);
            let delay = (expires_at - Utc::now()).to_std().unwrap_or_default();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(shared) = shared.upgrade() {
                    shared.expire();
                }
            });
            *self.expiry.lock().unwrap_or_else(PoisonError::into_inner) = Some(timer);
        }

        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session.clone();
        let _ = self.changes.send(session);
    }

    fn expire(&self) {
        // May run on the timer task itself, so detach rather than abort.
        drop(self.expiry.lock().unwrap_or_else(PoisonError::into_inner).take());

        let expired = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = expired {
            info!("Session for {} expired", session.user.email);
            let _ = self.changes.send(None);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(timer) = self
            .expiry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
    }
}

impl GoTrueAuth {
    pub fn new(base_url: Url, anon_key: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            http: reqwest::Client::new(),
            base_url,
            anon_key: anon_key.into(),
            on_redirect: Box::new(|url| info!("Open {} to sign in", url)),
            shared: Arc::new(Shared {
                session: Mutex::new(None),
                changes,
                expiry: Mutex::new(None),
            }),
        }
    }

    /// Route authorize URLs somewhere a user can follow them.
    pub fn on_redirect<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Url) + Send + Sync + 'static,
    {
        self.on_redirect = Box::new(handler);
        self
    }

    /// The URL a browser must visit to sign in with `provider`.
    pub fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> Result<Url, AuthError> {
        let mut url = self.base_url.join("auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    /// Finish a redirect sign-in with the access token it produced.
    pub async fn complete_sign_in(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = decode_claims(access_token)?;

        let resp = self
            .http
            .get(self.base_url.join("auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        let remote: GoTrueUser = resp.json().await?;

        if remote.id != claims.sub {
            warn!("Token subject {} differs from user {}", claims.sub, remote.id);
        }

        let user = User {
            id: remote.id,
            email: remote.email.or(claims.email).unwrap_or_default(),
        };
        let session = Session {
            user: user.clone(),
            access_token: access_token.to_string(),
            expires_at: DateTime::<Utc>::from_timestamp(claims.exp, 0),
        };

        info!("Signed in as {}", user.email);
        self.shared.replace(Some(session));
        Ok(user)
    }

    fn current(&self) -> Option<Session> {
        self.shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn decode_claims(token: &str) -> Result<AccessClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;

    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

#[async_trait]
impl AuthProvider for GoTrueAuth {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        match self.current() {
            Some(session) if session.is_expired() => {
                self.shared.expire();
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Option<Session>> {
        self.shared.changes.subscribe()
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        let url = self.authorize_url(provider, redirect_to)?;
        (self.on_redirect)(&url);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(session) = self.current() else {
            return Ok(());
        };

        let result = self
            .http
            .post(self.base_url.join("auth/v1/logout")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await;

        // Local session goes away regardless of what the service said.
        self.shared.replace(None);

        let resp = result?;
        if !resp.status().is_success() {
            return Err(AuthError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
