use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use softhouse_types::User;

use crate::provider::{AuthError, AuthProvider, OAuthProvider, Session};

/// Capacity of the per-gate transition channel.
const CHANGE_CAPACITY: usize = 64;

/// Current authentication state as seen by the client.
///
/// `user == None` is only authoritative once `loading` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub loading: bool,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

/// Owns the authenticated-user value and notifies dependents on change.
#[derive(Clone)]
pub struct SessionGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    provider: Arc<dyn AuthProvider>,
    redirect_to: String,
    publisher: Arc<Publisher>,
    resolver: JoinHandle<()>,
}

impl Drop for GateInner {
    fn drop(&mut self) {
        self.resolver.abort();
    }
}

/// Serializes updates so the snapshot and the transition stream never
/// disagree about ordering.
struct Publisher {
    current: Mutex<AuthSnapshot>,
    state: watch::Sender<AuthSnapshot>,
    changes: broadcast::Sender<Option<User>>,
}

impl Publisher {
    fn publish(&self, user: Option<User>) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let next = AuthSnapshot {
            user,
            loading: false,
        };
        if *current == next {
            return;
        }

        let user_changed = current.user != next.user;
        *current = next.clone();
        self.state.send_replace(next.clone());
        if user_changed {
            let _ = self.changes.send(next.user);
        }
    }
}

impl SessionGate {
    /// Begin resolving the current user. Must be called inside a tokio runtime.
    pub fn start(provider: Arc<dyn AuthProvider>, redirect_to: impl Into<String>) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::default());
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let publisher = Arc::new(Publisher {
            current: Mutex::new(AuthSnapshot::default()),
            state,
            changes,
        });

        let resolver = tokio::spawn(resolve(provider.clone(), publisher.clone()));

        Self {
            inner: Arc::new(GateInner {
                provider,
                redirect_to: redirect_to.into(),
                publisher,
                resolver,
            }),
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.publisher.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.publisher.state.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.publisher.state.borrow().loading
    }

    /// Observe the latest snapshot. Intermediate values may be coalesced;
    /// use [`SessionGate::on_auth_change`] to see every transition.
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.publisher.state.subscribe()
    }

    /// Deliver every subsequent user transition to `callback`, in order.
    ///
    /// Delivery stops when the returned [`Subscription`] is dropped.
    pub fn on_auth_change<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(Option<User>) + Send + 'static,
    {
        let mut changes = self.inner.publisher.changes.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(user) => callback(user),
                    Err(RecvError::Lagged(n)) => {
                        warn!("Auth change subscriber lagged by {} transitions", n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription { task: Some(task) }
    }

    /// Start the OAuth redirect flow. The user is resolved later through a
    /// change notification.
    pub async fn sign_in(&self) -> Result<(), AuthError> {
        info!("Starting {} sign-in", OAuthProvider::Google.as_str());
        self.inner
            .provider
            .sign_in_with_oauth(OAuthProvider::Google, &self.inner.redirect_to)
            .await
    }

    /// Invalidate the remote session, then clear the local user even if the
    /// remote call failed.
    pub async fn sign_out(&self) {
        if let Err(e) = self.inner.provider.sign_out().await {
            warn!("Remote sign-out failed, clearing local session anyway: {}", e);
        }
        self.inner.publisher.publish(None);
        info!("Signed out");
    }
}

async fn resolve(provider: Arc<dyn AuthProvider>, publisher: Arc<Publisher>) {
    // Subscribe before the initial lookup so nothing published in between is lost.
    let mut changes = provider.subscribe();

    publisher.publish(initial_user(provider.as_ref()).await);

    loop {
        match changes.recv().await {
            Ok(session) => publisher.publish(session.map(|s| s.user)),
            Err(RecvError::Lagged(n)) => {
                warn!("Auth provider changes lagged by {}, re-resolving session", n);
                publisher.publish(initial_user(provider.as_ref()).await);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn initial_user(provider: &dyn AuthProvider) -> Option<User> {
    match provider.get_session().await {
        Ok(Some(Session { user, .. })) => {
            info!("Resolved existing session for {}", user.email);
            Some(user)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Session lookup failed, continuing signed out: {}", e);
            None
        }
    }
}

/// Deregistration handle returned by [`SessionGate::on_auth_change`].
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
