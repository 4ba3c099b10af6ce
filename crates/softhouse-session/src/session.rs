use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use softhouse_types::{ClientEnvelope, ConnectionState, Message, MessageId, Role, ServerEnvelope, User};

use crate::log::MessageLog;
use crate::transport::{Connector, Epoch, EventSink, Outbound, SocketSignal, TransportEvent};

/// Connection lifecycle for the current identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No user, no socket, empty log.
    #[default]
    Idle,
    Connecting,
    Open,
    /// The transport closed. Stays here until the identity changes or a
    /// reconnect is requested.
    Closed,
}

impl SessionState {
    pub fn connection(self) -> ConnectionState {
        match self {
            Self::Open => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Owns one socket and its message log for the current user.
///
/// Every mutation goes through `set_user`, `send` or `handle`, so the log's
/// order is exactly the order those calls were made in.
pub struct ChatSession {
    endpoint: Url,
    connector: Arc<dyn Connector>,
    signals: mpsc::UnboundedSender<SocketSignal>,
    user: Option<User>,
    state: SessionState,
    epoch: Epoch,
    outbound: Option<Box<dyn Outbound>>,
    log: MessageLog,
}

impl ChatSession {
    /// Transport signals for this session are delivered to `signals`; feed
    /// them back through [`ChatSession::handle`].
    pub fn new(
        endpoint: Url,
        connector: Arc<dyn Connector>,
        signals: mpsc::UnboundedSender<SocketSignal>,
    ) -> Self {
        Self {
            endpoint,
            connector,
            signals,
            user: None,
            state: SessionState::Idle,
            epoch: 0,
            outbound: None,
            log: MessageLog::new(),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.connection()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    /// Apply an identity transition. Any change tears down the current
    /// connection and log; a present user then gets a fresh connection.
    pub fn set_user(&mut self, user: Option<User>) {
        if self.user == user {
            return;
        }

        self.teardown();
        self.user = user;

        if let Some(user) = &self.user {
            info!("Session started for {}", user.email);
            self.open();
        }
    }

    /// Replace a closed connection with a fresh one. The new connection
    /// starts with an empty log. Returns false when there is nothing to
    /// reconnect.
    pub fn reconnect(&mut self) -> bool {
        if self.user.is_none() || self.state != SessionState::Closed {
            return false;
        }
        self.teardown();
        self.open();
        true
    }

    /// Submit a user turn.
    ///
    /// Blank input and input while no socket is open are ignored. Otherwise
    /// the message is echoed into the log before it is transmitted.
    pub fn send(&mut self, content: &str) -> Option<MessageId> {
        if content.trim().is_empty() {
            debug!("Ignoring blank message");
            return None;
        }
        if self.state != SessionState::Open {
            debug!("Ignoring send while {:?}", self.state);
            return None;
        }
        let outbound = self.outbound.as_mut()?;

        let id = self.log.push(Role::User, content).id;

        match ClientEnvelope::new(content).to_json() {
            Ok(frame) => {
                if let Err(e) = outbound.send_text(frame) {
                    warn!("Message {} was not transmitted: {}", id, e);
                }
            }
            Err(e) => warn!("Message {} could not be encoded: {}", id, e),
        }

        Some(id)
    }

    /// Single entry point for transport events.
    pub fn handle(&mut self, signal: SocketSignal) {
        if signal.epoch != self.epoch || self.outbound.is_none() {
            debug!(
                "Dropping {:?} from stale connection {}",
                signal.event, signal.epoch
            );
            return;
        }

        match (self.state, signal.event) {
            (SessionState::Connecting, TransportEvent::Opened) => {
                self.state = SessionState::Open;
            }
            (SessionState::Open, TransportEvent::Frame(text)) => self.receive(&text),
            (_, TransportEvent::Closed) => {
                // The transport is already gone; never close it a second time.
                self.outbound = None;
                self.state = SessionState::Closed;
                info!("Connection {} closed by transport", self.epoch);
            }
            (state, event) => debug!("Ignoring {:?} while {:?}", event, state),
        }
    }

    /// Close the socket and forget the user.
    pub fn dispose(&mut self) {
        self.teardown();
        self.user = None;
    }

    fn receive(&mut self, text: &str) {
        match ServerEnvelope::parse(text) {
            Ok(ServerEnvelope::Message { role, content }) => {
                self.log.push(role, content);
            }
            Ok(ServerEnvelope::Other) => debug!("Ignoring non-message frame"),
            Err(e) => debug!("Dropping frame: {}", e),
        }
    }

    fn open(&mut self) {
        self.epoch += 1;
        self.state = SessionState::Connecting;
        let events = EventSink::new(self.epoch, self.signals.clone());
        self.outbound = Some(self.connector.connect(&self.endpoint, events));
        info!("Connection {} opening to {}", self.epoch, self.endpoint);
    }

    /// Release the current connection and log. Bumping the epoch makes any
    /// signal still in flight from the old connection stale.
    fn teardown(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            outbound.close();
        }
        if self.state != SessionState::Idle {
            self.epoch += 1;
        }
        self.log.clear();
        self.state = SessionState::Idle;
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            outbound.close();
        }
    }
}
