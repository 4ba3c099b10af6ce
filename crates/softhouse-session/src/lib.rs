//! Connection lifecycle and message log for one authenticated user.
//!
//! [`ChatSession`] is the state machine; [`ChatClient`] runs it on a single
//! task, driven by auth transitions, socket signals and user commands.

pub mod client;
pub mod connection;
pub mod log;
pub mod reconnect;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ChatClient, ChatView};
pub use connection::{DEFAULT_ROOM, WsConnector, chat_endpoint};
pub use log::MessageLog;
pub use reconnect::{NeverReconnect, ReconnectPolicy};
pub use session::{ChatSession, SessionState};
pub use transport::{Connector, Epoch, EventSink, Outbound, SocketSignal, TransportError, TransportEvent};
