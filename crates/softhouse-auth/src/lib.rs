//! Authentication for the chat client.
//!
//! The rest of the client never talks to an identity service directly: it
//! depends on the [`AuthProvider`] capability and observes the resolved user
//! through a [`SessionGate`].

pub mod gate;
pub mod gotrue;
pub mod memory;
pub mod provider;

pub use gate::{AuthSnapshot, SessionGate, Subscription};
pub use gotrue::GoTrueAuth;
pub use memory::MemoryAuth;
pub use provider::{AuthError, AuthProvider, OAuthProvider, Session};
