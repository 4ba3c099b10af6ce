pub mod events;
pub mod models;

pub use events::{ClientEnvelope, EnvelopeError, ServerEnvelope};
pub use models::{ConnectionState, Message, MessageId, Role, User};
