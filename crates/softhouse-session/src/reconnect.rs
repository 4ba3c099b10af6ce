use std::time::Duration;

/// Decides whether a closed connection is reopened.
///
/// `attempt` counts closes since the last successful open, starting at 1.
/// Returning `None` leaves the session disconnected.
pub trait ReconnectPolicy: Send {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;
}

/// Stay disconnected after a close.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverReconnect;

impl ReconnectPolicy for NeverReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }
}

impl<F> ReconnectPolicy for F
where
    F: FnMut(u32) -> Option<Duration> + Send,
{
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        self(attempt)
    }
}
