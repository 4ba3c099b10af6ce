use tokio::sync::mpsc;
use url::Url;

/// Identifies one connection attempt. Signals from any epoch other than the
/// session's current one are stale.
pub type Epoch = u64;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection is closed")]
    Closed,
}

/// Socket lifecycle events, in the order the transport observed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSignal {
    pub epoch: Epoch,
    pub event: TransportEvent,
}

/// Where a connection reports its lifecycle events.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: Epoch,
    tx: mpsc::UnboundedSender<SocketSignal>,
}

impl EventSink {
    pub fn new(epoch: Epoch, tx: mpsc::UnboundedSender<SocketSignal>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Returns false once nobody is listening any more.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SocketSignal {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// Write half of a live connection.
pub trait Outbound: Send {
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection. Consumes the handle, so it happens at most once.
    fn close(self: Box<Self>);
}

/// Opens connections. `connect` returns immediately; progress is reported
/// through `events` (`Opened`, then any number of `Frame`s, then `Closed`).
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &Url, events: EventSink) -> Box<dyn Outbound>;
}
