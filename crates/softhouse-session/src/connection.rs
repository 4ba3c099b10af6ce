use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::transport::{Connector, EventSink, Outbound, TransportError, TransportEvent};

/// The chat room every connection joins. Not parameterized by user.
pub const DEFAULT_ROOM: &str = "default";

/// Socket address for the fixed room on the backend at `base`.
pub fn chat_endpoint(base: &Url) -> Result<Url, url::ParseError> {
    base.join(&format!("/ws/chat/{}", DEFAULT_ROOM))
}

enum SocketCommand {
    Text(String),
    Close,
}

/// WebSocket transport over tokio-tungstenite. Each connection runs on its
/// own task; the returned handle feeds it outbound frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, endpoint: &Url, events: EventSink) -> Box<dyn Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(endpoint.clone(), events, rx));
        Box::new(WsOutbound { commands: tx })
    }
}

struct WsOutbound {
    commands: mpsc::UnboundedSender<SocketCommand>,
}

impl Outbound for WsOutbound {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.commands
            .send(SocketCommand::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(self: Box<Self>) {
        let _ = self.commands.send(SocketCommand::Close);
    }
}

async fn run_socket(
    endpoint: Url,
    events: EventSink,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
) {
    let epoch = events.epoch();

    let stream = tokio::select! {
        result = tokio_tungstenite::connect_async(endpoint.as_str()) => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("Connection {} to {} failed: {}", epoch, endpoint, e);
                events.emit(TransportEvent::Closed);
                return;
            }
        },
        _ = closed_while_connecting(&mut commands) => {
            debug!("Connection {} closed before it opened", epoch);
            events.emit(TransportEvent::Closed);
            return;
        }
    };

    info!("Connection {} open to {}", epoch, endpoint);
    if !events.emit(TransportEvent::Opened) {
        return;
    }

    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SocketCommand::Text(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        warn!("Connection {} write failed: {}", epoch, e);
                        break;
                    }
                }
                Some(SocketCommand::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection {} read failed: {}", epoch, e);
                    break;
                }
            },
        }
    }

    info!("Connection {} closed", epoch);
    events.emit(TransportEvent::Closed);
}

/// Resolves once the owner asks to close (or drops the handle).
async fn closed_while_connecting(commands: &mut mpsc::UnboundedReceiver<SocketCommand>) {
    loop {
        match commands.recv().await {
            Some(SocketCommand::Text(_)) => debug!("Dropping frame queued before open"),
            Some(SocketCommand::Close) | None => return,
        }
    }
}
