use std::sync::{Arc, Mutex};

use url::Url;

use crate::transport::{Connector, EventSink, Outbound, TransportError, TransportEvent};

/// What one fake connection saw.
#[derive(Debug, Default)]
pub struct FakeSocket {
    pub endpoint: String,
    pub sent: Vec<String>,
    pub closes: usize,
}

/// Records every connection instead of touching the network. Tests drive
/// lifecycle events through the recorded sinks.
#[derive(Clone, Default)]
pub struct FakeConnector {
    connections: Arc<Mutex<Vec<(EventSink, Arc<Mutex<FakeSocket>>)>>>,
}

impl FakeConnector {
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn emit(&self, index: usize, event: TransportEvent) {
        let connections = self.connections.lock().unwrap();
        connections[index].0.emit(event);
    }

    pub fn socket(&self, index: usize) -> Arc<Mutex<FakeSocket>> {
        self.connections.lock().unwrap()[index].1.clone()
    }

    pub fn sent(&self, index: usize) -> Vec<String> {
        self.socket(index).lock().unwrap().sent.clone()
    }

    pub fn closes(&self, index: usize) -> usize {
        self.socket(index).lock().unwrap().closes
    }
}

impl Connector for FakeConnector {
    fn connect(&self, endpoint: &Url, events: EventSink) -> Box<dyn Outbound> {
        let socket = Arc::new(Mutex::new(FakeSocket {
            endpoint: endpoint.to_string(),
            ..FakeSocket::default()
        }));
        self.connections
            .lock()
            .unwrap()
            .push((events, socket.clone()));
        Box::new(FakeOutbound { socket })
    }
}

struct FakeOutbound {
    socket: Arc<Mutex<FakeSocket>>,
}

impl Outbound for FakeOutbound {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.socket.lock().unwrap().sent.push(text);
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.socket.lock().unwrap().closes += 1;
    }
}
