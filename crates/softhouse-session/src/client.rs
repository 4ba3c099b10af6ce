use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use softhouse_auth::{AuthError, SessionGate};
use softhouse_types::{ConnectionState, Message, User};

use crate::reconnect::{NeverReconnect, ReconnectPolicy};
use crate::session::{ChatSession, SessionState};
use crate::transport::{Connector, Epoch, SocketSignal};

/// Everything the presentation layer renders. Published after every event
/// the client loop processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatView {
    pub user: Option<User>,
    pub loading: bool,
    pub state: SessionState,
    pub connection: ConnectionState,
    pub messages: Vec<Message>,
}

impl Default for ChatView {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
            state: SessionState::Idle,
            connection: ConnectionState::Disconnected,
            messages: Vec::new(),
        }
    }
}

enum Command {
    Send(String),
    Shutdown,
}

/// Runs a [`ChatSession`] on its own task, driven by the session gate.
pub struct ChatClient {
    gate: SessionGate,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<ChatView>,
    task: Option<JoinHandle<()>>,
}

impl ChatClient {
    pub fn spawn(gate: SessionGate, endpoint: Url, connector: Arc<dyn Connector>) -> Self {
        Self::spawn_with_policy(gate, endpoint, connector, Box::new(NeverReconnect))
    }

    pub fn spawn_with_policy(
        gate: SessionGate,
        endpoint: Url,
        connector: Arc<dyn Connector>,
        policy: Box<dyn ReconnectPolicy>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ChatView::default());

        let session = ChatSession::new(endpoint, connector, signal_tx);
        let task = tokio::spawn(run(
            session,
            gate.clone(),
            signal_rx,
            command_rx,
            view_tx,
            policy,
        ));

        Self {
            gate,
            commands: command_tx,
            view: view_rx,
            task: Some(task),
        }
    }

    /// Queue a user turn. Ignored unless a connection is open when the loop
    /// gets to it.
    pub fn send(&self, content: impl Into<String>) {
        let _ = self.commands.send(Command::Send(content.into()));
    }

    pub async fn sign_in(&self) -> Result<(), AuthError> {
        self.gate.sign_in().await
    }

    pub async fn sign_out(&self) {
        self.gate.sign_out().await
    }

    pub fn view(&self) -> ChatView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ChatView> {
        self.view.clone()
    }

    /// Stop the loop and close any live connection.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    mut session: ChatSession,
    gate: SessionGate,
    mut signals: mpsc::UnboundedReceiver<SocketSignal>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<ChatView>,
    mut policy: Box<dyn ReconnectPolicy>,
) {
    // Subscribe before reading the snapshot so no transition slips between them.
    let (auth_tx, mut auth_rx) = mpsc::unbounded_channel();
    let subscription = gate.on_auth_change(move |user| {
        let _ = auth_tx.send(user);
    });
    let mut snapshots = gate.watch();

    let snapshot = snapshots.borrow_and_update().clone();
    let mut loading = snapshot.loading;
    if !loading {
        session.set_user(snapshot.user);
    }
    publish(&view, &session, loading);

    let retry = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(retry);
    let mut retry_epoch: Option<Epoch> = None;
    let mut attempts: u32 = 0;

    loop {
        tokio::select! {
            Some(user) = auth_rx.recv() => {
                session.set_user(user);
                retry_epoch = None;
                attempts = 0;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                loading = snapshots.borrow_and_update().loading;
            }
            Some(signal) = signals.recv() => {
                let before = session.state();
                session.handle(signal);
                match session.state() {
                    SessionState::Open => attempts = 0,
                    SessionState::Closed if before != SessionState::Closed => {
                        attempts += 1;
                        if let Some(delay) = policy.next_delay(attempts) {
                            info!("Reconnecting in {:?} (attempt {})", delay, attempts);
                            retry.as_mut().reset(Instant::now() + delay);
                            retry_epoch = Some(session.epoch());
                        }
                    }
                    _ => {}
                }
            }
            () = &mut retry, if retry_epoch.is_some() => {
                if retry_epoch.take() == Some(session.epoch()) {
                    session.reconnect();
                }
            }
            command = commands.recv() => match command {
                Some(Command::Send(content)) => {
                    session.send(&content);
                }
                Some(Command::Shutdown) | None => break,
            },
        }

        publish(&view, &session, loading);
    }

    drop(subscription);
    session.dispose();
    publish(&view, &session, loading);
    debug!("Chat client loop stopped");
}

fn publish(view: &watch::Sender<ChatView>, session: &ChatSession, loading: bool) {
    let next = ChatView {
        user: session.user().cloned(),
        loading,
        state: session.state(),
        connection: session.connection(),
        messages: session.messages().to_vec(),
    };
    view.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
