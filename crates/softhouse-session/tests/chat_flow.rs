/// End-to-end: a real WebSocket chat peer on loopback, driven through the
/// full client (session gate + client loop + tungstenite transport).
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use url::Url;

use softhouse_auth::{MemoryAuth, SessionGate};
use softhouse_session::{ChatClient, ChatView, SessionState, WsConnector, chat_endpoint};
use softhouse_types::{Role, User};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct Peer {
    rooms: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<String>>>,
    live: Arc<AtomicUsize>,
}

async fn chat_upgrade(
    State(peer): State<Peer>,
    Path(room): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    peer.rooms.lock().unwrap().push(room);
    ws.on_upgrade(move |socket| serve(socket, peer))
}

async fn serve(mut socket: WebSocket, peer: Peer) {
    peer.live.fetch_add(1, Ordering::SeqCst);

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        peer.received.lock().unwrap().push(text.as_str().to_owned());

        let envelope: serde_json::Value = match serde_json::from_str(text.as_str()) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let content = envelope["message"].as_str().unwrap_or_default().to_owned();

        if content == "/close" {
            let _ = socket.send(Message::Close(None)).await;
            break;
        }

        let reply = if content == "hello" {
            "hi there".to_string()
        } else {
            format!("echo: {}", content)
        };

        // Frames the client must ignore, then the real reply.
        let ping = serde_json::json!({ "type": "ping" }).to_string();
        let bogus = "{not json".to_string();
        let answer =
            serde_json::json!({ "type": "message", "role": "assistant", "content": reply }).to_string();
        for frame in [ping, bogus, answer] {
            if socket.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    }

    peer.live.fetch_sub(1, Ordering::SeqCst);
}

async fn spawn_peer() -> (Url, Peer) {
    let peer = Peer::default();
    let app = Router::new()
        .route("/ws/chat/{room}", get(chat_upgrade))
        .with_state(peer.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (Url::parse(&format!("ws://{}", addr)).unwrap(), peer)
}

async fn start(auth: Arc<MemoryAuth>) -> (ChatClient, Peer) {
    let (base, peer) = spawn_peer().await;
    let gate = SessionGate::start(auth, "http://localhost:3000");
    let client = ChatClient::spawn(gate, chat_endpoint(&base).unwrap(), Arc::new(WsConnector));
    (client, peer)
}

async fn wait_for(client: &ChatClient, pred: impl FnMut(&ChatView) -> bool) -> ChatView {
    let mut rx = client.watch();
    let view = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("view never matched")
        .unwrap()
        .clone();
    view
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

fn log_of(view: &ChatView) -> Vec<(Role, String)> {
    view.messages
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect()
}

#[tokio::test]
async fn sign_in_send_and_receive() {
    let auth = Arc::new(MemoryAuth::new());
    let (client, peer) = start(auth.clone()).await;

    let view = wait_for(&client, |v| !v.loading).await;
    assert_eq!(view.user, None);
    assert!(!view.connection.is_connected());

    auth.set_user(User::new("u1", "a@x.com"));
    let view = wait_for(&client, |v| v.connection.is_connected()).await;
    assert_eq!(view.user, Some(User::new("u1", "a@x.com")));
    assert_eq!(peer.rooms.lock().unwrap().as_slice(), ["default"]);

    client.send("hello");
    let view = wait_for(&client, |v| v.messages.len() == 2).await;
    assert_eq!(
        log_of(&view),
        vec![
            (Role::User, "hello".to_string()),
            (Role::Assistant, "hi there".to_string()),
        ]
    );
    assert_eq!(
        peer.received.lock().unwrap().as_slice(),
        [r#"{"message":"hello"}"#]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn blank_input_is_never_transmitted() {
    let auth = Arc::new(MemoryAuth::with_user(User::new("u1", "a@x.com")));
    let (client, peer) = start(auth).await;
    wait_for(&client, |v| v.connection.is_connected()).await;

    client.send("   ");
    client.send("ping me");
    let view = wait_for(&client, |v| v.messages.len() == 2).await;
    assert_eq!(view.messages[0].content, "ping me");
    assert_eq!(peer.received.lock().unwrap().len(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn remote_close_disconnects_and_blocks_sends() {
    let auth = Arc::new(MemoryAuth::with_user(User::new("u1", "a@x.com")));
    let (client, peer) = start(auth).await;
    wait_for(&client, |v| v.connection.is_connected()).await;

    client.send("/close");
    let view = wait_for(&client, |v| v.state == SessionState::Closed).await;
    assert!(!view.connection.is_connected());
    assert_eq!(log_of(&view), vec![(Role::User, "/close".to_string())]);

    client.send("x");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(log_of(&client.view()), vec![(Role::User, "/close".to_string())]);
    assert_eq!(peer.received.lock().unwrap().as_slice(), [r#"{"message":"/close"}"#]);

    client.shutdown().await;
}

#[tokio::test]
async fn sign_out_then_in_starts_fresh_connection() {
    let auth = Arc::new(MemoryAuth::with_user(User::new("u1", "a@x.com")));
    let (client, peer) = start(auth.clone()).await;
    wait_for(&client, |v| v.connection.is_connected()).await;

    client.send("hello");
    wait_for(&client, |v| v.messages.len() == 2).await;

    client.sign_out().await;
    let view = wait_for(&client, |v| v.user.is_none()).await;
    assert!(view.messages.is_empty());
    assert!(!view.connection.is_connected());
    eventually(|| peer.live.load(Ordering::SeqCst) == 0).await;

    auth.set_user(User::new("u1", "a@x.com"));
    let view = wait_for(&client, |v| v.connection.is_connected()).await;
    assert!(view.messages.is_empty());
    assert_eq!(peer.rooms.lock().unwrap().len(), 2);
    eventually(|| peer.live.load(Ordering::SeqCst) == 1).await;

    client.shutdown().await;
    eventually(|| peer.live.load(Ordering::SeqCst) == 0).await;
}

#[tokio::test]
async fn switching_accounts_keeps_one_live_socket() {
    let auth = Arc::new(MemoryAuth::with_user(User::new("u1", "a@x.com")));
    let (client, peer) = start(auth.clone()).await;
    wait_for(&client, |v| v.connection.is_connected()).await;
    client.send("from u1");
    wait_for(&client, |v| v.messages.len() == 2).await;

    auth.set_user(User::new("u2", "b@x.com"));
    let view = wait_for(&client, |v| {
        v.user.as_ref().is_some_and(|u| u.id == "u2") && v.connection.is_connected()
    })
    .await;
    assert!(view.messages.is_empty());
    eventually(|| peer.live.load(Ordering::SeqCst) == 1).await;

    client.shutdown().await;
}
