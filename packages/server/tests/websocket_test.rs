//! End-to-end tests over a real socket: WebSocket frames through
//! tokio-tungstenite and the HTTP API through reqwest.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use hiroba_server::{
    config::RealtimeConfig,
    infrastructure::{identity::TokenTableResolver, repository::InMemoryHistoryStore},
    ui::{RoomEventHandler, Server},
    usecase::RealtimeHub,
};
use hiroba_shared::{
    protocol::{ClientFrame, ServerFrame},
    time::SystemClock,
};
use serde_json::json;
use tokio::{net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper struct to manage an in-process server lifecycle
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a server on an ephemeral port
    async fn start(config: RealtimeConfig) -> Self {
        let hub = Arc::new(RealtimeHub::new(
            config,
            Arc::new(TokenTableResolver::passthrough()),
            Arc::new(InMemoryHistoryStore::new(None)),
            Arc::new(SystemClock),
        ));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();

        let server = Server::new(hub, Arc::new(RoomEventHandler));
        tokio::spawn(async move {
            let _ = server
                .serve(listener, async move {
                    let _ = signal.await;
                })
                .await;
        });

        TestServer {
            addr,
            shutdown: Some(shutdown),
        }
    }

    fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Connect and consume the `connected` frame
    async fn connect(&self, token: &str) -> Client {
        let (mut client, _) = connect_async(self.ws_url(token)).await.unwrap();
        match next_frame(&mut client).await {
            ServerFrame::Connected { user_id, .. } => assert_eq!(user_id, token),
            other => panic!("expected connected frame, got {:?}", other),
        }
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn quiet() -> RealtimeConfig {
    RealtimeConfig {
        presence_events: false,
        ..RealtimeConfig::default()
    }
}

async fn send(client: &mut Client, frame: &ClientFrame) {
    let json = serde_json::to_string(frame).unwrap();
    client.send(Message::Text(json.into())).await.unwrap();
}

async fn next_frame(client: &mut Client) -> ServerFrame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn next_frames(client: &mut Client, count: usize) -> Vec<ServerFrame> {
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        frames.push(next_frame(client).await);
    }
    frames
}

async fn join(client: &mut Client, room: &str) {
    send(
        client,
        &ClientFrame::Join {
            room: room.to_string(),
        },
    )
    .await;
    assert!(matches!(
        next_frame(client).await,
        ServerFrame::Joined { .. }
    ));
}

#[tokio::test]
async fn test_publish_reaches_all_members_over_websocket() {
    // テスト項目: WebSocket 経由の publish が送信者と他のメンバーの両方に届く
    // given (前提条件):
    let server = TestServer::start(quiet()).await;
    let mut alice = server.connect("alice").await;
    let mut bob = server.connect("bob").await;
    join(&mut alice, "lobby").await;
    join(&mut bob, "lobby").await;

    // when (操作):
    send(
        &mut alice,
        &ClientFrame::Publish {
            room: "lobby".to_string(),
            payload: json!({ "text": "hi" }),
        },
    )
    .await;

    // then (期待する結果):
    let alice_frames = next_frames(&mut alice, 2).await;
    assert!(alice_frames.contains(&ServerFrame::Published {
        room: "lobby".to_string(),
        sequence: 1
    }));
    assert!(alice_frames.iter().any(|frame| matches!(
        frame,
        ServerFrame::Message(message) if message.sequence == 1
    )));
    let ServerFrame::Message(message) = next_frame(&mut bob).await else {
        panic!("expected a message frame");
    };
    assert_eq!(message.sender, "alice");
    assert_eq!(message.payload, json!({ "text": "hi" }));
}

#[tokio::test]
async fn test_history_request_over_websocket() {
    // テスト項目: history フレームで取りこぼしを取得できる
    // given (前提条件):
    let server = TestServer::start(quiet()).await;
    let mut alice = server.connect("alice").await;
    for text in ["one", "two", "three"] {
        send(
            &mut alice,
            &ClientFrame::Publish {
                room: "lobby".to_string(),
                payload: json!(text),
            },
        )
        .await;
        assert!(matches!(
            next_frame(&mut alice).await,
            ServerFrame::Published { .. }
        ));
    }

    // when (操作):
    send(
        &mut alice,
        &ClientFrame::History {
            room: "lobby".to_string(),
            since: 1,
            limit: None,
        },
    )
    .await;

    // then (期待する結果):
    let ServerFrame::History { messages, .. } = next_frame(&mut alice).await else {
        panic!("expected a history frame");
    };
    assert_eq!(
        messages.iter().map(|m| m.sequence).collect::<Vec<_>>(),
        vec![2, 3]
    );
}

#[tokio::test]
async fn test_missing_token_is_rejected_with_401() {
    // テスト項目: トークンなしの接続はアップグレード前に 401 で拒否される
    // given (前提条件):
    let server = TestServer::start(quiet()).await;

    // when (操作):
    let result = connect_async(format!("ws://{}/ws", server.addr)).await;

    // then (期待する結果):
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("connection should have been rejected"),
    }
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    // テスト項目: 不正なフレームはエラーフレームを返した後に切断される
    // given (前提条件):
    let server = TestServer::start(quiet()).await;
    let mut alice = server.connect("alice").await;

    // when (操作):
    alice
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();

    // then (期待する結果):
    match next_frame(&mut alice).await {
        ServerFrame::Error { code, .. } => assert_eq!(code, "protocol-violation"),
        other => panic!("expected an error frame, got {:?}", other),
    }
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match alice.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn test_http_api_reports_rooms_and_history() {
    // テスト項目: HTTP API でヘルスチェック・統計・ルーム詳細・履歴が取得できる
    // given (前提条件):
    let server = TestServer::start(quiet()).await;
    let mut alice = server.connect("alice").await;
    join(&mut alice, "lobby").await;
    send(
        &mut alice,
        &ClientFrame::Publish {
            room: "lobby".to_string(),
            payload: json!("hi"),
        },
    )
    .await;
    next_frames(&mut alice, 2).await;
    let http = reqwest::Client::new();

    // when (操作):
    let health: serde_json::Value = http
        .get(server.http_url("/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let stats: serde_json::Value = http
        .get(server.http_url("/api/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let detail: serde_json::Value = http
        .get(server.http_url("/api/rooms/lobby"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let history: serde_json::Value = http
        .get(server.http_url("/api/rooms/lobby/history?since=0"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let unknown = http
        .get(server.http_url("/api/rooms/nowhere"))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(health, json!({ "status": "ok" }));
    assert_eq!(stats["connections"], json!(1));
    assert_eq!(detail["sequence"], json!(1));
    assert_eq!(detail["members"][0]["user_id"], json!("alice"));
    assert_eq!(history["messages"][0]["payload"], json!("hi"));
    assert_eq!(unknown.status().as_u16(), 404);
}

#[tokio::test]
async fn test_ping_keeps_connection_past_idle_timeout() {
    // テスト項目: ping を送り続けるコネクションは idle タイムアウトを過ぎても切断されず、黙っているコネクションは切断される
    // given (前提条件):
    let server = TestServer::start(RealtimeConfig {
        idle_timeout: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
        ..quiet()
    })
    .await;
    let mut talker = server.connect("alice").await;
    let mut silent = server.connect("bob").await;

    // when (操作):
    for _ in 0..10 {
        send(&mut talker, &ClientFrame::Ping).await;
        assert_eq!(next_frame(&mut talker).await, ServerFrame::Pong);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // then (期待する結果):
    send(&mut talker, &ClientFrame::Ping).await;
    assert_eq!(next_frame(&mut talker).await, ServerFrame::Pong);
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match silent.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
