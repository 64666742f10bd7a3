//! WebSocket connection handlers.
//!
//! ## 処理の流れ
//!
//! 1. クエリの `token` で Identity Resolver に問い合わせ、Registry に登録
//!    （拒否された場合はアップグレードせずに 401 / 409 / 503 を返す）
//! 2. アップグレード後、受信タスクと送信タスク（pusher）を起動
//! 3. 受信したテキストフレームを `ClientFrame` に変換して EventHandler に渡す
//! 4. どちらかのタスクが終了したら切断処理（冪等）を行う
//!
//! 不正な JSON とバイナリフレームはプロトコル違反として扱い、エラーフレームを
//! 送ってから切断します。

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use hiroba_shared::protocol::{ClientFrame, MessageFrame, ServerFrame};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectRequest, RealtimeError},
    infrastructure::registry::{OutboundReceiver, RemovalReason},
    ui::{event_handler::Session, state::AppState},
    usecase::Admission,
};

use super::status_for;

/// How long the pusher may take to flush its last frames after removal
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let request = ConnectRequest { token: query.token };

    match state.hub.connect(&request).await {
        Ok(admission) => {
            let connection = admission.connection_id;
            let state_on_failure = state.clone();
            Ok(ws
                .on_failed_upgrade(move |e| {
                    tracing::warn!("WebSocket upgrade for {} failed: {}", connection, e);
                    tokio::spawn(async move {
                        state_on_failure
                            .hub
                            .disconnect(connection, RemovalReason::TransportError)
                            .await;
                    });
                })
                .on_upgrade(move |socket| handle_socket(socket, state, admission)))
        }
        Err(e) => {
            tracing::warn!("Connection rejected: {}", e);
            Err(status_for(&e))
        }
    }
}

/// Spawns a task that pushes room messages and handler replies to the
/// WebSocket sink.
///
/// Replies are sent first when both are ready. Once the outbound queue is
/// closed (the connection was removed, or the disconnect backpressure policy
/// fired) pending replies are flushed, a close frame is sent, and the task
/// ends.
fn pusher_loop(
    mut outbound: OutboundReceiver,
    mut replies: mpsc::UnboundedReceiver<ServerFrame>,
    mut sink: SplitSink<WebSocket, WsMessage>,
) -> tokio::task::JoinHandle<RemovalReason> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                Some(frame) = replies.recv() => frame,
                message = outbound.recv() => match message {
                    Some(message) => ServerFrame::Message(MessageFrame::from(message.as_ref())),
                    None => {
                        while let Ok(frame) = replies.try_recv() {
                            if send_frame(&mut sink, &frame).await.is_err() {
                                break;
                            }
                        }
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return RemovalReason::SlowConsumer;
                    }
                },
            };
            if let Err(e) = send_frame(&mut sink, &frame).await {
                tracing::debug!("WebSocket send failed: {}", e);
                return RemovalReason::TransportError;
            }
        }
    })
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => sink.send(WsMessage::Text(json.into())).await,
        Err(e) => {
            tracing::error!("Failed to encode frame: {}", e);
            Ok(())
        }
    }
}

/// Read frames until the client leaves or misbehaves
async fn receive_loop(
    mut inbound: SplitStream<WebSocket>,
    state: Arc<AppState>,
    session: Session,
) -> RemovalReason {
    while let Some(message) = inbound.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("WebSocket error on {}: {}", session.connection_id(), e);
                return RemovalReason::TransportError;
            }
        };
        state.hub.touch(session.connection_id());

        match message {
            WsMessage::Text(text) => {
                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        return violation(&session, format!("malformed frame: {}", e));
                    }
                };
                tracing::debug!("Received from {}: {:?}", session.connection_id(), frame);

                if let Err(e) = state.handler.on_frame(&state.hub, &session, frame).await {
                    if let RealtimeError::ProtocolViolation(reason) = e {
                        return violation(&session, reason);
                    }
                    tracing::debug!("Frame from {} failed: {}", session.connection_id(), e);
                    session.reply(ServerFrame::from(&e));
                }
            }
            WsMessage::Binary(_) => {
                return violation(&session, "binary frames are not supported".to_string());
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                // answered by the WebSocket layer
            }
            WsMessage::Close(_) => {
                tracing::info!("Client {} requested close", session.connection_id());
                return RemovalReason::ClientClosed;
            }
        }
    }
    RemovalReason::ClientClosed
}

fn violation(session: &Session, reason: String) -> RemovalReason {
    tracing::warn!(
        "Protocol violation from {}: {}",
        session.connection_id(),
        reason
    );
    session.reply(ServerFrame::from(&RealtimeError::ProtocolViolation(reason)));
    RemovalReason::ProtocolViolation
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, admission: Admission) {
    let Admission {
        connection_id,
        user_id,
        receiver,
    } = admission;
    let (sink, inbound) = socket.split();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let session = Session::new(connection_id, user_id.clone(), reply_tx);

    session.reply(ServerFrame::Connected {
        connection_id: connection_id.to_string(),
        user_id: user_id.as_str().to_string(),
    });
    state.handler.on_connect(&state.hub, &session).await;

    let mut send_task = pusher_loop(receiver, reply_rx, sink);
    let mut recv_task = tokio::spawn(receive_loop(inbound, state.clone(), session.clone()));

    // If any one of the tasks completes, tear the connection down
    let reason = tokio::select! {
        reason = &mut recv_task => {
            let reason = reason.unwrap_or(RemovalReason::TransportError);
            state.hub.disconnect(connection_id, reason).await;
            // removal closed the outbound queue; let the pusher flush
            if tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
            reason
        }
        reason = &mut send_task => {
            recv_task.abort();
            let reason = reason.unwrap_or(RemovalReason::TransportError);
            state.hub.disconnect(connection_id, reason).await;
            reason
        }
    };

    state.handler.on_disconnect(&state.hub, &session).await;
    tracing::info!("Client {} ('{}') disconnected: {:?}", connection_id, user_id, reason);
}
