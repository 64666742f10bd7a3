//! WebSocket client session management.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use hiroba_shared::protocol::{ClientFrame, ServerFrame};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, protocol::Message},
};

use crate::{
    command::parse_command,
    domain::handshake_error,
    error::ClientError,
    formatter::MessageFormatter,
    state::{Action, ClientState},
    ui::redisplay_prompt,
};

/// Keepalive period, well inside the server's default idle timeout
const PING_INTERVAL: Duration = Duration::from_secs(30);

type Sink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

fn show(text: &str) {
    print!("{}", text);
    redisplay_prompt();
}

async fn send_frame(write: &mut Sink, frame: &ClientFrame) -> Result<(), ClientError> {
    let json =
        serde_json::to_string(frame).map_err(|e| ClientError::ConnectionError(e.to_string()))?;
    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| ClientError::ConnectionError(e.to_string()))
}

/// Run one WebSocket session
///
/// Returns `Ok(())` when the user quits and an error when the connection is
/// refused or lost. Rooms joined in earlier sessions are rejoined and caught
/// up from the last sequence seen in each.
pub async fn run_client_session(
    url: &str,
    token: &str,
    state: &mut ClientState,
    input: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), ClientError> {
    let url = format!("{}?token={}", url, token);

    let (ws_stream, _response) = connect_async(&url).await.map_err(|e| match e {
        WsError::Http(response) => handshake_error(response.status().as_u16(), token),
        other => ClientError::ConnectionError(other.to_string()),
    })?;
    tracing::info!("Connected to {}", url);

    let (mut write, mut read) = ws_stream.split();

    for frame in state.resume_frames() {
        send_frame(&mut write, &frame).await?;
    }

    let mut keepalive =
        tokio::time::interval_at(tokio::time::Instant::now() + PING_INTERVAL, PING_INTERVAL);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                send_frame(&mut write, &ClientFrame::Ping).await?;
            }
            line = input.recv() => {
                let Some(line) = line else {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                };
                match parse_command(&line) {
                    Ok(command) => match state.apply(command) {
                        Action::Send(frame) => send_frame(&mut write, &frame).await?,
                        Action::Print(text) => show(&text),
                        Action::Quit => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    },
                    Err(e) => show(&MessageFormatter::format_notice(&e.to_string())),
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerFrame>(text.as_str()) {
                        Ok(frame) => {
                            for action in state.handle(frame) {
                                match action {
                                    Action::Send(frame) => send_frame(&mut write, &frame).await?,
                                    Action::Print(text) => show(&text),
                                    Action::Quit => {}
                                }
                            }
                        }
                        Err(_) => show(&MessageFormatter::format_raw_message(text.as_str())),
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    show(&MessageFormatter::format_binary_message(data.len()));
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("Server closed the connection");
                    return Err(ClientError::ConnectionError(
                        "server closed the connection".to_string(),
                    ));
                }
                Some(Err(e)) => {
                    tracing::warn!("WebSocket read error: {}", e);
                    return Err(ClientError::ConnectionError(e.to_string()));
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
