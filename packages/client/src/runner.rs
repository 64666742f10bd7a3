//! Client execution logic with reconnection support.

use std::time::Duration;

use crate::{
    domain::{next_reconnect_count, should_attempt_reconnect, should_exit_immediately},
    error::ClientError,
    session::run_client_session,
    state::ClientState,
    ui::spawn_line_reader,
};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Run the WebSocket client with reconnection logic
pub async fn run_client(url: String, token: String) -> Result<(), ClientError> {
    let mut input = spawn_line_reader();
    let mut state = ClientState::new();
    let mut reconnect_count = 0;

    loop {
        tracing::info!(
            "Attempting to connect to {} (attempt {}/{})",
            url,
            reconnect_count + 1,
            MAX_RECONNECT_ATTEMPTS
        );

        match run_client_session(&url, &token, &mut state, &mut input).await {
            Ok(()) => {
                tracing::info!("Client session ended normally");
                break;
            }
            Err(e) => {
                if should_exit_immediately(&e) {
                    tracing::error!("{}. Exiting.", e);
                    return Err(e);
                }

                tracing::warn!("Connection lost: {}", e);
                reconnect_count = next_reconnect_count(reconnect_count, state.take_connected());

                if !should_attempt_reconnect(&e, reconnect_count, MAX_RECONNECT_ATTEMPTS) {
                    tracing::error!(
                        "Failed to reconnect after {} attempts. Exiting.",
                        MAX_RECONNECT_ATTEMPTS
                    );
                    return Err(e);
                }

                tracing::info!(
                    "Reconnecting in {} seconds... (attempt {}/{})",
                    RECONNECT_INTERVAL_SECS,
                    reconnect_count + 1,
                    MAX_RECONNECT_ATTEMPTS
                );

                tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)).await;
            }
        }
    }

    Ok(())
}
