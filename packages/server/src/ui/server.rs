//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::usecase::RealtimeHub;

use super::{
    event_handler::EventHandler,
    handler::{
        get_room_detail, get_room_history, get_rooms, get_stats, health_check, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Real-time WebSocket server
///
/// This struct wires the hub and the application's event handler into an
/// axum router and runs it until a shutdown signal arrives.
///
/// # Example
///
/// ```ignore
/// let hub = Arc::new(RealtimeHub::new(config, resolver, history, clock));
/// let server = Server::new(hub, Arc::new(RoomEventHandler));
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    /// RealtimeHub（リアルタイム層のアプリケーション API）
    hub: Arc<RealtimeHub>,
    /// EventHandler（受信フレームの処理）
    handler: Arc<dyn EventHandler>,
}

impl Server {
    /// Create a new Server instance
    pub fn new(hub: Arc<RealtimeHub>, handler: Arc<dyn EventHandler>) -> Self {
        Self { hub, handler }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            hub: self.hub.clone(),
            handler: self.handler.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/stats", get(get_stats))
            .route("/api/rooms", get(get_rooms))
            .route("/api/rooms/{room_id}", get(get_room_detail))
            .route("/api/rooms/{room_id}/history", get(get_room_history))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Run the server on `host:port` until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Hiroba server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws?token=<token>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// On shutdown every connection is removed, which closes its socket, and
    /// the idle sweeper stops.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let app = self.router();
        let sweeper = spawn_idle_sweeper(self.hub.clone());

        let hub = self.hub.clone();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                sweeper.abort();
                hub.shutdown().await;
            })
            .await;

        tracing::info!("Server shutdown complete");
        result
    }
}

/// Periodically remove idle connections
fn spawn_idle_sweeper(hub: Arc<RealtimeHub>) -> tokio::task::JoinHandle<()> {
    let period = hub.config().sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = hub.sweep_idle().await;
            if removed > 0 {
                tracing::info!("Removed {} idle connection(s)", removed);
            }
        }
    })
}
