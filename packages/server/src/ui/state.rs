//! Server state shared by the HTTP and WebSocket handlers.

use std::sync::Arc;

use crate::usecase::RealtimeHub;

use super::event_handler::EventHandler;

/// Shared application state
pub struct AppState {
    /// RealtimeHub（リアルタイム層のアプリケーション API）
    pub hub: Arc<RealtimeHub>,
    /// EventHandler（受信フレームを処理するアプリケーションのハンドラ）
    pub handler: Arc<dyn EventHandler>,
}
