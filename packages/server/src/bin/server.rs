//! Hiroba real-time server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server
//! cargo run --bin hiroba-server -- --host 0.0.0.0 --port 3000 --token s3cret=alice
//! ```

use std::{collections::HashMap, sync::Arc, time::Duration};

use clap::Parser;
use hiroba_server::{
    config::{BackpressurePolicy, RealtimeConfig},
    domain::UserId,
    infrastructure::{identity::TokenTableResolver, repository::InMemoryHistoryStore},
    ui::{RoomEventHandler, Server},
    usecase::RealtimeHub,
};
use hiroba_shared::{logger::setup_logger, time::SystemClock};

#[derive(Parser, Debug)]
#[command(name = "hiroba-server")]
#[command(about = "Real-time rooms, presence, and history over WebSocket", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Maximum number of concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Allow at most one connection per user
    #[arg(long)]
    single_session: bool,

    /// Per-connection outbound queue length
    #[arg(long, default_value = "256")]
    outbound_capacity: usize,

    /// What to do when a connection's outbound queue is full
    #[arg(long, value_enum, default_value = "drop-oldest")]
    backpressure: BackpressurePolicy,

    /// Messages kept per room (0 keeps everything)
    #[arg(long, default_value = "1000")]
    history_retention: usize,

    /// Remove connections silent for this many seconds
    #[arg(long, default_value = "300")]
    idle_timeout_secs: u64,

    /// Keep empty rooms for this many seconds before evicting them
    #[arg(long, default_value = "60")]
    room_grace_secs: u64,

    /// Idle sweep period in seconds
    #[arg(long, default_value = "15")]
    sweep_interval_secs: u64,

    /// Require rooms to be created before they can be joined
    #[arg(long)]
    no_implicit_rooms: bool,

    /// Do not publish presence transitions into rooms
    #[arg(long)]
    no_presence_events: bool,

    /// Accepted token, as TOKEN=USER (repeatable). Without any, the token is
    /// used as the user id.
    #[arg(long = "token", value_parser = parse_token)]
    tokens: Vec<(String, UserId)>,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "debug")]
    log_level: String,
}

impl Args {
    fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            max_connections: self.max_connections,
            single_session: self.single_session,
            outbound_capacity: self.outbound_capacity,
            backpressure: self.backpressure,
            history_retention: Some(self.history_retention).filter(|limit| *limit > 0),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            room_grace_period: Duration::from_secs(self.room_grace_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            implicit_rooms: !self.no_implicit_rooms,
            presence_events: !self.no_presence_events,
        }
    }
}

fn parse_token(value: &str) -> Result<(String, UserId), String> {
    let (token, user) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TOKEN=USER, got '{}'", value))?;
    if token.is_empty() {
        return Err("token must not be empty".to_string());
    }
    let user = UserId::new(user.to_string()).map_err(|e| e.to_string())?;
    Ok((token.to_string(), user))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    // Initialize dependencies in order:
    // 1. Collaborators (history store, identity resolver, clock)
    // 2. RealtimeHub
    // 3. Server
    let config = args.realtime_config();
    tracing::info!("Starting with {:?}", config);

    // 1. Create collaborators
    let history = Arc::new(InMemoryHistoryStore::new(config.history_retention));
    let resolver = if args.tokens.is_empty() {
        tracing::warn!("No --token given: any token is accepted as the user id");
        TokenTableResolver::passthrough()
    } else {
        TokenTableResolver::new(args.tokens.into_iter().collect::<HashMap<_, _>>())
    };

    // 2. Create RealtimeHub
    let hub = Arc::new(RealtimeHub::new(
        config,
        Arc::new(resolver),
        history,
        Arc::new(SystemClock),
    ));

    // 3. Create and run the server
    let server = Server::new(hub, Arc::new(RoomEventHandler));
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
