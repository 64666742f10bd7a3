//! Terminal client for the Hiroba rooms server.
//!
//! Connects with a token, joins rooms and publishes typed lines to the
//! current room. Automatically reconnects on disconnection (max 5 attempts
//! with 5 second interval) and catches up on missed messages.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-client -- --token alice
//! cargo run --bin hiroba-client -- -t bob -u ws://127.0.0.1:8080/ws
//! ```

use clap::Parser;

use hiroba_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hiroba-client")]
#[command(about = "Terminal client for Hiroba real-time rooms", long_about = None)]
struct Args {
    /// Token presented to the server's identity resolver
    #[arg(short = 't', long)]
    token: String,

    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = hiroba_client::run_client(args.url, args.token).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
