mod command;
mod protocol;
mod server;
mod services;
mod state;

use std::sync::Arc;

use clap::Parser;

/// Collaborative whiteboard relay server.
#[derive(Parser, Debug)]
#[command(name = "wireboard", version, about)]
struct Args {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 4444)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let registry = Arc::new(state::Registry::new());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = args.port, "wireboard listening");

    tokio::select! {
        result = server::serve(listener, Arc::clone(&registry)) => {
            result.expect("server failed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            registry.shutdown().await;
        }
    }
}
