//! Server entry point.

use clap::Parser;

use roulette_relay::{router, RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "roulette-relay",
    version,
    about = "Matchmaking and signaling relay for anonymous two-party chat"
)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "ROULETTE_PORT")]
    port: u16,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roulette_relay=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let state = RelayState::new(RelayConfig { port: args.port });

    let addr = format!("0.0.0.0:{}", state.config.port);
    tracing::info!("Roulette relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, router(state))
        .await
        .expect("Server error");
}
