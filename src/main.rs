//! lew: a single-threaded, event-driven TCP echo server
//!
//! Runs the lew reactor with the echo listener:
//! - One thread, one readiness poll (epoll on Linux, kqueue on macOS)
//! - Bounded per-connection read buffers
//! - Pull-based writes: data is requested only while the socket is writable
//! - Configuration via CLI arguments or TOML file

mod config;

use config::Config;
use lew::echo::EchoListener;
use lew::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = config.host.as_deref().unwrap_or("0.0.0.0"),
        port = config.port,
        backlog = config.backlog,
        read_buffer_size = config.read_buffer_size,
        max_connections = config.max_connections,
        max_pending = config.max_pending,
        "Starting lew echo server"
    );

    let listener = EchoListener::new(config.max_pending);
    let mut server = Server::bind(config.server_options(), listener)?;
    server.run()?;

    Ok(())
}
