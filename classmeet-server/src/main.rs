use anyhow::Context;
use clap::Parser;
use classmeet_server::{ServerConfig, build_app, telemetry};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "classmeet-server", version, about = "ClassMeet signaling server")]
struct Args {
    /// Address to listen on, overrides CLASSMEET_BIND_ADDR.
    #[arg(long, short)]
    bind: Option<String>,

    /// Default log level when RUST_LOG is unset, overrides CLASSMEET_LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,

    /// Serve only the plain WebSocket transport.
    #[arg(long)]
    no_socketio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if args.no_socketio {
        config.socketio = false;
    }

    telemetry::init_tracing(&config.log_level, config.log_format);
    config.log_summary();

    let app = build_app(&config);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "classmeet-server listening");

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("HTTP server stopped, shutting down broker");
    app.broker.shutdown().await;
    app.broker_task.await.context("broker task panicked")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl-C received");
}
