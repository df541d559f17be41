use args::Args;
use clap::Parser;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args.log_filter());

    log::info!("Bedrock gateway {}", env!("CARGO_PKG_VERSION"));

    let config = if args.config.exists() {
        config::Config::load(&args.config)?
    } else {
        log::debug!("No configuration file at {}, using defaults", args.config.display());
        config::Config::default()
    };

    let listen_address = args.listen_address.unwrap_or(config.server.listen_address);
    let router = llm::router(&config).await?;

    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    log::info!("Listening on {listen_address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for the shutdown signal: {e}");
        return;
    }

    log::info!("Shutting down");
}
