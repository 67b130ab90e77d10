use anyhow::{Context, Result};
use clap::Parser;
use docqa::{api, config, logging, processing};
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Upload a document over HTTP and ask questions about it"
)]
struct Cli {
    /// Port to listen on; overrides SERVER_PORT.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    let config = config::init_config().context("Invalid configuration")?;

    let service = processing::DocumentQaService::new(config)
        .context("Failed to initialize document Q&A service")?;
    let app = api::create_router(Arc::new(service), api::ApiOptions::from_config(config));

    let (listener, port) = bind_listener(cli.port.or(config.server_port))
        .await
        .context("Failed to bind listener")?;
    tracing::info!(port, upload_dir = %config.upload_dir.display(), "Listening");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Ports tried in order when no port is configured.
const FALLBACK_PORTS: RangeInclusive<u16> = 4100..=4199;

/// Bind `port` when one is configured, otherwise the first free port in [`FALLBACK_PORTS`].
async fn bind_listener(port: Option<u16>) -> std::io::Result<(TcpListener, u16)> {
    if let Some(port) = port {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    for port in FALLBACK_PORTS {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port in use");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AddrNotAvailable,
        format!(
            "no free port in {}-{}; set SERVER_PORT or --port",
            FALLBACK_PORTS.start(),
            FALLBACK_PORTS.end()
        ),
    ))
}
