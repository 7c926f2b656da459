use std::{net::Ipv4Addr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use rustydocs::{api, config, logging, processing};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "rustydocs", about = "PDF upload and indexing server")]
struct Cli {
    /// Listen port; overrides `SERVER_PORT`.
    #[arg(long)]
    port: Option<u16>,
    /// Env file to load instead of `.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::load_env_file(cli.env_file.as_deref()).context("Failed to load env file")?;
    logging::init_tracing();

    let mut config = config::init_config().context("Invalid configuration")?;
    if let Some(port) = cli.port {
        config.server_port = Some(port);
    }
    let config = Arc::new(config);
    tracing::info!(
        mode = processing::DeploymentMode::from_config(&config).as_str(),
        archive = config.storage_container_name.is_some(),
        "Configuration loaded"
    );

    let backends = Arc::new(processing::ConfiguredBackends::new(config.clone()));
    let service = processing::IngestionService::new(config.clone(), backends)
        .context("Failed to build ingestion service")?;
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
