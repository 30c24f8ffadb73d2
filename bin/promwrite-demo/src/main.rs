//! Sample application that exports its metrics to a Prometheus remote write endpoint.
//!
//! Serves a small HTTP API and runs a simulated background task, both instrumented with the `metrics` facade, while a
//! remote writer periodically ships every recorded metric to the configured endpoint. Any export failure stops the
//! application.

#![deny(warnings)]
#![deny(missing_docs)]

use std::{convert::Infallible, net::SocketAddr};

use anyhow::{anyhow, Context as _, Error as GenericError};
use clap::{Args, Parser};
use promwrite::{MetricsRegistry, RemoteWriteConfiguration, RemoteWriter};
use serde::Serialize;
use tokio::{net::TcpListener, select};
use tracing::{error, info};

mod api;

mod background;

mod logging;
use self::logging::{fatal_and_exit, initialize_logging};

#[derive(Parser)]
#[command(about = "Sample application that exports its metrics to a Prometheus remote write endpoint.")]
struct Cli {
    /// The address to listen on for API requests.
    #[arg(long = "listen-addr", default_value = "0.0.0.0:8080")]
    listen_addr: SocketAddr,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

/// Configuration values set on the command line, taking precedence over the environment.
#[derive(Args, Serialize)]
struct ConfigOverrides {
    /// The URL of the remote write endpoint to send metrics to.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_write_url: Option<String>,

    /// How often to send metrics to the remote write endpoint, in seconds.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    flush_interval_secs: Option<u64>,

    /// Maximum time to wait for the remote write endpoint to respond, in seconds.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    request_timeout_secs: Option<u64>,

    /// Prefix to prepend to the name of every metric.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_prefix: Option<String>,
}

#[tokio::main]
#[allow(irrefutable_let_patterns)]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(None) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    if let Err(e) = run(cli).await {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<Infallible, GenericError> {
    let config = RemoteWriteConfiguration::from_environment_with_overrides(&cli.overrides)
        .context("Failed to load configuration.")?;

    let registry = MetricsRegistry::with_prefix(config.metrics_prefix.clone());
    registry
        .install()
        .map_err(|_| anyhow!("A global metrics recorder was already installed."))?;

    let writer = RemoteWriter::from_configuration(registry, &config).context("Failed to create remote writer.")?;

    let listener = TcpListener::bind(cli.listen_addr)
        .await
        .with_context(|| format!("Failed to bind API server to {}.", cli.listen_addr))?;

    tokio::spawn(background::run_periodic_task());

    info!(
        listen_addr = %cli.listen_addr,
        remote_write_url = %config.remote_write_url,
        flush_interval = ?config.flush_interval(),
        "promwrite-demo started."
    );

    select! {
        result = writer.run() => match result {
            Ok(never) => match never {},
            Err(e) => Err(e).context("Remote writer stopped."),
        },
        result = api::serve(listener) => match result {
            Ok(()) => Err(anyhow!("API server stopped unexpectedly.")),
            Err(e) => Err(e).context("API server failed."),
        },
    }
}
