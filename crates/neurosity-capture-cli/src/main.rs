//! # neurosity-capture-cli
//!
//! Command-line bounded-duration brainwave capture: authenticate against
//! the Neurosity device gateway, subscribe to the raw brainwave stream for
//! a fixed window, and flush the accumulated readings to a CSV file when
//! the window closes — whether the duration elapses or the process is
//! interrupted.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;

use neurosity_capture::capture::{self, StopReason};
use neurosity_capture::{CaptureConfig, CaptureResult, GatewayClient};

/// Bounded-duration raw brainwave capture for Neurosity devices.
#[derive(Parser)]
#[command(name = "neurosity-capture", version, about)]
struct Cli {
    /// Path to neurosity.toml config file
    #[arg(short, long)]
    config: Option<String>,

    /// Output CSV path (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Capture duration in seconds (overrides config)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Device gateway URL override
    #[arg(long)]
    url: Option<String>,

    /// Enable verbose logging (set RUST_LOG for fine-grained control)
    #[arg(short, long)]
    verbose: bool,
}

/// Forward SIGINT and SIGTERM into the capture shutdown channel.
///
/// Both signals are treated identically: the first one delivered requests
/// finalization, and any later ones are absorbed by the flush controller.
fn spawn_signal_listeners(shutdown_tx: mpsc::Sender<StopReason>) {
    let interrupt_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("SIGINT handler unavailable");
                return;
            }
            tracing::info!("Interrupt received");
            if interrupt_tx.send(StopReason::Signal).await.is_err() {
                return;
            }
        }
    });

    #[cfg(not(unix))]
    drop(shutdown_tx);

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut terminate) = signal(SignalKind::terminate()) else {
            tracing::warn!("SIGTERM handler unavailable");
            return;
        };
        while terminate.recv().await.is_some() {
            tracing::info!("Termination request received");
            if shutdown_tx.send(StopReason::Signal).await.is_err() {
                return;
            }
        }
    });
}

async fn run(cli: Cli) -> CaptureResult<()> {
    let mut config = CaptureConfig::discover(cli.config.as_deref().map(Path::new))?;
    if let Some(url) = cli.url {
        config.gateway_url = url;
    }
    if let Some(output) = cli.output {
        config.output_path = output;
    }
    if let Some(duration) = cli.duration {
        config.duration_secs = duration;
    }

    let client = std::sync::Arc::new(GatewayClient::connect(&config).await?);
    let session = client
        .login(&config.device_id, &config.email, &config.password)
        .await?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
    spawn_signal_listeners(shutdown_tx);

    let result = capture::capture_to_csv(&client, &session, &config, shutdown_rx).await;
    client.disconnect().await;

    let report = result?;
    tracing::info!(
        rows = report.rows_written,
        reason = %report.stop_reason,
        elapsed_ms = report.elapsed.as_millis() as u64,
        path = %config.output_path.display(),
        "Capture complete"
    );
    println!(
        "Wrote {} readings to {} ({})",
        report.rows_written,
        config.output_path.display(),
        report.stop_reason
    );

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("neurosity_capture=debug,neurosity_capture_cli=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("neurosity_capture=info,neurosity_capture_cli=info")
            .init();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Capture failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
