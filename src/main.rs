//! rotaryboard - serial rotary-knob control panel driver

use rotaryboard::controller::{Bindings, Controller, ExitReason};
use rotaryboard::feedback::Multiplexer;
use rotaryboard::gesture::{GestureConfig, GestureRecognizer};
use rotaryboard::integrations::Integrations;
use rotaryboard::transport::{serial, Transport};
use rotaryboard::config;

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long the write loop gets to drain the outro once the controller is done
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "rotaryboard", version, about)]
struct Args {
    /// Config file (YAML, TOML or JSON); defaults to $ROTARYBOARD_CONFIG or config.yaml
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rotaryboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.list_ports {
        for port in serial::list_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    tracing::info!("Starting rotaryboard v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(args.config.as_deref(), args.port.as_deref())?;
    tracing::info!("Configuration loaded, port: {} @ {}", config.port, config.baud);

    // Root token, cancelled by Ctrl+C / SIGTERM
    let shutdown = CancellationToken::new();
    // Trackers and blinkers; cancelled by the controller when it exits
    let session = shutdown.child_token();
    // Transport and multiplexer; outlive the controller so the outro gets out
    let link = CancellationToken::new();

    let (reader, writer) = serial::open(&config.port, config.baud)?;
    let mut transport = Transport::spawn(reader, writer, link.clone());
    let (feedback, mux) = Multiplexer::spawn(transport.commands.clone(), link.clone());
    tracing::info!("Serial link open on {}", config.port);

    let integrations = Integrations::from_config(&config)?;
    let bindings = Bindings::new(integrations, feedback.clone(), session.clone());
    let recognizer = GestureRecognizer::new(GestureConfig::from(&config.gesture));
    let controller = Controller::new(
        recognizer,
        bindings,
        feedback,
        session,
        shutdown.clone(),
    );

    let signals = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signals.cancel();
    });

    let outcome = tokio::select! {
        result = controller.run(transport.messages) => result,
        result = &mut transport.task => {
            // The controller is dropped with this branch; stop what it started
            shutdown.cancel();
            return match result {
                Ok(Ok(())) => Err(anyhow!("transport stopped unexpectedly")),
                Ok(Err(e)) => {
                    tracing::error!("Transport failed: {}", e);
                    Err(e.into())
                }
                Err(e) => Err(anyhow!("transport task panicked: {}", e)),
            };
        }
    };

    // The controller only gives up on its own when the message stream ended,
    // which means the transport failed; prefer the transport's error.
    let reason = match outcome {
        Ok(reason) => reason,
        Err(e) => {
            shutdown.cancel();
            return match tokio::time::timeout(DRAIN_TIMEOUT, &mut transport.task).await {
                Ok(Ok(Err(transport_err))) => {
                    tracing::error!("Transport failed: {}", transport_err);
                    Err(transport_err.into())
                }
                _ => Err(e),
            };
        }
    };

    // Controller flushed the outro into the transport queue; let it drain
    link.cancel();
    if let Err(e) = mux.await {
        tracing::warn!("Feedback multiplexer ended abnormally: {}", e);
    }
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut transport.task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::warn!("Transport error during shutdown: {}", e),
        Ok(Err(e)) => tracing::warn!("Transport task ended abnormally: {}", e),
        Err(_) => tracing::warn!("Timed out draining commands to the panel"),
    }

    match reason {
        ExitReason::Chord => tracing::info!("Shutdown chord pressed"),
        ExitReason::Signal => tracing::info!("Stopped by signal"),
    }
    shutdown.cancel();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
