use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, span, warn, Instrument, Level};

use crate::blacklist::Blacklist;
use crate::cdr::{self, CdrWriter, FileCdrWriter};
use crate::config::Config;
use crate::control::{self, ControlState};
use crate::session::SessionRegistry;
use crate::telemetry::{self, Metrics};

use super::gateway::{Gateway, GatewayConfig};

/// How long to wait for the CDR processor to flush on exit.
const CDR_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Main pgwd server
///
/// Components:
/// - UDP gateway: attach pipeline, TTL sweep, graceful drain
/// - Control plane: subscriber status, shutdown trigger, health, metrics
/// - CDR processor: billing log writer
/// - Main task: signal handling and ordered teardown
pub struct Server {
    config: Arc<Config>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Run the server until the graceful drain completes
    pub async fn run(self) -> Result<()> {
        let span = span!(Level::INFO, "pgwd", version = env!("CARGO_PKG_VERSION"));
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> Result<()> {
        let config = self.config;

        let metrics = Metrics::global().context("failed to initialize metrics")?;

        let file_writer = FileCdrWriter::open("file", &config.cdr.path, config.cdr.format)
            .with_context(|| format!("failed to open CDR file: {}", config.cdr.path.display()))?;
        let writers: Vec<Arc<dyn CdrWriter>> = vec![Arc::new(file_writer)];
        let (cdr, cdr_task) = cdr::start(writers);

        let blacklist = Arc::new(Blacklist::from_entries(
            config.blacklist.entries.iter(),
            config.blacklist.filter_bits,
        ));

        let registry = SessionRegistry::new(cdr.clone());

        let gateway = Arc::new(Gateway::new(
            GatewayConfig::from(config.as_ref()),
            blacklist.clone(),
            registry,
            cdr,
        ));

        let udp_address = gateway
            .start()
            .await
            .context("failed to start UDP gateway")?;

        let listener = match TcpListener::bind(config.control.address).await {
            Ok(listener) => listener,
            Err(e) => {
                gateway.stop().await;
                return Err(e).with_context(|| {
                    format!("failed to bind control plane on {}", config.control.address)
                });
            }
        };

        let control_cancel = CancellationToken::new();
        let control_state = Arc::new(ControlState::new(gateway.clone(), Some(metrics.clone())));
        let control_handle = tokio::spawn({
            let cancel = control_cancel.clone();
            async move {
                if let Err(e) = control::serve(listener, control_state, cancel).await {
                    error!(error = %e, "control plane failed");
                }
            }
        });

        info!(
            udp_address = %udp_address,
            control_address = %config.control.address,
            blacklist = blacklist.len(),
            session_ttl = ?config.session.ttl,
            drain_rate = config.shutdown.drain_rate,
            cdr_path = %config.cdr.path.display(),
            "pgwd server started"
        );

        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("shutdown signal received, starting graceful drain");
                gateway.initiate_graceful_shutdown();

                tokio::select! {
                    _ = gateway.wait_drained() => {}
                    _ = wait_for_shutdown() => {
                        warn!(
                            remaining = gateway.registry().count(),
                            "second shutdown signal, abandoning drain"
                        );
                    }
                }
            }
            _ = gateway.wait_drained() => {
                info!("graceful drain finished");
            }
        }

        gateway.stop().await;

        control_cancel.cancel();
        if let Err(e) = control_handle.await {
            warn!(error = %e, "control plane task failed");
        }

        // Last CDR handles live in the gateway; dropping it closes the channel.
        drop(gateway);
        match tokio::time::timeout(CDR_FLUSH_TIMEOUT, cdr_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "CDR processor failed"),
            Err(_) => warn!("timed out flushing CDRs"),
        }

        metrics.shutdown();
        telemetry::shutdown_tracing();

        info!("pgwd server stopped");

        Ok(())
    }
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}
