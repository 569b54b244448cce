use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::poller::Poller;
use crate::config::Config;
use crate::domain::ports::AccountSource;
use crate::infrastructure::marginfi::RpcAccountSource;
use crate::infrastructure::observability::{MetricRegistry, server};

/// Running exporter: exposition endpoint plus poll loop
pub struct ExporterHandle {
    pub metrics_addr: SocketAddr,
    task: JoinHandle<Result<()>>,
}

impl ExporterHandle {
    /// Wait until the poller and the endpoint have both stopped
    pub async fn wait(self) -> Result<()> {
        self.task.await.context("Exporter task panicked")?
    }
}

pub struct Exporter {
    pub config: Config,
    pub registry: Arc<MetricRegistry>,
    poller: Arc<Poller>,
}

impl Exporter {
    /// Wire the exporter against the configured ledger node
    pub fn build(config: Config) -> Result<Self> {
        info!("Using ledger RPC endpoint {}", config.rpc.endpoint);
        let source = Arc::new(RpcAccountSource::new(
            config.rpc.endpoint.as_str(),
            config.rpc.timeout,
            config.rpc.max_retries,
        ));
        Self::with_source(config, source)
    }

    /// Wire the exporter against any account source
    pub fn with_source(config: Config, source: Arc<dyn AccountSource>) -> Result<Self> {
        let registry = Arc::new(MetricRegistry::new().context("Failed to create metric registry")?);
        registry.set_build_info(&config.environment, env!("CARGO_PKG_VERSION"));

        if let Some(account) = &config.account_filter {
            info!("Polling restricted to account {}", account);
        }

        let poller = Poller::new(source, registry.clone(), config.poller.clone())
            .with_account_filter(config.account_filter.clone());

        Ok(Self {
            config,
            registry,
            poller: Arc::new(poller),
        })
    }

    /// Bind the metrics endpoint and start polling until `shutdown` flips.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<ExporterHandle> {
        let addr = self.config.observability.socket_addr();
        let listener = server::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?;
        let metrics_addr = listener.local_addr()?;

        let server_task = tokio::spawn(server::serve(
            listener,
            self.registry.clone(),
            shutdown.clone(),
        ));

        let poller = self.poller.clone();
        let task = tokio::spawn(async move {
            poller.run(shutdown).await;
            server_task
                .await
                .context("Metrics endpoint task panicked")?
                .context("Metrics endpoint failed")?;
            Ok(())
        });

        Ok(ExporterHandle { metrics_addr, task })
    }

    /// Run until Ctrl+C or SIGTERM, letting the current cycle finish.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => {
                    info!("Shutdown signal received. Finishing current cycle...");
                    let _ = shutdown_tx.send(true);
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                    // Dropping the sender would stop the poller
                    std::future::pending::<()>().await;
                }
            }
        });

        let handle = self.start(shutdown_rx).await?;
        handle.wait().await?;
        info!("Exporter stopped.");
        Ok(())
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
