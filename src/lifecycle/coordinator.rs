//! Run-phase coordination.
//!
//! # Responsibilities
//! - Restart the engine if it was running when the daemon last stopped
//! - Run the management service and the signal listener side by side
//! - Turn the first of their outcomes into an ordered shutdown
//!
//! # Design Decisions
//! - Both tasks report through one [`completion`] signal; only the first
//!   outcome counts
//! - Shutdown steps log their errors and keep going

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;

use crate::engine::ProxyEngine;
use crate::lifecycle::shutdown::{completion, Shutdown};
use crate::lifecycle::signals;
use crate::storage::ConfigStore;

/// How long the service gets to drain after shutdown is triggered.
const SERVICE_DRAIN: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("service failed: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("management service stopped: {0}")]
    Service(#[from] ServiceError),

    #[error("no task reported completion")]
    CompletionLost,
}

/// The long-running management surface.
#[async_trait]
pub trait ApiService: Send + Sync {
    /// Serve until shutdown (`Ok`) or a fatal error.
    async fn run(&self) -> Result<(), ServiceError>;
}

pub struct Coordinator {
    store: Arc<dyn ConfigStore>,
    engine: Arc<dyn ProxyEngine>,
    service: Arc<dyn ApiService>,
    shutdown: Shutdown,
    termination: Option<BoxFuture<'static, ()>>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        engine: Arc<dyn ProxyEngine>,
        service: Arc<dyn ApiService>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            engine,
            service,
            shutdown,
            termination: None,
        }
    }

    /// Replace the OS signal listener with another termination trigger.
    pub fn with_termination<F>(mut self, trigger: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.termination = Some(trigger.boxed());
        self
    }

    pub async fn run(self) -> Result<(), LifecycleError> {
        if self.store.is_running() {
            if let Err(e) = self.engine.apply_configuration().await {
                tracing::error!(error = %e, "Failed to start proxy engine");
            }
        }

        let (done, outcome) = completion::<Result<(), ServiceError>>();

        let service = Arc::clone(&self.service);
        let tx = done.clone();
        let service_task = tokio::spawn(async move {
            tx.complete(service.run().await);
        });

        let termination = self.termination.unwrap_or_else(|| {
            async {
                signals::wait_for_termination().await;
            }
            .boxed()
        });
        let tx = done;
        let signal_task = tokio::spawn(async move {
            termination.await;
            tx.complete(Ok(()));
        });

        let result = outcome.wait().await;
        signal_task.abort();

        match result {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "Management service failed");
                self.shutdown.trigger();
                return Err(LifecycleError::Service(e));
            }
            None => {
                self.shutdown.trigger();
                return Err(LifecycleError::CompletionLost);
            }
        }

        println!("Quitting...");
        self.shutdown.trigger();

        if tokio::time::timeout(SERVICE_DRAIN, service_task).await.is_err() {
            tracing::warn!("Management service did not stop in time");
        }

        if let Err(e) = self.engine.stop_transparent_forwarding().await {
            tracing::warn!(error = %e, "Failed to stop transparent forwarding");
        }
        if let Err(e) = self.engine.stop_service(false).await {
            tracing::warn!(error = %e, "Failed to stop proxy engine");
        }
        if let Err(e) = self.store.close() {
            tracing::warn!(error = %e, "Failed to close config store");
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }
}
