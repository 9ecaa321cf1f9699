use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{wait_ready, DatabaseProbe, DEFAULT_READY_TIMEOUT};
use crate::errors::{DblessError, DblessResult};
use crate::models::{ContainerHandle, ContainerSpec};
use crate::services::alembic::{discard_if_empty, MigrationTool};
use crate::services::docker::ContainerRuntime;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub ready_timeout: Duration,
    /// Keep autogenerated revisions that contain no operations.
    pub keep_empty: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            keep_empty: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Generated(PathBuf),
    /// Models already match the schema; the empty revision was discarded.
    NoChanges,
}

type ShutdownFn<'a> = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync + 'a>;

/// Sequences container, readiness probe and migration tool for one run.
pub struct Pipeline<'a> {
    runtime: &'a dyn ContainerRuntime,
    probe: &'a dyn DatabaseProbe,
    tool: &'a dyn MigrationTool,
    options: RunOptions,
    shutdown: ShutdownFn<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        probe: &'a dyn DatabaseProbe,
        tool: &'a dyn MigrationTool,
        options: RunOptions,
    ) -> Self {
        Self {
            runtime,
            probe,
            tool,
            options,
            shutdown: Box::new(|| shutdown_signal().boxed()),
        }
    }

    /// Replace Ctrl-C/SIGTERM with another source of shutdown requests.
    ///
    /// `shutdown` is called once per wait, so a second request can cut a
    /// hung teardown short.
    pub fn with_shutdown<F, Fut>(mut self, shutdown: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'a,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Box::new(move || shutdown().boxed());
        self
    }

    /// Start the container and bring it to head, leaving it running.
    ///
    /// The container is removed again if any step after its start fails.
    pub async fn start(&self, config: &Config) -> DblessResult<ContainerHandle> {
        let handle = self.runtime.start(&ContainerSpec::from(config)).await?;

        match self.interruptible(self.prepare(&handle, config)).await {
            Ok(()) => Ok(handle),
            Err(e) => {
                warn!("Start failed, removing container {}", handle.name);
                self.release(&handle).await;
                Err(e)
            }
        }
    }

    /// Full run: start, upgrade to head, autogenerate, always tear down.
    pub async fn auto(&self, config: &Config, message: &str) -> DblessResult<RunOutcome> {
        let handle = self.runtime.start(&ContainerSpec::from(config)).await?;

        self.scoped(&handle, async {
            self.prepare(&handle, config).await?;
            self.generate(config, message).await
        })
        .await
    }

    /// Await `work`, then release the container on every exit path.
    async fn scoped<T>(
        &self,
        handle: &ContainerHandle,
        work: impl Future<Output = DblessResult<T>>,
    ) -> DblessResult<T> {
        let result = self.interruptible(work).await;
        if result.is_err() {
            warn!("Run failed, removing container {}", handle.name);
        }
        self.release(handle).await;
        result
    }

    async fn interruptible<T>(
        &self,
        work: impl Future<Output = DblessResult<T>>,
    ) -> DblessResult<T> {
        tokio::select! {
            result = work => result,
            _ = (self.shutdown)() => Err(DblessError::Interrupted),
        }
    }

    /// Stop the container unless another shutdown request arrives first.
    async fn release(&self, handle: &ContainerHandle) {
        tokio::select! {
            biased;
            _ = self.runtime.stop(handle) => {}
            _ = (self.shutdown)() => {
                warn!(
                    "Interrupted again, leaving container {}; `dbless stop` removes it",
                    handle.name
                );
            }
        }
    }

    async fn prepare(&self, handle: &ContainerHandle, config: &Config) -> DblessResult<()> {
        let probe_url = config.probe_url()?;
        wait_ready(self.probe, handle, &probe_url, self.options.ready_timeout).await?;

        if let Some(revision) = self.tool.current(&config.engine_url).await? {
            return Err(DblessError::AlreadyMigrated { revision });
        }

        self.tool.upgrade_to_head(&config.engine_url).await
    }

    async fn generate(&self, config: &Config, message: &str) -> DblessResult<RunOutcome> {
        let path = self
            .tool
            .autogenerate(&config.engine_url, message)
            .await?;

        if !self.options.keep_empty {
            match discard_if_empty(&path).await {
                Ok(true) => {
                    info!("No schema changes detected, removed {}", path.display());
                    return Ok(RunOutcome::NoChanges);
                }
                Ok(false) => {}
                Err(e) => warn!("Could not inspect {}: {}", path.display(), e),
            }
        }

        info!("Great success! Generated {}", path.display());
        Ok(RunOutcome::Generated(path))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
