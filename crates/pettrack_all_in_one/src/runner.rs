//! Concurrent process runner with graceful shutdown.
//!
//! Runs named long-lived processes until one fails or SIGTERM/SIGINT
//! arrives, then cancels the rest and executes cleanup closers under a
//! timeout.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type ProcessFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Process = Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>;
type Closer = Box<dyn FnOnce() -> ProcessFuture + Send>;

pub struct Runner {
    processes: Vec<(String, Process)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Add a named long-lived process. Processes run concurrently; the
    /// first error cancels every other process.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Add a cleanup closer, executed after every process has stopped.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Run until every process has finished, then run closers and exit.
    pub async fn run(self) {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "process completed");
                }
                Ok((name, Err(e))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, error = %e, "process failed, shutting down");
                        first_error = Some(e);
                        token.cancel();
                    }
                }
                Err(e) => {
                    error!(error = %e, "process panicked");
                    if !token.is_cancelled() {
                        token.cancel();
                    }
                }
            }
        }

        if !self.closers.is_empty() {
            info!(timeout = ?self.closer_timeout, "running closers");
            let all_closers = async {
                for closer in self.closers {
                    if let Err(e) = closer().await {
                        error!(error = %e, "closer failed");
                    }
                }
            };
            if tokio::time::timeout(self.closer_timeout, all_closers)
                .await
                .is_err()
            {
                error!("closers timed out");
            }
        }

        if let Some(e) = first_error {
            error!(error = %e, "exiting with error");
            std::process::exit(1);
        }
        info!("exiting normally");
        std::process::exit(0);
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            sigterm.recv().await;
            info!("received SIGTERM");
            token.cancel();
        });
    }
}
