//! Concurrent process runner with ordered, graceful shutdown.
//!
//! App processes run side by side until a signal arrives or one of them fails. The shared
//! cancellation token is then cancelled and the runner waits, up to a grace period, for
//! every process to return. Closers run afterwards one at a time, in the order they were
//! registered, under a single timeout.
//!
//! # Example
//!
//! ```no_run
//! use fieldlink_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("flushing");
//!             Ok(())
//!         })
//!         .with_grace_period(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxedResultFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// An app process: receives the shared cancellation token and runs until it is cancelled.
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedResultFuture + Send>;

/// A closer: releases a resource once every app process has stopped.
pub type Closer = Box<dyn FnOnce() -> BoxedResultFuture + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Every process returned cleanly or was cancelled
    Stopped,
    /// A process failed or panicked and brought the others down
    Failed(anyhow::Error),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Stopped => 0,
            RunOutcome::Failed(_) => 1,
        }
    }
}

pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    grace_period: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with a 10 second grace period and a 10 second closer timeout.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            grace_period: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an app process under a generic name.
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    /// Adds an app process whose name shows up in shutdown logs.
    ///
    /// If the process returns an error, every other process is cancelled.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Adds a closer. Closers run sequentially in registration order.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// Total time allowed for all closers together.
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// How long to wait for processes to return after cancellation before aborting them.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs until shutdown, then exits the process with the outcome's exit code.
    pub async fn run(self) {
        spawn_signal_handlers(self.cancellation_token.clone());

        let outcome = self.run_until_stopped().await;
        match &outcome {
            RunOutcome::Stopped => info!("Application exiting normally"),
            RunOutcome::Failed(err) => error!("Application exiting with error: {:#}", err),
        }
        std::process::exit(outcome.exit_code());
    }

    /// Runs every process until cancellation or the first failure, then runs the closers.
    ///
    /// Does not install signal handlers or exit; cancel the token to stop.
    pub async fn run_until_stopped(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        let mut first_error = None;
        loop {
            let joined = tokio::select! {
                joined = join_set.join_next() => joined,
                _ = token.cancelled() => break,
            };
            let Some(joined) = joined else { break };

            match joined {
                Ok((name, Ok(()))) => debug!(process = %name, "App process completed"),
                Ok((name, Err(err))) => {
                    error!(process = %name, "App process error: {:#}", err);
                    first_error = Some(err.context(format!("process {} failed", name)));
                    break;
                }
                Err(err) => {
                    error!("App process panicked: {}", err);
                    first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                    break;
                }
            }
        }

        token.cancel();
        drain_processes(&mut join_set, self.grace_period).await;

        if !self.closers.is_empty() {
            info!(
                closers = self.closers.len(),
                "Running closers with timeout of {:?}", self.closer_timeout
            );
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("All closers completed"),
                Err(_) => error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => RunOutcome::Failed(err),
            None => RunOutcome::Stopped,
        }
    }
}

/// Wait for cancelled processes to return, aborting whatever is left after the grace period.
async fn drain_processes(
    join_set: &mut JoinSet<(String, Result<(), anyhow::Error>)>,
    grace_period: Duration,
) {
    if join_set.is_empty() {
        return;
    }

    info!(remaining = join_set.len(), "Waiting for app processes to stop");
    let drained = tokio::time::timeout(grace_period, async {
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(process = %name, "App process stopped"),
                Ok((name, Err(err))) => {
                    warn!(process = %name, "App process failed during shutdown: {:#}", err)
                }
                Err(err) => warn!("App process panicked during shutdown: {}", err),
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = join_set.len(),
            "Grace period of {:?} elapsed, aborting remaining processes", grace_period
        );
        join_set.shutdown().await;
    }
}

async fn run_closers(closers: Vec<Closer>) {
    for (index, closer) in closers.into_iter().enumerate() {
        match closer().await {
            Ok(()) => debug!(closer = index, "Closer completed"),
            Err(err) => error!(closer = index, "Closer error: {:#}", err),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => error!("Error setting up signal handler: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM signal");
                token.cancel();
            }
            Err(err) => error!("Error setting up SIGTERM handler: {}", err),
        }
    });
}
