//! Fixed-interval pass loop.
//!
//! The [`Scheduler`] owns the database connection for the agent's lifetime
//! and runs one [`scan`](crate::scan) per tick. It waits on two things only:
//! the interval timer and the cancellation token. Cancellation is observed
//! between passes; a pass that has started runs to completion.

use crate::connector::CatalogConnection;
use crate::publisher::ReportSink;
use crate::scanner::scan;
use crate::{EngineConfig, InventoryError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of the pass loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Created, loop not entered yet
    Idle,
    /// Waiting for a tick or running a pass
    Running,
    /// Loop left and connection closed
    Stopped,
}

/// Totals over the lifetime of one loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Passes started
    pub passes: u64,
    /// Passes that aborted with an error
    pub failed_passes: u64,
    /// Contained issues across completed passes
    pub issues: usize,
    pub records_published: usize,
}

/// Drives inventory passes on the configured interval.
pub struct Scheduler {
    config: Arc<EngineConfig>,
    connection: Box<dyn CatalogConnection>,
    sink: Arc<dyn ReportSink>,
    state: watch::Sender<AgentState>,
}

impl Scheduler {
    /// Creates an idle scheduler that owns `connection`.
    pub fn new(
        config: Arc<EngineConfig>,
        connection: Box<dyn CatalogConnection>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let (state, _) = watch::channel(AgentState::Idle);
        Self {
            config,
            connection,
            sink,
            state,
        }
    }

    /// Subscribes to state changes.
    pub fn state(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    /// Runs passes until `cancel` fires, then closes the connection.
    ///
    /// The first pass starts one interval after the call. Ticks that fall
    /// due while a pass is running are skipped, so passes never overlap or
    /// queue up.
    pub async fn run(self, cancel: CancellationToken) -> RunSummary {
        let period = self.config.sync_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.state.send_replace(AgentState::Running);
        info!(
            engine = %self.config.engine_type(),
            interval_secs = period.as_secs(),
            agent_id = %self.config.agent_id(),
            "Inventory agent started"
        );

        let mut summary = RunSummary::default();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Stop requested");
                    break;
                }
                _ = ticker.tick() => {
                    summary.passes += 1;
                    debug!(pass = summary.passes, "Starting inventory pass");
                    match scan(self.connection.as_ref(), self.sink.as_ref(), &self.config).await {
                        Ok(report) => {
                            summary.records_published += report.records_published;
                            summary.issues += report.issues.len();
                        }
                        Err(e) => {
                            summary.failed_passes += 1;
                            warn!(pass = summary.passes, error = %e, "Pass failed, retrying at next tick");
                        }
                    }
                }
            }
        }

        self.connection.close().await;
        self.state.send_replace(AgentState::Stopped);
        info!(
            passes = summary.passes,
            failed = summary.failed_passes,
            "Inventory agent stopped"
        );
        summary
    }

    /// Moves the loop onto its own task.
    pub fn spawn(self) -> AgentHandle {
        let cancel = CancellationToken::new();
        let state = self.state();
        let task = tokio::spawn(self.run(cancel.clone()));
        AgentHandle {
            cancel,
            task,
            state,
        }
    }
}

/// Control handle for a spawned [`Scheduler`].
#[derive(Debug)]
pub struct AgentHandle {
    cancel: CancellationToken,
    task: JoinHandle<RunSummary>,
    state: watch::Receiver<AgentState>,
}

impl AgentHandle {
    /// Token that stops the loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current loop state.
    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.clone()
    }

    /// Requests a stop and waits for the in-flight pass, if any, to finish.
    ///
    /// # Errors
    /// Returns [`InventoryError::Runtime`] if the loop task panicked
    pub async fn stop(self) -> Result<RunSummary> {
        self.cancel.cancel();
        self.join().await
    }

    /// Waits for the loop to end without requesting a stop.
    ///
    /// # Errors
    /// Returns [`InventoryError::Runtime`] if the loop task panicked
    pub async fn join(self) -> Result<RunSummary> {
        self.task
            .await
            .map_err(|e| InventoryError::runtime(format!("scheduler task failed: {e}")))
    }
}
