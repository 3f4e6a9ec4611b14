//! Listing orchestration.
//!
//! An [`IngestionPipeline`] runs one [`ListingTask`] per logical sub-source,
//! fans their items into a single bounded output channel and merges their
//! terminal errors:
//!
//! ```text
//!   ListingTask ──┐
//!   ListingTask ──┼──> ItemSink ──> mpsc::Sender<CommonItem> ──> consumer
//!   ListingTask ──┘
//!        │
//!        └── JoinHandle<(label, Result<ListingSummary>)> ──> aggregated error
//! ```
//!
//! The pipeline keeps its own sender alive until every task has been joined,
//! so the consumer observes channel closure only after all producers are done.

use crate::error::{IngestError, Result, TaskFailure};
use crate::types::ListOptions;
use async_trait::async_trait;
use std::sync::Arc;
use timeline::{CommonItem, ListingWindow};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Producer handle given to each listing task.
///
/// Sending suspends while the channel is full, so a slow consumer stalls the
/// producing task instead of growing a buffer.
#[derive(Clone)]
pub struct ItemSink {
    tx: mpsc::Sender<CommonItem>,
    cancel: CancellationToken,
}

impl ItemSink {
    pub fn new(tx: mpsc::Sender<CommonItem>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Push one item, waiting for channel capacity or cancellation.
    pub async fn send(&self, item: CommonItem) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            sent = self.tx.send(item) => sent.map_err(|_| IngestError::ChannelClosed),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Counts reported by a finished listing task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListingSummary {
    pub emitted: usize,
    pub skipped: usize,
}

/// One concurrent unit of work paginating a single logical source.
#[async_trait]
pub trait ListingTask: Send + Sync {
    /// Label used in logs and aggregated errors (e.g. "calendar/primary").
    fn label(&self) -> String;

    /// List every record in `window` and push the normalized items to `sink`.
    ///
    /// Per-record normalization failures are logged and skipped. Only
    /// unrecoverable listing errors end the task with `Err`.
    async fn run(&self, window: ListingWindow, sink: ItemSink) -> Result<ListingSummary>;
}

/// Lifecycle of one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Closed,
}

/// Runs listing tasks concurrently and owns the output channel's lifecycle.
pub struct IngestionPipeline {
    source_id: String,
    tasks: Vec<Arc<dyn ListingTask>>,
    state: watch::Sender<PipelineState>,
}

impl IngestionPipeline {
    pub fn new(source_id: impl Into<String>, tasks: Vec<Arc<dyn ListingTask>>) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            source_id: source_id.into(),
            tasks,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    fn transition(&self, next: PipelineState) {
        let previous = self.state.send_replace(next);
        debug!(
            source = %self.source_id,
            from = ?previous,
            to = ?next,
            "Pipeline state transition"
        );
    }

    /// Run every task to completion, then close `output`.
    ///
    /// `output` is dropped before this returns, on every path. Items already
    /// sent stay valid even when the run fails.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        output: mpsc::Sender<CommonItem>,
        options: ListOptions,
    ) -> Result<()> {
        // Check and claim in one step so concurrent callers cannot both start.
        let claimed = self.state.send_if_modified(|state| {
            if *state == PipelineState::Idle {
                *state = PipelineState::Running;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(IngestError::Configuration(format!(
                "pipeline for {} has already run",
                self.source_id
            )));
        }
        debug!(
            source = %self.source_id,
            from = ?PipelineState::Idle,
            to = ?PipelineState::Running,
            "Pipeline state transition"
        );

        if let Some(path) = &options.filename {
            drop(output);
            self.transition(PipelineState::Closed);
            return Err(IngestError::Configuration(format!(
                "importing data from a file is not supported ({})",
                path.display()
            )));
        }

        let mut set = JoinSet::new();
        for task in &self.tasks {
            let task = Arc::clone(task);
            let sink = ItemSink::new(output.clone(), cancel.clone());
            let window = options.timeframe;
            set.spawn(async move {
                let label = task.label();
                let result = task.run(window, sink).await;
                (label, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((label, Ok(summary))) => {
                    info!(
                        source = %self.source_id,
                        task = %label,
                        emitted = summary.emitted,
                        skipped = summary.skipped,
                        "Listing task finished"
                    );
                }
                Ok((label, Err(e))) => {
                    error!(
                        source = %self.source_id,
                        task = %label,
                        error = %e,
                        "A listing task errored"
                    );
                    failures.push(TaskFailure {
                        task: label,
                        error: e,
                    });
                }
                Err(join_error) => {
                    error!(
                        source = %self.source_id,
                        error = %join_error,
                        "A listing task could not be joined"
                    );
                    failures.push(TaskFailure {
                        task: "<unknown>".to_string(),
                        error: IngestError::Internal(join_error.to_string()),
                    });
                }
            }
        }

        self.transition(PipelineState::Draining);
        drop(output);
        self.transition(PipelineState::Closed);

        if failures.is_empty() {
            return Ok(());
        }
        if failures.iter().all(|f| f.error.is_cancelled()) {
            return Err(IngestError::Cancelled);
        }
        error!(
            source = %self.source_id,
            failed = failures.len(),
            tasks = self.tasks.len(),
            "Listing finished with errors"
        );
        Err(IngestError::Aggregate(failures))
    }
}
