//! Batch processing queue.
//!
//! Items move `pending -> processing -> completed | failed`. Failed items stay
//! failed, with their error, until [`BatchQueue::retry_failed`] puts the ones
//! under the attempt ceiling back to pending.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pipeline::{Pipeline, ProcessedDocument};

/// Default attempt ceiling for automatic retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: usize,
    pub path: PathBuf,
    pub status: QueueStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub document: Option<ProcessedDocument>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchQueue {
    items: Vec<QueueItem>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        let mut queue = Self::new();
        for path in paths {
            queue.push(path);
        }
        queue
    }

    /// Enqueue a file; returns its id.
    pub fn push(&mut self, path: impl Into<PathBuf>) -> usize {
        let id = self.items.len();
        self.items.push(QueueItem {
            id,
            path: path.into(),
            status: QueueStatus::Pending,
            attempts: 0,
            error: None,
            document: None,
            started_at: None,
            completed_at: None,
        });
        id
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn get(&self, id: usize) -> Option<&QueueItem> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Claim the next pending item, marking it as processing.
    pub fn next_pending(&mut self) -> Option<(usize, PathBuf)> {
        let item = self.items.iter_mut().find(|i| i.status == QueueStatus::Pending)?;
        item.status = QueueStatus::Processing;
        item.attempts += 1;
        item.started_at = Some(Utc::now());
        Some((item.id, item.path.clone()))
    }

    pub fn mark_completed(&mut self, id: usize, document: ProcessedDocument) {
        if let Some(item) = self.items.get_mut(id) {
            item.status = QueueStatus::Completed;
            item.error = None;
            item.document = Some(document);
            item.completed_at = Some(Utc::now());
        }
    }

    pub fn mark_failed(&mut self, id: usize, error: impl Into<String>) {
        if let Some(item) = self.items.get_mut(id) {
            item.status = QueueStatus::Failed;
            item.error = Some(error.into());
            item.completed_at = Some(Utc::now());
        }
    }

    /// Reset failed items with fewer than `max_attempts` attempts; returns how many.
    pub fn retry_failed(&mut self, max_attempts: u32) -> usize {
        let mut count = 0;
        for item in self
            .items
            .iter_mut()
            .filter(|i| i.status == QueueStatus::Failed && i.attempts < max_attempts)
        {
            item.status = QueueStatus::Pending;
            item.error = None;
            item.started_at = None;
            item.completed_at = None;
            count += 1;
        }
        count
    }

    pub fn stats(&self) -> BatchStats {
        self.items.iter().fold(
            BatchStats {
                total: self.items.len(),
                ..Default::default()
            },
            |mut stats, item| {
                match item.status {
                    QueueStatus::Pending => stats.pending += 1,
                    QueueStatus::Processing => stats.processing += 1,
                    QueueStatus::Completed => stats.completed += 1,
                    QueueStatus::Failed => stats.failed += 1,
                }
                stats
            },
        )
    }

    /// Documents of completed items, in queue order.
    pub fn documents(&self) -> impl Iterator<Item = &ProcessedDocument> {
        self.items.iter().filter_map(|i| i.document.as_ref())
    }
}

/// Drains a queue with a bounded pool of worker threads.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    workers: usize,
    max_attempts: u32,
    auto_retry: bool,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(4)
    }
}

impl BatchRunner {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            auto_retry: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Re-run failed items until they succeed or hit the attempt ceiling.
    pub fn with_auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    /// Run every document through the pipeline.
    pub fn run_pipeline(&self, pipeline: &Pipeline, queue: &mut BatchQueue) -> BatchStats {
        self.run(queue, |path| {
            let state = pipeline.run(path);
            state.outcome().ok_or_else(|| {
                state
                    .error_message()
                    .unwrap_or("pipeline did not complete")
                    .to_string()
            })
        })
    }

    /// Drain `queue` with `process`, which must be safe to call from several threads.
    ///
    /// Each round claims every pending item, runs them on a pool of at most
    /// `workers` threads and records the outcomes back on the calling thread.
    pub fn run<F>(&self, queue: &mut BatchQueue, process: F) -> BatchStats
    where
        F: Fn(&Path) -> Result<ProcessedDocument, String> + Sync,
    {
        let pool = ThreadPoolBuilder::new().num_threads(self.workers).build();
        if let Err(e) = &pool {
            warn!("Could not build worker pool, processing sequentially: {}", e);
        }
        let mut round = 1;

        loop {
            let claimed: Vec<(usize, PathBuf)> = std::iter::from_fn(|| queue.next_pending()).collect();
            debug!("Round {}: {} documents on {} workers", round, claimed.len(), self.workers);

            let run_one = |(id, path): &(usize, PathBuf)| (*id, path.clone(), process(path));
            let outcomes: Vec<_> = match &pool {
                Ok(pool) => pool.install(|| claimed.par_iter().map(run_one).collect()),
                Err(_) => claimed.iter().map(run_one).collect(),
            };

            for (id, path, outcome) in outcomes {
                match outcome {
                    Ok(document) => queue.mark_completed(id, document),
                    Err(error) => {
                        warn!("{} failed: {}", path.display(), error);
                        queue.mark_failed(id, error);
                    }
                }
            }

            if !self.auto_retry {
                break;
            }
            let reset = queue.retry_failed(self.max_attempts);
            if reset == 0 {
                break;
            }
            info!("Retrying {} failed documents", reset);
            round += 1;
        }

        let stats = queue.stats();
        info!(
            "Batch finished: {} completed, {} failed of {}",
            stats.completed, stats.failed, stats.total
        );
        stats
    }
}
