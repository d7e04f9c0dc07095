//! Bulk label sweep: paginated producer feeding a bounded worker pool
//!
//! The producer walks the listing one page at a time and pushes every message
//! ID into a bounded MPMC queue, suspending when the queue is full. N workers
//! pull IDs and apply the label change. The producer is the only sender and
//! closes the queue exactly once, on success and on listing failure alike;
//! workers drain whatever is left and exit, and the orchestrator joins all of
//! them before returning.

use async_channel::{Receiver, Sender};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::client::MailboxClient;
use crate::error::{GmailError, Result};
use crate::models::{FailedItem, ItemOutcome, LabelChange, PipelineReport, WorkerSummary};
use crate::stopwatch::Stopwatch;

/// A worker logs progress on its first item and every `PROGRESS_EVERY` items after
pub const PROGRESS_EVERY: usize = 10;

/// Size of the worker pool and the job queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Send every per-message result to an aggregator so failures can be reported
    pub collect_outcomes: bool,
}

impl PipelineOptions {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers,
            queue_capacity,
            collect_outcomes: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(GmailError::ConfigError(
                "pipeline needs at least 1 worker".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(GmailError::ConfigError(
                "job queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new(12, 1024)
    }
}

/// Totals the producer reports once it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub pages: usize,
    pub enqueued: usize,
}

/// Walks the paginated listing and feeds the job queue
pub struct Producer<C> {
    client: Arc<C>,
    queue: Sender<String>,
    stats: ProducerStats,
}

impl<C: MailboxClient> Producer<C> {
    pub fn new(client: Arc<C>, queue: Sender<String>) -> Self {
        Self {
            client,
            queue,
            stats: ProducerStats::default(),
        }
    }

    /// Enqueue every message matching `query`, then close the queue
    ///
    /// The queue is closed on every return path. A listing failure is returned
    /// as [`GmailError::ListingFailed`] together with what was enqueued before it.
    pub async fn run(mut self, query: &str) -> (ProducerStats, Result<()>) {
        let result = self.fill(query).await;
        self.queue.close();
        (self.stats, result)
    }

    async fn fill(&mut self, query: &str) -> Result<()> {
        let total = Stopwatch::new();
        let mut sw = Stopwatch::new();
        let mut page_token: Option<String> = None;

        loop {
            sw.start();
            let page = self
                .client
                .list_page(query, page_token.take())
                .await
                .map_err(|e| {
                    error!("Failed to list page {}: {}", self.stats.pages + 1, e);
                    GmailError::ListingFailed(e.to_string())
                })?;
            let list_elapsed = sw.elapsed();
            self.stats.pages += 1;

            let is_last = page.is_last();
            let page_len = page.ids.len();

            sw.start();
            for id in page.ids {
                self.queue.send(id).await.map_err(|_| {
                    GmailError::QueueClosed(
                        "all workers exited before the listing was exhausted".to_string(),
                    )
                })?;
                self.stats.enqueued += 1;
            }
            let enqueue_elapsed = sw.elapsed();

            info!(
                "Enqueued page {} ({} msgs, total: {}, total-elapsed: {:?}, list-elapsed: {:?}, enqueue-elapsed: {:?})",
                self.stats.pages,
                page_len,
                self.stats.enqueued,
                total.elapsed(),
                list_elapsed,
                enqueue_elapsed
            );

            if is_last {
                debug!("Reached last page after {} pages", self.stats.pages);
                return Ok(());
            }
            // Pages with no messages but a continuation token are still followed
            page_token = page.next_page_token;
        }
    }
}

/// One consumer of the job queue; owns its counters
struct Worker<C> {
    index: usize,
    client: Arc<C>,
    change: Arc<LabelChange>,
    queue: Receiver<String>,
    outcomes: Option<mpsc::UnboundedSender<ItemOutcome>>,
}

impl<C: MailboxClient> Worker<C> {
    async fn run(self) -> WorkerSummary {
        let sw = Stopwatch::new();
        let mut processed = 0usize;
        let mut failed = 0usize;

        debug!("[job:{}] Processing messages", self.index);

        // recv fails only once the queue is closed and empty
        while let Ok(id) = self.queue.recv().await {
            let result = self
                .client
                .modify_labels(&id, &self.change)
                .await
                .map_err(|e| GmailError::MutationFailed {
                    id: id.clone(),
                    message: e.to_string(),
                });
            processed += 1;

            if let Err(e) = &result {
                failed += 1;
                warn!("[job:{}] {}", self.index, e);
            }

            if let Some(outcomes) = &self.outcomes {
                let _ = outcomes.send(ItemOutcome {
                    worker: self.index,
                    id,
                    result,
                });
            }

            if processed == 1 || processed % PROGRESS_EVERY == 0 {
                info!(
                    "[job:{}] Modified {} messages (avg: {:.2}/s, elapsed: {:?})",
                    self.index,
                    processed,
                    sw.rate(processed),
                    sw.elapsed()
                );
            }
        }

        debug!("[job:{}] Done processing messages", self.index);
        WorkerSummary {
            worker: self.index,
            processed,
            failed,
            elapsed: sw.elapsed(),
        }
    }
}

/// Fixed set of workers draining one job queue
pub struct WorkerPool {
    tasks: JoinSet<WorkerSummary>,
}

impl WorkerPool {
    /// Start `count` workers on `queue`
    ///
    /// Takes ownership of the receiver so that only workers hold it: if they
    /// all exit, the producer's next send fails instead of blocking forever.
    pub fn spawn<C>(
        count: usize,
        queue: Receiver<String>,
        client: Arc<C>,
        change: Arc<LabelChange>,
        outcomes: Option<mpsc::UnboundedSender<ItemOutcome>>,
    ) -> Self
    where
        C: MailboxClient + 'static,
    {
        let mut tasks = JoinSet::new();
        for index in 0..count {
            let worker = Worker {
                index,
                client: Arc::clone(&client),
                change: Arc::clone(&change),
                queue: queue.clone(),
                outcomes: outcomes.clone(),
            };
            tasks.spawn(worker.run());
        }
        info!("Started {} workers", count);
        Self { tasks }
    }

    /// Wait for every worker to exit
    ///
    /// Always joins all workers; a panic in any of them is reported as
    /// [`GmailError::WorkerPanicked`] afterwards.
    pub async fn join(mut self) -> Result<Vec<WorkerSummary>> {
        let mut summaries = Vec::with_capacity(self.tasks.len());
        let mut panicked: Option<String> = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!("Worker task failed: {}", e);
                    panicked.get_or_insert_with(|| e.to_string());
                }
            }
        }

        if let Some(message) = panicked {
            return Err(GmailError::WorkerPanicked(message));
        }

        summaries.sort_by_key(|s| s.worker);
        Ok(summaries)
    }
}

/// Counts per-message outcomes and keeps the failures
#[derive(Debug, Default)]
pub struct OutcomeAggregator {
    pub succeeded: usize,
    pub failures: Vec<FailedItem>,
}

impl OutcomeAggregator {
    pub fn record(&mut self, outcome: ItemOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else if let Some(failure) = outcome.into_failure() {
            self.failures.push(failure);
        }
    }

    /// Drain `outcomes` until every sender is gone
    pub async fn collect(mut outcomes: mpsc::UnboundedReceiver<ItemOutcome>) -> Self {
        let mut aggregator = Self::default();
        while let Some(outcome) = outcomes.recv().await {
            aggregator.record(outcome);
        }
        aggregator
    }
}

/// Wires the producer and the worker pool together for one sweep
pub struct Pipeline<C> {
    client: Arc<C>,
    change: Arc<LabelChange>,
    options: PipelineOptions,
}

impl<C> Pipeline<C>
where
    C: MailboxClient + 'static,
{
    pub fn new(client: Arc<C>, change: LabelChange, options: PipelineOptions) -> Result<Self> {
        options.validate()?;
        if change.is_empty() {
            return Err(GmailError::ConfigError(
                "label change must add or remove at least one label".to_string(),
            ));
        }
        Ok(Self {
            client,
            change: Arc::new(change),
            options,
        })
    }

    /// Apply the label change to every message matching `query`
    ///
    /// Returns only after every worker has exited. A listing failure stops
    /// further page fetches, but messages already enqueued are still
    /// processed before [`GmailError::ListingFailed`] is returned.
    pub async fn run(&self, query: &str) -> Result<PipelineReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let total = Stopwatch::new();

        info!(
            "Starting sweep {} (query: {:?}, workers: {}, queue: {})",
            run_id, query, self.options.workers, self.options.queue_capacity
        );

        let (sender, receiver) = async_channel::bounded(self.options.queue_capacity);

        let (outcome_tx, aggregator): (_, Option<JoinHandle<OutcomeAggregator>>) =
            if self.options.collect_outcomes {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(tokio::spawn(OutcomeAggregator::collect(rx))))
            } else {
                (None, None)
            };

        let pool = WorkerPool::spawn(
            self.options.workers,
            receiver,
            Arc::clone(&self.client),
            Arc::clone(&self.change),
            outcome_tx,
        );

        let (stats, produced) = Producer::new(Arc::clone(&self.client), sender)
            .run(query)
            .await;

        let joined = pool.join().await;

        // Every sender lived in a worker, so the aggregator ends once they are joined
        let aggregated = match aggregator {
            Some(handle) => match handle.await {
                Ok(aggregated) => Some(aggregated),
                Err(e) => {
                    error!("Outcome aggregator failed: {}", e);
                    None
                }
            },
            None => None,
        };

        let workers = joined?;
        let processed: usize = workers.iter().map(|w| w.processed).sum();
        let failed: usize = workers.iter().map(|w| w.failed).sum();
        let elapsed = total.elapsed();

        info!(
            "Total number of messages modified: {} ({} failed), total-elapsed: {:?}",
            processed, failed, elapsed
        );

        produced?;

        Ok(PipelineReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            query: query.to_string(),
            pages: stats.pages,
            enqueued: stats.enqueued,
            processed,
            failed,
            elapsed,
            workers,
            failures: aggregated.map(|a| a.failures).unwrap_or_default(),
        })
    }
}
