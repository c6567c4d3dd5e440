//! Background execution of ingestion runs.
//!
//! Callers ask for a run through [`dispatch_ingest`]. A synchronous request
//! runs inline; otherwise the run is enqueued as an `ingest.run` job. When
//! the queue cannot take the job the run happens inline anyway, so an
//! upload flow never stalls on queue infrastructure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::error::{QueueError, Result};
use crate::ingest::{IngestPipeline, RunSummary};

/// Job name for ingestion runs.
pub const INGEST_JOB: &str = "ingest.run";

/// Opaque identifier handed out by a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub args: serde_json::Value,
}

/// Arguments of an [`INGEST_JOB`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestArgs {
    pub prefix: String,
}

/// Fire-and-forget job submission.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, name: &str, args: serde_json::Value) -> std::result::Result<JobId, QueueError>;
}

/// In-process queue feeding an [`IngestWorker`] over a channel.
#[derive(Debug)]
pub struct ChannelJobQueue {
    sender: mpsc::UnboundedSender<Job>,
    next_id: AtomicU64,
}

impl ChannelJobQueue {
    /// Create a queue and the receiving end a worker consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            sender,
            next_id: AtomicU64::new(1),
        };
        (queue, receiver)
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, name: &str, args: serde_json::Value) -> std::result::Result<JobId, QueueError> {
        let id = JobId(format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        let job = Job {
            id: id.clone(),
            name: name.to_string(),
            args,
        };
        self.sender
            .send(job)
            .map_err(|_| QueueError::Unavailable("no worker is receiving jobs".into()))?;
        Ok(id)
    }
}

/// How a requested run was carried out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Dispatch {
    Inline { result: RunSummary },
    Queued { job_id: JobId },
    InlineFallback { result: RunSummary },
}

/// Run inline when `sync`, otherwise enqueue, falling back to inline.
///
/// A queue that rejects the job degrades to an inline run. Errors from the
/// run itself are returned as they are.
#[instrument(skip(pipeline, queue))]
pub async fn dispatch_ingest(
    pipeline: &IngestPipeline,
    queue: &dyn JobQueue,
    prefix: &str,
    sync: bool,
) -> Result<Dispatch> {
    if sync {
        let result = pipeline.run(prefix).await?;
        return Ok(Dispatch::Inline { result });
    }

    let args = serde_json::json!({ "prefix": prefix });
    match queue.enqueue(INGEST_JOB, args).await {
        Ok(job_id) => {
            info!(job_id = %job_id, "Ingestion queued");
            Ok(Dispatch::Queued { job_id })
        }
        Err(e) => {
            warn!(error = %e, "Queue unavailable, running ingestion inline");
            let result = pipeline.run(prefix).await?;
            Ok(Dispatch::InlineFallback { result })
        }
    }
}

/// Tallies reported when a worker's queue closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Consumes jobs and runs the pipeline once per ingestion job.
pub struct IngestWorker {
    pipeline: Arc<IngestPipeline>,
    jobs: mpsc::UnboundedReceiver<Job>,
}

impl IngestWorker {
    pub fn new(pipeline: Arc<IngestPipeline>, jobs: mpsc::UnboundedReceiver<Job>) -> Self {
        Self { pipeline, jobs }
    }

    /// Process jobs until every queue handle is dropped.
    pub async fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Some(job) = self.jobs.recv().await {
            match self.handle(&job).await {
                Ok(Some(summary)) => {
                    info!(
                        job_id = %job.id,
                        pairs = summary.pairs,
                        inserted = summary.inserted,
                        skipped_existing = summary.skipped_existing,
                        dupes_flagged = summary.dupes_flagged,
                        "Job finished"
                    );
                    stats.completed += 1;
                }
                Ok(None) => {
                    warn!(job_id = %job.id, name = %job.name, "Unknown job, skipping");
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Job failed");
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    async fn handle(&self, job: &Job) -> Result<Option<RunSummary>> {
        if job.name != INGEST_JOB {
            return Ok(None);
        }
        let args: IngestArgs = serde_json::from_value(job.args.clone())
            .map_err(|e| QueueError::InvalidArgs(e.to_string()))?;
        Ok(Some(self.pipeline.run(&args.prefix).await?))
    }
}

impl std::fmt::Debug for IngestWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestWorker")
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::config::PipelineConfig;
    use crate::storage::MemoryObjectStore;

    fn empty_pipeline() -> Arc<IngestPipeline> {
        Arc::new(IngestPipeline::new(
            Arc::new(MemoryObjectStore::new()),
            Arc::new(MemoryCatalog::new()),
            PipelineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_sync_runs_inline() {
        let pipeline = empty_pipeline();
        let (queue, mut jobs) = ChannelJobQueue::new();
        let dispatch = dispatch_ingest(&pipeline, &queue, "inbox/unsorted/", true).await.unwrap();
        assert_eq!(dispatch, Dispatch::Inline { result: RunSummary::default() });
        assert!(jobs.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_async_request_is_queued_with_prefix() {
        let pipeline = empty_pipeline();
        let (queue, mut jobs) = ChannelJobQueue::new();
        let dispatch = dispatch_ingest(&pipeline, &queue, "inbox/x/", false).await.unwrap();

        let job = jobs.try_recv().unwrap();
        assert_eq!(dispatch, Dispatch::Queued { job_id: job.id.clone() });
        assert_eq!(job.name, INGEST_JOB);
        assert_eq!(job.args, serde_json::json!({ "prefix": "inbox/x/" }));
    }

    #[tokio::test]
    async fn test_closed_queue_falls_back_inline() {
        let pipeline = empty_pipeline();
        let (queue, jobs) = ChannelJobQueue::new();
        drop(jobs);
        let dispatch = dispatch_ingest(&pipeline, &queue, "inbox/", false).await.unwrap();
        assert_eq!(dispatch, Dispatch::InlineFallback { result: RunSummary::default() });
    }

    #[test]
    fn test_dispatch_serializes_with_mode_tag() {
        let value = serde_json::to_value(Dispatch::InlineFallback {
            result: RunSummary::default(),
        })
        .unwrap();
        assert_eq!(value["mode"], "inline-fallback");
        assert_eq!(value["result"]["inserted"], 0);

        let queued = serde_json::to_value(Dispatch::Queued { job_id: JobId("job-1".into()) }).unwrap();
        assert_eq!(queued, serde_json::json!({ "mode": "queued", "job_id": "job-1" }));
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let pipeline = empty_pipeline();
        let (queue, jobs) = ChannelJobQueue::new();
        queue.enqueue(INGEST_JOB, serde_json::json!({ "prefix": "a/" })).await.unwrap();
        queue.enqueue("thumbs.make", serde_json::json!({})).await.unwrap();
        queue.enqueue(INGEST_JOB, serde_json::json!({ "wrong": 1 })).await.unwrap();
        drop(queue);

        let stats = IngestWorker::new(pipeline, jobs).run().await;
        assert_eq!(
            stats,
            WorkerStats {
                completed: 1,
                failed: 1,
                skipped: 1
            }
        );
    }
}
