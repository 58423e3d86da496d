use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use decomp_core::JobId;
use decomp_logging::{decomp_debug, decomp_error, decomp_info};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::worker::{JobContext, JobWorker};

struct Submission {
    job_id: JobId,
    source_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("job scheduler is shut down")]
pub struct SchedulerClosed;

/// Fixed-size pool of workers fed from one FIFO queue.
///
/// Workers take submissions in the order they were enqueued; a job that does
/// not fit the pool waits in the queue. Must be started inside a tokio runtime.
pub struct JobScheduler {
    cmd_tx: mpsc::UnboundedSender<Submission>,
    pending: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn start(ctx: Arc<JobContext>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(cmd_rx));
        let pending = Arc::new(AtomicUsize::new(0));
        let width = ctx.config.workers.max(1);

        let workers = (0..width)
            .map(|slot| {
                let queue = queue.clone();
                let pending = pending.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move { worker_loop(slot, ctx, queue, pending).await })
            })
            .collect();
        decomp_info!("Job scheduler started with {} worker(s)", width);

        Self {
            cmd_tx,
            pending,
            workers,
        }
    }

    pub fn enqueue(&self, job_id: JobId, source_url: impl Into<String>) -> Result<(), SchedulerClosed> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.cmd_tx
            .send(Submission {
                job_id,
                source_url: source_url.into(),
            })
            .map_err(|_| {
                self.pending.fetch_sub(1, Ordering::Relaxed);
                SchedulerClosed
            })
    }

    /// Submissions accepted but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Stops accepting work, lets the workers drain the queue and waits for them.
    pub async fn shutdown(self) {
        drop(self.cmd_tx);
        for worker in self.workers {
            let _ = worker.await;
        }
        decomp_info!("Job scheduler stopped");
    }
}

async fn worker_loop(
    slot: usize,
    ctx: Arc<JobContext>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Submission>>>,
    pending: Arc<AtomicUsize>,
) {
    loop {
        let next = { queue.lock().await.recv().await };
        let Some(Submission { job_id, source_url }) = next else {
            break;
        };
        pending.fetch_sub(1, Ordering::Relaxed);
        decomp_debug!("Worker {} picked up job {}", slot, job_id);

        // A panicking job must not take the worker down with it.
        let worker = JobWorker::new(ctx.clone());
        let task_id = job_id.clone();
        let handle = tokio::spawn(async move { worker.run(&task_id, &source_url).await });
        match handle.await {
            Ok(status) => decomp_debug!("Worker {} finished job {} ({})", slot, job_id, status),
            Err(err) => {
                decomp_error!("Job {} aborted: {}", job_id, err);
                ctx.record_failure(&job_id, format!("worker aborted: {err}"));
            }
        }
    }
}
