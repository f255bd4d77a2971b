use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::pipeline::Pipeline;
use crate::worker::job::{JobId, JobOutcome};

/// Fixed set of worker threads pulling job ids from a bounded queue.
///
/// Each worker owns a single-threaded tokio runtime and runs one job at a
/// time to completion.
pub struct WorkerPool {
    job_sender: Sender<JobId>,
    result_receiver: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>, worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be at least 1".to_string(),
            ));
        }

        let (job_sender, job_receiver) = bounded::<JobId>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<JobOutcome>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);

            let handle = thread::Builder::new()
                .name(format!("pdf2txt-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_pipeline)
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        })
    }

    /// Enqueues a job, blocking while the queue is full.
    pub fn submit(&self, job_id: JobId) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }
        self.job_sender
            .send(job_id)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Enqueues a job without blocking.
    pub fn try_submit(&self, job_id: JobId) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }
        self.job_sender.try_send(job_id).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::QueueFull,
            TrySendError::Disconnected(_) => WorkerError::ChannelClosed,
        })
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and joins every worker. Jobs still queued are run
    /// first unless [`shutdown`](Self::shutdown) was called.
    pub fn wait(self) {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<JobId>,
    result_sender: Sender<JobOutcome>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Worker {} could not start its runtime: {}", worker_id, e);
            return;
        }
    };
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job_id) => {
                debug!("Worker {} processing job {}", worker_id, job_id);
                let Some(outcome) = runtime.block_on(pipeline.run(job_id)) else {
                    continue;
                };
                match result_sender.try_send(outcome) {
                    Ok(()) => {}
                    Err(TrySendError::Full(outcome)) => {
                        warn!(
                            "Result queue full, dropping outcome of job {}",
                            outcome.job_id
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        debug!("Worker {} result channel closed", worker_id);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::Harness;
    use crate::worker::JobStatus;

    #[test]
    fn test_zero_workers_is_rejected() {
        let harness = Harness::new();
        assert!(matches!(
            WorkerPool::new(harness.pipeline(), 0),
            Err(WorkerError::SpawnFailed(_))
        ));
    }

    #[test]
    fn test_pool_runs_submitted_jobs() {
        let harness = Harness::new();
        let owner = harness.owner("pool@example.com");
        let first = harness.pending_job(owner, "doc-one", &["Scanned page"]);
        let second = harness.pending_job(owner, "doc-two", &["Another page"]);

        let pool = WorkerPool::new(harness.pipeline(), 2).unwrap();
        pool.submit(first).unwrap();
        pool.submit(second).unwrap();

        let mut outcomes = vec![
            pool.recv_result_timeout(Duration::from_secs(10)).unwrap(),
            pool.recv_result_timeout(Duration::from_secs(10)).unwrap(),
        ];
        outcomes.sort_by_key(|o| o.job_id);

        assert_eq!(outcomes[0].job_id, first);
        assert_eq!(outcomes[1].job_id, second);
        assert!(outcomes.iter().all(|o| o.status == JobStatus::Success));

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_unknown_job_produces_no_outcome() {
        let harness = Harness::new();
        let pool = WorkerPool::new(harness.pipeline(), 1).unwrap();

        pool.submit(4242).unwrap();
        assert!(pool
            .recv_result_timeout(Duration::from_millis(500))
            .is_none());

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let harness = Harness::new();
        let pool = WorkerPool::new(harness.pipeline(), 1).unwrap();
        pool.shutdown();

        assert!(matches!(pool.submit(1), Err(WorkerError::ChannelClosed)));
        assert!(matches!(pool.try_submit(1), Err(WorkerError::ChannelClosed)));
        pool.wait();
    }
}
