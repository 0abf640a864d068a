//! In-process job queue.
//!
//! A bounded tokio channel feeds a fixed pool of worker tasks that share the
//! receiver. Shutdown stops intake, lets every worker drain what is already
//! queued, then ends the workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use super::{Job, JobQueue, JobQueueError};
use crate::config::ProvisioningConfig;
use crate::observability::MetricsRecorder;

/// Sending side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InProcessJobQueue {
    sender: mpsc::Sender<Job>,
    accepting: Arc<AtomicBool>,
    metrics: MetricsRecorder,
}

/// Controls the worker pool behind an [`InProcessJobQueue`]
#[derive(Debug)]
pub struct JobQueueHandle {
    shutdown_tx: watch::Sender<bool>,
    accepting: Arc<AtomicBool>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl JobQueueHandle {
    /// Stop accepting jobs and tell workers to drain the queue and exit.
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown of job queue");
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all workers to finish
    pub async fn join(self) {
        for handle in self.worker_handles {
            let _ = handle.await;
        }
    }

    pub async fn shutdown_and_join(self) {
        self.shutdown();
        self.join().await;
    }
}

impl InProcessJobQueue {
    /// Create the queue and spawn its workers.
    pub fn start(config: &ProvisioningConfig) -> (Self, JobQueueHandle) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accepting = Arc::new(AtomicBool::new(true));
        let receiver = Arc::new(Mutex::new(receiver));
        let metrics = MetricsRecorder::new();

        let worker_handles = (0..config.worker_count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&receiver),
                    shutdown_rx.clone(),
                    metrics.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            worker_count = worker_handles.len(),
            queue_capacity = config.queue_capacity,
            "Job queue workers spawned"
        );

        let queue = Self { sender, accepting: Arc::clone(&accepting), metrics };
        let handle = JobQueueHandle { shutdown_tx, accepting, worker_handles };
        (queue, handle)
    }

    /// Jobs currently waiting for a worker
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

impl JobQueue for InProcessJobQueue {
    fn enqueue(&self, job: Job) -> Result<(), JobQueueError> {
        let name = job.name().to_string();

        let result = if !self.accepting.load(Ordering::SeqCst) {
            Err(JobQueueError::QueueClosed { job: name.clone() })
        } else {
            self.sender.try_send(job).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    JobQueueError::QueueFull { job: name.clone() }
                }
                mpsc::error::TrySendError::Closed(_) => {
                    JobQueueError::QueueClosed { job: name.clone() }
                }
            })
        };

        match &result {
            Ok(()) => {
                self.metrics.record_job_enqueued(&name);
                self.metrics.update_job_queue_depth(self.depth());
            }
            Err(e) => self.metrics.record_job_rejected(&name, e.reason()),
        }
        result
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut shutdown_rx: watch::Receiver<bool>,
    metrics: MetricsRecorder,
) {
    info!(worker_id, "Job queue worker started");

    loop {
        tokio::select! {
            job = async {
                let mut rx = receiver.lock().await;
                rx.recv().await
            } => {
                match job {
                    Some(job) => run_job(worker_id, job, &metrics).await,
                    None => {
                        info!(worker_id, "Job channel closed, worker exiting");
                        break;
                    }
                }
            }

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(worker_id, "Received shutdown signal, draining queue");

                    let mut drained = 0;
                    loop {
                        let job = {
                            let mut rx = receiver.lock().await;
                            rx.try_recv()
                        };
                        match job {
                            Ok(job) => {
                                run_job(worker_id, job, &metrics).await;
                                drained += 1;
                            }
                            Err(_) => break,
                        }
                    }

                    info!(worker_id, drained_jobs = drained, "Worker shutdown complete");
                    break;
                }
            }
        }
    }
}

/// Run one job on its own task so a panic only loses that job.
async fn run_job(worker_id: usize, job: Job, metrics: &MetricsRecorder) {
    let (name, action) = job.into_parts();
    let span = crate::job_span!(name, worker_id);
    let started = Instant::now();

    let outcome = tokio::spawn(action.instrument(span)).await;
    let elapsed = started.elapsed().as_secs_f64();

    match outcome {
        Ok(Ok(())) => metrics.record_job_completed(&name, true, elapsed),
        Ok(Err(e)) => {
            metrics.record_job_completed(&name, false, elapsed);
            error!(worker_id, job = %name, error = %e, "Job failed");
        }
        Err(e) => {
            metrics.record_job_completed(&name, false, elapsed);
            warn!(worker_id, job = %name, error = %e, "Job panicked or was cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CertplaneError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn config(worker_count: usize, queue_capacity: usize) -> ProvisioningConfig {
        ProvisioningConfig { worker_count, queue_capacity }
    }

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = Arc::clone(counter);
        Job::new("count", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_enqueued_jobs_run() {
        let (queue, handle) = InProcessJobQueue::start(&config(2, 8));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            queue.enqueue(counting_job(&counter)).unwrap();
        }

        handle.shutdown_and_join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_enqueue_does_not_wait_for_job() {
        let (queue, handle) = InProcessJobQueue::start(&config(1, 4));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let job = Job::new("blocked", async move {
            let _ = release_rx.await;
            Ok(())
        });
        tokio::time::timeout(Duration::from_millis(100), async { queue.enqueue(job) })
            .await
            .expect("enqueue returned promptly")
            .unwrap();

        let _ = release_tx.send(());
        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let (queue, handle) = InProcessJobQueue::start(&config(1, 1));
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        queue
            .enqueue(Job::new("blocker", async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                Ok(())
            }))
            .unwrap();
        started_rx.await.unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        queue.enqueue(counting_job(&counter)).unwrap();
        let err = queue.enqueue(counting_job(&counter)).unwrap_err();
        assert_eq!(err, JobQueueError::QueueFull { job: "count".to_string() });

        let _ = release_tx.send(());
        handle.shutdown_and_join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_jobs() {
        let (queue, handle) = InProcessJobQueue::start(&config(1, 4));
        handle.shutdown();

        let counter = Arc::new(AtomicUsize::new(0));
        let err = queue.enqueue(counting_job(&counter)).unwrap_err();
        assert!(matches!(err, JobQueueError::QueueClosed { .. }));
        assert_eq!(err.reason(), "queue_closed");

        handle.join().await;
    }

    #[tokio::test]
    async fn test_failing_and_panicking_jobs_do_not_stop_workers() {
        let (queue, handle) = InProcessJobQueue::start(&config(1, 8));
        let counter = Arc::new(AtomicUsize::new(0));

        queue.enqueue(Job::new("fails", async { Err(CertplaneError::internal("boom")) })).unwrap();
        queue
            .enqueue(Job::new("panics", async {
                if std::hint::black_box(true) {
                    panic!("job panic");
                }
                Ok(())
            }))
            .unwrap();
        queue.enqueue(counting_job(&counter)).unwrap();

        handle.shutdown_and_join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
