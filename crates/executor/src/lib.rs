//! Shard Executor — bounded-concurrency FIFO job queues partitioned by
//! shard key (a memory id, in the write pipeline above this crate).
//! Each shard is one `tokio::spawn`ed worker loop pulling from a bounded
//! `mpsc` channel, with exponential-backoff retry on transient job
//! failures — "N parallel shard workers, each single-threaded FIFO".

mod cancel;
mod config;
mod error;
mod job;

pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use config::ExecutorConfig;
pub use error::{AckError, ExecutorError, JobFailure};
pub use job::Job;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

struct Envelope {
    job: Box<dyn Job>,
    ack_tx: oneshot::Sender<Result<(), anyhow::Error>>,
}

/// Handle returned by `submit`. Resolves once the job has completed
/// (success or terminal failure,). Dropping this handle
/// without awaiting it does not abort the job — it keeps running on its
/// shard worker regardless.
pub struct JobAck {
    rx: oneshot::Receiver<Result<(), anyhow::Error>>,
}

impl JobAck {
    pub async fn wait(self) -> Result<(), AckError> {
        match self.rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AckError::Failed(e)),
            Err(_) => Err(AckError::ExecutorClosed),
        }
    }
}

/// FNV-1a: a small, stable, non-cryptographic hash.
/// Deterministic across processes and Rust versions, unlike
/// `std::collections::hash_map::DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

struct ShardState {
    sender: mpsc::Sender<Envelope>,
    queue_len: Arc<AtomicUsize>,
}

/// Bounded-concurrency FIFO job queue partitioned by shard key. N worker
/// tasks, each owning one bounded queue; `submit` hashes the caller's
/// shard key onto exactly one worker, so all jobs sharing a key observe
/// strict FIFO while jobs on different keys run in parallel.
pub struct ShardExecutor {
    cfg: ExecutorConfig,
    shards: Mutex<Option<Vec<ShardState>>>,
    workers: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl ShardExecutor {
    pub fn new(cfg: ExecutorConfig) -> Arc<Self> {
        let mut shards = Vec::with_capacity(cfg.shards);
        let mut workers = Vec::with_capacity(cfg.shards);
        for shard in 0..cfg.shards {
            let (tx, rx) = mpsc::channel(cfg.queue_capacity.max(1));
            let queue_len = Arc::new(AtomicUsize::new(0));
            let worker_queue_len = queue_len.clone();
            let worker_cfg = cfg.clone();
            workers.push(tokio::spawn(worker_loop(shard, rx, worker_queue_len, worker_cfg)));
            shards.push(ShardState { sender: tx, queue_len });
        }
        Arc::new(Self {
            cfg,
            shards: Mutex::new(Some(shards)),
            workers: Mutex::new(Some(workers)),
        })
    }

    fn shard_index(&self, shard_key: &[u8]) -> usize {
        (fnv1a(shard_key) % self.cfg.shards as u64) as usize
    }

    /// Returns the shard index a given key would be routed to. Exposed
    /// for diagnostics and tests (e.g. asserting FIFO order per memory).
    pub fn route(&self, shard_key: &[u8]) -> usize {
        self.shard_index(shard_key)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.cfg
    }

    /// Current queue length of the shard `shard_key` hashes to, for
    /// diagnostics.
    pub fn queue_len(&self, shard_key: &[u8]) -> Option<usize> {
        let idx = self.shard_index(shard_key);
        let guard = self.shards.lock().unwrap();
        guard.as_ref().map(|s| s[idx].queue_len.load(Ordering::SeqCst))
    }

    /// Enqueue `job` onto the shard `shard_key` hashes to. Blocks up to
    /// `submitTimeout` waiting for room in a full queue; returns
    /// `QueueFull` if it never finds any. If `cancellation` fires before
    /// the job reaches the queue, returns `CancelledBeforeEnqueue` and
    /// the job is never enqueued — the
    /// analogue of "ack resolves with cancellation error" folded into
    /// this call's own result, since nothing was enqueued to ack.
    pub async fn submit(
        &self,
        shard_key: &[u8],
        job: Box<dyn Job>,
        cancellation: Option<Cancellation>,
    ) -> Result<JobAck, ExecutorError> {
        let shard = self.shard_index(shard_key);
        let (sender, queue_len) = {
            let guard = self.shards.lock().unwrap();
            let shards = guard.as_ref().ok_or(ExecutorError::Closed)?;
            (shards[shard].sender.clone(), shards[shard].queue_len.clone())
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        let envelope = Envelope { job, ack_tx };

        let enqueue = tokio::time::timeout(self.cfg.submit_timeout, sender.send(envelope));

        let outcome = match cancellation {
            Some(mut cancellation) => {
                tokio::select! {
                    res = enqueue => res,
                    _ = cancellation.cancelled() => return Err(ExecutorError::CancelledBeforeEnqueue),
                }
            }
            None => enqueue.await,
        };

        match outcome {
            Ok(Ok(())) => {
                queue_len.fetch_add(1, Ordering::SeqCst);
                Ok(JobAck { rx: ack_rx })
            }
            Ok(Err(_)) => Err(ExecutorError::Closed),
            Err(_elapsed) => Err(ExecutorError::QueueFull {
                shard,
                length: queue_len.load(Ordering::SeqCst),
                capacity: self.cfg.queue_capacity,
            }),
        }
    }

    /// After `close`, new submissions fail with `ExecutorError::Closed`.
    /// If `drain`, waits until every in-flight and queued job has
    /// completed before returning.
    pub async fn close(&self, drain: bool) {
        let shards = self.shards.lock().unwrap().take();
        drop(shards); // drops the stored senders; channels close once in-flight clones finish

        if drain {
            let workers = self.workers.lock().unwrap().take();
            if let Some(handles) = workers {
                for handle in handles {
                    let _ = handle.await;
                }
            }
        }
    }
}

async fn worker_loop(
    shard: usize,
    mut rx: mpsc::Receiver<Envelope>,
    queue_len: Arc<AtomicUsize>,
    cfg: ExecutorConfig,
) {
    while let Some(envelope) = rx.recv().await {
        queue_len.fetch_sub(1, Ordering::SeqCst);
        let Envelope { mut job, ack_tx } = envelope;
        let label = job.label();
        let mut attempt = 0usize;
        let mut backoff = cfg.base_backoff;

        let result = loop {
            attempt += 1;
            match job.run().await {
                Ok(()) => break Ok(()),
                Err(failure) if failure.transient && attempt < cfg.max_attempts => {
                    warn!(shard, attempt, job = label, error = %failure.error, "job failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(cfg.max_backoff);
                }
                Err(failure) => break Err(failure.error),
            }
        };

        let _ = ack_tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct RecordingJob {
        log: Arc<Mutex<Vec<u32>>>,
        value: u32,
        fail_times: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl Job for RecordingJob {
        async fn run(&mut self) -> Result<(), JobFailure> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(JobFailure::transient(anyhow::anyhow!("transient failure")));
            }
            self.log.lock().unwrap().push(self.value);
            Ok(())
        }
    }

    #[tokio::test]
    async fn fifo_order_within_a_shard() {
        let exec = ShardExecutor::new(ExecutorConfig {
            shards: 4,
            ..Default::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        let key = b"memory-1";
        let mut acks = Vec::new();
        for i in 0..20u32 {
            let job = RecordingJob {
                log: log.clone(),
                value: i,
                fail_times: Arc::new(AtomicU32::new(0)),
            };
            acks.push(exec.submit(key, Box::new(job), None).await.unwrap());
        }
        for ack in acks {
            ack.wait().await.unwrap();
        }
        let observed = log.lock().unwrap().clone();
        let expected: Vec<u32> = (0..20).collect();
        assert_eq!(observed, expected);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_succeeds() {
        let exec = ShardExecutor::new(ExecutorConfig {
            shards: 1,
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..Default::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        let job = RecordingJob {
            log: log.clone(),
            value: 7,
            fail_times: Arc::new(AtomicU32::new(2)),
        };
        let ack = exec.submit(b"m", Box::new(job), None).await.unwrap();
        ack.wait().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_terminal_error() {
        let exec = ShardExecutor::new(ExecutorConfig {
            shards: 1,
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..Default::default()
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        let job = RecordingJob {
            log: log.clone(),
            value: 1,
            fail_times: Arc::new(AtomicU32::new(10)),
        };
        let ack = exec.submit(b"m", Box::new(job), None).await.unwrap();
        assert!(ack.wait().await.is_err());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_after_close_is_rejected() {
        let exec = ShardExecutor::new(ExecutorConfig::default());
        exec.close(true).await;
        let job = RecordingJob {
            log: Arc::new(Mutex::new(Vec::new())),
            value: 0,
            fail_times: Arc::new(AtomicU32::new(0)),
        };
        let res = exec.submit(b"m", Box::new(job), None).await;
        assert!(matches!(res, Err(ExecutorError::Closed)));
    }

    #[tokio::test]
    async fn queue_full_returns_diagnostic_fields() {
        let exec = ShardExecutor::new(ExecutorConfig {
            shards: 1,
            queue_capacity: 2,
            submit_timeout: Duration::from_millis(50),
            ..Default::default()
        });

        struct BlockingJob {
            gate: Arc<tokio::sync::Notify>,
        }
        #[async_trait::async_trait]
        impl Job for BlockingJob {
            async fn run(&mut self) -> Result<(), JobFailure> {
                self.gate.notified().await;
                Ok(())
            }
        }

        let gate = Arc::new(tokio::sync::Notify::new());
        let blocker = BlockingJob { gate: gate.clone() };
        let _ack0 = exec.submit(b"m", Box::new(blocker), None).await.unwrap();
        // Let the worker dequeue and start running the blocker before filling
        // the now-empty queue to capacity.
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Fill the queue to capacity with no-op jobs behind the blocked worker.
        struct NoopJob;
        #[async_trait::async_trait]
        impl Job for NoopJob {
            async fn run(&mut self) -> Result<(), JobFailure> {
                Ok(())
            }
        }
        let _ack1 = exec.submit(b"m", Box::new(NoopJob), None).await.unwrap();
        let _ack2 = exec.submit(b"m", Box::new(NoopJob), None).await.unwrap();

        let res = exec.submit(b"m", Box::new(NoopJob), None).await;
        match res {
            Err(ExecutorError::QueueFull { shard, length, capacity }) => {
                assert_eq!(shard, 0);
                assert_eq!(capacity, 2);
                assert_eq!(length, 2);
            }
            other => panic!("expected QueueFull, got {other:?}"),
        }
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn cancellation_before_enqueue_prevents_submit() {
        let exec = ShardExecutor::new(ExecutorConfig::default());
        let (handle, cancellation) = cancellation();
        handle.cancel();
        let job = RecordingJob {
            log: Arc::new(Mutex::new(Vec::new())),
            value: 0,
            fail_times: Arc::new(AtomicU32::new(0)),
        };
        let res = exec.submit(b"m", Box::new(job), Some(cancellation)).await;
        assert!(matches!(res, Err(ExecutorError::CancelledBeforeEnqueue)));
    }
}
