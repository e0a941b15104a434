//! Background worker pool
//!
//! Jobs wait in a priority queue (high before normal, FIFO within a
//! priority) and are executed by a fixed set of worker threads. Workers only
//! perform I/O and parsing through a [`JobExecutor`]; results travel back to
//! the home thread over a channel as [`Completion`]s and are applied there.
//!
//! Cancellation is cooperative: the token is checked before a job starts,
//! and executors may check it between I/O steps.

use crate::artifact::{AnyPayload, ArtifactKind, Locator};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStep {
    DiskLoad,
    NetworkFetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Normal,
    High,
}

impl Priority {
    pub fn from_high(high: bool) -> Self {
        if high {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

/// Unit of background work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub kind: ArtifactKind,
    pub step: JobStep,
    pub locator: Locator,
    pub priority: Priority,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, atomic::Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(atomic::Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    token: CancelToken,
}

impl JobHandle {
    pub fn new(id: JobId, token: CancelToken) -> Self {
        JobHandle { id, token }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Loaded {
        payload: AnyPayload,
        fetched: DateTime<Utc>,
    },
    /// Nothing stored on disk (or remotely) for this locator
    NotFound,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub id: JobId,
    pub kind: ArtifactKind,
    pub step: JobStep,
    pub outcome: JobOutcome,
}

/// Performs the blocking part of a job on a worker thread
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &Job, cancel: &CancelToken) -> JobOutcome;
}

/// Where caches submit their jobs
pub trait Scheduler {
    fn schedule(&self, job: Job) -> JobHandle;

    fn cancel(&self, handle: &JobHandle);
}

struct Queued {
    priority: Priority,
    seq: u64,
    id: JobId,
    job: Job,
    token: CancelToken,
}

impl Queued {
    fn rank(&self) -> (Priority, Reverse<u64>) {
        (self.priority, Reverse(self.seq))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

struct QueueState {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
    running: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    completions: Receiver<Completion>,
}

impl WorkerPool {
    /// Start `threads` workers (at least one) running `executor`
    pub fn new(threads: usize, executor: Arc<dyn JobExecutor>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 1,
                running: true,
            }),
            available: Condvar::new(),
        });
        let (tx, rx) = channel::unbounded();

        let workers = (0..threads.max(1))
            .map(|n| {
                let shared = Arc::clone(&shared);
                let executor = Arc::clone(&executor);
                let tx = tx.clone();
                thread::Builder::new()
                    .name(format!("catalog-worker-{}", n))
                    .spawn(move || worker_loop(&shared, executor.as_ref(), &tx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!("Failed to spawn worker thread: {}", e);
                    None
                }
            })
            .collect();

        WorkerPool {
            shared,
            workers,
            completions: rx,
        }
    }

    pub fn enqueue(&self, job: Job) -> JobHandle {
        let token = CancelToken::new();
        let mut state = self.shared.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;

        trace!("Enqueue job {} {:?} {} ({:?})", seq, job.step, job.locator, job.priority);
        state.heap.push(Queued {
            priority: job.priority,
            seq,
            id: seq,
            job,
            token: token.clone(),
        });
        drop(state);

        self.shared.available.notify_one();
        JobHandle::new(seq, token)
    }

    pub fn cancel(&self, handle: &JobHandle) {
        handle.token.cancel();
    }

    pub fn try_recv(&self) -> Option<Completion> {
        self.completions.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Completion> {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.state.lock().heap.len()
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting work and join every worker; queued jobs are dropped
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.running = false;
            state.heap.clear();
        }
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Scheduler for WorkerPool {
    fn schedule(&self, job: Job) -> JobHandle {
        self.enqueue(job)
    }

    fn cancel(&self, handle: &JobHandle) {
        WorkerPool::cancel(self, handle)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared, executor: &dyn JobExecutor, tx: &Sender<Completion>) {
    loop {
        let queued = {
            let mut state = shared.state.lock();
            loop {
                if !state.running {
                    return;
                }
                if let Some(queued) = state.heap.pop() {
                    break queued;
                }
                shared.available.wait(&mut state);
            }
        };

        let outcome = if queued.token.is_cancelled() {
            JobOutcome::Cancelled
        } else {
            executor.execute(&queued.job, &queued.token)
        };
        debug!("Job {} {:?} {} finished: {}", queued.id, queued.job.step, queued.job.locator, outcome_name(&outcome));

        let completion = Completion {
            id: queued.id,
            kind: queued.job.kind,
            step: queued.job.step,
            outcome,
        };
        if tx.send(completion).is_err() {
            return;
        }
    }
}

fn outcome_name(outcome: &JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Loaded { .. } => "loaded",
        JobOutcome::NotFound => "not found",
        JobOutcome::Failed(_) => "failed",
        JobOutcome::Cancelled => "cancelled",
    }
}
