//! A fixed-size pool of worker threads fed from one shared queue.
//!
//! [`WorkerPool`] owns long-lived, named OS threads. Submitted [`PoolTask`]s
//! travel through a single multi-consumer [`crossbeam_channel`] queue, so any
//! idle worker picks up the next task and no per-worker balancing is needed.
//!
//! Submission hands back one [`TaskFuture`] per task. Waiting on the futures
//! is the caller's business; [`WorkerPool::invoke_all`] does both in one call.

use super::task::{Job, PoolTask, TaskFuture};
use super::worker::{Shared, worker_loop};
use crate::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use portable_atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Default prefix of worker thread names; workers are named `{prefix}-{index}`.
pub const DEFAULT_THREAD_NAME: &str = "scattergather-worker";

/// Admission policy of the pool's task queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QueuePolicy {
    /// Every submission is accepted immediately.
    #[default]
    Unbounded,
    /// At most `n` tasks wait in the queue; submission blocks while it is full.
    Bounded(usize),
}

/// Point-in-time counters of a [`WorkerPool`].
///
/// The counters are read one by one without a common lock, so a snapshot
/// taken while tasks move through the pool may be slightly inconsistent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub workers: usize,
    /// Tasks accepted but not yet picked up by a worker.
    pub queued: usize,
    /// Tasks currently running.
    pub active: usize,
    /// Tasks that ran to the end, including those that panicked.
    pub completed: usize,
}

/// Configures and starts a [`WorkerPool`].
#[derive(Clone, Debug)]
pub struct PoolBuilder {
    workers: usize,
    queue: QueuePolicy,
    thread_name: String,
}

impl PoolBuilder {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            queue: QueuePolicy::default(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    #[must_use]
    pub const fn queue_policy(mut self, queue: QueuePolicy) -> Self {
        self.queue = queue;
        self
    }

    #[must_use]
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Spawns the workers.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPoolSize`] if the worker count is zero.
    /// - [`Error::Spawn`] if the OS refuses to start a thread. Workers that
    ///   were already running are shut down again.
    pub fn build(self) -> Result<WorkerPool> {
        if self.workers == 0 {
            return Err(Error::InvalidPoolSize { size: 0 });
        }

        let (tx, rx) = match self.queue {
            QueuePolicy::Unbounded => crossbeam_channel::unbounded(),
            QueuePolicy::Bounded(capacity) => crossbeam_channel::bounded(capacity),
        };

        let pool = WorkerPool {
            sender: Mutex::new(Some(tx)),
            receiver: rx,
            handles: Mutex::new(Vec::with_capacity(self.workers)),
            shared: Arc::new(Shared::default()),
            workers: self.workers,
        };

        for worker_id in 0..self.workers {
            let rx = pool.receiver.clone();
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{worker_id}", self.thread_name))
                .spawn(move || worker_loop(worker_id, rx, &shared))
                .map_err(|e| Error::Spawn {
                    reason: e.to_string(),
                })?;
            pool.handles.lock().push(handle);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            workers = self.workers,
            queue = ?self.queue,
            "Worker pool started"
        );

        Ok(pool)
    }
}

/// A fixed set of worker threads executing [`PoolTask`]s.
///
/// The pool is meant to be shared, typically as `Arc<WorkerPool>`, by every
/// caller that fans work out onto it. Dropping the pool shuts it down.
///
/// # Example
/// ```
/// use scattergather::{PoolTask, WorkerPool};
///
/// struct Square(u64);
///
/// impl PoolTask for Square {
///     type Output = u64;
///
///     fn run(&mut self) -> u64 {
///         self.0 * self.0
///     }
/// }
///
/// let pool = WorkerPool::new(2)?;
/// let squares: Vec<u64> = pool
///     .invoke_all((1..=4).map(Square))?
///     .into_iter()
///     .map(|outcome| outcome.unwrap())
///     .collect();
/// assert_eq!(squares, [1, 4, 9, 16]);
/// # Ok::<(), scattergather::Error>(())
/// ```
#[derive(Debug)]
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Shared>,
    workers: usize,
}

impl WorkerPool {
    /// Starts `workers` threads with an unbounded queue.
    ///
    /// # Errors
    ///
    /// See [`PoolBuilder::build`].
    pub fn new(workers: usize) -> Result<Self> {
        PoolBuilder::new(workers).build()
    }

    pub fn builder(workers: usize) -> PoolBuilder {
        PoolBuilder::new(workers)
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Queues every task and returns their futures in submission order.
    ///
    /// Returns once all tasks have been accepted. With a
    /// [bounded](QueuePolicy::Bounded) queue that may mean waiting for
    /// workers to make room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolShutdown`] if the pool no longer accepts work.
    /// Tasks queued before the error was noticed are discarded with it.
    pub fn submit_all<T, I>(&self, tasks: I) -> Result<Vec<TaskFuture<T::Output>>>
    where
        T: PoolTask,
        I: IntoIterator<Item = T>,
    {
        // Clone the sender so a blocking send never holds the lock.
        let sender = self.sender.lock().clone().ok_or(Error::PoolShutdown)?;

        let tasks = tasks.into_iter();
        let mut futures = Vec::with_capacity(tasks.size_hint().0);
        for task in tasks {
            if self.shared.is_shutdown() {
                return Err(Error::PoolShutdown);
            }

            let (job, future) = Job::new(task);
            self.shared.queued.fetch_add(1, Ordering::AcqRel);
            if sender.send(job).is_err() {
                self.shared.queued.fetch_sub(1, Ordering::AcqRel);
                return Err(Error::PoolShutdown);
            }
            futures.push(future);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(tasks = futures.len(), "Submitted tasks to worker pool");

        Ok(futures)
    }

    /// Submits every task and blocks until all of them have run.
    ///
    /// Outcomes are returned in submission order; a task that panicked
    /// yields its panic payload.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolShutdown`] if the pool no longer accepts work.
    /// - [`Error::Interrupted`] if the pool discarded one of the tasks.
    pub fn invoke_all<T, I>(&self, tasks: I) -> Result<Vec<thread::Result<T::Output>>>
    where
        T: PoolTask,
        I: IntoIterator<Item = T>,
    {
        self.submit_all(tasks)?
            .into_iter()
            .map(TaskFuture::join)
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers,
            queued: self.shared.queued.load(Ordering::Acquire),
            active: self.shared.active.load(Ordering::Acquire),
            completed: self.shared.completed.load(Ordering::Acquire),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Stops the pool.
    ///
    /// New submissions fail with [`Error::PoolShutdown`]. Tasks still waiting
    /// in the queue are discarded, so their futures resolve to
    /// [`Error::Interrupted`]. Running tasks finish normally. Blocks until
    /// every worker has exited. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new tasks");
        drop(self.sender.lock().take());

        let discarded = self
            .receiver
            .try_iter()
            .inspect(|_| {
                self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            })
            .count();
        #[cfg(feature = "tracing")]
        tracing::debug!(discarded, "Discarded queued tasks");
        #[cfg(not(feature = "tracing"))]
        let _ = discarded;

        let handles = core::mem::take(&mut *self.handles.lock());
        let current = thread::current().id();
        for handle in handles {
            // The last handle to the pool may be released by one of its own tasks.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker thread exited abnormally");
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
