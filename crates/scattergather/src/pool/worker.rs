use super::task::Job;
use crossbeam_channel::Receiver;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

/// State shared by the pool handle and all of its workers.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) shutdown: AtomicBool,
    pub(crate) queued: AtomicUsize,
    pub(crate) active: AtomicUsize,
    pub(crate) completed: AtomicUsize,
}

impl Shared {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Body of one pool thread.
///
/// The worker takes jobs from the shared queue until every sender is gone.
/// After shutdown has begun, jobs still arriving are dropped unrun, which
/// resolves their futures as interrupted.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker within its pool (used for logs).
/// - `rx`: Receiving end of the pool's job queue.
/// - `shared`: Counters and the shutdown flag of the owning pool.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub(crate) fn worker_loop(worker_id: usize, rx: Receiver<Job>, shared: &Shared) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Ok(job) = rx.recv() {
        shared.queued.fetch_sub(1, Ordering::AcqRel);

        if shared.is_shutdown() {
            #[cfg(feature = "tracing")]
            tracing::trace!("Worker {worker_id} discarded a task after shutdown");
            drop(job);
            continue;
        }

        shared.active.fetch_add(1, Ordering::AcqRel);
        let completed = job.run();
        shared.active.fetch_sub(1, Ordering::AcqRel);
        shared.completed.fetch_add(1, Ordering::AcqRel);

        if !completed {
            #[cfg(feature = "tracing")]
            tracing::warn!("Worker {worker_id} caught a panicking task");
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}
