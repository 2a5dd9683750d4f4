use crate::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// A unit of work executed by a [`WorkerPool`](crate::WorkerPool).
///
/// Workers call the three stages in order on the thread that picked the task
/// up: [`before_run`](Self::before_run), [`run`](Self::run), then
/// [`after_run`](Self::after_run). `after_run` is called exactly once, even
/// when an earlier stage panics, which makes the pair of hooks the place to
/// set up and tear down per-thread state around `run`.
pub trait PoolTask: Send + 'static {
    type Output: Send + 'static;

    fn before_run(&mut self) {}

    fn run(&mut self) -> Self::Output;

    fn after_run(&mut self) {}
}

/// Drives a task through its stages and captures any panic.
///
/// A panic in `before_run` skips `run`. When both the task and `after_run`
/// panic, the first payload wins.
pub(crate) fn execute<T: PoolTask>(task: &mut T) -> thread::Result<T::Output> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        task.before_run();
        task.run()
    }));
    let teardown = panic::catch_unwind(AssertUnwindSafe(|| task.after_run()));

    match (outcome, teardown) {
        (Ok(output), Ok(())) => Ok(output),
        (Err(payload), _) | (Ok(_), Err(payload)) => Err(payload),
    }
}

/// A type-erased task as it travels through the queue.
///
/// Dropping a job without running it drops its completion sender, which is
/// how the matching [`TaskFuture`] learns that the task was discarded.
pub(crate) struct Job {
    run: Box<dyn FnOnce() -> bool + Send + 'static>,
}

impl Job {
    /// Pairs `task` with a fresh completion channel.
    pub(crate) fn new<T: PoolTask>(mut task: T) -> (Self, TaskFuture<T::Output>) {
        let (tx, rx): (Sender<thread::Result<T::Output>>, _) = crossbeam_channel::bounded(1);
        let run = Box::new(move || {
            let outcome = execute(&mut task);
            let completed = outcome.is_ok();
            // The caller may have stopped waiting; that is not our concern.
            let _ = tx.send(outcome);
            completed
        });
        (Self { run }, TaskFuture { rx })
    }

    /// Runs the task and reports whether it finished without panicking.
    pub(crate) fn run(self) -> bool {
        (self.run)()
    }
}

/// Handle to the eventual outcome of a submitted [`PoolTask`].
///
/// A future does not need to be polled for its task to make progress, and
/// dropping it does not cancel the task.
///
/// The outcome is sent only after the task's [`after_run`](PoolTask::after_run)
/// hook has returned, so once [`join`](Self::join) yields a result the task
/// has been fully torn down on its worker.
#[derive(Debug)]
pub struct TaskFuture<T> {
    rx: Receiver<thread::Result<T>>,
}

impl<T> TaskFuture<T> {
    /// Blocks until the task has run.
    ///
    /// The inner result is the task's output, or the payload of a panic
    /// raised by any of its stages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Interrupted`] if the pool discarded the task before
    /// it could run, for instance because the pool was shut down.
    pub fn join(self) -> Result<thread::Result<T>> {
        self.rx.recv().map_err(|_| Error::Interrupted)
    }

    /// Blocks until the task has run and returns its output, resuming a
    /// panic of the task on the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Interrupted`] if the task was discarded.
    pub fn wait(self) -> Result<T> {
        match self.join()? {
            Ok(output) => Ok(output),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
        fail_in: Option<&'static str>,
    }

    impl Recorder {
        fn stage(&self, name: &'static str) {
            self.log.lock().unwrap().push(name);
            if self.fail_in == Some(name) {
                panic!("{name} failed");
            }
        }
    }

    impl PoolTask for Recorder {
        type Output = u8;

        fn before_run(&mut self) {
            self.stage("before");
        }

        fn run(&mut self) -> u8 {
            self.stage("run");
            7
        }

        fn after_run(&mut self) {
            self.stage("after");
        }
    }

    fn recorder(fail_in: Option<&'static str>) -> (Recorder, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Recorder {
                log: Arc::clone(&log),
                fail_in,
            },
            log,
        )
    }

    #[test]
    fn stages_run_in_order() {
        let (mut task, log) = recorder(None);
        assert_eq!(execute(&mut task).unwrap(), 7);
        assert_eq!(*log.lock().unwrap(), ["before", "run", "after"]);
    }

    #[test]
    fn after_run_follows_a_panicking_run() {
        let (mut task, log) = recorder(Some("run"));
        assert!(execute(&mut task).is_err());
        assert_eq!(*log.lock().unwrap(), ["before", "run", "after"]);
    }

    #[test]
    fn panicking_before_run_skips_run() {
        let (mut task, log) = recorder(Some("before"));
        assert!(execute(&mut task).is_err());
        assert_eq!(*log.lock().unwrap(), ["before", "after"]);
    }

    #[test]
    fn panicking_after_run_is_reported() {
        let (mut task, _log) = recorder(Some("after"));
        let payload = execute(&mut task).unwrap_err();
        assert_eq!(payload.downcast_ref::<String>().unwrap(), "after failed");
    }

    #[test]
    fn dropped_job_interrupts_its_future() {
        let (task, _log) = recorder(None);
        let (job, future) = Job::new(task);
        drop(job);
        assert_eq!(future.join().unwrap_err(), Error::Interrupted);
    }

    #[test]
    fn join_returns_after_the_post_hook() {
        let (task, log) = recorder(Some("run"));
        let (job, future) = Job::new(task);
        let worker = std::thread::spawn(move || job.run());

        assert!(future.join().unwrap().is_err());
        assert_eq!(*log.lock().unwrap(), ["before", "run", "after"]);
        assert!(!worker.join().unwrap());
    }

    #[test]
    fn job_completes_its_future() {
        let (task, _log) = recorder(None);
        let (job, future) = Job::new(task);
        assert!(job.run());
        assert_eq!(future.wait().unwrap(), 7);
    }
}
