//! Fixed-size render worker pool.
//!
//! Jobs are handed to workers over a zero-capacity channel, so
//! [`RenderPool::dispatch`] blocks until a worker is free. The producer can
//! therefore never run more than one job per worker ahead of rendering.
//!
//! [`RenderPool::join`] is the completion barrier: it closes the channel,
//! waits for every worker and returns a [`PoolReport`] in which each
//! dispatched job is accounted for exactly once (rendered, skipped after
//! cancellation, or failed).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Dispatch};

use crate::render::{FileRenderer, RenderJob};
use crate::{Error, Result};

/// How often an idle worker checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// A job that did not produce its page.
#[derive(Debug)]
pub struct RenderFailure {
    pub module: String,
    pub output: PathBuf,
    pub error: Error,
}

/// Outcome of all jobs handed to a pool.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub workers: usize,
    pub dispatched: usize,
    pub rendered: usize,
    /// Jobs received after cancellation and dropped unrendered.
    pub skipped: usize,
    pub failures: Vec<RenderFailure>,
}

impl PoolReport {
    /// Number of jobs that reached a worker and were finished one way or another.
    pub fn completed(&self) -> usize {
        self.rendered + self.skipped + self.failures.len()
    }

    /// True when every dispatched job was rendered.
    pub fn is_clean(&self) -> bool {
        self.rendered == self.dispatched && self.failures.is_empty()
    }

    fn absorb(&mut self, worker: WorkerReport) {
        self.rendered += worker.rendered;
        self.skipped += worker.skipped;
        self.failures.extend(worker.failures);
    }
}

#[derive(Debug, Default)]
struct WorkerReport {
    rendered: usize,
    skipped: usize,
    failures: Vec<RenderFailure>,
}

/// A fixed set of worker threads rendering [`RenderJob`]s.
pub struct RenderPool {
    sender: SyncSender<RenderJob>,
    handles: Vec<JoinHandle<WorkerReport>>,
    cancel: CancellationToken,
    dispatched: usize,
}

impl RenderPool {
    /// Starts `workers` threads that render jobs with `renderer`.
    ///
    /// Workers log through the tracing dispatcher that is current when the
    /// pool is spawned.
    pub fn spawn(workers: usize, renderer: Arc<dyn FileRenderer>) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidConfig(
                "render pool needs at least one worker".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::sync_channel::<RenderJob>(0);
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let receiver = Arc::clone(&receiver);
            let renderer = Arc::clone(&renderer);
            let cancel = cancel.clone();
            let dispatch = dispatch.clone();
            let handle = thread::Builder::new()
                .name(format!("render-{id}"))
                .spawn(move || {
                    tracing::dispatcher::with_default(&dispatch, || {
                        worker_loop(id, &receiver, renderer.as_ref(), &cancel)
                    })
                })?;
            handles.push(handle);
        }
        debug!(workers, "render pool started");

        Ok(Self {
            sender,
            handles,
            cancel,
            dispatched: 0,
        })
    }

    /// Hands a job to the next free worker, blocking until one accepts it.
    pub fn dispatch(&mut self, job: RenderJob) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::PoolClosed);
        }
        self.sender.send(job).map_err(|_| Error::PoolClosed)?;
        self.dispatched += 1;
        Ok(())
    }

    /// Signals every worker to stop rendering. Jobs already being rendered
    /// finish; later jobs are skipped. Idle workers exit within a poll
    /// interval, after which a blocked [`RenderPool::dispatch`] returns
    /// [`Error::PoolClosed`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Closes the pool and waits for every worker to finish.
    pub fn join(self) -> PoolReport {
        let Self {
            sender,
            handles,
            dispatched,
            ..
        } = self;
        drop(sender);

        let mut report = PoolReport {
            workers: handles.len(),
            dispatched,
            ..PoolReport::default()
        };
        for handle in handles {
            match handle.join() {
                Ok(worker) => report.absorb(worker),
                Err(payload) => error!(
                    reason = %panic_message(payload.as_ref()),
                    "render worker terminated abnormally"
                ),
            }
        }
        debug!(
            dispatched = report.dispatched,
            rendered = report.rendered,
            skipped = report.skipped,
            failed = report.failures.len(),
            "render pool drained"
        );
        report
    }
}

fn worker_loop(
    id: usize,
    receiver: &Mutex<Receiver<RenderJob>>,
    renderer: &dyn FileRenderer,
    cancel: &CancellationToken,
) -> WorkerReport {
    debug!(worker = id, "render worker started");
    let mut report = WorkerReport::default();

    loop {
        let next = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv_timeout(CANCEL_POLL)
        };
        let job = match next {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) if cancel.is_cancelled() => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if cancel.is_cancelled() {
            debug!(worker = id, module = %job.summary.display_file, "skipping job after cancellation");
            report.skipped += 1;
            continue;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| renderer.render_file(&job)))
            .unwrap_or_else(|payload| Err(Error::WorkerPanic(panic_message(payload.as_ref()))));
        match outcome {
            Ok(()) => report.rendered += 1,
            Err(error) => {
                warn!(
                    worker = id,
                    module = %job.summary.display_file,
                    error = %error,
                    "render failed"
                );
                report.failures.push(RenderFailure {
                    module: job.summary.display_file.clone(),
                    output: job.output,
                    error,
                });
            }
        }
    }

    debug!(worker = id, rendered = report.rendered, "render worker stopped");
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
