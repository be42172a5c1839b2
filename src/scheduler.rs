//! Single pending task scheduling.
//!
//! Renders and visibility recomputations are coalesced: any number of requests made
//! before the executor gets around to running the task collapse into one run of the
//! most recently requested job. The executor is injected, so the same code runs on a
//! tokio frame timer, inline, or under manual control in tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs later.
pub trait Executor: Send + Sync {
    /// Run `job` at the executor's next opportunity.
    fn defer(&self, job: Job);
}

/// Runs jobs immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn defer(&self, job: Job) {
        job();
    }
}

/// Queues jobs until [`ManualExecutor::run_pending`] is called.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Job>>,
}

impl ManualExecutor {
    /// Create an empty executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued job, including jobs queued while running. Returns the count.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.queue.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Number of queued jobs.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Executor for ManualExecutor {
    fn defer(&self, job: Job) {
        self.queue.lock().push_back(job);
    }
}

/// Runs jobs on a tokio runtime after one frame interval.
#[derive(Debug, Clone)]
pub struct FrameExecutor {
    handle: tokio::runtime::Handle,
    frame: Duration,
}

impl FrameExecutor {
    /// Bind to an explicit runtime handle.
    pub fn new(handle: tokio::runtime::Handle, frame: Duration) -> Self {
        Self { handle, frame }
    }

    /// Bind to the runtime of the calling task, if any.
    pub fn current(frame: Duration) -> Option<Self> {
        tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| Self::new(handle, frame))
    }
}

impl Executor for FrameExecutor {
    fn defer(&self, job: Job) {
        let frame = self.frame;
        self.handle.spawn(async move {
            tokio::time::sleep(frame).await;
            job();
        });
    }
}

#[derive(Default)]
struct Slot {
    job: Option<Job>,
    scheduled: bool,
    generation: u64,
    runs: u64,
}

/// Coalescing scheduler holding at most one pending job.
///
/// `request` replaces the pending job and schedules a run if none is scheduled;
/// `cancel` drops the pending job and invalidates the scheduled run.
#[derive(Clone)]
pub struct SinglePending {
    executor: Arc<dyn Executor>,
    slot: Arc<Mutex<Slot>>,
}

impl std::fmt::Debug for SinglePending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("SinglePending")
            .field("scheduled", &slot.scheduled)
            .field("generation", &slot.generation)
            .field("runs", &slot.runs)
            .finish()
    }
}

impl SinglePending {
    /// Create a scheduler over an executor.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor, slot: Arc::new(Mutex::new(Slot::default())) }
    }

    /// Make `job` the pending job. Returns `true` if this call scheduled a new run.
    pub fn request<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = {
            let mut slot = self.slot.lock();
            slot.job = Some(Box::new(job));
            if slot.scheduled {
                return false;
            }
            slot.scheduled = true;
            slot.generation
        };
        let slot = Arc::clone(&self.slot);
        self.executor.defer(Box::new(move || {
            let job = {
                let mut slot = slot.lock();
                if slot.generation != generation {
                    return;
                }
                slot.scheduled = false;
                slot.runs += 1;
                slot.job.take()
            };
            if let Some(job) = job {
                job();
            }
        }));
        true
    }

    /// Drop the pending job, if any. Returns `true` if one was dropped.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        slot.scheduled = false;
        slot.job.take().is_some()
    }

    /// Whether a run is scheduled.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().scheduled
    }

    /// Number of runs executed so far.
    pub fn runs(&self) -> u64 {
        self.slot.lock().runs
    }
}
