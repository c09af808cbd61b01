//! Periodic job plumbing for the automation runner.

use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobSchedulerError};

/// Interval between idle checks while waiting for in-flight passes
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Marks one loop as running so overlapping ticks are skipped.
#[derive(Clone)]
pub struct TickGuard {
    name: &'static str,
    running: Arc<AtomicBool>,
}

impl TickGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the loop for one pass; `None` if a pass is already running
    pub fn try_enter(&self) -> Option<TickPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit {
                running: self.running.clone(),
            })
    }
}

/// Releases its guard when dropped
pub struct TickPermit {
    running: Arc<AtomicBool>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Run one pass of `task` unless the previous pass is still in flight.
/// Returns whether the pass ran.
pub async fn run_guarded<F, Fut>(guard: &TickGuard, task: F) -> bool
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let Some(_permit) = guard.try_enter() else {
        warn!("Skipping {} tick: previous pass still running", guard.name());
        return false;
    };
    debug!("{} tick started", guard.name());
    task().await;
    true
}

/// A job firing every `interval`, guarded against overlapping passes
pub fn repeated_job<F, Fut>(
    guard: TickGuard,
    interval: Duration,
    task: F,
) -> Result<Job, JobSchedulerError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = Arc::new(task);
    Job::new_repeated_async(interval, move |_uuid, _l| {
        let guard = guard.clone();
        let task = task.clone();
        Box::pin(async move {
            run_guarded(&guard, || task()).await;
        })
    })
}

/// Wait for every guarded loop to finish its current pass. Returns `false`
/// if some pass is still running after `timeout`.
pub async fn wait_until_idle(guards: &[TickGuard], timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let busy: Vec<&str> = guards
            .iter()
            .filter(|g| g.is_running())
            .map(|g| g.name())
            .collect();
        if busy.is_empty() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("Still running at shutdown: {}", busy.join(", "));
            return false;
        }
        tokio::time::sleep(IDLE_POLL).await;
    }
}
