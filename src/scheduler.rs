use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::price_tracker::PriceTracker;

/// Lets at most one tick run at a time; overlapping ticks are dropped
#[derive(Clone, Default)]
pub struct TickGuard {
    running: Arc<Mutex<()>>,
}

impl TickGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the tick slot, or `None` if a tick is already in flight
    pub fn try_enter(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.running).try_lock_owned().ok()
    }

    /// Run `tick` unless another one is in flight. Returns whether it ran.
    pub async fn run_exclusive<F>(&self, tick: F) -> bool
    where
        F: Future<Output = ()>,
    {
        let Some(_held) = self.try_enter() else {
            return false;
        };
        tick.await;
        true
    }

    /// Wait for the in-flight tick, if any, to finish
    pub async fn drain(&self) {
        let _held = self.running.lock().await;
    }
}

/// Cron-driven price checks over every tracked hotel
pub struct Scheduler {
    sched: JobScheduler,
    tracker: PriceTracker,
    guard: TickGuard,
}

impl Scheduler {
    pub async fn start(tracker: PriceTracker, cron: &str) -> Result<Self> {
        let sched = JobScheduler::new().await?;
        let guard = TickGuard::new();

        let job_tracker = tracker.clone();
        let job_guard = guard.clone();
        let job = Job::new_async(cron, move |_uuid, _l| {
            let tracker = job_tracker.clone();
            let guard = job_guard.clone();
            Box::pin(async move {
                run_guarded(&guard, &tracker).await;
            })
        })
        .with_context(|| format!("Invalid schedule {cron:?}"))?;

        sched.add(job).await?;
        sched.start().await?;
        info!(schedule = %cron, "Scheduler started");

        Ok(Self {
            sched,
            tracker,
            guard,
        })
    }

    /// Start one tick now in the background, outside the schedule.
    ///
    /// The tick slot is claimed before this returns, so a `shutdown` issued
    /// right after still waits for it.
    pub fn spawn_now(&self) -> Option<JoinHandle<()>> {
        spawn_guarded(&self.guard, &self.tracker)
    }

    /// Stop scheduling, let the current tick finish, then release browsers
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Stopping scheduler");
        self.sched.shutdown().await?;

        self.guard.drain().await;
        self.tracker.release().await;

        info!("Scheduler stopped");
        Ok(())
    }
}

fn spawn_guarded(guard: &TickGuard, tracker: &PriceTracker) -> Option<JoinHandle<()>> {
    let Some(held) = guard.try_enter() else {
        warn!("Price check already running, not starting another");
        return None;
    };

    let tracker = tracker.clone();
    Some(tokio::spawn(async move {
        let _held = held;
        if let Err(e) = tracker.run_tick().await {
            error!("Price check failed: {:#}", e);
        }
    }))
}

async fn run_guarded(guard: &TickGuard, tracker: &PriceTracker) {
    let ran = guard
        .run_exclusive(async {
            if let Err(e) = tracker.run_tick().await {
                error!("Price check failed: {:#}", e);
            }
        })
        .await;

    if !ran {
        warn!("Previous price check still running, skipping this tick");
    }
}
