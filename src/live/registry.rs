//! Registry of scheduled live instances.
//!
//! One tokio task per instance id ticks at the instance interval and runs a
//! cycle per tick. A per-id guard, kept across re-registrations of the same
//! id, ensures cycles of one instance never overlap: a tick that finds the
//! guard held is skipped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cycle::{run_cycle, CycleContext, CycleOutcome, TradingInstance};
use crate::domain::error::SigtraderError;

pub type InstanceGuard = Arc<tokio::sync::Mutex<()>>;

type GuardMap = Arc<Mutex<HashMap<i64, InstanceGuard>>>;

struct Job {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct InstanceRegistry {
    ctx: Arc<CycleContext>,
    jobs: Mutex<HashMap<i64, Job>>,
    guards: GuardMap,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drop the map entry of `instance_id` once the map holds the only reference.
fn prune_guard(guards: &Mutex<HashMap<i64, InstanceGuard>>, instance_id: i64) {
    let mut map = lock(guards);
    if map
        .get(&instance_id)
        .is_some_and(|guard| Arc::strong_count(guard) == 1)
    {
        map.remove(&instance_id);
    }
}

/// Run one cycle unless another cycle of the same instance holds the guard.
pub async fn run_guarded_cycle(
    ctx: &CycleContext,
    instance: &TradingInstance,
    guard: &InstanceGuard,
) -> Result<CycleOutcome, SigtraderError> {
    let Ok(_held) = guard.try_lock() else {
        return Ok(CycleOutcome::Skipped);
    };
    run_cycle(ctx, instance).await
}

async fn run_instance(
    ctx: Arc<CycleContext>,
    instance: TradingInstance,
    guard: InstanceGuard,
    guards: GuardMap,
    cancel: CancellationToken,
) {
    // first tick one interval after registration
    let mut ticker = interval_at(Instant::now() + instance.interval, instance.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // cancellation wins over a tick that came due during a long cycle
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // a cycle already under way finishes even if cancelled meanwhile
        match run_guarded_cycle(&ctx, &instance, &guard).await {
            Ok(CycleOutcome::Skipped) => {
                debug!(instance_id = instance.id, "previous cycle still running, tick skipped")
            }
            Ok(outcome) => debug!(instance_id = instance.id, ?outcome, "cycle complete"),
            Err(e) => warn!(
                instance_id = instance.id,
                inst_id = %instance.inst_id,
                transient = e.is_transient(),
                error = %e,
                "cycle failed"
            ),
        }
    }
    drop(guard);
    prune_guard(&guards, instance.id);
    debug!(instance_id = instance.id, "instance loop stopped");
}

impl InstanceRegistry {
    pub fn new(ctx: Arc<CycleContext>) -> Self {
        Self {
            ctx,
            jobs: Mutex::new(HashMap::new()),
            guards: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The shared non-reentrant guard of `instance_id`.
    pub fn guard(&self, instance_id: i64) -> InstanceGuard {
        lock(&self.guards)
            .entry(instance_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Schedule `instance`, replacing any schedule already registered under its id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, instance: TradingInstance) -> Result<(), SigtraderError> {
        if instance.interval.is_zero() {
            return Err(SigtraderError::ConfigInvalid {
                section: format!("instance.{}", instance.id),
                key: "interval_sec".into(),
                reason: "interval must be greater than zero".into(),
            });
        }

        let id = instance.id;
        let interval = instance.interval;
        let guard = self.guard(id);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_instance(
            Arc::clone(&self.ctx),
            instance,
            guard,
            Arc::clone(&self.guards),
            cancel.clone(),
        ));

        if let Some(previous) = lock(&self.jobs).insert(id, Job { cancel, handle }) {
            previous.cancel.cancel();
            info!(instance_id = id, "instance re-registered, previous schedule cancelled");
        }
        info!(instance_id = id, interval_secs = interval.as_secs(), "instance registered");
        Ok(())
    }

    /// Stop future ticks of `instance_id`. An in-flight cycle runs to completion.
    /// Returns whether the id was registered.
    ///
    /// The guard of the id is released here if nothing holds it, otherwise by
    /// the instance task when it stops.
    pub fn unregister(&self, instance_id: i64) -> bool {
        let removed = lock(&self.jobs).remove(&instance_id);
        prune_guard(&self.guards, instance_id);
        match removed {
            Some(job) => {
                job.cancel.cancel();
                info!(instance_id, "instance unregistered");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, instance_id: i64) -> bool {
        lock(&self.jobs)
            .get(&instance_id)
            .is_some_and(|job| !job.handle.is_finished())
    }

    /// Registered ids, ascending.
    pub fn active_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = lock(&self.jobs)
            .iter()
            .filter(|(_, job)| !job.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel every schedule and wait for in-flight cycles to finish.
    pub async fn shutdown(&self) {
        let jobs: Vec<(i64, Job)> = lock(&self.jobs).drain().collect();
        for (_, job) in &jobs {
            job.cancel.cancel();
        }
        for (id, job) in jobs {
            if let Err(e) = job.handle.await {
                warn!(instance_id = id, error = %e, "instance task ended abnormally");
            }
        }
        info!("all instances stopped");
    }
}
