//! Run eviction.
//!
//! Workflow runs are the only entities that grow without bound, so they are
//! the unit of eviction. Two rules apply, each disabled by a zero setting:
//!
//! - **TTL**: a run not upserted (directly or through one of its jobs) for
//!   longer than `memory_ttl` is removed.
//! - **Byte budget**: while the runs' estimated footprint exceeds
//!   `memory_limit`, the least recently touched run is removed.
//!
//! A run's footprint is the length of its JSON encoding. That over-counts
//! compared to the in-memory size but tracks it closely enough to bound
//! growth. Organizations, users, repositories and workflows are never evicted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::EntityStore;
use crate::config::Config;
use crate::types::RunId;

/// How often the sweeper applies the eviction rules.
pub const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub expired: usize,
    pub over_budget: usize,
}

impl EntityStore {
    /// Removes every run last touched at or before `cutoff`.
    pub fn evict_untouched_since(&self, cutoff: Instant) -> usize {
        let mut tree = self.write();
        let expired: Vec<RunId> = tree
            .touched
            .iter()
            .filter(|(_, touched)| **touched <= cutoff)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            tree.remove_run(*id);
        }
        expired.len()
    }

    /// Removes least recently touched runs until the runs fit in `limit` bytes.
    ///
    /// Runs are sized under the read lock. The write lock is only held to
    /// remove the chosen runs.
    pub fn enforce_byte_budget(&self, limit: u64) -> usize {
        let victims = self.plan_byte_budget(limit);
        if victims.is_empty() {
            return 0;
        }
        self.evict_planned(&victims)
    }

    /// Picks the least recently touched runs whose removal brings the total
    /// within `limit`, with the instant each was last touched.
    fn plan_byte_budget(&self, limit: u64) -> Vec<(RunId, Instant)> {
        let mut by_age: Vec<(Instant, RunId, u64)> = {
            let tree = self.read();
            tree.touched
                .iter()
                .map(|(id, touched)| {
                    let size = tree.run(*id).map(estimated_size).unwrap_or(0);
                    (*touched, *id, size)
                })
                .collect()
        };
        let mut total: u64 = by_age.iter().map(|(_, _, size)| size).sum();
        if total <= limit {
            return Vec::new();
        }

        by_age.sort();
        let mut victims = Vec::new();
        for (touched, id, size) in by_age {
            if total <= limit {
                break;
            }
            victims.push((id, touched));
            total = total.saturating_sub(size);
        }
        victims
    }

    /// Removes planned runs that have not been touched since they were sized.
    fn evict_planned(&self, victims: &[(RunId, Instant)]) -> usize {
        let mut tree = self.write();
        let mut evicted = 0;
        for (id, touched) in victims {
            if tree.touched.get(id) != Some(touched) {
                debug!(run_id = %id, "Run touched during sweep, keeping it");
                continue;
            }
            tree.remove_run(*id);
            evicted += 1;
        }
        evicted
    }

    /// Applies both rules as configured. A zero TTL or limit skips that rule.
    pub fn sweep(&self, ttl: Duration, limit: u64, now: Instant) -> EvictionReport {
        let expired = match now.checked_sub(ttl) {
            Some(cutoff) if !ttl.is_zero() => self.evict_untouched_since(cutoff),
            _ => 0,
        };
        let over_budget = if limit > 0 {
            self.enforce_byte_budget(limit)
        } else {
            0
        };
        EvictionReport {
            expired,
            over_budget,
        }
    }
}

fn estimated_size(run: &crate::types::WorkflowRun) -> u64 {
    match serde_json::to_vec(run) {
        Ok(bytes) => bytes.len() as u64,
        Err(e) => {
            warn!(run_id = %run.id, error = %e, "Failed to size run for eviction");
            0
        }
    }
}

/// Periodically evicts runs according to the current configuration.
///
/// The TTL and byte budget are read from the latest config snapshot on every
/// tick, so a hot reload takes effect at the next sweep. Returns when `cancel`
/// fires.
pub async fn run_eviction_loop(
    store: Arc<EntityStore>,
    config: watch::Receiver<Arc<Config>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Eviction loop stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let (ttl, limit) = {
            let config = config.borrow();
            (config.memory_ttl, config.memory_limit)
        };
        let report = store.sweep(ttl, limit, Instant::now());
        if report != EvictionReport::default() {
            info!(
                expired = report.expired,
                over_budget = report.over_budget,
                remaining = store.run_count(),
                "Evicted workflow runs"
            );
        }
    }
}
