//! Pager status types for hosts and monitoring.
//!
//! [`PagerStatus`] is a point-in-time copy of the coordinator's state. The
//! counters behind it are atomics updated from probe and commit tasks without
//! taking the state lock.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::NavigabilityFlags;
use crate::direction::Direction;
use crate::snapshot::RefreshToken;

/// What the pager is doing with the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagerPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// One or both neighbor probes in flight.
    Probing {
        /// Forward probe in flight.
        forward: bool,
        /// Backward probe in flight.
        backward: bool,
    },
    /// A committed transition is executing.
    Committing(Direction),
}

impl PagerPhase {
    /// Short name for display.
    pub fn name(&self) -> &'static str {
        match self {
            PagerPhase::Idle => "idle",
            PagerPhase::Probing { .. } => "probing",
            PagerPhase::Committing(_) => "committing",
        }
    }
}

/// Cumulative pager activity.
#[derive(Debug, Default)]
pub(crate) struct PagerCounters {
    probes_started: AtomicU64,
    probes_completed: AtomicU64,
    probes_cancelled: AtomicU64,
    commits_completed: AtomicU64,
    commits_void: AtomicU64,
    late_refreshes_applied: AtomicU64,
}

impl PagerCounters {
    pub(crate) fn probe_started(&self) {
        self.probes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn probe_completed(&self) {
        self.probes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn probe_cancelled(&self) {
        self.probes_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn commit_completed(&self) {
        self.commits_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn commit_void(&self) {
        self.commits_void.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn late_refresh_applied(&self) {
        self.late_refreshes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, compensation_failures: u64) -> PagerCountersSnapshot {
        PagerCountersSnapshot {
            probes_started: self.probes_started.load(Ordering::Relaxed),
            probes_completed: self.probes_completed.load(Ordering::Relaxed),
            probes_cancelled: self.probes_cancelled.load(Ordering::Relaxed),
            commits_completed: self.commits_completed.load(Ordering::Relaxed),
            commits_void: self.commits_void.load(Ordering::Relaxed),
            late_refreshes_applied: self.late_refreshes_applied.load(Ordering::Relaxed),
            compensation_failures,
        }
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagerCountersSnapshot {
    /// Probes spawned.
    pub probes_started: u64,
    /// Probes whose result was applied to the cache.
    pub probes_completed: u64,
    /// Probes cancelled or discarded as stale.
    pub probes_cancelled: u64,
    /// Commits that moved the renderer.
    pub commits_completed: u64,
    /// Commits where the renderer refused to move.
    pub commits_void: u64,
    /// Late refreshes that replaced the current image.
    pub late_refreshes_applied: u64,
    /// Compensating steps that did not move the renderer.
    pub compensation_failures: u64,
}

/// Point-in-time pager state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerStatus {
    /// Content token, `None` before initialization.
    pub token: Option<RefreshToken>,
    /// Current phase.
    pub phase: PagerPhase,
    /// Whether the backward slot holds an image.
    pub has_backward: bool,
    /// Whether the current slot holds an image.
    pub has_current: bool,
    /// Whether the forward slot holds an image.
    pub has_forward: bool,
    /// Navigability flags.
    pub flags: NavigabilityFlags,
    /// Direction recorded by the last pending transition notification.
    pub pending: Option<Direction>,
    /// Cumulative counters.
    pub counters: PagerCountersSnapshot,
}

impl PagerStatus {
    /// Whether nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.phase == PagerPhase::Idle
    }
}
