//! Speculative neighbor probes.
//!
//! A probe moves the renderer one position in a direction, waits for it to
//! settle, captures the visual output, and steps back. The caller sees the
//! neighbor image; the renderer ends where it started.
//!
//! # Round Trip
//!
//! ```text
//!   lock ──► step(dir) ──► settle ──► capture ──► step(opposite) ──► unlock
//!              │              ╰──── cancellable ────╯      ▲
//!              │ no move                                   │
//!              ╰──► unlock (nothing to undo)     always runs once stepped
//! ```
//!
//! The renderer lock is held for the whole round trip, so a commit that
//! cancels a probe never observes it mid-flight.
//!
//! The compensating step lives in [`CompensationGuard`]. On the normal path
//! the probe awaits it explicitly. If the probe future is dropped before that
//! point, the guard's `Drop` spawns the compensation onto the current runtime,
//! and the spawned task keeps holding the renderer lock until the renderer is
//! back in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureError, CapturePolicy, CaptureService};
use crate::direction::Direction;
use crate::renderer::DocumentRenderer;
use crate::snapshot::{RefreshToken, Snapshot};

/// Lock serializing every operation that touches the renderer.
pub type RendererLock = Arc<Mutex<()>>;

/// Result of one probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Captured neighbor image, if the capture succeeded.
    pub image: Option<Snapshot>,
    /// Whether the renderer moved in the probed direction.
    pub did_move: bool,
    /// Whether the probe was cut short by cancellation.
    pub cancelled: bool,
}

impl ProbeOutcome {
    fn cancelled_before_step() -> Self {
        Self {
            image: None,
            did_move: false,
            cancelled: true,
        }
    }
}

/// Performs speculative round trips on the renderer.
pub struct Prober {
    renderer: Arc<dyn DocumentRenderer>,
    capture: CaptureService,
    renderer_lock: RendererLock,
    settle_delay: Duration,
    policy: CapturePolicy,
    compensation_failures: Arc<AtomicU64>,
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("settle_delay", &self.settle_delay)
            .field("policy", &self.policy)
            .field("compensation_failures", &self.compensation_failures())
            .finish_non_exhaustive()
    }
}

impl Prober {
    /// Create a prober sharing `renderer_lock` with the other renderer users.
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        renderer_lock: RendererLock,
        settle_delay: Duration,
        policy: CapturePolicy,
    ) -> Self {
        Self {
            capture: CaptureService::new(Arc::clone(&renderer)),
            renderer,
            renderer_lock,
            settle_delay,
            policy,
            compensation_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of compensating steps that failed to move the renderer.
    pub fn compensation_failures(&self) -> u64 {
        self.compensation_failures.load(Ordering::Relaxed)
    }

    /// Probe the neighbor in `direction`.
    ///
    /// Cancellation is honored while waiting for the renderer lock, during
    /// the settle delay, and during capture. Once the renderer has moved, the
    /// compensating step runs regardless.
    pub async fn probe(
        &self,
        direction: Direction,
        token: RefreshToken,
        cancel: &CancellationToken,
    ) -> ProbeOutcome {
        let permit = tokio::select! {
            biased;

            _ = cancel.cancelled() => return ProbeOutcome::cancelled_before_step(),
            permit = Arc::clone(&self.renderer_lock).lock_owned() => permit,
        };

        if cancel.is_cancelled() {
            return ProbeOutcome::cancelled_before_step();
        }

        let suppression = ProgressSuppression::new(Arc::clone(&self.renderer));

        tracing::debug!(direction = %direction, token = %token, "Probe stepping");
        if !self.renderer.step(direction).await {
            tracing::debug!(direction = %direction, "Probe found renderer at boundary");
            return ProbeOutcome {
                image: None,
                did_move: false,
                cancelled: false,
            };
        }

        let guard = CompensationGuard::arm(
            permit,
            Arc::clone(&self.renderer),
            direction,
            suppression,
            Arc::clone(&self.compensation_failures),
        );

        let image = self.settle_and_capture(direction, token, cancel).await;
        let cancelled = cancel.is_cancelled();

        guard.compensate().await;

        ProbeOutcome {
            image,
            did_move: true,
            cancelled,
        }
    }

    async fn settle_and_capture(
        &self,
        direction: Direction,
        token: RefreshToken,
        cancel: &CancellationToken,
    ) -> Option<Snapshot> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(self.settle_delay) => {}
        }

        match self.capture.capture(token, &self.policy, cancel).await {
            Ok(snapshot) => Some(snapshot),
            Err(CaptureError::Cancelled) => None,
            Err(e) => {
                tracing::debug!(direction = %direction, error = %e, "Probe capture unavailable");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Guards
// ─────────────────────────────────────────────────────────────────────────────

/// Disables renderer progress reporting until dropped.
struct ProgressSuppression {
    renderer: Arc<dyn DocumentRenderer>,
}

impl ProgressSuppression {
    fn new(renderer: Arc<dyn DocumentRenderer>) -> Self {
        renderer.set_progress_reporting(false);
        Self { renderer }
    }
}

impl Drop for ProgressSuppression {
    fn drop(&mut self) {
        self.renderer.set_progress_reporting(true);
    }
}

/// Owns the undo of a speculative step.
///
/// Holds the renderer lock and the progress suppression; both are released
/// only after the compensating step has finished.
struct CompensationGuard {
    renderer: Arc<dyn DocumentRenderer>,
    stepped: Direction,
    failures: Arc<AtomicU64>,
    suppression: Option<ProgressSuppression>,
    permit: Option<OwnedMutexGuard<()>>,
    armed: bool,
}

impl CompensationGuard {
    fn arm(
        permit: OwnedMutexGuard<()>,
        renderer: Arc<dyn DocumentRenderer>,
        stepped: Direction,
        suppression: ProgressSuppression,
        failures: Arc<AtomicU64>,
    ) -> Self {
        Self {
            renderer,
            stepped,
            failures,
            suppression: Some(suppression),
            permit: Some(permit),
            armed: true,
        }
    }

    /// Run the compensating step, then release the lock.
    ///
    /// The guard stays armed until the step back returns, so dropping this
    /// future mid-step still hands the undo to `Drop`.
    async fn compensate(mut self) {
        step_back(self.renderer.as_ref(), self.stepped, &self.failures).await;
        self.armed = false;
    }
}

impl Drop for CompensationGuard {
    fn drop(&mut self) {
        let suppression = self.suppression.take();
        let permit = self.permit.take();

        if !self.armed {
            drop(suppression);
            drop(permit);
            return;
        }

        let renderer = Arc::clone(&self.renderer);
        let failures = Arc::clone(&self.failures);
        let stepped = self.stepped;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(direction = %stepped, "Probe dropped mid-flight, compensating in background");
                handle.spawn(async move {
                    step_back(renderer.as_ref(), stepped, &failures).await;
                    drop(suppression);
                    drop(permit);
                });
            }
            Err(_) => {
                failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    direction = %stepped,
                    "Probe dropped outside a runtime; compensating step skipped"
                );
            }
        }
    }
}

async fn step_back(renderer: &dyn DocumentRenderer, stepped: Direction, failures: &AtomicU64) {
    if !renderer.step(stepped.opposite()).await {
        failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            direction = %stepped,
            "Compensating step did not move; renderer position no longer matches the pager"
        );
    }
}
