//! Snapshot pager coordinator.
//!
//! Presents a three-slot paging illusion over a renderer that can show only
//! one position at a time. Neighbor images are filled by background probes;
//! committed flips perform the real navigation and rotate the cache.
//!
//! # Architecture
//!
//! ```text
//!         flip widget                         host
//!   neighbor / notify_*                initialize / on_content_swap
//!              │                                   │
//!              ▼                                   ▼
//!        ┌───────────────────────────────────────────────┐
//!        │                SnapshotPager                  │
//!        │  PagerState (parking_lot, never across await) │
//!        │  token · generation · cache · committing      │
//!        └──────┬──────────────────┬─────────────────┬───┘
//!               │ spawn            │ await           │ spawn
//!               ▼                  ▼                 ▼
//!          ┌─────────┐       ┌──────────┐     ┌──────────────┐
//!          │ Prober  │       │  commit  │     │ late refresh │
//!          └────┬────┘       └────┬─────┘     └──────┬───────┘
//!               └────────── renderer lock ───────────┘
//!                                 │
//!                         DocumentRenderer
//! ```
//!
//! # Phases
//!
//! `Idle`, `Probing` (forward and backward may overlap), and
//! `Committing(direction)`, which excludes everything else. A commit cancels
//! in-flight probes and then waits for the renderer lock, which the probes
//! hold until their compensating step has run.
//!
//! # Cancellation
//!
//! Each refresh token gets a session [`CancellationToken`]. Probes and the
//! late refresh run on child tokens. A content swap cancels the session and
//! bumps the generation so that results from the old content are discarded.
//!
//! # Example
//!
//! ```ignore
//! let pager = SnapshotPager::new(renderer, PagerConfig::default())?;
//! pager.initialize(RefreshToken::generate()).await;
//!
//! // Widget asks for the next page; None means "poll again".
//! let next = pager.neighbor(Direction::Forward);
//!
//! // User completed the flip.
//! pager.notify_pending_transition(Direction::Forward);
//! pager.notify_transition_finished(true).await;
//! ```

pub mod config;
mod error;
mod events;
mod status;

pub use config::PagerConfig;
pub use error::{ConfigError, PagerError};
pub use events::PagerEvent;
pub use status::{PagerCountersSnapshot, PagerPhase, PagerStatus};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::cache::{DirectionalCache, ProbeHandle, Slot};
use crate::capture::CaptureService;
use crate::direction::{Direction, ReadingDirection, Side};
use crate::probe::{Prober, RendererLock};
use crate::renderer::DocumentRenderer;
use crate::snapshot::{RefreshToken, Snapshot};
use status::PagerCounters;

/// Where a tap landed, in widget coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapLocation {
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

impl TapLocation {
    /// Create a tap location.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Host callback for taps on the pager.
pub type TapHandler = Arc<dyn Fn(TapLocation) + Send + Sync>;

/// What a transition notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The renderer moved and the cache was rotated.
    Committed,
    /// The renderer refused to move; the direction is now pinned.
    Void,
    /// Dropped: another commit is running, there is no pending direction,
    /// or the pager has no content.
    Ignored,
    /// The widget reported the gesture as not completed.
    NotCompleted,
    /// The content was swapped while the commit ran.
    Superseded,
}

struct PagerState {
    token: Option<RefreshToken>,
    generation: u64,
    session: CancellationToken,
    cache: DirectionalCache,
    committing: Option<Direction>,
    commit_seq: u64,
    pending: Option<Direction>,
    late_refresh: Option<CancellationToken>,
    reading_direction: ReadingDirection,
    next_probe_id: u64,
}

impl PagerState {
    fn is_current(&self, generation: u64, commit_seq: u64) -> bool {
        self.committing.is_none() && self.generation == generation && self.commit_seq == commit_seq
    }

    fn cancel_late_refresh(&mut self) {
        if let Some(late) = self.late_refresh.take() {
            late.cancel();
        }
    }
}

struct PagerInner {
    config: PagerConfig,
    renderer: Arc<dyn DocumentRenderer>,
    renderer_lock: RendererLock,
    capture: CaptureService,
    prober: Prober,
    state: Mutex<PagerState>,
    events: broadcast::Sender<PagerEvent>,
    tap_handler: Mutex<Option<TapHandler>>,
    counters: PagerCounters,
    runtime: Option<Handle>,
}

/// Speculative snapshot pager.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SnapshotPager {
    inner: Arc<PagerInner>,
}

impl std::fmt::Debug for SnapshotPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotPager")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SnapshotPager {
    /// Create a pager over `renderer`.
    ///
    /// Background work is spawned on the runtime current at the time of each
    /// call, falling back to the runtime current at construction.
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        config: PagerConfig,
    ) -> Result<Self, PagerError> {
        config.validate()?;
        Ok(Self::build(renderer, config))
    }

    /// Create a pager with the default configuration.
    pub fn with_defaults(renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self::build(renderer, PagerConfig::default())
    }

    fn build(renderer: Arc<dyn DocumentRenderer>, config: PagerConfig) -> Self {
        let renderer_lock = RendererLock::default();
        let prober = Prober::new(
            Arc::clone(&renderer),
            Arc::clone(&renderer_lock),
            config.settle_delay,
            config.capture.clone(),
        );
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let state = PagerState {
            token: None,
            generation: 0,
            session: CancellationToken::new(),
            cache: DirectionalCache::new(),
            committing: None,
            commit_seq: 0,
            pending: None,
            late_refresh: None,
            reading_direction: config.reading_direction,
            next_probe_id: 1,
        };

        Self {
            inner: Arc::new(PagerInner {
                capture: CaptureService::new(Arc::clone(&renderer)),
                renderer,
                renderer_lock,
                prober,
                state: Mutex::new(state),
                events,
                tap_handler: Mutex::new(None),
                counters: PagerCounters::default(),
                runtime: Handle::try_current().ok(),
                config,
            }),
        }
    }

    /// Pager configuration.
    pub fn config(&self) -> &PagerConfig {
        &self.inner.config
    }

    /// Current content token.
    pub fn token(&self) -> Option<RefreshToken> {
        self.inner.state.lock().token
    }

    /// Subscribe to pager events.
    pub fn subscribe(&self) -> broadcast::Receiver<PagerEvent> {
        self.inner.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host interface
    // ─────────────────────────────────────────────────────────────────────────

    /// Bind to content `token`: clear all state, capture the current page,
    /// and start probing both neighbors.
    ///
    /// Returns whether a current image was captured.
    pub async fn initialize(&self, token: RefreshToken) -> bool {
        let (generation, session) = self.begin_session(token);
        tracing::debug!(token = %token, generation, "Pager initialized");
        self.initial_capture(token, generation, session).await
    }

    /// React to a content token change.
    ///
    /// A token equal to the current one is ignored and `false` returned.
    /// Otherwise everything in flight is cancelled, every cached image is
    /// dropped, and the initialize sequence runs for the new token.
    pub async fn on_content_swap(&self, token: RefreshToken) -> bool {
        if self.inner.state.lock().token == Some(token) {
            return false;
        }

        let (generation, session) = self.begin_session(token);
        tracing::info!(token = %token, "Content swapped, cache invalidated");
        self.emit(PagerEvent::ContentSwapped { token });
        self.initial_capture(token, generation, session).await;
        true
    }

    /// Re-capture the current page now.
    ///
    /// Returns `Ok(false)` if a commit is running or the capture failed.
    pub async fn refresh_current(&self) -> Result<bool, PagerError> {
        let (token, generation, commit_seq, session) = {
            let state = self.inner.state.lock();
            let token = state.token.ok_or(PagerError::NotInitialized)?;
            if state.committing.is_some() {
                return Ok(false);
            }
            (token, state.generation, state.commit_seq, state.session.clone())
        };
        Ok(self
            .recapture_current(token, generation, commit_seq, &session)
            .await)
    }

    /// Install the tap callback.
    pub fn set_tap_handler<F>(&self, handler: F)
    where
        F: Fn(TapLocation) + Send + Sync + 'static,
    {
        *self.inner.tap_handler.lock() = Some(Arc::new(handler));
    }

    /// Remove the tap callback.
    pub fn clear_tap_handler(&self) {
        *self.inner.tap_handler.lock() = None;
    }

    /// Forward a tap to the host callback. Pager state is untouched.
    pub fn on_tap_gesture(&self, location: TapLocation) {
        let handler = self.inner.tap_handler.lock().clone();
        if let Some(handler) = handler {
            handler(location);
        }
    }

    /// Set the reading direction used by [`neighbor_for_side`].
    ///
    /// Cached images are keyed by document direction and stay valid.
    ///
    /// [`neighbor_for_side`]: Self::neighbor_for_side
    pub fn set_reading_direction(&self, reading_direction: ReadingDirection) {
        self.inner.state.lock().reading_direction = reading_direction;
    }

    /// Current reading direction.
    pub fn reading_direction(&self) -> ReadingDirection {
        self.inner.state.lock().reading_direction
    }

    /// Stop all background work, drop every cached image, and detach from
    /// the content.
    ///
    /// Probes already running still restore the renderer position.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.session.cancel();
        state.cache.reset();
        state.cancel_late_refresh();
        state.token = None;
        state.generation += 1;
        state.committing = None;
        state.pending = None;
        tracing::debug!("Pager shut down");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Widget interface
    // ─────────────────────────────────────────────────────────────────────────

    /// Image for the neighbor in `direction`.
    ///
    /// `None` means either the renderer cannot move that way or the image is
    /// not ready yet; in the latter case a probe is scheduled and the widget
    /// should ask again later.
    pub fn neighbor(&self, direction: Direction) -> Option<Snapshot> {
        let mut state = self.inner.state.lock();
        let token = state.token?;

        if !state.cache.can_navigate(direction) {
            return None;
        }

        if let Some(snapshot) = state.cache.get(Slot::from(direction)) {
            if snapshot.token() == token {
                return Some(snapshot.clone());
            }
        }

        self.schedule_probe(&mut state, direction);
        None
    }

    /// Image for the view spatially before or after the current one.
    pub fn neighbor_for_side(&self, side: Side) -> Option<Snapshot> {
        let direction = self.reading_direction().direction_for(side);
        self.neighbor(direction)
    }

    /// Image of the current position.
    pub fn current_image(&self) -> Option<Snapshot> {
        let state = self.inner.state.lock();
        let token = state.token?;
        state
            .cache
            .get(Slot::Current)
            .filter(|snapshot| snapshot.token() == token)
            .cloned()
    }

    /// Record the direction of the page the widget is about to reveal.
    pub fn notify_pending_transition(&self, direction: Direction) {
        self.inner.state.lock().pending = Some(direction);
    }

    /// Resolve the pending transition.
    ///
    /// Commits the recorded direction if `completed`. An abandoned gesture
    /// clears the pending direction. While another commit is running the
    /// call is ignored and leaves the pending direction alone.
    pub async fn notify_transition_finished(&self, completed: bool) -> CommitOutcome {
        let pending = {
            let mut state = self.inner.state.lock();
            if !completed {
                state.pending = None;
                return CommitOutcome::NotCompleted;
            }
            if state.committing.is_some() {
                return CommitOutcome::Ignored;
            }
            state.pending
        };
        match pending {
            Some(direction) => self.commit(direction).await,
            None => CommitOutcome::Ignored,
        }
    }

    /// Commit a transition in `direction` if `completed`.
    ///
    /// The pending direction is cleared when the gesture is abandoned or the
    /// commit is admitted.
    pub async fn notify_committed_transition(
        &self,
        direction: Direction,
        completed: bool,
    ) -> CommitOutcome {
        if !completed {
            self.inner.state.lock().pending = None;
            return CommitOutcome::NotCompleted;
        }
        self.commit(direction).await
    }

    /// Point-in-time status.
    pub fn status(&self) -> PagerStatus {
        let state = self.inner.state.lock();

        let phase = match state.committing {
            Some(direction) => PagerPhase::Committing(direction),
            None => {
                let forward = state.cache.probe_in_flight(Direction::Forward);
                let backward = state.cache.probe_in_flight(Direction::Backward);
                if forward || backward {
                    PagerPhase::Probing { forward, backward }
                } else {
                    PagerPhase::Idle
                }
            }
        };
        let [has_backward, has_current, has_forward] = state.cache.occupancy();

        PagerStatus {
            token: state.token,
            phase,
            has_backward,
            has_current,
            has_forward,
            flags: state.cache.flags(),
            pending: state.pending,
            counters: self
                .inner
                .counters
                .snapshot(self.inner.prober.compensation_failures()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    fn begin_session(&self, token: RefreshToken) -> (u64, CancellationToken) {
        let mut state = self.inner.state.lock();

        state.session.cancel();
        state.cache.reset();
        state.cancel_late_refresh();

        let session = CancellationToken::new();
        state.session = session.clone();
        state.token = Some(token);
        state.generation += 1;
        state.committing = None;
        state.pending = None;

        (state.generation, session)
    }

    async fn initial_capture(
        &self,
        token: RefreshToken,
        generation: u64,
        session: CancellationToken,
    ) -> bool {
        let permit = tokio::select! {
            biased;

            _ = session.cancelled() => return false,
            permit = Arc::clone(&self.inner.renderer_lock).lock_owned() => permit,
        };

        let result = self
            .inner
            .capture
            .capture(token, &self.inner.config.initial_capture, &session)
            .await;

        // Store while still holding the renderer lock so no commit can move
        // the renderer between this capture and the write.
        let captured = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return false;
            }
            let captured = match result {
                Ok(snapshot) => {
                    state.cache.put(Slot::Current, snapshot);
                    true
                }
                Err(e) => {
                    tracing::warn!(token = %token, error = %e, "Initial capture unavailable");
                    false
                }
            };
            drop(permit);
            for direction in Direction::ALL {
                self.schedule_probe(&mut state, direction);
            }
            captured
        };

        if captured {
            self.emit(PagerEvent::CurrentChanged { token });
        }
        captured
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Probes
    // ─────────────────────────────────────────────────────────────────────────

    fn schedule_probe(&self, state: &mut PagerState, direction: Direction) -> bool {
        if state.committing.is_some()
            || state.cache.probe_in_flight(direction)
            || !state.cache.can_navigate(direction)
        {
            return false;
        }
        let Some(token) = state.token else {
            return false;
        };
        let Some(runtime) = self.runtime() else {
            tracing::warn!(direction = %direction, "No runtime available, probe skipped");
            return false;
        };

        let id = state.next_probe_id;
        state.next_probe_id += 1;
        let cancel = state.session.child_token();
        state
            .cache
            .begin_probe(direction, ProbeHandle::new(id, cancel.clone()));
        let generation = state.generation;

        self.inner.counters.probe_started();
        tracing::debug!(direction = %direction, token = %token, probe = id, "Probe scheduled");

        let pager = self.clone();
        runtime.spawn(async move {
            pager
                .run_probe(direction, token, generation, id, cancel)
                .await;
        });
        true
    }

    async fn run_probe(
        &self,
        direction: Direction,
        token: RefreshToken,
        generation: u64,
        id: u64,
        cancel: CancellationToken,
    ) {
        let outcome = self.inner.prober.probe(direction, token, &cancel).await;

        let event = {
            let mut state = self.inner.state.lock();
            let owned = state.generation == generation && state.cache.finish_probe(direction, id);

            if !owned || outcome.cancelled {
                self.inner.counters.probe_cancelled();
                tracing::debug!(direction = %direction, probe = id, "Probe result discarded");
                None
            } else if !outcome.did_move {
                state.cache.pin_boundary(direction);
                self.inner.counters.probe_completed();
                tracing::info!(direction = %direction, token = %token, "Boundary reached");
                Some(PagerEvent::BoundaryReached { direction })
            } else if let Some(snapshot) = outcome.image {
                state.cache.put(Slot::from(direction), snapshot);
                self.inner.counters.probe_completed();
                tracing::debug!(direction = %direction, probe = id, "Neighbor cached");
                Some(PagerEvent::NeighborReady { direction })
            } else {
                self.inner.counters.probe_completed();
                tracing::debug!(direction = %direction, probe = id, "Probe captured no image");
                None
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commit
    // ─────────────────────────────────────────────────────────────────────────

    async fn commit(&self, direction: Direction) -> CommitOutcome {
        // The real step must not be abandoned half way if the caller drops
        // the future, so the commit runs as its own task.
        let Some(runtime) = self.runtime() else {
            return self.run_commit(direction).await;
        };
        let pager = self.clone();
        match runtime
            .spawn(async move { pager.run_commit(direction).await })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(direction = %direction, error = %e, "Commit task failed");
                CommitOutcome::Ignored
            }
        }
    }

    async fn run_commit(&self, direction: Direction) -> CommitOutcome {
        let (token, generation, session) = {
            let mut state = self.inner.state.lock();
            let Some(token) = state.token else {
                return CommitOutcome::Ignored;
            };
            if let Some(running) = state.committing {
                tracing::debug!(
                    direction = %direction,
                    running = %running,
                    "Commit ignored, another commit is running"
                );
                return CommitOutcome::Ignored;
            }
            state.committing = Some(direction);
            state.pending = None;
            state.cache.cancel_probes();
            state.cancel_late_refresh();
            (token, state.generation, state.session.clone())
        };

        let permit = Arc::clone(&self.inner.renderer_lock).lock_owned().await;
        if self.inner.state.lock().generation != generation {
            return CommitOutcome::Superseded;
        }

        if !self.inner.renderer.step(direction).await {
            drop(permit);
            {
                let mut state = self.inner.state.lock();
                if state.generation != generation {
                    return CommitOutcome::Superseded;
                }
                state.committing = None;
                state.cache.pin_boundary(direction);
                for direction in Direction::ALL {
                    self.schedule_probe(&mut state, direction);
                }
            }
            self.inner.counters.commit_void();
            tracing::info!(direction = %direction, "Commit void, renderer at boundary");
            self.emit(PagerEvent::BoundaryReached { direction });
            self.emit(PagerEvent::CurrentChanged { token });
            return CommitOutcome::Void;
        }

        let timeout = self.inner.config.stabilization_timeout;
        if tokio::time::timeout(timeout, self.inner.renderer.wait_until_stable())
            .await
            .is_err()
        {
            tracing::warn!(
                direction = %direction,
                timeout_ms = timeout.as_millis() as u64,
                "Renderer did not stabilize in time, continuing"
            );
        }

        let has_cached = self
            .inner
            .state
            .lock()
            .cache
            .get(Slot::from(direction))
            .is_some();
        let fresh = if has_cached {
            None
        } else {
            match self
                .inner
                .capture
                .capture(token, &self.inner.config.capture, &session)
                .await
            {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::debug!(direction = %direction, error = %e, "Commit capture unavailable");
                    None
                }
            }
        };
        drop(permit);

        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return CommitOutcome::Superseded;
            }
            state.committing = None;
            state.cache.rotate_on_commit(direction);
            if let Some(snapshot) = fresh {
                state.cache.put(Slot::Current, snapshot);
            }
            state.commit_seq += 1;

            for direction in Direction::ALL {
                self.schedule_probe(&mut state, direction);
            }
            self.schedule_late_refresh(&mut state);
        }

        self.inner.counters.commit_completed();
        tracing::debug!(direction = %direction, used_cached = has_cached, "Commit complete");
        self.emit(PagerEvent::CurrentChanged { token });
        CommitOutcome::Committed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Late refresh
    // ─────────────────────────────────────────────────────────────────────────

    fn schedule_late_refresh(&self, state: &mut PagerState) {
        let Some(token) = state.token else {
            return;
        };
        let Some(runtime) = self.runtime() else {
            return;
        };

        state.cancel_late_refresh();
        let cancel = state.session.child_token();
        state.late_refresh = Some(cancel.clone());
        let (generation, commit_seq) = (state.generation, state.commit_seq);

        let pager = self.clone();
        runtime.spawn(async move {
            pager
                .run_late_refresh(token, generation, commit_seq, cancel)
                .await;
        });
    }

    async fn run_late_refresh(
        &self,
        token: RefreshToken,
        generation: u64,
        commit_seq: u64,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.inner.config.late_refresh_delay) => {}
        }

        if self
            .recapture_current(token, generation, commit_seq, &cancel)
            .await
        {
            self.inner.counters.late_refresh_applied();
            tracing::debug!(token = %token, "Late refresh applied");
        }
    }

    /// Capture the current page and store it if nothing moved the renderer
    /// or swapped the content in the meantime.
    async fn recapture_current(
        &self,
        token: RefreshToken,
        generation: u64,
        commit_seq: u64,
        cancel: &CancellationToken,
    ) -> bool {
        let permit = tokio::select! {
            biased;

            _ = cancel.cancelled() => return false,
            permit = Arc::clone(&self.inner.renderer_lock).lock_owned() => permit,
        };

        if !self.inner.state.lock().is_current(generation, commit_seq) {
            return false;
        }

        let result = self
            .inner
            .capture
            .capture(token, &self.inner.config.capture, cancel)
            .await;
        drop(permit);

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!(token = %token, error = %e, "Re-capture unavailable");
                return false;
            }
        };

        {
            let mut state = self.inner.state.lock();
            if cancel.is_cancelled() || !state.is_current(generation, commit_seq) {
                return false;
            }
            state.cache.put(Slot::Current, snapshot);
        }

        self.emit(PagerEvent::CurrentChanged { token });
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn runtime(&self) -> Option<Handle> {
        Handle::try_current()
            .ok()
            .or_else(|| self.inner.runtime.clone())
    }

    fn emit(&self, event: PagerEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}
