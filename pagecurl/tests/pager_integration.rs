//! Integration tests for the snapshot pager.
//!
//! These tests drive the public API over a `SimulatedRenderer` on a paused
//! tokio clock:
//! - Initialization, probing and boundary pinning
//! - Committed transitions, cache rotation and late refresh
//! - Cancellation of in-flight probes by commits and content swaps
//!
//! Run with: `cargo test --test pager_integration`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use pagecurl::{
    CommitOutcome, Direction, DocumentRenderer, PagerConfig, PagerEvent, PagerPhase, RefreshToken,
    SimulatedRenderer, Snapshot, SnapshotPager,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn renderer_at(pages: usize, position: usize) -> Arc<SimulatedRenderer> {
    Arc::new(SimulatedRenderer::at_position(pages, position))
}

fn pager_over(renderer: &Arc<SimulatedRenderer>) -> SnapshotPager {
    pager_with(renderer, PagerConfig::default())
}

fn pager_with(renderer: &Arc<SimulatedRenderer>, config: PagerConfig) -> SnapshotPager {
    SnapshotPager::new(Arc::clone(renderer) as Arc<dyn DocumentRenderer>, config)
        .expect("valid config")
}

/// Advance the paused clock far enough for all background work to finish.
async fn quiesce() {
    tokio::time::sleep(Duration::from_secs(2)).await;
}

fn page(snapshot: &Snapshot) -> Option<usize> {
    SimulatedRenderer::page_of(snapshot.image())
}

fn drain(events: &mut broadcast::Receiver<PagerEvent>) -> Vec<PagerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

// ============================================================================
// End-to-end flow
// ============================================================================

/// Ten-position document starting at 0: the backward probe pins the
/// boundary, a forward commit lands on 1 and rotates the cache.
#[tokio::test(start_paused = true)]
async fn test_forward_flip_from_document_start() {
    let renderer = renderer_at(10, 0);
    let pager = pager_over(&renderer);
    let token = RefreshToken::new(42);

    assert!(pager.initialize(token).await);
    quiesce().await;

    let status = pager.status();
    assert!(!status.flags.can_go_backward);
    assert!(status.flags.can_go_forward);
    assert!(pager.neighbor(Direction::Backward).is_none());
    let forward = pager.neighbor(Direction::Forward).expect("forward probed");
    assert_eq!(page(&forward), Some(1));
    let old_current = pager.current_image().expect("current captured");
    assert_eq!(page(&old_current), Some(0));

    let outcome = pager
        .notify_committed_transition(Direction::Forward, true)
        .await;
    assert_eq!(outcome, CommitOutcome::Committed);

    let status = pager.status();
    assert!(status.has_backward);
    assert!(status.has_current);
    assert!(!status.has_forward);
    assert_eq!(
        status.phase,
        PagerPhase::Probing {
            forward: true,
            backward: true
        }
    );
    assert_eq!(status.counters.probes_started, 4);

    let current = pager.current_image().expect("current after commit");
    assert!(current.same_image(&forward));
    let backward = pager.neighbor(Direction::Backward).expect("old current");
    assert!(backward.same_image(&old_current));

    quiesce().await;
    assert_eq!(renderer.position(), 1);
    assert_eq!(page(&pager.neighbor(Direction::Forward).unwrap()), Some(2));
    assert!(pager.status().is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_events_follow_initialization() {
    let renderer = renderer_at(10, 0);
    let pager = pager_over(&renderer);
    let mut events = pager.subscribe();
    let token = RefreshToken::new(1);

    pager.initialize(token).await;
    quiesce().await;

    let received = drain(&mut events);
    assert_eq!(received.first(), Some(&PagerEvent::CurrentChanged { token }));
    assert!(received.contains(&PagerEvent::NeighborReady {
        direction: Direction::Forward
    }));
    assert!(received.contains(&PagerEvent::BoundaryReached {
        direction: Direction::Backward
    }));
}

#[tokio::test(start_paused = true)]
async fn test_probes_never_report_progress() {
    let renderer = renderer_at(10, 0);
    let pager = pager_over(&renderer);

    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;
    pager
        .notify_committed_transition(Direction::Forward, true)
        .await;
    quiesce().await;

    assert_eq!(renderer.progress_reports(), vec![1]);
    assert!(renderer.progress_enabled());
}

// ============================================================================
// Boundaries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_pinned_boundary_stops_probing() {
    let renderer = renderer_at(10, 9);
    let pager = pager_over(&renderer);

    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;
    let started = pager.status().counters.probes_started;

    for _ in 0..5 {
        assert!(pager.neighbor(Direction::Forward).is_none());
    }
    quiesce().await;

    let status = pager.status();
    assert!(!status.flags.can_go_forward);
    assert_eq!(status.counters.probes_started, started);
    assert_eq!(renderer.position(), 9);
}

#[tokio::test(start_paused = true)]
async fn test_void_commit_keeps_current_and_pins() {
    let renderer = renderer_at(10, 0);
    let pager = pager_over(&renderer);
    let mut events = pager.subscribe();

    pager.initialize(RefreshToken::new(1)).await;
    let before = pager.current_image().expect("current");

    let outcome = pager
        .notify_committed_transition(Direction::Backward, true)
        .await;
    assert_eq!(outcome, CommitOutcome::Void);

    let after = pager.current_image().expect("current kept");
    assert!(after.same_image(&before));

    let status = pager.status();
    assert!(!status.flags.can_go_backward);
    assert_eq!(status.counters.commits_void, 1);
    assert!(drain(&mut events).contains(&PagerEvent::BoundaryReached {
        direction: Direction::Backward
    }));

    quiesce().await;
    assert_eq!(renderer.position(), 0);
}

// ============================================================================
// Commit interplay with probes
// ============================================================================

/// A commit issued while a probe is settling cancels it; the probe still
/// steps back before the commit's own step, so the commit lands exactly one
/// position away.
#[tokio::test(start_paused = true)]
async fn test_commit_cancels_probe_in_flight() {
    let renderer = Arc::new(
        SimulatedRenderer::at_position(10, 5).with_step_latency(Duration::from_millis(20)),
    );
    let pager = pager_over(&renderer);

    pager.initialize(RefreshToken::new(1)).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(renderer.position(), 6, "forward probe should be settling");

    let outcome = pager
        .notify_committed_transition(Direction::Forward, true)
        .await;
    assert_eq!(outcome, CommitOutcome::Committed);
    assert_eq!(page(&pager.current_image().unwrap()), Some(6));

    quiesce().await;
    let status = pager.status();
    assert_eq!(renderer.position(), 6);
    assert_eq!(renderer.max_concurrent_steps(), 1);
    assert!(status.counters.probes_cancelled >= 2);
    assert_eq!(status.counters.compensation_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_commits_move_one_step_each() {
    let renderer = renderer_at(10, 3);
    let pager = pager_over(&renderer);
    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;

    for _ in 0..3 {
        assert_eq!(
            pager
                .notify_committed_transition(Direction::Forward, true)
                .await,
            CommitOutcome::Committed
        );
    }
    assert_eq!(
        pager
            .notify_committed_transition(Direction::Backward, true)
            .await,
        CommitOutcome::Committed
    );

    quiesce().await;
    assert_eq!(renderer.position(), 5);
    assert_eq!(page(&pager.current_image().unwrap()), Some(5));
    assert_eq!(page(&pager.neighbor(Direction::Backward).unwrap()), Some(4));
    assert_eq!(page(&pager.neighbor(Direction::Forward).unwrap()), Some(6));
    assert_eq!(pager.status().counters.late_refreshes_applied, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stabilization_timeout_is_not_fatal() {
    let renderer = Arc::new(
        SimulatedRenderer::at_position(10, 3).with_settle_time(Duration::from_secs(5)),
    );
    let config = PagerConfig::default().with_stabilization_timeout(Duration::from_millis(300));
    let pager = pager_with(&renderer, config);
    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;

    let started = Instant::now();
    let outcome = pager
        .notify_committed_transition(Direction::Forward, true)
        .await;

    assert_eq!(outcome, CommitOutcome::Committed);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_commit_without_cached_neighbor_captures_fresh() {
    let renderer = renderer_at(10, 3);
    let pager = pager_over(&renderer);
    pager.initialize(RefreshToken::new(1)).await;
    // Probe captures fail; the commit capture succeeds.
    renderer.fail_next_renders(100);
    quiesce().await;
    assert!(!pager.status().has_forward);
    renderer.fail_next_renders(0);

    let outcome = pager
        .notify_committed_transition(Direction::Forward, true)
        .await;

    assert_eq!(outcome, CommitOutcome::Committed);
    assert_eq!(page(&pager.current_image().unwrap()), Some(4));
}

// ============================================================================
// Late refresh
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_late_refresh_replaces_current() {
    let renderer = renderer_at(10, 3);
    let pager = pager_over(&renderer);
    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;

    pager
        .notify_committed_transition(Direction::Forward, true)
        .await;
    let committed = pager.current_image().unwrap();

    quiesce().await;

    let refreshed = pager.current_image().unwrap();
    assert!(!refreshed.same_image(&committed));
    assert_eq!(page(&refreshed), Some(4));
    assert!(
        refreshed.captured_at().duration_since(committed.captured_at())
            >= pager.config().late_refresh_delay
    );
    assert_eq!(pager.status().counters.late_refreshes_applied, 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_refresh_waits_configured_delay() {
    let renderer = renderer_at(10, 3);
    let config = PagerConfig::default().with_late_refresh_delay(Duration::from_millis(800));
    let pager = pager_with(&renderer, config);
    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;

    pager
        .notify_committed_transition(Direction::Forward, true)
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pager.status().counters.late_refreshes_applied, 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pager.status().counters.late_refreshes_applied, 1);
}

// ============================================================================
// Content swap
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_content_swap_invalidates_everything() {
    let renderer = renderer_at(10, 5);
    let pager = pager_over(&renderer);
    let mut events = pager.subscribe();
    let old = RefreshToken::new(1);
    let new = RefreshToken::new(2);

    pager.initialize(old).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(pager.on_content_swap(new).await);
    assert_eq!(pager.token(), Some(new));
    assert_eq!(pager.current_image().unwrap().token(), new);

    for _ in 0..3 {
        for direction in Direction::ALL {
            if let Some(snapshot) = pager.neighbor(direction) {
                assert_eq!(snapshot.token(), new);
            }
        }
        tokio::time::sleep(Duration::from_millis(70)).await;
    }

    quiesce().await;
    for direction in Direction::ALL {
        assert_eq!(pager.neighbor(direction).unwrap().token(), new);
    }
    assert_eq!(renderer.position(), 5);
    assert!(drain(&mut events).contains(&PagerEvent::ContentSwapped { token: new }));
}

#[tokio::test(start_paused = true)]
async fn test_content_swap_resets_pinned_boundary() {
    let renderer = renderer_at(10, 0);
    let pager = pager_over(&renderer);

    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;
    assert!(!pager.status().flags.can_go_backward);

    pager.on_content_swap(RefreshToken::new(2)).await;
    assert!(pager.status().flags.can_go_backward);

    quiesce().await;
    assert!(!pager.status().flags.can_go_backward);
    assert_eq!(renderer.position(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_content_swap_during_commit_supersedes_it() {
    let renderer = Arc::new(
        SimulatedRenderer::at_position(10, 4).with_step_latency(Duration::from_millis(40)),
    );
    let pager = pager_over(&renderer);
    let new = RefreshToken::new(2);

    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;

    let commit = {
        let pager = pager.clone();
        tokio::spawn(async move {
            pager
                .notify_committed_transition(Direction::Forward, true)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(pager.on_content_swap(new).await);
    assert_eq!(commit.await.unwrap(), CommitOutcome::Superseded);

    quiesce().await;
    assert_eq!(renderer.position(), 5);
    let current = pager.current_image().unwrap();
    assert_eq!(current.token(), new);
    assert_eq!(page(&current), Some(5));

    let forward = pager.neighbor(Direction::Forward).unwrap();
    let backward = pager.neighbor(Direction::Backward).unwrap();
    assert_eq!((forward.token(), page(&forward)), (new, Some(6)));
    assert_eq!((backward.token(), page(&backward)), (new, Some(4)));

    let status = pager.status();
    assert!(status.is_idle());
    assert_eq!(status.counters.commits_completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_commit_supersedes_it() {
    let renderer = Arc::new(
        SimulatedRenderer::at_position(10, 4).with_step_latency(Duration::from_millis(40)),
    );
    let pager = pager_over(&renderer);

    pager.initialize(RefreshToken::new(1)).await;
    quiesce().await;

    let commit = {
        let pager = pager.clone();
        tokio::spawn(async move {
            pager
                .notify_committed_transition(Direction::Forward, true)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    pager.shutdown();
    assert_eq!(commit.await.unwrap(), CommitOutcome::Superseded);

    quiesce().await;
    assert_eq!(renderer.position(), 5);
    assert!(pager.token().is_none());
    assert!(pager.current_image().is_none());
    assert!(pager.neighbor(Direction::Forward).is_none());

    let status = pager.status();
    assert!(status.is_idle());
    assert!(!status.has_backward && !status.has_current && !status.has_forward);
    assert_eq!(status.counters.commits_completed, 0);
}
