//! In-memory renderer over an N-position document.
//!
//! Each position renders as a solid image whose first pixel encodes the
//! position index, so tests can tell which page an image shows via
//! [`SimulatedRenderer::page_of`]. Failure knobs (detached surface, failing
//! render passes, a renderer that refuses to step back) drive the pager's
//! error paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

use super::{BoxFuture, DocumentRenderer, Extent};
use crate::direction::Direction;

/// Default surface size of the simulated renderer.
pub const DEFAULT_SIMULATED_EXTENT: Extent = Extent {
    width: 48,
    height: 64,
};

/// Blue channel marker identifying images produced by the simulator.
const PAGE_MARKER: u8 = 0x5a;

#[derive(Debug)]
struct SimulatedState {
    position: usize,
    extent: Extent,
    attached: bool,
    failing_renders: u32,
    refuse_backward: bool,
    step_latency: Duration,
    settle_time: Duration,
    progress_enabled: bool,
    progress_reports: Vec<usize>,
    steps_taken: u64,
    render_passes: u64,
}

/// Simulated document renderer.
///
/// Thread-safe; all state sits behind a mutex that is never held across an
/// await point. Concurrent step calls are counted so tests can assert the
/// pager never touches the renderer from two operations at once.
#[derive(Debug)]
pub struct SimulatedRenderer {
    page_count: usize,
    state: Mutex<SimulatedState>,
    active_steps: AtomicUsize,
    max_active_steps: AtomicUsize,
}

struct ActiveStep<'a>(&'a AtomicUsize);

impl Drop for ActiveStep<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedRenderer {
    /// Create a renderer at position 0 of a `page_count`-position document.
    pub fn new(page_count: usize) -> Self {
        Self::at_position(page_count, 0)
    }

    /// Create a renderer starting at `position` (clamped to the document).
    pub fn at_position(page_count: usize, position: usize) -> Self {
        let page_count = page_count.max(1);
        Self {
            page_count,
            state: Mutex::new(SimulatedState {
                position: position.min(page_count - 1),
                extent: DEFAULT_SIMULATED_EXTENT,
                attached: true,
                failing_renders: 0,
                refuse_backward: false,
                step_latency: Duration::ZERO,
                settle_time: Duration::ZERO,
                progress_enabled: true,
                progress_reports: Vec::new(),
                steps_taken: 0,
                render_passes: 0,
            }),
            active_steps: AtomicUsize::new(0),
            max_active_steps: AtomicUsize::new(0),
        }
    }

    /// Set the time each step takes.
    pub fn with_step_latency(mut self, latency: Duration) -> Self {
        self.state.get_mut().step_latency = latency;
        self
    }

    /// Set how long `wait_until_stable` takes after a step.
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.state.get_mut().settle_time = settle_time;
        self
    }

    /// Set the surface size.
    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.state.get_mut().extent = extent;
        self
    }

    /// Number of positions in the document.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Current logical position.
    pub fn position(&self) -> usize {
        self.state.lock().position
    }

    /// Attach or detach the visual surface.
    pub fn set_attached(&self, attached: bool) {
        self.state.lock().attached = attached;
    }

    /// Resize the visual surface.
    pub fn set_extent(&self, extent: Extent) {
        self.state.lock().extent = extent;
    }

    /// Change the stabilization time reported after steps.
    pub fn set_settle_time(&self, settle_time: Duration) {
        self.state.lock().settle_time = settle_time;
    }

    /// Make the next `count` render passes yield no image.
    pub fn fail_next_renders(&self, count: u32) {
        self.state.lock().failing_renders = count;
    }

    /// Make backward steps report no movement.
    pub fn refuse_backward_steps(&self, refuse: bool) {
        self.state.lock().refuse_backward = refuse;
    }

    /// Positions reported as reading progress, in order.
    pub fn progress_reports(&self) -> Vec<usize> {
        self.state.lock().progress_reports.clone()
    }

    /// Whether progress reporting is currently enabled.
    pub fn progress_enabled(&self) -> bool {
        self.state.lock().progress_enabled
    }

    /// Total successful steps in either direction.
    pub fn steps_taken(&self) -> u64 {
        self.state.lock().steps_taken
    }

    /// Total render passes taken, successful or not.
    pub fn render_passes(&self) -> u64 {
        self.state.lock().render_passes
    }

    /// Highest number of step calls ever in progress at the same time.
    pub fn max_concurrent_steps(&self) -> usize {
        self.max_active_steps.load(Ordering::SeqCst)
    }

    /// Decode the position an image produced by this renderer shows.
    pub fn page_of(image: &RgbaImage) -> Option<usize> {
        if image.width() == 0 || image.height() == 0 {
            return None;
        }
        let Rgba([low, high, marker, _]) = *image.get_pixel(0, 0);
        (marker == PAGE_MARKER).then(|| usize::from(low) | (usize::from(high) << 8))
    }

    fn render_page(position: usize, extent: Extent) -> RgbaImage {
        let low = (position & 0xff) as u8;
        let high = ((position >> 8) & 0xff) as u8;
        RgbaImage::from_pixel(
            extent.width,
            extent.height,
            Rgba([low, high, PAGE_MARKER, 0xff]),
        )
    }

    fn step_in(&self, direction: Direction) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let active = self.active_steps.fetch_add(1, Ordering::SeqCst) + 1;
            let _active = ActiveStep(&self.active_steps);
            self.max_active_steps.fetch_max(active, Ordering::SeqCst);

            let latency = self.state.lock().step_latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let mut state = self.state.lock();
            let moved = match direction {
                Direction::Forward if state.position + 1 < self.page_count => {
                    state.position += 1;
                    true
                }
                Direction::Backward if !state.refuse_backward && state.position > 0 => {
                    state.position -= 1;
                    true
                }
                _ => false,
            };

            if moved {
                state.steps_taken += 1;
                if state.progress_enabled {
                    let position = state.position;
                    state.progress_reports.push(position);
                }
            }
            moved
        })
    }
}

impl DocumentRenderer for SimulatedRenderer {
    fn step_forward(&self) -> BoxFuture<'_, bool> {
        self.step_in(Direction::Forward)
    }

    fn step_backward(&self) -> BoxFuture<'_, bool> {
        self.step_in(Direction::Backward)
    }

    fn current_visual(&self) -> Option<RgbaImage> {
        let mut state = self.state.lock();
        state.render_passes += 1;
        if state.failing_renders > 0 {
            state.failing_renders -= 1;
            return None;
        }
        Some(Self::render_page(state.position, state.extent))
    }

    fn surface_extent(&self) -> Extent {
        self.state.lock().extent
    }

    fn is_attached_and_visible(&self) -> bool {
        self.state.lock().attached
    }

    fn wait_until_stable(&self) -> BoxFuture<'_, ()> {
        let settle_time = self.state.lock().settle_time;
        Box::pin(async move {
            if !settle_time.is_zero() {
                tokio::time::sleep(settle_time).await;
            }
        })
    }

    fn set_progress_reporting(&self, enabled: bool) {
        self.state.lock().progress_enabled = enabled;
    }
}
