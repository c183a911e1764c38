//! Document renderer abstraction.
//!
//! The pager wraps a renderer that can show exactly one logical position at a
//! time and only knows how to step one position forward or backward. There is
//! no random access and no way to render two positions at once, so every
//! neighbor image has to be obtained by actually moving the renderer.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so the pager can hold the renderer as
//! `Arc<dyn DocumentRenderer>`.
//!
//! # Implementors
//!
//! - [`SimulatedRenderer`] - in-memory document used by tests and the CLI

mod simulated;

pub use simulated::SimulatedRenderer;

use std::future::Future;
use std::pin::Pin;

use image::RgbaImage;

use crate::direction::Direction;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pixel dimensions of the renderer's visual surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent {
    /// Create an extent.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A single-position, sequential-only document display engine.
///
/// The renderer is a single mutable, non-reentrant resource. The pager
/// guarantees that no two of its operations ever call the step methods
/// concurrently.
pub trait DocumentRenderer: Send + Sync {
    /// Move one position towards the end of the document.
    ///
    /// Resolves to `true` if the position changed, `false` at the end.
    fn step_forward(&self) -> BoxFuture<'_, bool>;

    /// Move one position towards the start of the document.
    ///
    /// Resolves to `true` if the position changed, `false` at the start.
    fn step_backward(&self) -> BoxFuture<'_, bool>;

    /// Take a single rendering pass of the visual surface.
    ///
    /// Returns `None` if the pass produced no usable image. Must not change
    /// the renderer's position.
    fn current_visual(&self) -> Option<RgbaImage>;

    /// Current size of the visual surface.
    fn surface_extent(&self) -> Extent;

    /// Whether the visual surface is attached to a displayable context.
    fn is_attached_and_visible(&self) -> bool;

    /// Resolves once the renderer reports its position and content settled
    /// after a navigation.
    ///
    /// Callers bound this with a timeout. The default resolves immediately.
    fn wait_until_stable(&self) -> BoxFuture<'_, ()> {
        Box::pin(std::future::ready(()))
    }

    /// Enable or disable reading-progress reporting to the host.
    ///
    /// Speculative probes disable reporting so that a neighbor position is
    /// never persisted as the user's reading position.
    fn set_progress_reporting(&self, _enabled: bool) {}

    /// Step in the given direction.
    fn step(&self, direction: Direction) -> BoxFuture<'_, bool> {
        match direction {
            Direction::Forward => self.step_forward(),
            Direction::Backward => self.step_backward(),
        }
    }
}
