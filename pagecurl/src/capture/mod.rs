//! Snapshot capture with bounded retries.
//!
//! A capture reads the renderer's visual surface and never moves it. Two
//! kinds of "not yet" are told apart:
//!
//! - **Surface not ready**: detached or zero-sized. Nothing is rendered; the
//!   attempt is skipped and waited out (bounded by `max_surface_waits`).
//! - **Render pass failed**: the surface was ready but yielded no image.
//!   Retried up to `max_retries` times.
//!
//! Every wait races the caller's [`CancellationToken`]; a cancelled capture
//! returns immediately without finishing the outstanding wait.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::renderer::DocumentRenderer;
use crate::snapshot::{RefreshToken, Snapshot};

/// Default number of retries after a failed render pass.
pub const DEFAULT_CAPTURE_MAX_RETRIES: u32 = 2;

/// Default delay between capture attempts.
pub const DEFAULT_CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(60);

/// Default number of waits for a detached or zero-sized surface.
pub const DEFAULT_MAX_SURFACE_WAITS: u32 = 4;

/// Retry discipline for a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePolicy {
    /// Retries after the first failed render pass.
    pub max_retries: u32,
    /// Delay before each retry or surface wait.
    pub retry_delay: Duration,
    /// Waits allowed for the surface to become ready. These do not consume
    /// render retries.
    pub max_surface_waits: u32,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_CAPTURE_MAX_RETRIES,
            retry_delay: DEFAULT_CAPTURE_RETRY_DELAY,
            max_surface_waits: DEFAULT_MAX_SURFACE_WAITS,
        }
    }
}

impl CapturePolicy {
    /// Fixed-delay policy with the default surface wait budget.
    pub fn fixed(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            max_surface_waits: DEFAULT_MAX_SURFACE_WAITS,
        }
    }

    /// Set the surface wait budget.
    pub fn with_max_surface_waits(mut self, waits: u32) -> Self {
        self.max_surface_waits = waits;
        self
    }

    /// Maximum render passes a capture may take.
    pub fn max_render_passes(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Why a capture produced no snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Retries exhausted without a usable image.
    #[error("no usable image after {render_passes} render passes and {surface_waits} surface waits")]
    Unavailable {
        /// Render passes taken.
        render_passes: u32,
        /// Waits spent on a surface that was not ready.
        surface_waits: u32,
    },

    /// The capture was cancelled.
    #[error("capture cancelled")]
    Cancelled,
}

/// Captures snapshots of a renderer's visual output.
#[derive(Clone)]
pub struct CaptureService {
    renderer: Arc<dyn DocumentRenderer>,
}

impl std::fmt::Debug for CaptureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureService").finish_non_exhaustive()
    }
}

impl CaptureService {
    /// Create a capture service for the given renderer.
    pub fn new(renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self { renderer }
    }

    /// Capture the renderer's current visual output.
    ///
    /// The caller must hold the renderer stable (no step in progress) for
    /// the duration of the capture.
    pub async fn capture(
        &self,
        token: RefreshToken,
        policy: &CapturePolicy,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, CaptureError> {
        let mut render_passes = 0u32;
        let mut surface_waits = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(CaptureError::Cancelled);
            }

            let surface_ready = self.renderer.is_attached_and_visible()
                && !self.renderer.surface_extent().is_empty();

            if surface_ready {
                render_passes += 1;
                match self.renderer.current_visual() {
                    Some(image) if image.width() > 0 && image.height() > 0 => {
                        tracing::trace!(render_passes, surface_waits, "Snapshot captured");
                        return Ok(Snapshot::new(image, token));
                    }
                    _ => {
                        if render_passes > policy.max_retries {
                            return Err(CaptureError::Unavailable {
                                render_passes,
                                surface_waits,
                            });
                        }
                        tracing::trace!(render_passes, "Render pass yielded no image, retrying");
                    }
                }
            } else {
                if surface_waits >= policy.max_surface_waits {
                    return Err(CaptureError::Unavailable {
                        render_passes,
                        surface_waits,
                    });
                }
                surface_waits += 1;
                tracing::trace!(surface_waits, "Surface not ready, waiting");
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(CaptureError::Cancelled),
                _ = tokio::time::sleep(policy.retry_delay) => {}
            }
        }
    }
}
