//! Rendered page images and the content token they belong to.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use image::RgbaImage;
use tokio::time::Instant;

use crate::renderer::Extent;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies the content currently loaded in the renderer.
///
/// Changing the token (new chapter, reload, new book) invalidates every
/// cached snapshot and every in-flight probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefreshToken(u64);

impl RefreshToken {
    /// Wrap a host-provided identifier.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Allocate a process-unique token.
    pub fn generate() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identifier.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for RefreshToken {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An immutable rendered image of one renderer position.
///
/// Cloning shares the pixel buffer. Every snapshot remembers the
/// [`RefreshToken`] it was captured under so that images from replaced
/// content can never be served.
#[derive(Clone)]
pub struct Snapshot {
    image: Arc<RgbaImage>,
    token: RefreshToken,
    captured_at: Instant,
}

impl Snapshot {
    /// Wrap a freshly rendered image.
    pub fn new(image: RgbaImage, token: RefreshToken) -> Self {
        Self {
            image: Arc::new(image),
            token,
            captured_at: Instant::now(),
        }
    }

    /// The pixels.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Content token the image was captured under.
    pub fn token(&self) -> RefreshToken {
        self.token
    }

    /// When the image was captured.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Image dimensions.
    pub fn extent(&self) -> Extent {
        Extent::new(self.image.width(), self.image.height())
    }

    /// Whether both snapshots share the same pixel buffer.
    pub fn same_image(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("extent", &self.extent())
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
