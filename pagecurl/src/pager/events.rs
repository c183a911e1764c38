//! Notifications for the flip widget.

use crate::direction::Direction;
use crate::snapshot::RefreshToken;

/// Something the widget may want to redraw for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerEvent {
    /// A new current image was published. Replace the displayed page
    /// without animation.
    CurrentChanged {
        /// Content token of the new image.
        token: RefreshToken,
    },

    /// A probe cached the neighbor image for `direction`.
    NeighborReady {
        /// Probed direction.
        direction: Direction,
    },

    /// The renderer cannot move in `direction`; the flip affordance for it
    /// should be disabled.
    BoundaryReached {
        /// Pinned direction.
        direction: Direction,
    },

    /// New content was loaded and every cached image was dropped.
    ContentSwapped {
        /// New content token.
        token: RefreshToken,
    },
}
