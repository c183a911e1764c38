//! pagecurl - speculative snapshot pager for page-curl navigation
//!
//! Lets a page-flip widget show the previous and next page of a document
//! rendered by an engine that can display only one position at a time and
//! only step forward or backward. Neighbor pages are obtained by briefly
//! moving the renderer, capturing its output, and moving it back.
//!
//! The entry point is [`SnapshotPager`]; renderers plug in through
//! [`DocumentRenderer`].

pub mod cache;
pub mod capture;
pub mod direction;
pub mod logging;
pub mod pager;
pub mod probe;
pub mod renderer;
pub mod snapshot;

pub use cache::{DirectionalCache, NavigabilityFlags, Slot};
pub use capture::{CaptureError, CapturePolicy, CaptureService};
pub use direction::{Direction, ReadingDirection, Side};
pub use pager::{
    CommitOutcome, ConfigError, PagerConfig, PagerError, PagerEvent, PagerPhase, PagerStatus,
    SnapshotPager, TapLocation,
};
pub use probe::{ProbeOutcome, Prober};
pub use renderer::{DocumentRenderer, Extent, SimulatedRenderer};
pub use snapshot::{RefreshToken, Snapshot};
