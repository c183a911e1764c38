//! Three-slot directional snapshot cache.
//!
//! Holds at most one [`Snapshot`] per [`Slot`], the per-direction
//! [`NavigabilityFlags`], and the in-flight [`ProbeHandle`] for each direction.
//!
//! An empty slot means "unknown, not yet probed". That is distinct from a
//! direction whose flag is pinned `false` because the renderer refused to
//! move.
//!
//! # Rotation
//!
//! ```text
//!            before Forward commit           after rotate_on_commit(Forward)
//!   ┌──────────┬──────────┬──────────┐     ┌──────────┬──────────┬──────────┐
//!   │ Backward │ Current  │ Forward  │ ──► │ Backward │ Current  │ Forward  │
//!   │    B     │    C     │    F     │     │    C     │    F     │   None   │
//!   └──────────┴──────────┴──────────┘     └──────────┴──────────┴──────────┘
//! ```
//!
//! The cache is owned by the pager and mutated only from probe and commit
//! completions.

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::direction::Direction;
use crate::snapshot::Snapshot;

/// Cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Image standing in for the previous position.
    Backward,
    /// Image of the visible position.
    Current,
    /// Image standing in for the next position.
    Forward,
}

impl Slot {
    /// All slots in spatial order.
    pub const ALL: [Slot; 3] = [Slot::Backward, Slot::Current, Slot::Forward];

    fn index(self) -> usize {
        match self {
            Slot::Backward => 0,
            Slot::Current => 1,
            Slot::Forward => 2,
        }
    }

    /// Short lowercase name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Backward => "backward",
            Slot::Current => "current",
            Slot::Forward => "forward",
        }
    }
}

impl From<Direction> for Slot {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => Slot::Forward,
            Direction::Backward => Slot::Backward,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the renderer may be able to move in each direction.
///
/// Optimistic (`true`) until a probe or commit finds the renderer at a
/// boundary. A `false` flag stays pinned until the next content swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigabilityFlags {
    /// Renderer may step forward.
    pub can_go_forward: bool,
    /// Renderer may step backward.
    pub can_go_backward: bool,
}

impl Default for NavigabilityFlags {
    fn default() -> Self {
        Self {
            can_go_forward: true,
            can_go_backward: true,
        }
    }
}

impl NavigabilityFlags {
    /// Flag for the given direction.
    pub fn can_go(&self, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.can_go_forward,
            Direction::Backward => self.can_go_backward,
        }
    }

    /// Set the flag for the given direction.
    pub fn set(&mut self, direction: Direction, value: bool) {
        match direction {
            Direction::Forward => self.can_go_forward = value,
            Direction::Backward => self.can_go_backward = value,
        }
    }
}

/// Marker for a probe in flight.
///
/// Holds the probe's cancellation token. The id lets the completion path
/// tell its own handle apart from one installed after a cancellation.
#[derive(Debug, Clone)]
pub struct ProbeHandle {
    id: u64,
    cancel: CancellationToken,
}

impl ProbeHandle {
    /// Create a handle.
    pub fn new(id: u64, cancel: CancellationToken) -> Self {
        Self { id, cancel }
    }

    /// Probe id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation of the probe.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Snapshot cache keyed by slot.
#[derive(Debug, Default)]
pub struct DirectionalCache {
    slots: [Option<Snapshot>; 3],
    flags: NavigabilityFlags,
    forward_probe: Option<ProbeHandle>,
    backward_probe: Option<ProbeHandle>,
}

impl DirectionalCache {
    /// Create an empty cache with optimistic flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached image for a slot.
    pub fn get(&self, slot: Slot) -> Option<&Snapshot> {
        self.slots[slot.index()].as_ref()
    }

    /// Store an image, replacing any previous one.
    pub fn put(&mut self, slot: Slot, snapshot: Snapshot) {
        self.slots[slot.index()] = Some(snapshot);
    }

    /// Forget a slot's image, returning it.
    pub fn invalidate(&mut self, slot: Slot) -> Option<Snapshot> {
        self.slots[slot.index()].take()
    }

    /// Forget every image.
    pub fn invalidate_all(&mut self) {
        self.slots = Default::default();
    }

    /// Rotate the slots after a committed transition in `direction`.
    ///
    /// The old current image moves to the opposite slot, the image cached
    /// for `direction` becomes current, and the `direction` slot is left
    /// empty since it now stands two steps from the pre-commit position. The
    /// opposite flag is reset to optimistic.
    pub fn rotate_on_commit(&mut self, direction: Direction) {
        let arrived = self.invalidate(Slot::from(direction));
        let departed = self.invalidate(Slot::Current);

        self.slots[Slot::from(direction.opposite()).index()] = departed;
        self.slots[Slot::Current.index()] = arrived;
        self.flags.set(direction.opposite(), true);
    }

    /// Navigability flags.
    pub fn flags(&self) -> NavigabilityFlags {
        self.flags
    }

    /// Whether the renderer may move in `direction`.
    pub fn can_navigate(&self, direction: Direction) -> bool {
        self.flags.can_go(direction)
    }

    /// Record that the renderer cannot move in `direction`.
    ///
    /// Drops any image cached for that direction.
    pub fn pin_boundary(&mut self, direction: Direction) {
        self.flags.set(direction, false);
        self.invalidate(Slot::from(direction));
    }

    /// Whether a probe is in flight for `direction`.
    pub fn probe_in_flight(&self, direction: Direction) -> bool {
        self.probe_slot(direction).is_some()
    }

    /// Install a probe handle. Returns `false` if one is already present.
    pub fn begin_probe(&mut self, direction: Direction, handle: ProbeHandle) -> bool {
        let slot = self.probe_slot_mut(direction);
        if slot.is_some() {
            return false;
        }
        *slot = Some(handle);
        true
    }

    /// Clear the probe handle if it still belongs to probe `id`.
    ///
    /// Returns `false` when the handle was already cleared by a cancellation.
    pub fn finish_probe(&mut self, direction: Direction, id: u64) -> bool {
        let slot = self.probe_slot_mut(direction);
        match slot {
            Some(handle) if handle.id() == id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Cancel and clear every probe handle. Returns how many were cancelled.
    pub fn cancel_probes(&mut self) -> usize {
        let mut cancelled = 0;
        for handle in [self.forward_probe.take(), self.backward_probe.take()]
            .into_iter()
            .flatten()
        {
            handle.cancel();
            cancelled += 1;
        }
        cancelled
    }

    /// Cancel probes, forget every image, and make both flags optimistic.
    pub fn reset(&mut self) -> usize {
        let cancelled = self.cancel_probes();
        self.invalidate_all();
        self.flags = NavigabilityFlags::default();
        cancelled
    }

    /// Which slots currently hold an image, in [`Slot::ALL`] order.
    pub fn occupancy(&self) -> [bool; 3] {
        [
            self.slots[0].is_some(),
            self.slots[1].is_some(),
            self.slots[2].is_some(),
        ]
    }

    fn probe_slot(&self, direction: Direction) -> &Option<ProbeHandle> {
        match direction {
            Direction::Forward => &self.forward_probe,
            Direction::Backward => &self.backward_probe,
        }
    }

    fn probe_slot_mut(&mut self, direction: Direction) -> &mut Option<ProbeHandle> {
        match direction {
            Direction::Forward => &mut self.forward_probe,
            Direction::Backward => &mut self.backward_probe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RefreshToken;
    use image::RgbaImage;

    fn snap() -> Snapshot {
        Snapshot::new(RgbaImage::new(1, 1), RefreshToken::new(1))
    }

    fn same(a: Option<&Snapshot>, b: &Snapshot) -> bool {
        a.map(|a| a.same_image(b)).unwrap_or(false)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Slot and flag tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_slot_from_direction() {
        assert_eq!(Slot::from(Direction::Forward), Slot::Forward);
        assert_eq!(Slot::from(Direction::Backward), Slot::Backward);
    }

    #[test]
    fn test_flags_default_optimistic() {
        let flags = NavigabilityFlags::default();
        assert!(flags.can_go(Direction::Forward));
        assert!(flags.can_go(Direction::Backward));
    }

    #[test]
    fn test_flags_set() {
        let mut flags = NavigabilityFlags::default();
        flags.set(Direction::Backward, false);
        assert!(!flags.can_go_backward);
        assert!(flags.can_go_forward);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Slot storage tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_new_cache_is_empty() {
        let cache = DirectionalCache::new();
        assert_eq!(cache.occupancy(), [false, false, false]);
        assert!(!cache.probe_in_flight(Direction::Forward));
    }

    #[test]
    fn test_put_get_invalidate() {
        let mut cache = DirectionalCache::new();
        let image = snap();
        cache.put(Slot::Forward, image.clone());
        assert!(same(cache.get(Slot::Forward), &image));
        assert!(cache.get(Slot::Backward).is_none());

        let removed = cache.invalidate(Slot::Forward);
        assert!(removed.is_some());
        assert!(cache.get(Slot::Forward).is_none());
    }

    #[test]
    fn test_invalidate_all_keeps_flags() {
        let mut cache = DirectionalCache::new();
        for slot in Slot::ALL {
            cache.put(slot, snap());
        }
        cache.pin_boundary(Direction::Forward);
        cache.invalidate_all();
        assert_eq!(cache.occupancy(), [false, false, false]);
        assert!(!cache.can_navigate(Direction::Forward));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rotation tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_rotate_forward() {
        let (b, c, f) = (snap(), snap(), snap());
        let mut cache = DirectionalCache::new();
        cache.put(Slot::Backward, b);
        cache.put(Slot::Current, c.clone());
        cache.put(Slot::Forward, f.clone());

        cache.rotate_on_commit(Direction::Forward);

        assert!(same(cache.get(Slot::Backward), &c));
        assert!(same(cache.get(Slot::Current), &f));
        assert!(cache.get(Slot::Forward).is_none());
    }

    #[test]
    fn test_rotate_backward() {
        let (b, c, f) = (snap(), snap(), snap());
        let mut cache = DirectionalCache::new();
        cache.put(Slot::Backward, b.clone());
        cache.put(Slot::Current, c.clone());
        cache.put(Slot::Forward, f);

        cache.rotate_on_commit(Direction::Backward);

        assert!(same(cache.get(Slot::Forward), &c));
        assert!(same(cache.get(Slot::Current), &b));
        assert!(cache.get(Slot::Backward).is_none());
    }

    #[test]
    fn test_rotate_without_cached_neighbor_leaves_current_empty() {
        let c = snap();
        let mut cache = DirectionalCache::new();
        cache.put(Slot::Current, c.clone());

        cache.rotate_on_commit(Direction::Forward);

        assert!(cache.get(Slot::Current).is_none());
        assert!(same(cache.get(Slot::Backward), &c));
    }

    #[test]
    fn test_rotate_resets_opposite_flag() {
        let mut cache = DirectionalCache::new();
        cache.pin_boundary(Direction::Backward);

        cache.rotate_on_commit(Direction::Forward);

        assert!(cache.can_navigate(Direction::Backward));
    }

    #[test]
    fn test_pin_boundary_drops_image() {
        let mut cache = DirectionalCache::new();
        cache.put(Slot::Backward, snap());
        cache.pin_boundary(Direction::Backward);
        assert!(cache.get(Slot::Backward).is_none());
        assert!(!cache.flags().can_go_backward);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Probe handle tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_begin_probe_rejects_second_handle() {
        let mut cache = DirectionalCache::new();
        assert!(cache.begin_probe(Direction::Forward, ProbeHandle::new(1, CancellationToken::new())));
        assert!(!cache.begin_probe(Direction::Forward, ProbeHandle::new(2, CancellationToken::new())));
        assert!(cache.begin_probe(Direction::Backward, ProbeHandle::new(3, CancellationToken::new())));
    }

    #[test]
    fn test_finish_probe_matches_id() {
        let mut cache = DirectionalCache::new();
        cache.begin_probe(Direction::Forward, ProbeHandle::new(7, CancellationToken::new()));

        assert!(!cache.finish_probe(Direction::Forward, 8));
        assert!(cache.probe_in_flight(Direction::Forward));
        assert!(cache.finish_probe(Direction::Forward, 7));
        assert!(!cache.probe_in_flight(Direction::Forward));
        assert!(!cache.finish_probe(Direction::Forward, 7));
    }

    #[test]
    fn test_cancel_probes_clears_and_cancels() {
        let mut cache = DirectionalCache::new();
        let token = CancellationToken::new();
        cache.begin_probe(Direction::Forward, ProbeHandle::new(1, token.clone()));
        cache.begin_probe(Direction::Backward, ProbeHandle::new(2, CancellationToken::new()));

        assert_eq!(cache.cancel_probes(), 2);
        assert!(token.is_cancelled());
        assert!(!cache.probe_in_flight(Direction::Forward));
        assert!(!cache.finish_probe(Direction::Forward, 1));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut cache = DirectionalCache::new();
        cache.put(Slot::Current, snap());
        cache.pin_boundary(Direction::Forward);
        cache.begin_probe(Direction::Backward, ProbeHandle::new(1, CancellationToken::new()));

        assert_eq!(cache.reset(), 1);
        assert_eq!(cache.occupancy(), [false, false, false]);
        assert_eq!(cache.flags(), NavigabilityFlags::default());
        assert!(!cache.probe_in_flight(Direction::Backward));
    }
}
