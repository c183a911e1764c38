//! Navigation directions.
//!
//! Two vocabularies meet here:
//!
//! - [`Direction`] is *logical*: forward means "later in the document",
//!   regardless of how the page is laid out on screen.
//! - [`Side`] is *spatial*: the flip widget asks for the page that sits before
//!   (left of) or after (right of) the visible one.
//!
//! [`ReadingDirection`] maps one onto the other. For right-to-left documents
//! (manga, Arabic, Hebrew) the page on the left is the *next* page.

use std::fmt;

/// Logical navigation direction of the document renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards the end of the document.
    Forward,
    /// Towards the start of the document.
    Backward,
}

impl Direction {
    /// Both directions, forward first.
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Backward];

    /// The direction that undoes a step in this direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    /// Short lowercase name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spatial side of the visible page, as seen by the flip widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The page revealed by curling towards the left edge.
    Before,
    /// The page revealed by curling towards the right edge.
    After,
}

/// Page progression of the loaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadingDirection {
    /// Western page progression: the next page is on the right.
    #[default]
    LeftToRight,
    /// The next page is on the left.
    RightToLeft,
}

impl ReadingDirection {
    /// Map a spatial side to the logical direction that reaches it.
    pub fn direction_for(self, side: Side) -> Direction {
        match (self, side) {
            (ReadingDirection::LeftToRight, Side::Before) => Direction::Backward,
            (ReadingDirection::LeftToRight, Side::After) => Direction::Forward,
            (ReadingDirection::RightToLeft, Side::Before) => Direction::Forward,
            (ReadingDirection::RightToLeft, Side::After) => Direction::Backward,
        }
    }

    /// Whether pages progress right to left.
    pub fn is_rtl(self) -> bool {
        self == ReadingDirection::RightToLeft
    }

    /// Parse a config value (`ltr` / `rtl`, case-insensitive).
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ltr" | "left-to-right" => Some(ReadingDirection::LeftToRight),
            "rtl" | "right-to-left" => Some(ReadingDirection::RightToLeft),
            _ => None,
        }
    }
}

impl fmt::Display for ReadingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingDirection::LeftToRight => f.write_str("ltr"),
            ReadingDirection::RightToLeft => f.write_str("rtl"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_is_involution() {
        for direction in Direction::ALL {
            assert_ne!(direction.opposite(), direction);
            assert_eq!(direction.opposite().opposite(), direction);
        }
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(format!("{}", Direction::Forward), "forward");
        assert_eq!(format!("{}", Direction::Backward), "backward");
    }

    #[test]
    fn test_ltr_side_mapping() {
        let ltr = ReadingDirection::LeftToRight;
        assert_eq!(ltr.direction_for(Side::Before), Direction::Backward);
        assert_eq!(ltr.direction_for(Side::After), Direction::Forward);
    }

    #[test]
    fn test_rtl_side_mapping_is_mirrored() {
        let rtl = ReadingDirection::RightToLeft;
        assert_eq!(rtl.direction_for(Side::Before), Direction::Forward);
        assert_eq!(rtl.direction_for(Side::After), Direction::Backward);
        assert!(rtl.is_rtl());
    }

    #[test]
    fn test_reading_direction_from_config_str() {
        assert_eq!(
            ReadingDirection::from_config_str("RTL"),
            Some(ReadingDirection::RightToLeft)
        );
        assert_eq!(
            ReadingDirection::from_config_str(" ltr "),
            Some(ReadingDirection::LeftToRight)
        );
        assert_eq!(ReadingDirection::from_config_str("vertical"), None);
    }

    #[test]
    fn test_default_is_ltr() {
        assert_eq!(ReadingDirection::default(), ReadingDirection::LeftToRight);
    }
}
