//! Node positions.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// A 1-based node ordinal within a workflow.
///
/// Positions are contiguous: a workflow with `n` nodes occupies positions
/// `1..=n`. Structural edits shift positions; symbolic [`Alias`]
/// references survive such shifts, raw positions do not.
///
/// [`Alias`]: crate::Alias
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(NonZeroU32);

impl Position {
    /// First position in a workflow.
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    /// Create a position from a 1-based ordinal. Returns `None` for zero.
    #[must_use]
    pub fn new(ordinal: u32) -> Option<Self> {
        NonZeroU32::new(ordinal).map(Self)
    }

    /// The 1-based ordinal.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Zero-based index into an ordered node list.
    #[must_use]
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// The next position.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_a_position() {
        assert!(Position::new(0).is_none());
    }

    #[test]
    fn first_position_is_one() {
        assert_eq!(Position::FIRST.get(), 1);
        assert_eq!(Position::FIRST.index(), 0);
    }

    #[test]
    fn index_is_zero_based() {
        assert_eq!(Position::new(5).unwrap().index(), 4);
    }

    #[test]
    fn next_increments() {
        assert_eq!(Position::new(2).unwrap().next(), Position::new(3).unwrap());
    }

    #[test]
    fn ordering_follows_ordinal() {
        assert!(Position::new(1).unwrap() < Position::new(2).unwrap());
    }

    #[test]
    fn serde_is_transparent() {
        let pos = Position::new(7).unwrap();
        assert_eq!(serde_json::to_string(&pos).unwrap(), "7");
        let back: Position = serde_json::from_str("7").unwrap();
        assert_eq!(pos, back);
    }

    #[test]
    fn serde_rejects_zero() {
        let result: Result<Position, _> = serde_json::from_str("0");
        assert!(result.is_err());
    }
}
