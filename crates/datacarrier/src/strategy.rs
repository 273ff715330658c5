#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a slot buffer does when the cursor lands on a slot that still holds an
/// undrained item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OverflowStrategy {
    /// Reject the write; the occupant stays and `save` returns `false`.
    DropIfOccupied,
    /// Replace the occupant with the new item.
    #[default]
    OverwriteAlways,
}

impl OverflowStrategy {
    #[inline]
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::DropIfOccupied => 0,
            Self::OverwriteAlways => 1,
        }
    }

    #[inline]
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::DropIfOccupied,
            _ => Self::OverwriteAlways,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_overwrite() {
        assert_eq!(OverflowStrategy::default(), OverflowStrategy::OverwriteAlways);
    }

    #[test]
    fn test_u8_encoding() {
        for strategy in [OverflowStrategy::DropIfOccupied, OverflowStrategy::OverwriteAlways] {
            assert_eq!(OverflowStrategy::from_u8(strategy.as_u8()), strategy);
        }
    }
}
