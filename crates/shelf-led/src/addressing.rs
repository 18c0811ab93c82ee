//! LED Position Addressing
//!
//! Maps active `(level, block)` slots onto a dense linear strip index.
//!
//! ## Wiring convention
//!
//! The strip starts at block 1 of the highest level, runs left to right
//! along that level, then jumps to block 1 of the next level down:
//!
//! ```text
//!   L4  [ 0][ 1][ 2][ 3][ 4][ 5]
//!   L3  [ 6][ 7][ 8][ 9][10][11]
//!   L2  [12][13][14][15][16][17]
//!   L1  [18][19][20][21][22][23]
//! ```
//!
//! Inactive slots have no index; the slots after them close the gap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shelf_core::{Layout, Position};

/// Direction in which levels are exhausted along the strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WiringOrder {
    /// Highest level first (index 0 at the top-left slot)
    #[default]
    TopDown,
    /// Lowest level first (index 0 at the bottom-left slot)
    BottomUp,
}

/// Physical wiring of the installed shelves
pub const WIRING_ORDER: WiringOrder = WiringOrder::TopDown;

/// Position ↔ strip index mapping for one layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedAddressing {
    order: WiringOrder,
    indices: BTreeMap<Position, usize>,
    positions: Vec<Position>,
}

impl LedAddressing {
    /// Compute the mapping for a layout
    pub fn from_layout(layout: &Layout, order: WiringOrder) -> Self {
        let levels: Vec<u32> = match order {
            WiringOrder::TopDown => layout.levels().rev().collect(),
            WiringOrder::BottomUp => layout.levels().collect(),
        };

        let positions: Vec<Position> = levels
            .into_iter()
            .flat_map(|level| layout.level_positions(level).collect::<Vec<_>>())
            .collect();
        let indices = positions
            .iter()
            .enumerate()
            .map(|(i, pos)| (*pos, i))
            .collect();

        Self {
            order,
            indices,
            positions,
        }
    }

    pub fn order(&self) -> WiringOrder {
        self.order
    }

    /// Strip index of an active slot
    pub fn index(&self, pos: Position) -> Option<usize> {
        self.indices.get(&pos).copied()
    }

    /// Slot wired to a strip index
    pub fn position_of(&self, index: usize) -> Option<Position> {
        self.positions.get(index).copied()
    }

    /// Number of addressable pixels
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions in strip order
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::SlotSpec;

    fn pos(level: u32, block: u32) -> Position {
        Position::new(level, block)
    }

    #[test]
    fn test_top_down_fallback_mapping() {
        let addressing = LedAddressing::from_layout(&Layout::fallback(), WIRING_ORDER);
        let expected = [
            (pos(4, 1), 0),
            (pos(4, 6), 5),
            (pos(3, 1), 6),
            (pos(3, 6), 11),
            (pos(2, 1), 12),
            (pos(2, 6), 17),
            (pos(1, 1), 18),
            (pos(1, 6), 23),
        ];
        for (position, index) in expected {
            assert_eq!(addressing.index(position), Some(index), "{position}");
            assert_eq!(addressing.position_of(index), Some(position));
        }
        assert_eq!(addressing.len(), 24);
    }

    #[test]
    fn test_bottom_up_mapping() {
        let addressing =
            LedAddressing::from_layout(&Layout::uniform(&[(1, 3), (2, 2)], 24), WiringOrder::BottomUp);
        assert_eq!(addressing.index(pos(1, 1)), Some(0));
        assert_eq!(addressing.index(pos(1, 3)), Some(2));
        assert_eq!(addressing.index(pos(2, 1)), Some(3));
        assert_eq!(addressing.len(), 5);
    }

    #[test]
    fn test_invalid_positions_have_no_index() {
        let addressing = LedAddressing::from_layout(&Layout::fallback(), WIRING_ORDER);
        assert_eq!(addressing.index(pos(5, 1)), None);
        assert_eq!(addressing.index(pos(1, 7)), None);
        assert_eq!(addressing.index(pos(0, 0)), None);
        assert_eq!(addressing.position_of(24), None);
    }

    #[test]
    fn test_inactive_slots_are_skipped() {
        let layout = Layout::from_slots([
            (pos(1, 1), SlotSpec::default()),
            (pos(1, 2), SlotSpec { capacity: 24, active: false }),
            (pos(1, 3), SlotSpec::default()),
            (pos(2, 1), SlotSpec::default()),
        ])
        .unwrap();
        let addressing = LedAddressing::from_layout(&layout, WIRING_ORDER);
        assert_eq!(addressing.len(), 3);
        assert_eq!(addressing.index(pos(2, 1)), Some(0));
        assert_eq!(addressing.index(pos(1, 1)), Some(1));
        assert_eq!(addressing.index(pos(1, 2)), None);
        assert_eq!(addressing.index(pos(1, 3)), Some(2));
    }

    #[test]
    fn test_uneven_levels() {
        let addressing =
            LedAddressing::from_layout(&Layout::uniform(&[(1, 8), (2, 4), (3, 6)], 24), WIRING_ORDER);
        assert_eq!(addressing.index(pos(3, 6)), Some(5));
        assert_eq!(addressing.index(pos(2, 1)), Some(6));
        assert_eq!(addressing.index(pos(1, 1)), Some(10));
        assert_eq!(addressing.index(pos(1, 8)), Some(17));
    }
}
