//! Layout Configuration
//!
//! Versioned mapping of `(level, block)` to slot capacity and active status.
//! Blocks are 1-based and contiguous per level; a Gateway layout that skips
//! a block gets the gap filled with an inactive slot so numbering stays
//! contiguous.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::Position;

/// Capacity (trays) used when a slot does not specify one
pub const DEFAULT_CELL_CAPACITY: u32 = 24;

/// Static fallback table used until a Gateway layout is loaded: (level, blocks)
pub const FALLBACK_LEVELS: [(u32, u32); 4] = [(1, 6), (2, 6), (3, 6), (4, 6)];

/// Upper bounds on externally supplied layouts
pub const MAX_LEVELS: usize = 64;
pub const MAX_BLOCKS_PER_LEVEL: u32 = 256;

/// Per-slot configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub capacity: u32,
    pub active: bool,
}

impl Default for SlotSpec {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CELL_CAPACITY,
            active: true,
        }
    }
}

/// Where the current layout came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutSource {
    Fallback,
    Gateway,
}

/// Layout validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("Layout has no active slots")]
    Empty,

    #[error("Level and block numbers are 1-based, got {0}")]
    ZeroCoordinate(String),

    #[error("Duplicate slot {0} in layout")]
    DuplicateSlot(Position),

    #[error("Layout exceeds limits: {0}")]
    TooLarge(String),
}

/// Layout Configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    levels: BTreeMap<u32, Vec<SlotSpec>>,
    version: u64,
    source: LayoutSource,
}

impl Layout {
    /// Static fallback layout (4 levels × 6 blocks, capacity 24)
    pub fn fallback() -> Self {
        Self::uniform(&FALLBACK_LEVELS, DEFAULT_CELL_CAPACITY)
    }

    /// Build a layout where every block of every level has the same capacity
    pub fn uniform(levels: &[(u32, u32)], capacity: u32) -> Self {
        let levels = levels
            .iter()
            .filter(|(level, blocks)| *level > 0 && *blocks > 0)
            .map(|&(level, blocks)| {
                (
                    level,
                    vec![
                        SlotSpec {
                            capacity,
                            active: true
                        };
                        blocks as usize
                    ],
                )
            })
            .collect();
        Self {
            levels,
            version: 0,
            source: LayoutSource::Fallback,
        }
    }

    /// Build a layout from individually specified slots (Gateway layout)
    pub fn from_slots<I>(slots: I) -> Result<Self, LayoutError>
    where
        I: IntoIterator<Item = (Position, SlotSpec)>,
    {
        let mut by_level: BTreeMap<u32, BTreeMap<u32, SlotSpec>> = BTreeMap::new();
        for (pos, spec) in slots {
            if pos.level == 0 || pos.block == 0 {
                return Err(LayoutError::ZeroCoordinate(pos.to_string()));
            }
            if pos.block > MAX_BLOCKS_PER_LEVEL {
                return Err(LayoutError::TooLarge(format!(
                    "block {} > {MAX_BLOCKS_PER_LEVEL}",
                    pos.block
                )));
            }
            if by_level
                .entry(pos.level)
                .or_default()
                .insert(pos.block, spec)
                .is_some()
            {
                return Err(LayoutError::DuplicateSlot(pos));
            }
        }
        if by_level.len() > MAX_LEVELS {
            return Err(LayoutError::TooLarge(format!(
                "{} levels > {MAX_LEVELS}",
                by_level.len()
            )));
        }

        let mut levels = BTreeMap::new();
        for (level, blocks) in by_level {
            // Highest active block defines the level width
            let Some(width) = blocks
                .iter()
                .filter(|(_, spec)| spec.active)
                .map(|(block, _)| *block)
                .max()
            else {
                continue;
            };
            let row = (1..=width)
                .map(|block| {
                    blocks.get(&block).copied().unwrap_or(SlotSpec {
                        capacity: DEFAULT_CELL_CAPACITY,
                        active: false,
                    })
                })
                .collect();
            levels.insert(level, row);
        }

        if levels.is_empty() {
            return Err(LayoutError::Empty);
        }

        Ok(Self {
            levels,
            version: 0,
            source: LayoutSource::Gateway,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn source(&self) -> LayoutSource {
        self.source
    }

    /// Stamp a version number (assigned by the owner on replacement)
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Levels in ascending order
    pub fn levels(&self) -> impl DoubleEndedIterator<Item = u32> + '_ {
        self.levels.keys().copied()
    }

    /// Number of blocks on a level (active or not)
    pub fn block_count(&self, level: u32) -> Option<u32> {
        self.levels.get(&level).map(|row| row.len() as u32)
    }

    /// Slot spec for a position, if the position exists in the layout
    pub fn slot(&self, pos: Position) -> Option<&SlotSpec> {
        if pos.block == 0 {
            return None;
        }
        self.levels
            .get(&pos.level)
            .and_then(|row| row.get(pos.block as usize - 1))
    }

    /// True iff the level is known, the block is in range and the slot is active
    pub fn contains(&self, pos: Position) -> bool {
        self.slot(pos).is_some_and(|spec| spec.active)
    }

    /// Capacity of an active slot
    pub fn capacity(&self, pos: Position) -> Option<u32> {
        self.slot(pos)
            .filter(|spec| spec.active)
            .map(|spec| spec.capacity)
    }

    /// Active positions of one level, blocks ascending
    pub fn level_positions(&self, level: u32) -> impl Iterator<Item = Position> + '_ {
        self.levels
            .get(&level)
            .into_iter()
            .flat_map(move |row| {
                row.iter()
                    .enumerate()
                    .filter(|(_, spec)| spec.active)
                    .map(move |(i, _)| Position::new(level, i as u32 + 1))
            })
    }

    /// All active positions, level then block ascending
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.levels().flat_map(move |level| self.level_positions(level))
    }

    /// Number of active slots
    pub fn active_count(&self) -> usize {
        self.levels
            .values()
            .map(|row| row.iter().filter(|spec| spec.active).count())
            .sum()
    }

    /// Serializable description for observers and the Gateway
    pub fn info(&self) -> LayoutInfo {
        let mut slots = BTreeMap::new();
        for (&level, row) in &self.levels {
            for (i, spec) in row.iter().enumerate() {
                let pos = Position::new(level, i as u32 + 1);
                slots.insert(
                    pos.slot_key(),
                    SlotInfo {
                        level,
                        block: pos.block,
                        capacity: spec.capacity,
                        active: spec.active,
                    },
                );
            }
        }
        LayoutInfo {
            version: self.version,
            source: self.source,
            shelf_config: self
                .levels
                .iter()
                .map(|(level, row)| (*level, row.len() as u32))
                .collect(),
            slots,
            total_positions: self.active_count(),
            default_capacity: DEFAULT_CELL_CAPACITY,
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Wire description of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub level: u32,
    pub block: u32,
    #[serde(alias = "max_tray_count", default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_capacity() -> u32 {
    DEFAULT_CELL_CAPACITY
}

fn default_active() -> bool {
    true
}

/// Wire description of the whole layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u64,
    pub source: LayoutSource,
    /// level → block count
    pub shelf_config: BTreeMap<u32, u32>,
    /// `"<level>-<block>"` → slot
    pub slots: BTreeMap<String, SlotInfo>,
    pub total_positions: usize,
    pub default_capacity: u32,
}
