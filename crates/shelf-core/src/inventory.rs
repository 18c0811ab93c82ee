//! Cell Inventory Store
//!
//! Authoritative map of every active slot to its stack of lots. All
//! mutations are capacity-checked before anything is written, so a
//! rejected call never leaves a partial change behind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ShelfError, ShelfResult};
use crate::layout::Layout;
use crate::position::Position;

/// Business code given to lots placed without one
pub const DEFAULT_BIZ: &str = "Unknown";

/// One lot stacked in a cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotStack {
    pub lot_no: String,
    pub tray_count: u32,
    #[serde(default = "default_biz")]
    pub biz: String,
}

fn default_biz() -> String {
    DEFAULT_BIZ.to_string()
}

impl LotStack {
    pub fn new(lot_no: impl Into<String>, tray_count: u32, biz: impl Into<String>) -> Self {
        Self {
            lot_no: lot_no.into(),
            tray_count,
            biz: biz.into(),
        }
    }

    fn has_default_biz(&self) -> bool {
        self.biz.is_empty() || self.biz == DEFAULT_BIZ
    }
}

/// Cell contents as exchanged with observers and the Gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub level: u32,
    pub block: u32,
    pub lots: Vec<LotStack>,
}

impl CellSnapshot {
    pub fn position(&self) -> Position {
        Position::new(self.level, self.block)
    }
}

/// One occupied lot, flattened for listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupiedLot {
    pub position: Position,
    pub level: u32,
    pub block: u32,
    pub lot_no: String,
    pub tray_count: u32,
    pub biz: String,
}

/// Occupancy summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfSummary {
    pub total_positions: usize,
    pub occupied: usize,
    pub empty: usize,
    /// Percentage of occupied cells (0.0 ..= 100.0)
    pub occupancy_rate: f64,
}

/// Outcome of a bulk restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored_lots: usize,
    pub rejected: Vec<String>,
}

/// Cell Inventory Store
#[derive(Debug, Clone)]
pub struct Inventory {
    layout: Layout,
    cells: BTreeMap<Position, Vec<LotStack>>,
}

impl Inventory {
    /// Create an empty inventory for a layout
    pub fn new(layout: Layout) -> Self {
        let mut inventory = Self {
            layout,
            cells: BTreeMap::new(),
        };
        inventory.reset_all();
        inventory
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// True iff the slot exists and is active in the current layout
    pub fn validate_position(&self, pos: Position) -> bool {
        self.layout.contains(pos)
    }

    fn cell(&self, pos: Position) -> ShelfResult<&Vec<LotStack>> {
        self.cells
            .get(&pos)
            .ok_or(ShelfError::InvalidPosition(pos))
    }

    /// Lots in a slot, bottom first
    pub fn get_lots(&self, pos: Position) -> ShelfResult<&[LotStack]> {
        self.cell(pos).map(Vec::as_slice)
    }

    /// Slot capacity
    pub fn capacity(&self, pos: Position) -> ShelfResult<u32> {
        self.layout
            .capacity(pos)
            .ok_or(ShelfError::InvalidPosition(pos))
    }

    /// Trays currently stored in a slot
    pub fn cell_total(&self, pos: Position) -> ShelfResult<u32> {
        Ok(self.cell(pos)?.iter().map(|lot| lot.tray_count).sum())
    }

    /// Whether a lot is stacked in the given slot
    pub fn contains_lot(&self, pos: Position, lot_no: &str) -> bool {
        self.cells
            .get(&pos)
            .is_some_and(|lots| lots.iter().any(|lot| lot.lot_no == lot_no))
    }

    /// Place trays of a lot into a slot.
    ///
    /// Fails with `Overflow` (without mutating) when the slot would exceed its
    /// capacity. A lot already present in the slot has its quantity increased
    /// instead of gaining a second entry.
    pub fn add_lot(
        &mut self,
        pos: Position,
        lot_no: &str,
        tray_count: u32,
        biz: &str,
    ) -> ShelfResult<()> {
        if tray_count == 0 {
            return Err(ShelfError::InvalidRequest(
                "tray_count must be positive".into(),
            ));
        }
        let capacity = self.capacity(pos)?;
        let current = self.cell_total(pos)?;
        if current.saturating_add(tray_count) > capacity {
            log::warn!(
                "[Inventory] Cell {} overflow: {} + {} > {}",
                pos,
                current,
                tray_count,
                capacity
            );
            return Err(ShelfError::Overflow {
                position: pos,
                requested: tray_count,
                current,
                capacity,
            });
        }

        let lots = self
            .cells
            .get_mut(&pos)
            .ok_or(ShelfError::InvalidPosition(pos))?;
        if let Some(lot) = lots.iter_mut().find(|lot| lot.lot_no == lot_no) {
            lot.tray_count += tray_count;
            if lot.has_default_biz() && !biz.is_empty() {
                lot.biz = biz.to_string();
            }
        } else {
            let biz = if biz.is_empty() { DEFAULT_BIZ } else { biz };
            lots.push(LotStack::new(lot_no, tray_count, biz));
        }
        Ok(())
    }

    /// Remove the first stack of `lot_no` from a slot
    pub fn remove_lot(&mut self, pos: Position, lot_no: &str) -> ShelfResult<LotStack> {
        let lots = self
            .cells
            .get_mut(&pos)
            .ok_or(ShelfError::InvalidPosition(pos))?;
        let index = lots
            .iter()
            .position(|lot| lot.lot_no == lot_no)
            .ok_or_else(|| ShelfError::NotFound(format!("lot {lot_no} in {pos}")))?;
        Ok(lots.remove(index))
    }

    /// Empty every slot, re-deriving the cell set from the current layout
    pub fn reset_all(&mut self) {
        self.cells = self
            .layout
            .positions()
            .map(|pos| (pos, Vec::new()))
            .collect();
    }

    /// Replace the layout wholesale.
    ///
    /// The cell set is re-derived from the new layout. Lots of positions that
    /// survive are carried over in order while they still fit the new
    /// capacity; everything else is returned as dropped.
    pub fn replace_layout(&mut self, layout: Layout) -> Vec<(Position, LotStack)> {
        let version = self.layout.version() + 1;
        let previous = std::mem::take(&mut self.cells);
        self.layout = layout.with_version(version);
        self.reset_all();

        let mut dropped = Vec::new();
        for (pos, lots) in previous {
            for lot in lots {
                if self
                    .add_lot(pos, &lot.lot_no, lot.tray_count, &lot.biz)
                    .is_err()
                {
                    log::warn!(
                        "[Inventory] Dropping lot {} ({} trays) from {} after layout change",
                        lot.lot_no,
                        lot.tray_count,
                        pos
                    );
                    dropped.push((pos, lot));
                }
            }
        }
        dropped
    }

    /// Replace all contents with a snapshot from the system of record.
    ///
    /// Every lot goes through `add_lot`, so capacity and uniqueness hold for
    /// the restored state; lots that violate them are reported.
    pub fn restore(&mut self, cells: &[CellSnapshot]) -> RestoreReport {
        self.reset_all();
        let mut report = RestoreReport::default();
        for cell in cells {
            let pos = cell.position();
            for lot in &cell.lots {
                match self.add_lot(pos, &lot.lot_no, lot.tray_count, &lot.biz) {
                    Ok(()) => report.restored_lots += 1,
                    Err(e) => report.rejected.push(format!("{}: {}", lot.lot_no, e)),
                }
            }
        }
        report
    }

    /// Where a lot is stored, if anywhere
    pub fn find_lot(&self, lot_no: &str) -> Option<Position> {
        self.cells
            .iter()
            .find(|(_, lots)| lots.iter().any(|lot| lot.lot_no == lot_no))
            .map(|(pos, _)| *pos)
    }

    /// Full per-cell snapshot, level then block ascending
    pub fn snapshot(&self) -> Vec<CellSnapshot> {
        self.cells
            .iter()
            .map(|(pos, lots)| CellSnapshot {
                level: pos.level,
                block: pos.block,
                lots: lots.clone(),
            })
            .collect()
    }

    /// Every stored lot with its position
    pub fn occupied(&self) -> Vec<OccupiedLot> {
        self.cells
            .iter()
            .flat_map(|(pos, lots)| {
                lots.iter().map(move |lot| OccupiedLot {
                    position: *pos,
                    level: pos.level,
                    block: pos.block,
                    lot_no: lot.lot_no.clone(),
                    tray_count: lot.tray_count,
                    biz: lot.biz.clone(),
                })
            })
            .collect()
    }

    /// Occupancy summary over all active cells
    pub fn summary(&self) -> ShelfSummary {
        let total_positions = self.cells.len();
        let occupied = self.cells.values().filter(|lots| !lots.is_empty()).count();
        let occupancy_rate = if total_positions == 0 {
            0.0
        } else {
            occupied as f64 * 100.0 / total_positions as f64
        };
        ShelfSummary {
            total_positions,
            occupied,
            empty: total_positions - occupied,
            occupancy_rate,
        }
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new(Layout::fallback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(level: u32, block: u32) -> Position {
        Position::new(level, block)
    }

    #[test]
    fn test_new_inventory_is_empty() {
        let inv = Inventory::default();
        assert_eq!(inv.snapshot().len(), 24);
        assert!(inv.get_lots(pos(1, 1)).unwrap().is_empty());
        assert_eq!(inv.summary().occupied, 0);
    }

    #[test]
    fn test_get_lots_invalid_position() {
        let inv = Inventory::default();
        assert_eq!(
            inv.get_lots(pos(9, 1)),
            Err(ShelfError::InvalidPosition(pos(9, 1)))
        );
    }

    #[test]
    fn test_add_appends_on_top() {
        let mut inv = Inventory::default();
        inv.add_lot(pos(1, 1), "A1", 5, "IS").unwrap();
        inv.add_lot(pos(1, 1), "B2", 3, "IS").unwrap();
        let lots = inv.get_lots(pos(1, 1)).unwrap();
        assert_eq!(lots[0].lot_no, "A1");
        assert_eq!(lots[1].lot_no, "B2");
        assert_eq!(inv.cell_total(pos(1, 1)).unwrap(), 8);
    }

    #[test]
    fn test_add_merges_same_lot() {
        let mut inv = Inventory::default();
        inv.add_lot(pos(1, 1), "A1", 5, DEFAULT_BIZ).unwrap();
        inv.add_lot(pos(1, 1), "A1", 4, "IS").unwrap();
        let lots = inv.get_lots(pos(1, 1)).unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].tray_count, 9);
        assert_eq!(lots[0].biz, "IS");

        // A non-default biz is never overwritten
        inv.add_lot(pos(1, 1), "A1", 1, "OT").unwrap();
        assert_eq!(inv.get_lots(pos(1, 1)).unwrap()[0].biz, "IS");
    }

    #[test]
    fn test_overflow_rejected_without_mutation() {
        let mut inv = Inventory::default();
        inv.add_lot(pos(2, 2), "A1", 20, "IS").unwrap();
        let err = inv.add_lot(pos(2, 2), "B1", 10, "IS").unwrap_err();
        assert_eq!(
            err,
            ShelfError::Overflow {
                position: pos(2, 2),
                requested: 10,
                current: 20,
                capacity: 24
            }
        );
        assert_eq!(inv.cell_total(pos(2, 2)).unwrap(), 20);
        assert_eq!(inv.get_lots(pos(2, 2)).unwrap().len(), 1);
    }

    #[test]
    fn test_fill_to_exact_capacity() {
        let mut inv = Inventory::default();
        inv.add_lot(pos(1, 1), "A1", 24, "IS").unwrap();
        assert!(inv.add_lot(pos(1, 1), "A2", 1, "IS").is_err());
    }

    #[test]
    fn test_zero_trays_rejected() {
        let mut inv = Inventory::default();
        assert!(matches!(
            inv.add_lot(pos(1, 1), "A1", 0, "IS"),
            Err(ShelfError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_remove_by_lot_number() {
        let mut inv = Inventory::default();
        inv.add_lot(pos(1, 1), "A1", 5, "IS").unwrap();
        inv.add_lot(pos(1, 1), "B2", 3, "IS").unwrap();
        inv.add_lot(pos(1, 1), "C3", 2, "IS").unwrap();
        let removed = inv.remove_lot(pos(1, 1), "B2").unwrap();
        assert_eq!(removed.tray_count, 3);
        let remaining: Vec<_> = inv
            .get_lots(pos(1, 1))
            .unwrap()
            .iter()
            .map(|l| l.lot_no.as_str())
            .collect();
        assert_eq!(remaining, vec!["A1", "C3"]);
        assert!(matches!(
            inv.remove_lot(pos(1, 1), "B2"),
            Err(ShelfError::NotFound(_))
        ));
    }

    #[test]
    fn test_reset_all() {
        let mut inv = Inventory::default();
        inv.add_lot(pos(1, 1), "A1", 5, "IS").unwrap();
        inv.reset_all();
        assert!(inv.occupied().is_empty());
        assert_eq!(inv.snapshot().len(), 24);
    }

    #[test]
    fn test_replace_layout_carries_surviving_lots() {
        let mut inv = Inventory::default();
        inv.add_lot(pos(1, 1), "A1", 20, "IS").unwrap();
        inv.add_lot(pos(4, 6), "Z9", 3, "IS").unwrap();

        let dropped = inv.replace_layout(Layout::uniform(&[(1, 2), (2, 2)], 10));
        assert_eq!(inv.layout().version(), 1);
        assert_eq!(inv.snapshot().len(), 4);
        // A1 no longer fits capacity 10, L4B6 no longer exists
        assert_eq!(dropped.len(), 2);
        assert!(inv.occupied().is_empty());

        let dropped = inv.replace_layout(Layout::uniform(&[(1, 2)], 30));
        assert!(dropped.is_empty());
        assert_eq!(inv.layout().version(), 2);
    }

    #[test]
    fn test_restore_enforces_invariants() {
        let mut inv = Inventory::default();
        inv.add_lot(pos(3, 3), "OLD", 1, "IS").unwrap();
        let report = inv.restore(&[
            CellSnapshot {
                level: 1,
                block: 1,
                lots: vec![LotStack::new("A1", 10, "IS"), LotStack::new("A1", 2, "IS")],
            },
            CellSnapshot {
                level: 1,
                block: 2,
                lots: vec![LotStack::new("B1", 30, "IS")],
            },
            CellSnapshot {
                level: 8,
                block: 1,
                lots: vec![LotStack::new("C1", 1, "IS")],
            },
        ]);
        assert_eq!(report.restored_lots, 2);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(inv.get_lots(pos(1, 1)).unwrap().len(), 1);
        assert_eq!(inv.cell_total(pos(1, 1)).unwrap(), 12);
        assert_eq!(inv.find_lot("OLD"), None);
    }

    #[test]
    fn test_find_and_summary() {
        let mut inv = Inventory::new(Layout::uniform(&[(1, 4)], 24));
        inv.add_lot(pos(1, 3), "A1", 1, "IS").unwrap();
        assert_eq!(inv.find_lot("A1"), Some(pos(1, 3)));
        let summary = inv.summary();
        assert_eq!(summary.total_positions, 4);
        assert_eq!(summary.occupied, 1);
        assert_eq!(summary.empty, 3);
        assert!((summary.occupancy_rate - 25.0).abs() < f64::EPSILON);
        assert_eq!(inv.occupied()[0].position, pos(1, 3));
    }
}
