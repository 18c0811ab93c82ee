//! Gateway wire payloads
//!
//! Layout and state use one shape for both directions, told apart by
//! `mode`. Completion notices and pending jobs follow the warehouse
//! system's string-typed record format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shelf_core::{
    CellSnapshot, Job, JobRequest, Layout, LayoutError, Position, SlotInfo, SlotSpec,
};

use crate::error::GatewayError;

/// Direction of a sync round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Read,
    Write,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

/// `{shelf_id, mode, slots: {"<level>-<block>": {capacity, active, level, block}}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutPayload {
    pub shelf_id: String,
    pub mode: SyncMode,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotInfo>,
}

impl LayoutPayload {
    /// Read request: slots left empty
    pub fn read(shelf_id: impl Into<String>) -> Self {
        Self {
            shelf_id: shelf_id.into(),
            mode: SyncMode::Read,
            slots: BTreeMap::new(),
        }
    }

    /// Write request describing `layout`
    pub fn write(shelf_id: impl Into<String>, layout: &Layout) -> Self {
        Self {
            shelf_id: shelf_id.into(),
            mode: SyncMode::Write,
            slots: layout.info().slots,
        }
    }

    /// Build a layout from the slot table.
    ///
    /// Each key must agree with the coordinates inside its entry.
    pub fn to_layout(&self) -> Result<Layout, GatewayError> {
        let mut slots = Vec::with_capacity(self.slots.len());
        for (key, slot) in &self.slots {
            let pos = Position::from_slot_key(key)
                .map_err(|e| GatewayError::InvalidPayload(format!("slot key '{key}': {e}")))?;
            if pos != Position::new(slot.level, slot.block) {
                return Err(GatewayError::InvalidPayload(format!(
                    "slot key '{key}' does not match L{}B{}",
                    slot.level, slot.block
                )));
            }
            if slot.capacity == 0 {
                return Err(GatewayError::InvalidPayload(format!(
                    "slot '{key}' has zero capacity"
                )));
            }
            slots.push((
                pos,
                SlotSpec {
                    capacity: slot.capacity,
                    active: slot.active,
                },
            ));
        }
        Layout::from_slots(slots).map_err(|e: LayoutError| GatewayError::InvalidPayload(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// `{shelf_id, mode, cells: [{level, block, lots: [{lot_no, tray_count, biz}]}]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    pub shelf_id: String,
    pub mode: SyncMode,
    #[serde(default)]
    pub cells: Vec<CellSnapshot>,
}

impl StatePayload {
    pub fn read(shelf_id: impl Into<String>) -> Self {
        Self {
            shelf_id: shelf_id.into(),
            mode: SyncMode::Read,
            cells: Vec::new(),
        }
    }

    pub fn write(shelf_id: impl Into<String>, cells: Vec<CellSnapshot>) -> Self {
        Self {
            shelf_id: shelf_id.into(),
            mode: SyncMode::Write,
            cells,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOBS & IDENTITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Completion notice; every field travels as a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfComplete {
    pub biz: String,
    pub shelf_id: String,
    pub lot_no: String,
    pub level: String,
    pub block: String,
    pub place_flg: String,
    pub trn_status: String,
    pub tray_count: String,
    /// Always `"success"`; the Gateway keys completion on it
    pub status: String,
}

impl From<&Job> for ShelfComplete {
    fn from(job: &Job) -> Self {
        Self {
            biz: job.biz.clone(),
            shelf_id: job.shelf_id.clone(),
            lot_no: job.lot_no.clone(),
            level: job.level.to_string(),
            block: job.block.to_string(),
            place_flg: job.place_flg.as_str().to_string(),
            trn_status: job.trn_status.clone(),
            tray_count: job.tray_count.to_string(),
            status: "success".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingJobsRequest {
    pub shelf_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingJobsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub jobs: Vec<JobRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfIdRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shelf_ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfIdResponse {
    #[serde(default)]
    pub shelf_id: Option<String>,
    #[serde(default)]
    pub shelf_name: Option<String>,
}
