//! Smart Shelf Core Model
//!
//! Typed records for a multi-level storage shelf:
//! - `Position`: `(level, block)` slot coordinates and the `L<level>B<block>` encoding
//! - `Layout`: versioned slot capacity / active-status configuration
//! - `Inventory`: capacity-checked stacks of lots per slot
//! - `Job`: place/pick work items as exchanged on the wire
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌────────────────────┐     ┌──────────────┐
//! │ Layout           │────▶│ Inventory          │◀────│ Job records  │
//! │ level → [slots]  │     │ slot → [LotStack]  │     │ place / pick │
//! │ version, source  │     │ sum ≤ capacity     │     │ queued/error │
//! └──────────────────┘     └────────────────────┘     └──────────────┘
//! ```
//!
//! Nothing here is shared or locked; the engine owns one instance of each
//! and serializes access.

mod error;
mod position;

pub mod inventory;
pub mod job;
pub mod layout;

// Re-exports
pub use error::{ShelfError, ShelfResult};
pub use inventory::{
    CellSnapshot, DEFAULT_BIZ, Inventory, LotStack, OccupiedLot, RestoreReport, ShelfSummary,
};
pub use job::{
    ErrorLocation, Job, JobAction, JobRequest, JobStatus, PlaceFlag, TRN_STATUS_ERROR,
    TRN_STATUS_NORMAL, UNKNOWN_SHELF_ID,
};
pub use layout::{
    DEFAULT_CELL_CAPACITY, Layout, LayoutError, LayoutInfo, LayoutSource, SlotInfo, SlotSpec,
};
pub use position::{Position, PositionParseError};
