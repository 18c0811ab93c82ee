//! Error types for the shelf engine

use thiserror::Error;

use crate::position::Position;

/// Core error type
///
/// Local validation failures (`InvalidPosition`, `DuplicateLot`, `Overflow`,
/// `NotFound`, `InvalidRequest`) gate physical-world mutations and are always
/// returned to the caller. `GatewayUnavailable` and `HardwareFault` describe
/// collaborators outside the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShelfError {
    #[error("Invalid position {0}: not in current layout")]
    InvalidPosition(Position),

    /// Batch rejection listing every unknown position
    #[error("Invalid positions {}: not in current layout", format_positions(.0))]
    InvalidPositions(Vec<Position>),

    #[error("Job for lot {lot_no} already exists in the queue")]
    DuplicateLot { lot_no: String },

    #[error("Cell {position} overflow: {current} + {requested} > {capacity}")]
    Overflow {
        position: Position,
        requested: u32,
        current: u32,
        capacity: u32,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Hardware fault: {0}")]
    HardwareFault(String),
}

impl ShelfError {
    /// Stable machine-readable code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPosition(_) | Self::InvalidPositions(_) => "INVALID_POSITION",
            Self::DuplicateLot { .. } => "DUPLICATE_LOT",
            Self::Overflow { .. } => "OVERFLOW",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            Self::HardwareFault(_) => "HARDWARE_FAULT",
        }
    }

    /// True for errors produced by local validation (never by a collaborator)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPosition(_)
                | Self::InvalidPositions(_)
                | Self::DuplicateLot { .. }
                | Self::Overflow { .. }
                | Self::NotFound(_)
                | Self::InvalidRequest(_)
        )
    }
}

fn format_positions(positions: &[Position]) -> String {
    positions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias
pub type ShelfResult<T> = Result<T, ShelfError>;
