//! Strip colours, driver boundary and LED errors

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shelf_core::{Position, ShelfError};
use thiserror::Error;

/// RGB triple, one byte per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Self = Self::new(0, 0, 0);
    /// Target slot
    pub const BLUE: Self = Self::new(0, 0, 255);
    /// Job done at the target slot
    pub const GREEN: Self = Self::new(0, 255, 0);
    /// Wrong slot
    pub const RED: Self = Self::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_off(&self) -> bool {
        *self == Self::OFF
    }
}

/// LED errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedError {
    #[error("Invalid LED positions: {}", format_positions(.0))]
    InvalidPositions(Vec<Position>),

    #[error("Invalid level {0}")]
    InvalidLevel(u32),

    #[error("Delay {0} ms out of range (0..=1000)")]
    InvalidDelay(u64),

    #[error("LED index {index} out of bounds for strip of {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("LED driver error: {0}")]
    Driver(String),
}

fn format_positions(positions: &[Position]) -> String {
    positions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<LedError> for ShelfError {
    fn from(err: LedError) -> Self {
        match err {
            LedError::InvalidPositions(positions) => ShelfError::InvalidPositions(positions),
            LedError::InvalidLevel(_) | LedError::InvalidDelay(_) => {
                ShelfError::InvalidRequest(err.to_string())
            }
            LedError::IndexOutOfBounds { .. } | LedError::Driver(_) => {
                ShelfError::HardwareFault(err.to_string())
            }
        }
    }
}

/// Physical strip boundary (SPI NeoPixel driver on the shelf controller)
pub trait LedDriver: Send {
    /// Push the whole frame to the strip
    fn write(&mut self, pixels: &[Rgb]) -> Result<(), LedError>;

    fn name(&self) -> &str;
}

/// Driver used when no strip is attached; frames are only logged
#[derive(Debug, Default)]
pub struct NullDriver;

impl LedDriver for NullDriver {
    fn write(&mut self, pixels: &[Rgb]) -> Result<(), LedError> {
        let lit = pixels.iter().filter(|p| !p.is_off()).count();
        log::debug!("[Led] (null) frame of {} pixels, {} lit", pixels.len(), lit);
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Driver that records every frame, shared with the caller through a handle
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    frames: Arc<Mutex<Vec<Vec<Rgb>>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All frames written so far
    pub fn frames(&self) -> Vec<Vec<Rgb>> {
        self.frames.lock().clone()
    }

    /// Most recent frame
    pub fn last_frame(&self) -> Option<Vec<Rgb>> {
        self.frames.lock().last().cloned()
    }

    /// Make subsequent writes fail (simulated hardware fault)
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

impl LedDriver for RecordingDriver {
    fn write(&mut self, pixels: &[Rgb]) -> Result<(), LedError> {
        if *self.fail.lock() {
            return Err(LedError::Driver("simulated SPI failure".into()));
        }
        self.frames.lock().push(pixels.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
