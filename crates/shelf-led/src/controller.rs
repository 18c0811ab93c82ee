//! LED Controller
//!
//! Owns the addressing, the soft pixel buffer and the driver behind one
//! lock, so a layout change (re-addressing + resize + clear) can never
//! interleave with a write that still uses the old indices.
//!
//! Every batch operation validates all of its positions before the buffer
//! is touched. A rejected batch leaves the strip exactly as it was.
//!
//! Layout versions only move forward: a layout at or below the applied
//! version is ignored, so replacements racing to the strip settle on the
//! newest one.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shelf_core::{Layout, Position};

use crate::addressing::{LedAddressing, WiringOrder};
use crate::driver::{LedDriver, LedError, Rgb};

/// Upper bound for the pause between clearing and applying a batch
pub const MAX_BATCH_DELAY_MS: u64 = 1000;

/// One entry of an LED batch command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedCommand {
    pub position: Position,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl LedCommand {
    pub fn new(position: Position, color: Rgb) -> Self {
        Self {
            position,
            r: color.r,
            g: color.g,
            b: color.b,
        }
    }

    pub fn color(&self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }
}

/// Batch command: optional clear, optional pause, then all colours at once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedBatch {
    pub positions: Vec<LedCommand>,
    #[serde(default)]
    pub clear_first: bool,
    #[serde(default)]
    pub delay_ms: u64,
}

/// A lit pixel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLed {
    pub index: usize,
    pub level: u32,
    pub block: u32,
    pub color: Rgb,
}

/// Snapshot of the strip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedState {
    pub total_pixels: usize,
    pub active_count: usize,
    pub active_leds: Vec<ActiveLed>,
}

struct LedInner {
    addressing: LedAddressing,
    layout_version: u64,
    buffer: Vec<Rgb>,
    driver: Box<dyn LedDriver>,
}

impl LedInner {
    fn flush(&mut self) -> Result<(), LedError> {
        self.driver.write(&self.buffer)
    }

    /// Resolve every position or fail listing all the unknown ones
    fn resolve(&self, positions: impl Iterator<Item = Position>) -> Result<Vec<usize>, LedError> {
        let mut indices = Vec::new();
        let mut invalid = Vec::new();
        for pos in positions {
            match self.addressing.index(pos) {
                Some(i) => indices.push(i),
                None => invalid.push(pos),
            }
        }
        if !invalid.is_empty() {
            return Err(LedError::InvalidPositions(invalid));
        }
        // Addressing and buffer are rebuilt together, a mismatch is a bug
        if let Some(&index) = indices.iter().find(|&&i| i >= self.buffer.len()) {
            return Err(LedError::IndexOutOfBounds {
                index,
                len: self.buffer.len(),
            });
        }
        Ok(indices)
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|px| *px = Rgb::OFF);
    }
}

/// LED Controller
pub struct LedController {
    inner: Mutex<LedInner>,
}

impl LedController {
    /// Create a controller for a layout; the strip is cleared immediately
    pub fn new(layout: &Layout, order: WiringOrder, driver: Box<dyn LedDriver>) -> Self {
        let addressing = LedAddressing::from_layout(layout, order);
        let mut inner = LedInner {
            buffer: vec![Rgb::OFF; addressing.len()],
            addressing,
            layout_version: layout.version(),
            driver,
        };
        log::info!(
            "[Led] {} pixels, wiring {:?}, driver '{}'",
            inner.buffer.len(),
            order,
            inner.driver.name()
        );
        if let Err(e) = inner.flush() {
            log::error!("[Led] Initial clear failed: {}", e);
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Re-address for a new layout, resize the buffer and clear the strip.
    ///
    /// Returns `false` when `layout` is not newer than the applied one.
    pub fn apply_layout(&self, layout: &Layout) -> Result<bool, LedError> {
        let mut inner = self.inner.lock();
        if layout.version() <= inner.layout_version {
            log::debug!(
                "[Led] Ignoring layout v{}, v{} already applied",
                layout.version(),
                inner.layout_version
            );
            return Ok(false);
        }
        let order = inner.addressing.order();
        inner.addressing = LedAddressing::from_layout(layout, order);
        inner.buffer = vec![Rgb::OFF; inner.addressing.len()];
        inner.layout_version = layout.version();
        log::info!(
            "[Led] Re-addressed for layout v{}: {} pixels",
            layout.version(),
            inner.buffer.len()
        );
        inner.flush()?;
        Ok(true)
    }

    /// Version of the layout the strip is addressed for
    pub fn layout_version(&self) -> u64 {
        self.inner.lock().layout_version
    }

    /// Number of pixels in the current buffer
    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_of(&self, pos: Position) -> Option<usize> {
        self.inner.lock().addressing.index(pos)
    }

    pub fn color_at(&self, pos: Position) -> Option<Rgb> {
        let inner = self.inner.lock();
        let index = inner.addressing.index(pos)?;
        inner.buffer.get(index).copied()
    }

    /// Set one slot; returns its strip index
    pub fn set_position(&self, pos: Position, color: Rgb) -> Result<usize, LedError> {
        let mut inner = self.inner.lock();
        let index = inner.resolve(std::iter::once(pos))?[0];
        inner.buffer[index] = color;
        inner.flush()?;
        Ok(index)
    }

    /// Set many slots at once, all or nothing
    pub fn set_many(&self, updates: &[(Position, Rgb)]) -> Result<usize, LedError> {
        let mut inner = self.inner.lock();
        let indices = inner.resolve(updates.iter().map(|(pos, _)| *pos))?;
        for (index, (_, color)) in indices.into_iter().zip(updates) {
            inner.buffer[index] = *color;
        }
        inner.flush()?;
        Ok(updates.len())
    }

    /// Turn every pixel off
    pub fn clear_all(&self) -> Result<(), LedError> {
        let mut inner = self.inner.lock();
        inner.clear();
        inner.flush()
    }

    /// Turn off some slots, all or nothing
    pub fn turn_off(&self, positions: &[Position]) -> Result<usize, LedError> {
        let updates: Vec<_> = positions.iter().map(|pos| (*pos, Rgb::OFF)).collect();
        self.set_many(&updates)
    }

    /// Apply a batch command.
    ///
    /// Delay and positions are validated first. With `clear_first` the
    /// cleared frame is pushed, then the optional pause, then the batch.
    pub fn clear_and_batch(&self, batch: &LedBatch) -> Result<usize, LedError> {
        if batch.delay_ms > MAX_BATCH_DELAY_MS {
            return Err(LedError::InvalidDelay(batch.delay_ms));
        }
        let mut inner = self.inner.lock();
        let indices = inner.resolve(batch.positions.iter().map(|cmd| cmd.position))?;

        if batch.clear_first {
            inner.clear();
            inner.flush()?;
        }
        if batch.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(batch.delay_ms));
        }
        for (index, cmd) in indices.into_iter().zip(&batch.positions) {
            inner.buffer[index] = cmd.color();
        }
        inner.flush()?;
        Ok(batch.positions.len())
    }

    /// Light every active slot of a level
    pub fn light_level(&self, level: u32, color: Rgb) -> Result<usize, LedError> {
        let mut inner = self.inner.lock();
        let indices: Vec<usize> = inner
            .addressing
            .positions()
            .iter()
            .enumerate()
            .filter(|(_, pos)| pos.level == level)
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            return Err(LedError::InvalidLevel(level));
        }
        for &index in &indices {
            inner.buffer[index] = color;
        }
        inner.flush()?;
        Ok(indices.len())
    }

    /// Clear the strip and mark the target slot blue
    pub fn indicate_target(&self, pos: Position) -> Result<usize, LedError> {
        let mut inner = self.inner.lock();
        let index = inner.resolve(std::iter::once(pos))?[0];
        inner.clear();
        inner.buffer[index] = Rgb::BLUE;
        inner.flush()?;
        Ok(index)
    }

    /// Mark the target slot green
    pub fn indicate_success(&self, pos: Position) -> Result<usize, LedError> {
        self.set_position(pos, Rgb::GREEN)
    }

    /// Add a red mark without clearing what is lit
    pub fn indicate_error(&self, pos: Position) -> Result<usize, LedError> {
        self.set_position(pos, Rgb::RED)
    }

    /// Lit pixels with their slot
    pub fn state(&self) -> LedState {
        let inner = self.inner.lock();
        let active_leds: Vec<ActiveLed> = inner
            .buffer
            .iter()
            .enumerate()
            .filter(|(_, color)| !color.is_off())
            .filter_map(|(index, color)| {
                inner.addressing.position_of(index).map(|pos| ActiveLed {
                    index,
                    level: pos.level,
                    block: pos.block,
                    color: *color,
                })
            })
            .collect();
        LedState {
            total_pixels: inner.buffer.len(),
            active_count: active_leds.len(),
            active_leds,
        }
    }
}
