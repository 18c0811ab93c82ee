//! Smart Shelf LED strip
//!
//! One addressable pixel per active slot. The wiring convention lives in
//! [`addressing`]; [`LedController`] is the only writer of the strip.

pub mod addressing;
pub mod controller;
pub mod driver;

pub use addressing::{LedAddressing, WIRING_ORDER, WiringOrder};
pub use controller::{
    ActiveLed, LedBatch, LedCommand, LedController, LedState, MAX_BATCH_DELAY_MS,
};
pub use driver::{LedDriver, LedError, NullDriver, RecordingDriver, Rgb};
