//! Smart Shelf Engine
//!
//! Owns the shelf state and serializes every mutation:
//! - [`jobs`]: job admission, completion, error and cancellation
//! - [`broadcast`]: best-effort fan-out of [`ShelfEvent`]s to observers
//! - [`buttons`]: debounced push-button polling on its own thread
//! - [`config`]: TOML configuration for the daemon
//!
//! [`ShelfEngine`] ties them to the inventory and the LED strip.

pub mod broadcast;
pub mod buttons;
pub mod config;
pub mod engine;
pub mod events;
pub mod jobs;

pub use broadcast::{Broadcaster, ChannelObserver, Observer, ObserverGone, ObserverId};
pub use buttons::{
    BUTTON_INPUTS, ButtonBinding, ButtonError, ButtonPoller, ButtonPress, ButtonSource, Debouncer,
    PollTiming, SimulatedButtons, default_bindings,
};
pub use config::{ButtonSettings, ConfigError, GatewaySettings, ServerSettings, ShelfConfig, ShelfSection};
pub use engine::{ButtonOutcome, LayoutChange, ShelfEngine};
pub use events::{CompletionReported, JobCompleted, LayoutUpdated, ShelfEvent, ShelfSnapshot, StateChanged};
pub use jobs::{CancelOutcome, Completion, JobQueue, RecoveryReport};
