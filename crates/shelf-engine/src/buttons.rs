//! Physical push-button hand-off
//!
//! A dedicated thread polls a [`ButtonSource`] on a fixed interval,
//! debounces each input and pushes [`ButtonPress`] events into a
//! crossbeam channel. The poller never touches shelf state; the engine
//! consumes the channel and performs all mutation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use shelf_core::Position;
use thiserror::Error;

/// Number of inputs on one 8-bit expander port
pub const BUTTON_INPUTS: u8 = 8;

/// Button errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ButtonError {
    #[error("Button bus read failed: {0}")]
    Bus(String),
}

/// A debounced press of a mapped button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub button: u8,
    pub position: Position,
}

/// Binding of an expander input to a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonBinding {
    pub pin: u8,
    pub position: Position,
}

/// Default wiring: P0..P2 on the first three blocks of level 1
pub fn default_bindings() -> Vec<ButtonBinding> {
    (0..3)
        .map(|pin| ButtonBinding {
            pin,
            position: Position::new(1, pin as u32 + 1),
        })
        .collect()
}

/// Input port the poller reads (I2C GPIO expander on the shelf controller)
pub trait ButtonSource: Send {
    /// Pressed inputs as a bitmask, bit `n` set while input `n` is held
    fn read_pressed(&mut self) -> Result<u8, ButtonError>;
}

/// In-process button source driven through a shared handle
#[derive(Debug, Clone, Default)]
pub struct SimulatedButtons {
    state: Arc<AtomicU8>,
}

impl SimulatedButtons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, pin: u8) {
        self.state.fetch_or(1 << pin, Ordering::SeqCst);
    }

    pub fn release(&self, pin: u8) {
        self.state.fetch_and(!(1 << pin), Ordering::SeqCst);
    }
}

impl ButtonSource for SimulatedButtons {
    fn read_pressed(&mut self) -> Result<u8, ButtonError> {
        Ok(self.state.load(Ordering::SeqCst))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBOUNCE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct InputState {
    stable: bool,
    raw: bool,
    changed_at: Instant,
}

/// Per-input debouncer: a level must hold for `window` before it counts
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    inputs: [InputState; BUTTON_INPUTS as usize],
}

impl Debouncer {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            inputs: [InputState {
                stable: false,
                raw: false,
                changed_at: now,
            }; BUTTON_INPUTS as usize],
        }
    }

    /// Feed one sample; returns the inputs that became pressed
    pub fn update(&mut self, pressed: u8, now: Instant) -> Vec<u8> {
        let mut edges = Vec::new();
        for (pin, input) in self.inputs.iter_mut().enumerate() {
            let raw = pressed & (1 << pin) != 0;
            if raw != input.raw {
                input.raw = raw;
                input.changed_at = now;
                continue;
            }
            if raw != input.stable && now.duration_since(input.changed_at) >= self.window {
                input.stable = raw;
                if raw {
                    edges.push(pin as u8);
                }
            }
        }
        edges
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POLLER THREAD
// ═══════════════════════════════════════════════════════════════════════════════

/// Poll timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub interval: Duration,
    pub debounce: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(20),
            debounce: Duration::from_millis(50),
        }
    }
}

/// Handle to the polling thread; stops it on drop
pub struct ButtonPoller {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ButtonPoller {
    /// Start polling `source`, sending mapped presses to `tx`
    pub fn spawn(
        mut source: Box<dyn ButtonSource>,
        bindings: Vec<ButtonBinding>,
        timing: PollTiming,
        tx: Sender<ButtonPress>,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("shelf-buttons".into())
            .spawn(move || {
                log::info!(
                    "[Buttons] Polling {} inputs every {:?} (debounce {:?})",
                    bindings.len(),
                    timing.interval,
                    timing.debounce
                );
                let mut debouncer = Debouncer::new(timing.debounce, Instant::now());
                let mut failing = false;

                while flag.load(Ordering::Relaxed) {
                    match source.read_pressed() {
                        Ok(pressed) => {
                            failing = false;
                            for pin in debouncer.update(pressed, Instant::now()) {
                                let Some(binding) = bindings.iter().find(|b| b.pin == pin) else {
                                    log::debug!("[Buttons] Unmapped input P{} pressed", pin);
                                    continue;
                                };
                                let press = ButtonPress {
                                    button: pin,
                                    position: binding.position,
                                };
                                log::info!("[Buttons] P{} pressed at {}", pin, press.position);
                                if tx.send(press).is_err() {
                                    log::info!("[Buttons] Consumer gone, stopping");
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            if !failing {
                                log::error!("[Buttons] {}", e);
                            }
                            failing = true;
                        }
                    }
                    std::thread::sleep(timing.interval);
                }
                log::info!("[Buttons] Stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("[Buttons] Poller thread panicked");
        }
    }
}

impl Drop for ButtonPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_debounce_requires_stable_level() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(50), start);

        assert!(debouncer.update(0b001, start).is_empty());
        assert!(debouncer.update(0b001, start + ms(20)).is_empty());
        assert_eq!(debouncer.update(0b001, start + ms(60)), vec![0]);
        // held: no repeat
        assert!(debouncer.update(0b001, start + ms(200)).is_empty());
    }

    #[test]
    fn test_debounce_ignores_bounce() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(50), start);

        for (i, sample) in [0b010, 0b000, 0b010, 0b000].into_iter().enumerate() {
            assert!(debouncer.update(sample, start + ms(10 * i as u64)).is_empty());
        }
        assert!(debouncer.update(0b000, start + ms(200)).is_empty());
    }

    #[test]
    fn test_release_then_press_again() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(50), start);
        debouncer.update(0b100, start);
        assert_eq!(debouncer.update(0b100, start + ms(50)), vec![2]);
        debouncer.update(0b000, start + ms(100));
        assert!(debouncer.update(0b000, start + ms(150)).is_empty());
        debouncer.update(0b100, start + ms(200));
        assert_eq!(debouncer.update(0b100, start + ms(260)), vec![2]);
    }

    #[test]
    fn test_default_bindings() {
        let bindings = default_bindings();
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[2].position, Position::new(1, 3));
    }

    #[test]
    fn test_poller_sends_mapped_press() {
        let buttons = SimulatedButtons::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut poller = ButtonPoller::spawn(
            Box::new(buttons.clone()),
            default_bindings(),
            PollTiming {
                interval: ms(2),
                debounce: ms(6),
            },
            tx,
        )
        .unwrap();

        buttons.press(1);
        let press = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(press.button, 1);
        assert_eq!(press.position, Position::new(1, 2));
        poller.stop();
    }
}
