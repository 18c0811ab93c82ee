//! Shelf Engine
//!
//! Single owner of the shelf state. Layout, inventory, job queue and the
//! observer registry live together behind one mutex that is held for the
//! whole of each compound operation, so check-then-mutate is atomic and
//! observers see events in the same order the state changed.
//!
//! LED indication happens after the state lock is released; a failed LED
//! write is logged and never rolls back the committed mutation.
//!
//! ```text
//!   WebSocket commands ─┐
//!   Gateway sync ───────┼──▶ ShelfEngine ──lock──▶ ShelfState ──▶ Broadcaster
//!   button channel ─────┘          │
//!                                  └──(unlocked)──▶ LedController
//! ```

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use shelf_core::{
    CellSnapshot, ErrorLocation, Inventory, Job, JobRequest, Layout, LayoutInfo, LotStack,
    OccupiedLot, Position, RestoreReport, ShelfError, ShelfResult, ShelfSummary,
};
use shelf_led::{LedBatch, LedController, LedError, Rgb};

use crate::broadcast::{Broadcaster, Observer, ObserverId};
use crate::buttons::ButtonPress;
use crate::events::{CompletionReported, JobCompleted, LayoutUpdated, ShelfEvent, ShelfSnapshot, StateChanged};
use crate::jobs::{CancelOutcome, Completion, JobQueue, RecoveryReport};

/// Everything guarded by the engine lock
struct ShelfState {
    inventory: Inventory,
    jobs: JobQueue,
    broadcaster: Broadcaster,
    shelf_id: Option<String>,
}

impl ShelfState {
    fn snapshot(&self) -> ShelfSnapshot {
        ShelfSnapshot {
            shelf_id: self.shelf_id.clone(),
            layout: self.inventory.layout().info(),
            shelf_state: self.inventory.snapshot(),
            jobs: self.jobs.list().to_vec(),
            summary: self.inventory.summary(),
        }
    }

    fn state_changed(&self, rejected: Vec<String>) -> StateChanged {
        StateChanged {
            shelf_state: self.inventory.snapshot(),
            summary: self.inventory.summary(),
            rejected,
        }
    }
}

/// Result of a layout replacement
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutChange {
    pub layout: LayoutInfo,
    pub dropped: Vec<(Position, LotStack)>,
}

/// What a button press did
#[derive(Debug, Clone, PartialEq)]
pub enum ButtonOutcome {
    /// The press matched an outstanding job, which completed
    Completed(Completion),
    /// The press was at a slot no job targets; the oldest job is flagged
    WrongSlot(Job),
    /// The matching job could not be completed
    Rejected(ShelfError),
    /// No jobs outstanding
    Ignored,
}

/// Shelf Engine
pub struct ShelfEngine {
    state: Mutex<ShelfState>,
    leds: LedController,
}

impl ShelfEngine {
    /// Create an engine over `layout` with an empty inventory
    pub fn new(layout: Layout, leds: LedController) -> Self {
        Self {
            state: Mutex::new(ShelfState {
                inventory: Inventory::new(layout),
                jobs: JobQueue::new(),
                broadcaster: Broadcaster::new(),
                shelf_id: None,
            }),
            leds,
        }
    }

    pub fn leds(&self) -> &LedController {
        &self.leds
    }

    /// Log LED failures; the inventory is the thing of record
    fn led_result<T>(&self, action: &str, result: Result<T, LedError>) {
        if let Err(e) = result {
            log::error!("[Engine] LED {} failed: {}", action, e);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // IDENTITY
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn shelf_id(&self) -> Option<String> {
        self.state.lock().shelf_id.clone()
    }

    /// Store the process-wide shelf identity used for jobs that omit one
    pub fn set_shelf_id(&self, shelf_id: impl Into<String>) {
        let shelf_id = shelf_id.into();
        log::info!("[Engine] Shelf identity: {}", shelf_id);
        self.state.lock().shelf_id = Some(shelf_id);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // JOBS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Admit a job and mark its slot
    pub fn create_job(&self, request: JobRequest) -> ShelfResult<Job> {
        let job = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let job = state
                .jobs
                .create_job(request, &state.inventory, state.shelf_id.as_deref())?;
            state.broadcaster.broadcast(&ShelfEvent::NewJob(job.clone()));
            job
        };
        self.led_result("target", self.leds.indicate_target(job.position()));
        Ok(job)
    }

    /// Complete a job, mutating the inventory
    pub fn complete_job(&self, job_id: &str) -> ShelfResult<Completion> {
        let completion = {
            let mut state = self.state.lock();
            Self::complete_locked(&mut state, job_id)?
        };
        self.led_result("success", self.leds.indicate_success(completion.job.position()));
        Ok(completion)
    }

    fn complete_locked(state: &mut ShelfState, job_id: &str) -> ShelfResult<Completion> {
        let completion = state.jobs.complete_job(job_id, &mut state.inventory)?;
        let job = &completion.job;
        state
            .broadcaster
            .broadcast(&ShelfEvent::JobCompleted(JobCompleted {
                completed_job_id: job.job_id.clone(),
                lot_no: job.lot_no.clone(),
                biz: job.biz.clone(),
                shelf_id: job.shelf_id.clone(),
                level: job.level,
                block: job.block,
                action: completion.action,
                shelf_state: state.inventory.snapshot(),
            }));
        Ok(completion)
    }

    /// Follow a completed job with the outcome of its Gateway report
    pub fn notify_completion_reported(&self, job: &Job, gateway_success: bool) {
        let mut state = self.state.lock();
        state
            .broadcaster
            .broadcast(&ShelfEvent::CompletionReported(CompletionReported {
                completed_job_id: job.job_id.clone(),
                lot_no: job.lot_no.clone(),
                gateway_success,
            }));
    }

    /// Flag a job as faulted at a location
    pub fn error_job(&self, job_id: &str, location: ErrorLocation) -> ShelfResult<Job> {
        let job = {
            let mut state = self.state.lock();
            let job = state.jobs.error_job(job_id, location)?;
            state.broadcaster.broadcast(&ShelfEvent::JobError(job.clone()));
            job
        };
        if let Some(location) = &job.error_location {
            self.led_result("error", self.leds.indicate_error(location.position()));
        }
        Ok(job)
    }

    /// Withdraw all outstanding jobs for a lot; never an error
    pub fn cancel_job(&self, lot_no: &str) -> CancelOutcome {
        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.jobs.cancel_job(lot_no);
            if let CancelOutcome::Canceled(jobs) = &outcome {
                for job in jobs {
                    state.broadcaster.broadcast(&ShelfEvent::JobCanceled(job.clone()));
                }
            }
            outcome
        };
        if let CancelOutcome::Canceled(jobs) = &outcome {
            let positions: Vec<Position> = jobs
                .iter()
                .map(Job::position)
                .filter(|pos| self.leds.index_of(*pos).is_some())
                .collect();
            self.led_result("turn off", self.leds.turn_off(&positions));
        }
        outcome
    }

    /// Admit jobs recovered from the Gateway
    pub fn recover_jobs(&self, requests: Vec<JobRequest>) -> RecoveryReport {
        let mut state = self.state.lock();
        let state = &mut *state;
        let report = state
            .jobs
            .recover_jobs(requests, &state.inventory, state.shelf_id.as_deref());
        for job in &report.loaded {
            state.broadcaster.broadcast(&ShelfEvent::NewJob(job.clone()));
        }
        report
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().jobs.list().to_vec()
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.state.lock().jobs.get(job_id).cloned()
    }

    /// Drop all jobs and inventory, restart job numbering
    pub fn system_reset(&self) {
        {
            let mut state = self.state.lock();
            state.jobs.clear();
            state.inventory.reset_all();
            state.broadcaster.broadcast(&ShelfEvent::SystemReset);
        }
        log::info!("[Engine] System reset");
        self.led_result("clear", self.leds.clear_all());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BUTTONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply a debounced button press.
    ///
    /// A press at the slot of an outstanding job completes that job. A press
    /// anywhere else while jobs are outstanding flags the oldest job with
    /// the wrong slot.
    pub fn handle_button_press(&self, press: ButtonPress) -> ButtonOutcome {
        let pos = press.position;
        let outcome = {
            let mut state = self.state.lock();
            if let Some(job_id) = state.jobs.find_at(pos).map(|job| job.job_id.clone()) {
                match Self::complete_locked(&mut state, &job_id) {
                    Ok(completion) => ButtonOutcome::Completed(completion),
                    Err(e) => ButtonOutcome::Rejected(e),
                }
            } else if let Some(job_id) = state.jobs.oldest().map(|job| job.job_id.clone()) {
                let location = ErrorLocation {
                    level: pos.level,
                    block: pos.block,
                    message: format!("Wrong slot pressed (button P{})", press.button),
                };
                match state.jobs.error_job(&job_id, location) {
                    Ok(job) => {
                        state.broadcaster.broadcast(&ShelfEvent::JobError(job.clone()));
                        ButtonOutcome::WrongSlot(job)
                    }
                    Err(e) => ButtonOutcome::Rejected(e),
                }
            } else {
                ButtonOutcome::Ignored
            }
        };

        match &outcome {
            ButtonOutcome::Completed(_) => {
                self.led_result("success", self.leds.indicate_success(pos));
            }
            ButtonOutcome::WrongSlot(_) => {
                self.led_result("error", self.leds.indicate_error(pos));
            }
            ButtonOutcome::Rejected(e) => {
                log::warn!("[Engine] Button at {} rejected: {}", pos, e);
            }
            ButtonOutcome::Ignored => {
                log::debug!("[Engine] Button at {} with no outstanding jobs", pos);
            }
        }
        outcome
    }

    /// Consume presses until every sender is gone
    pub fn run_button_loop<F>(&self, presses: Receiver<ButtonPress>, mut on_outcome: F)
    where
        F: FnMut(ButtonOutcome),
    {
        for press in presses {
            on_outcome(self.handle_button_press(press));
        }
        log::info!("[Engine] Button channel closed");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LAYOUT & STATE SYNC
    // ═══════════════════════════════════════════════════════════════════════════

    /// Replace the layout wholesale, re-address the strip and notify observers
    pub fn replace_layout(&self, layout: Layout) -> LayoutChange {
        let (change, new_layout) = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let dropped = state.inventory.replace_layout(layout);
            let new_layout = state.inventory.layout().clone();
            let info = new_layout.info();
            for job in state.jobs.list() {
                if !state.inventory.validate_position(job.position()) {
                    log::warn!(
                        "[Engine] Job {} targets {} which left the layout",
                        job.job_id,
                        job.position()
                    );
                }
            }
            state
                .broadcaster
                .broadcast(&ShelfEvent::LayoutUpdated(LayoutUpdated {
                    layout: info.clone(),
                    shelf_state: state.inventory.snapshot(),
                    dropped: dropped
                        .iter()
                        .map(|(pos, lot)| format!("{} at {}", lot.lot_no, pos))
                        .collect(),
                }));
            (
                LayoutChange {
                    layout: info,
                    dropped,
                },
                new_layout,
            )
        };
        log::info!(
            "[Engine] Layout v{} applied: {} slots, {} lots dropped",
            change.layout.version,
            change.layout.total_positions,
            change.dropped.len()
        );
        self.led_result("re-address", self.leds.apply_layout(&new_layout));
        change
    }

    /// Replace all inventory with a snapshot from the system of record
    pub fn restore_state(&self, cells: &[CellSnapshot]) -> RestoreReport {
        let mut state = self.state.lock();
        let report = state.inventory.restore(cells);
        for rejected in &report.rejected {
            log::warn!("[Engine] Restore rejected {}", rejected);
        }
        let payload = state.state_changed(report.rejected.clone());
        state
            .broadcaster
            .broadcast(&ShelfEvent::ShelfStateRestored(payload));
        log::info!("[Engine] Restored {} lots", report.restored_lots);
        report
    }

    /// Tell observers the state was synchronized with the system of record
    pub fn notify_state_synced(&self) {
        let mut state = self.state.lock();
        let payload = state.state_changed(Vec::new());
        state
            .broadcaster
            .broadcast(&ShelfEvent::ShelfStateUpdated(payload));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OBSERVERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register an observer; it receives the full state before any event
    pub fn register_observer(&self, observer: Box<dyn Observer>) -> Option<ObserverId> {
        let mut state = self.state.lock();
        let initial = ShelfEvent::InitialState(state.snapshot());
        state.broadcaster.register(observer, &initial)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.state.lock().broadcaster.unregister(id)
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().broadcaster.len()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn snapshot(&self) -> ShelfSnapshot {
        self.state.lock().snapshot()
    }

    pub fn get_lots(&self, pos: Position) -> ShelfResult<Vec<LotStack>> {
        self.state.lock().inventory.get_lots(pos).map(<[_]>::to_vec)
    }

    pub fn cell_snapshot(&self) -> Vec<CellSnapshot> {
        self.state.lock().inventory.snapshot()
    }

    pub fn layout(&self) -> Layout {
        self.state.lock().inventory.layout().clone()
    }

    pub fn validate_position(&self, pos: Position) -> bool {
        self.state.lock().inventory.validate_position(pos)
    }

    pub fn find_lot(&self, lot_no: &str) -> Option<Position> {
        self.state.lock().inventory.find_lot(lot_no)
    }

    pub fn occupied(&self) -> Vec<OccupiedLot> {
        self.state.lock().inventory.occupied()
    }

    pub fn summary(&self) -> ShelfSummary {
        self.state.lock().inventory.summary()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LED COMMANDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply an LED batch command from a client
    pub fn led_batch(&self, batch: &LedBatch) -> ShelfResult<usize> {
        self.leds.clear_and_batch(batch).map_err(ShelfError::from)
    }

    /// Light every active slot of a level
    pub fn light_level(&self, level: u32, color: Rgb) -> ShelfResult<usize> {
        self.leds.light_level(level, color).map_err(ShelfError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelObserver;
    use shelf_core::{JobAction, JobStatus, PlaceFlag};
    use shelf_led::{RecordingDriver, Rgb, WIRING_ORDER};

    fn pos(level: u32, block: u32) -> Position {
        Position::new(level, block)
    }

    fn engine() -> (ShelfEngine, RecordingDriver) {
        let driver = RecordingDriver::new();
        let layout = Layout::fallback();
        let leds = LedController::new(&layout, WIRING_ORDER, Box::new(driver.clone()));
        (ShelfEngine::new(layout, leds), driver)
    }

    fn place(lot: &str, at: Position, trays: u32) -> JobRequest {
        JobRequest::new(lot, at, PlaceFlag::Place, trays, "IS")
    }

    fn press(button: u8, at: Position) -> ButtonPress {
        ButtonPress {
            button,
            position: at,
        }
    }

    #[test]
    fn test_create_marks_target() {
        let (engine, _) = engine();
        engine.create_job(place("A1", pos(1, 1), 10)).unwrap();
        assert_eq!(engine.leds().color_at(pos(1, 1)), Some(Rgb::BLUE));
    }

    #[test]
    fn test_complete_marks_success() {
        let (engine, _) = engine();
        let job = engine.create_job(place("A1", pos(1, 1), 10)).unwrap();
        let done = engine.complete_job(&job.job_id).unwrap();
        assert_eq!(done.action, JobAction::Placed);
        assert_eq!(engine.leds().color_at(pos(1, 1)), Some(Rgb::GREEN));
        assert_eq!(engine.get_lots(pos(1, 1)).unwrap()[0].tray_count, 10);
    }

    #[test]
    fn test_led_fault_does_not_roll_back() {
        let (engine, driver) = engine();
        let job = engine.create_job(place("A1", pos(1, 1), 10)).unwrap();
        driver.set_failing(true);
        engine.complete_job(&job.job_id).unwrap();
        assert_eq!(engine.get_lots(pos(1, 1)).unwrap().len(), 1);
        assert!(engine.jobs().is_empty());
    }

    #[test]
    fn test_shelf_id_applies_to_new_jobs() {
        let (engine, _) = engine();
        engine.set_shelf_id("PC2");
        let job = engine.create_job(place("A1", pos(1, 1), 1)).unwrap();
        assert_eq!(job.shelf_id, "PC2");
    }

    #[test]
    fn test_button_at_target_completes() {
        let (engine, _) = engine();
        engine.create_job(place("A1", pos(1, 2), 4)).unwrap();
        match engine.handle_button_press(press(1, pos(1, 2))) {
            ButtonOutcome::Completed(done) => assert_eq!(done.job.lot_no, "A1"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(engine.get_lots(pos(1, 2)).unwrap()[0].tray_count, 4);
        assert_eq!(engine.leds().color_at(pos(1, 2)), Some(Rgb::GREEN));
    }

    #[test]
    fn test_button_elsewhere_flags_wrong_slot() {
        let (engine, _) = engine();
        engine.create_job(place("A1", pos(1, 2), 4)).unwrap();
        match engine.handle_button_press(press(0, pos(1, 1))) {
            ButtonOutcome::WrongSlot(job) => {
                assert_eq!(job.status, JobStatus::Errored);
                assert_eq!(job.error_location.unwrap().position(), pos(1, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
        // target stays lit, wrong slot added in red
        assert_eq!(engine.leds().color_at(pos(1, 2)), Some(Rgb::BLUE));
        assert_eq!(engine.leds().color_at(pos(1, 1)), Some(Rgb::RED));
        assert!(engine.get_lots(pos(1, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_button_without_jobs_ignored() {
        let (engine, _) = engine();
        assert_eq!(
            engine.handle_button_press(press(0, pos(1, 1))),
            ButtonOutcome::Ignored
        );
    }

    #[test]
    fn test_button_loop_drains_channel() {
        let (engine, _) = engine();
        engine.create_job(place("A1", pos(1, 1), 2)).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(press(0, pos(1, 1))).unwrap();
        drop(tx);
        let mut outcomes = Vec::new();
        engine.run_button_loop(rx, |outcome| outcomes.push(outcome));
        assert!(matches!(outcomes.as_slice(), [ButtonOutcome::Completed(_)]));
        assert!(engine.jobs().is_empty());
        assert_eq!(engine.find_lot("A1"), Some(pos(1, 1)));
    }

    #[test]
    fn test_cancel_turns_off_slot() {
        let (engine, _) = engine();
        engine.create_job(place("A1", pos(2, 2), 1)).unwrap();
        assert!(matches!(engine.cancel_job("A1"), CancelOutcome::Canceled(_)));
        assert_eq!(engine.leds().color_at(pos(2, 2)), Some(Rgb::OFF));
        assert_eq!(engine.cancel_job("A1"), CancelOutcome::NotFound);
    }

    #[test]
    fn test_system_reset() {
        let (engine, _) = engine();
        let job = engine.create_job(place("A1", pos(1, 1), 1)).unwrap();
        engine.complete_job(&job.job_id).unwrap();
        engine.create_job(place("B1", pos(1, 2), 1)).unwrap();

        engine.system_reset();
        assert!(engine.jobs().is_empty());
        assert!(engine.occupied().is_empty());
        assert_eq!(engine.leds().state().active_count, 0);
        let job = engine.create_job(place("C1", pos(1, 3), 1)).unwrap();
        assert_eq!(job.job_id, "job_1");
    }

    #[test]
    fn test_replace_layout_resizes_leds() {
        let (engine, _) = engine();
        let job = engine.create_job(place("A1", pos(1, 1), 5)).unwrap();
        engine.complete_job(&job.job_id).unwrap();

        let change = engine.replace_layout(Layout::uniform(&[(1, 3), (2, 3)], 24));
        assert_eq!(change.layout.total_positions, 6);
        assert!(change.dropped.is_empty());
        assert_eq!(engine.leds().len(), 6);
        assert_eq!(engine.leds().state().active_count, 0);
        assert_eq!(engine.get_lots(pos(1, 1)).unwrap()[0].lot_no, "A1");
        assert!(!engine.validate_position(pos(4, 1)));
    }

    #[test]
    fn test_observer_receives_initial_state_first() {
        let (engine, _) = engine();
        engine.create_job(place("A1", pos(1, 1), 1)).unwrap();

        let (observer, mut rx) = ChannelObserver::channel();
        engine.register_observer(Box::new(observer)).unwrap();
        engine.create_job(place("B1", pos(1, 2), 1)).unwrap();

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "initial_state");
        assert_eq!(first["payload"]["jobs"][0]["lot_no"], "A1");
        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["type"], "new_job");
        assert_eq!(second["payload"]["lot_no"], "B1");
    }

    #[test]
    fn test_restore_broadcasts() {
        let (engine, _) = engine();
        let (observer, mut rx) = ChannelObserver::channel();
        engine.register_observer(Box::new(observer)).unwrap();
        let _ = rx.try_recv();

        let report = engine.restore_state(&[CellSnapshot {
            level: 2,
            block: 2,
            lots: vec![LotStack::new("R1", 3, "IS")],
        }]);
        assert_eq!(report.restored_lots, 1);
        assert_eq!(engine.find_lot("R1"), Some(pos(2, 2)));

        let event: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(event["type"], "shelf_state_restored");
    }
}
