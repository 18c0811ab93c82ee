//! Job Lifecycle Manager
//!
//! ```text
//!            create_job / recover_jobs
//!                       │
//!                       ▼
//!   cancel_job ◀──── Queued ────▶ complete_job ──▶ (removed, inventory mutated)
//!        ▲              │
//!        │          error_job
//!        │              ▼
//!        └───────── Errored ────▶ complete_job
//! ```
//!
//! An errored job stays in the queue until it is completed or canceled and
//! still holds its lot number for duplicate detection.

use shelf_core::{
    ErrorLocation, Inventory, Job, JobAction, JobRequest, PlaceFlag, Position, ShelfError,
    ShelfResult, UNKNOWN_SHELF_ID,
};

/// Outcome of an external cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Every outstanding job for the lot, oldest first
    Canceled(Vec<Job>),
    NotFound,
}

/// A job that completed and left the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub job: Job,
    pub action: JobAction,
}

/// Outcome of loading pending jobs from the system of record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub loaded: Vec<Job>,
    pub skipped: Vec<String>,
}

/// Outstanding jobs in admission order
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Vec<Job>,
    counter: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("job_{}", self.counter)
    }

    fn resolve_shelf_id(request: &JobRequest, detected: Option<&str>) -> String {
        request
            .shelf_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .or(detected)
            .unwrap_or(UNKNOWN_SHELF_ID)
            .to_string()
    }

    /// Admit a new job.
    ///
    /// Rejects a lot that already has an outstanding job, an unknown slot,
    /// and a pick of a lot the slot does not hold.
    pub fn create_job(
        &mut self,
        request: JobRequest,
        inventory: &Inventory,
        detected_shelf_id: Option<&str>,
    ) -> ShelfResult<Job> {
        if self.jobs.iter().any(|job| job.lot_no == request.lot_no) {
            return Err(ShelfError::DuplicateLot {
                lot_no: request.lot_no,
            });
        }
        request.validate()?;

        let pos = request.position();
        if !inventory.validate_position(pos) {
            return Err(ShelfError::InvalidPosition(pos));
        }
        if request.place_flg == PlaceFlag::Pick && !inventory.contains_lot(pos, &request.lot_no) {
            return Err(ShelfError::NotFound(format!(
                "lot {} in {}",
                request.lot_no, pos
            )));
        }

        let shelf_id = Self::resolve_shelf_id(&request, detected_shelf_id);
        let job_id = self.next_id();
        let job = Job::from_request(job_id, request, shelf_id);
        log::info!(
            "[Jobs] Created {} - lot {} {:?} at {} (biz {}, shelf {})",
            job.job_id,
            job.lot_no,
            job.place_flg,
            pos,
            job.biz,
            job.shelf_id
        );
        self.jobs.push(job.clone());
        Ok(job)
    }

    /// Complete a job, applying it to the inventory.
    ///
    /// A failed inventory mutation (overflow on place, missing lot on pick)
    /// is returned and the job stays queued.
    pub fn complete_job(&mut self, job_id: &str, inventory: &mut Inventory) -> ShelfResult<Completion> {
        let index = self
            .index_of(job_id)
            .ok_or_else(|| ShelfError::NotFound(format!("job {job_id}")))?;

        let job = &self.jobs[index];
        let pos = job.position();
        let action = job.action();
        match job.place_flg {
            PlaceFlag::Place => inventory.add_lot(pos, &job.lot_no, job.tray_count, &job.biz)?,
            PlaceFlag::Pick => {
                inventory.remove_lot(pos, &job.lot_no)?;
            }
        }

        let job = self.jobs.remove(index);
        log::info!(
            "[Jobs] Completed {} - lot {} {:?} at {}",
            job.job_id,
            job.lot_no,
            action,
            pos
        );
        Ok(Completion { job, action })
    }

    /// Flag a job as faulted; inventory is untouched
    pub fn error_job(&mut self, job_id: &str, location: ErrorLocation) -> ShelfResult<Job> {
        let job = self
            .jobs
            .iter_mut()
            .find(|job| job.job_id == job_id)
            .ok_or_else(|| ShelfError::NotFound(format!("job {job_id}")))?;
        log::warn!(
            "[Jobs] Error on {} - lot {} at L{}B{}: {}",
            job.job_id,
            job.lot_no,
            location.level,
            location.block,
            location.message
        );
        job.mark_error(location);
        Ok(job.clone())
    }

    /// Withdraw every outstanding job for a lot, whatever its state
    pub fn cancel_job(&mut self, lot_no: &str) -> CancelOutcome {
        let (canceled, kept): (Vec<Job>, Vec<Job>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(|job| job.lot_no == lot_no);
        self.jobs = kept;

        if canceled.is_empty() {
            log::debug!("[Jobs] Cancel for lot {}: no outstanding job", lot_no);
            CancelOutcome::NotFound
        } else {
            for job in &canceled {
                log::info!("[Jobs] Canceled {} - lot {}", job.job_id, job.lot_no);
            }
            CancelOutcome::Canceled(canceled)
        }
    }

    /// Admit jobs recovered from the system of record.
    ///
    /// Duplicates are keyed on `(lot_no, level, block)`; the slot must be
    /// valid, but inventory presence is not required.
    pub fn recover_jobs(
        &mut self,
        requests: Vec<JobRequest>,
        inventory: &Inventory,
        detected_shelf_id: Option<&str>,
    ) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        for request in requests {
            let pos = request.position();
            let duplicate = self
                .jobs
                .iter()
                .any(|job| job.lot_no == request.lot_no && job.position() == pos);
            if duplicate {
                report
                    .skipped
                    .push(format!("{} at {}: already queued", request.lot_no, pos));
                continue;
            }
            if let Err(e) = request.validate() {
                report.skipped.push(format!("{} at {}: {}", request.lot_no, pos, e));
                continue;
            }
            if !inventory.validate_position(pos) {
                report.skipped.push(format!(
                    "{} at {}: {}",
                    request.lot_no,
                    pos,
                    ShelfError::InvalidPosition(pos)
                ));
                continue;
            }

            let shelf_id = Self::resolve_shelf_id(&request, detected_shelf_id);
            let job_id = self.next_id();
            let job = Job::from_request(job_id, request, shelf_id);
            self.jobs.push(job.clone());
            report.loaded.push(job);
        }
        log::info!(
            "[Jobs] Recovered {} pending jobs, skipped {}",
            report.loaded.len(),
            report.skipped.len()
        );
        report
    }

    fn index_of(&self, job_id: &str) -> Option<usize> {
        self.jobs.iter().position(|job| job.job_id == job_id)
    }

    pub fn list(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.job_id == job_id)
    }

    /// Oldest outstanding job targeting a slot
    pub fn find_at(&self, pos: Position) -> Option<&Job> {
        self.jobs.iter().find(|job| job.position() == pos)
    }

    /// Oldest outstanding job
    pub fn oldest(&self) -> Option<&Job> {
        self.jobs.first()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop every job and restart id numbering
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.counter = 0;
    }
}
