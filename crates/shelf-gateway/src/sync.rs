//! Gateway Sync Adapter
//!
//! Reconciles the engine with the system of record. Every round trip is
//! bounded; when the Gateway cannot be reached the engine keeps operating
//! on its last-known layout and inventory.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shelf_core::{Job, RestoreReport, UNKNOWN_SHELF_ID};
use shelf_engine::{LayoutChange, RecoveryReport, ShelfEngine};

use crate::error::GatewayError;
use crate::protocol::{LayoutPayload, ShelfComplete, StatePayload};
use crate::transport::GatewayTransport;

/// What the startup sync managed to do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupReport {
    pub shelf_id: Option<String>,
    pub layout: Option<LayoutChange>,
    pub restored: Option<RestoreReport>,
    pub recovered: Option<RecoveryReport>,
    /// The Gateway had no usable layout and was sent the local one
    pub layout_seeded: bool,
}

/// What happened to a completed job on the Gateway side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionSync {
    pub reported: bool,
    pub state_pushed: bool,
}

/// Gateway sync orchestration over a shared engine
pub struct GatewaySync<T> {
    transport: T,
    engine: Arc<ShelfEngine>,
    timeout: Duration,
}

impl<T: GatewayTransport> GatewaySync<T> {
    pub fn new(transport: T, engine: Arc<ShelfEngine>, timeout: Duration) -> Self {
        Self {
            transport,
            engine,
            timeout,
        }
    }

    pub fn engine(&self) -> &Arc<ShelfEngine> {
        &self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Identity used on the wire
    fn shelf_id(&self) -> String {
        self.engine
            .shelf_id()
            .unwrap_or_else(|| UNKNOWN_SHELF_ID.to_string())
    }

    async fn bounded<R>(
        &self,
        what: &str,
        call: impl Future<Output = Result<R, GatewayError>>,
    ) -> Result<R, GatewayError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                log::warn!("[Gateway] {} failed: {}", what, e);
                Err(e)
            }
            Err(_) => {
                log::warn!("[Gateway] {} timed out after {:?}", what, self.timeout);
                Err(GatewayError::Timeout(self.timeout))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // IDENTITY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ask the Gateway who this shelf is and store the answer in the engine
    pub async fn detect_shelf_identity(&self, shelf_ip: Option<&str>) -> Result<String, GatewayError> {
        let response = self
            .bounded("shelf identity", self.transport.request_shelf_id(shelf_ip))
            .await?;
        let shelf_id = response
            .shelf_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| GatewayError::InvalidPayload("response has no shelf_id".into()))?;
        log::info!(
            "[Gateway] Shelf identity {} ({})",
            shelf_id,
            response.shelf_name.as_deref().unwrap_or("unnamed")
        );
        self.engine.set_shelf_id(shelf_id.clone());
        Ok(shelf_id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LAYOUT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch the layout and replace the engine's on success.
    ///
    /// On any failure the current layout stays in place.
    pub async fn sync_layout(&self) -> Result<LayoutChange, GatewayError> {
        let shelf_id = self.shelf_id();
        let payload = self
            .bounded("layout read", self.transport.fetch_layout(&shelf_id))
            .await?;
        let layout = match payload.to_layout() {
            Ok(layout) => layout,
            Err(e) => {
                log::warn!("[Gateway] Rejected layout for {}: {}", shelf_id, e);
                return Err(e);
            }
        };
        Ok(self.engine.replace_layout(layout))
    }

    /// Write the engine's layout to the Gateway
    pub async fn push_layout(&self) -> Result<(), GatewayError> {
        let payload = LayoutPayload::write(self.shelf_id(), &self.engine.layout());
        self.bounded("layout write", self.transport.push_layout(&payload))
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Replace the inventory with the Gateway's copy
    pub async fn restore_state(&self) -> Result<RestoreReport, GatewayError> {
        let shelf_id = self.shelf_id();
        let payload = self
            .bounded("state read", self.transport.fetch_state(&shelf_id))
            .await?;
        Ok(self.engine.restore_state(&payload.cells))
    }

    /// Write the current inventory to the Gateway
    pub async fn push_state(&self) -> Result<(), GatewayError> {
        let payload = StatePayload::write(self.shelf_id(), self.engine.cell_snapshot());
        self.bounded("state write", self.transport.push_state(&payload))
            .await?;
        self.engine.notify_state_synced();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // JOBS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load jobs the Gateway still considers outstanding
    pub async fn load_pending_jobs(&self) -> Result<RecoveryReport, GatewayError> {
        let shelf_id = self.shelf_id();
        let requests = self
            .bounded("pending jobs", self.transport.fetch_pending_jobs(&shelf_id))
            .await?;
        Ok(self.engine.recover_jobs(requests))
    }

    /// Tell the Gateway a job completed; best effort
    pub async fn report_completion(&self, job: &Job) -> bool {
        if job.biz.trim().is_empty() {
            log::warn!("[Gateway] Not reporting {}: no biz", job.job_id);
            return false;
        }
        let complete = ShelfComplete::from(job);
        match self
            .bounded("completion", self.transport.notify_complete(&complete))
            .await
        {
            Ok(()) => {
                log::info!("[Gateway] Reported completion of {}", job.job_id);
                true
            }
            Err(_) => false,
        }
    }

    /// Report a completion, tell observers how the report went, then write
    /// the new inventory back
    pub async fn publish_completion(&self, job: &Job) -> CompletionSync {
        let reported = self.report_completion(job).await;
        self.engine.notify_completion_reported(job, reported);
        let state_pushed = self.push_state().await.is_ok();
        CompletionSync {
            reported,
            state_pushed,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STARTUP
    // ═══════════════════════════════════════════════════════════════════════════

    /// Identity, layout, state and pending jobs, each degrading on failure
    pub async fn startup(&self, shelf_ip: Option<&str>) -> StartupReport {
        let mut report = StartupReport::default();

        report.shelf_id = match self.engine.shelf_id() {
            Some(id) => Some(id),
            None => self.detect_shelf_identity(shelf_ip).await.ok(),
        };
        report.layout = match self.sync_layout().await {
            Ok(change) => Some(change),
            Err(GatewayError::InvalidPayload(_)) => {
                log::warn!("[Gateway] No usable layout upstream, sending the local one");
                report.layout_seeded = self.push_layout().await.is_ok();
                None
            }
            Err(_) => {
                log::warn!("[Gateway] Keeping last-known layout");
                None
            }
        };
        report.restored = self.restore_state().await.ok();
        report.recovered = self.load_pending_jobs().await.ok();

        log::info!(
            "[Gateway] Startup sync: identity {}, layout {}, state {}, pending jobs {}",
            report.shelf_id.as_deref().unwrap_or(UNKNOWN_SHELF_ID),
            match (&report.layout, report.layout_seeded) {
                (Some(_), _) => "synced",
                (None, true) => "seeded",
                (None, false) => "local",
            },
            if report.restored.is_some() { "restored" } else { "local" },
            report
                .recovered
                .as_ref()
                .map_or(0, |r| r.loaded.len())
        );
        report
    }
}
