//! Job records exchanged with requesters, observers and the Gateway

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ShelfError, ShelfResult};
use crate::position::Position;

/// Transaction status reported for a normal job
pub const TRN_STATUS_NORMAL: &str = "1";
/// Transaction status reported once a job is flagged as faulted
pub const TRN_STATUS_ERROR: &str = "2";
/// Shelf identity used when none was detected or supplied
pub const UNKNOWN_SHELF_ID: &str = "UNKNOWN";

/// Job direction, `"1"` (place) or `"0"` (pick) on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceFlag {
    Pick,
    Place,
}

impl PlaceFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pick => "0",
            Self::Place => "1",
        }
    }

    /// Action reported on completion
    pub fn action(self) -> JobAction {
        match self {
            Self::Pick => JobAction::Picked,
            Self::Place => JobAction::Placed,
        }
    }
}

impl Serialize for PlaceFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlaceFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match lenient_string(deserializer)?.as_str() {
            "0" => Ok(Self::Pick),
            "1" => Ok(Self::Place),
            other => Err(de::Error::custom(format!(
                "place_flg must be \"0\" or \"1\", got {other:?}"
            ))),
        }
    }
}

/// What a completed job did to the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Placed,
    Picked,
}

/// Lifecycle state of a job still in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Errored,
}

/// Where a fault was observed (e.g. a wrong slot was scanned or pressed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    #[serde(deserialize_with = "de_u32")]
    pub level: u32,
    #[serde(deserialize_with = "de_u32")]
    pub block: u32,
    #[serde(default)]
    pub message: String,
}

impl ErrorLocation {
    pub fn position(&self) -> Position {
        Position::new(self.level, self.block)
    }
}

/// Inbound job proposal
///
/// Integer fields accept either JSON numbers or decimal strings, since
/// upstream systems send `"level": "1"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub lot_no: String,
    #[serde(deserialize_with = "de_u32")]
    pub level: u32,
    #[serde(deserialize_with = "de_u32")]
    pub block: u32,
    pub place_flg: PlaceFlag,
    #[serde(default = "default_tray_count", deserialize_with = "de_u32")]
    pub tray_count: u32,
    #[serde(default)]
    pub biz: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_id: Option<String>,
    #[serde(default = "default_trn_status")]
    pub trn_status: String,
}

fn default_tray_count() -> u32 {
    1
}

fn default_trn_status() -> String {
    TRN_STATUS_NORMAL.to_string()
}

impl JobRequest {
    pub fn new(
        lot_no: impl Into<String>,
        position: Position,
        place_flg: PlaceFlag,
        tray_count: u32,
        biz: impl Into<String>,
    ) -> Self {
        Self {
            lot_no: lot_no.into(),
            level: position.level,
            block: position.block,
            place_flg,
            tray_count,
            biz: biz.into(),
            shelf_id: None,
            trn_status: default_trn_status(),
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.level, self.block)
    }

    /// Field-level checks that do not depend on shelf state
    pub fn validate(&self) -> ShelfResult<()> {
        if self.lot_no.trim().is_empty() {
            return Err(ShelfError::InvalidRequest("lot_no is required".into()));
        }
        if self.biz.trim().is_empty() {
            return Err(ShelfError::InvalidRequest("biz field is required".into()));
        }
        if self.level == 0 || self.block == 0 {
            return Err(ShelfError::InvalidPosition(self.position()));
        }
        if self.tray_count == 0 {
            return Err(ShelfError::InvalidRequest(
                "tray_count must be a positive integer".into(),
            ));
        }
        Ok(())
    }
}

/// An admitted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub lot_no: String,
    pub level: u32,
    pub block: u32,
    pub place_flg: PlaceFlag,
    pub tray_count: u32,
    pub biz: String,
    pub shelf_id: String,
    pub trn_status: String,
    pub status: JobStatus,
    pub error: bool,
    #[serde(
        rename = "errorLocation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_location: Option<ErrorLocation>,
}

impl Job {
    /// Admit a request under the given id and shelf identity
    pub fn from_request(job_id: String, request: JobRequest, shelf_id: String) -> Self {
        Self {
            job_id,
            lot_no: request.lot_no,
            level: request.level,
            block: request.block,
            place_flg: request.place_flg,
            tray_count: request.tray_count,
            biz: request.biz,
            shelf_id,
            trn_status: request.trn_status,
            status: JobStatus::Queued,
            error: false,
            error_location: None,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.level, self.block)
    }

    pub fn action(&self) -> JobAction {
        self.place_flg.action()
    }

    /// Flag the job as faulted at a location
    pub fn mark_error(&mut self, location: ErrorLocation) {
        self.status = JobStatus::Errored;
        self.trn_status = TRN_STATUS_ERROR.to_string();
        self.error = true;
        self.error_location = Some(location);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LENIENT INTEGER DECODING
// ═══════════════════════════════════════════════════════════════════════════════

fn de_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = lenient_string(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(de::Error::custom(format!(
            "expected a non-negative integer, got {raw:?}"
        )));
    }
    trimmed
        .parse()
        .map_err(|_| de::Error::custom(format!("integer out of range: {raw:?}")))
}

/// Accept a JSON string or an unsigned integer and return its text
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct LenientVisitor;

    impl Visitor<'_> for LenientVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or an unsigned integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            if v < 0 {
                return Err(E::custom(format!("negative value {v}")));
            }
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(LenientVisitor)
}
