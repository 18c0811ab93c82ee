//! Inbound WebSocket commands
//!
//! `{"type": "<command>", "payload": {...}}` in, one reply to the sender:
//! `command_result` on success, `command_error` with the error code
//! otherwise. State changes reach every observer through the engine's
//! broadcast, not through the reply.
//!
//! Query commands (`led_state`, `occupied_lots`, `shelf_summary`) only read.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shelf_core::{ErrorLocation, Job, JobRequest, ShelfError};
use shelf_engine::{CancelOutcome, ShelfEngine};
use shelf_led::{LedBatch, Rgb};

/// Commands a client may send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    CreateJob(JobRequest),
    CompleteJob {
        #[serde(alias = "jobId")]
        job_id: String,
    },
    JobError {
        #[serde(alias = "jobId")]
        job_id: String,
        level: u32,
        block: u32,
        #[serde(default)]
        message: String,
    },
    CancelJob {
        lot_no: String,
    },
    SystemReset,
    LedBatch(LedBatch),
    LightLevel {
        level: u32,
        r: u8,
        g: u8,
        b: u8,
    },
    LedState,
    OccupiedLots,
    ShelfSummary,
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateJob(_) => "create_job",
            Self::CompleteJob { .. } => "complete_job",
            Self::JobError { .. } => "job_error",
            Self::CancelJob { .. } => "cancel_job",
            Self::SystemReset => "system_reset",
            Self::LedBatch(_) => "led_batch",
            Self::LightLevel { .. } => "light_level",
            Self::LedState => "led_state",
            Self::OccupiedLots => "occupied_lots",
            Self::ShelfSummary => "shelf_summary",
        }
    }

    /// Whether a successful run changes the inventory
    fn mutates_inventory(&self) -> bool {
        matches!(self, Self::CompleteJob { .. } | Self::SystemReset)
    }
}

/// Reply sent to the requesting client only
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CommandReply {
    CommandResult { command: String, result: Value },
    CommandError { command: String, code: String, message: String },
}

impl CommandReply {
    fn error(command: &str, err: &ShelfError) -> Self {
        Self::CommandError {
            command: command.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"command_error","payload":{{"command":"","code":"INTERNAL","message":"{e}"}}}}"#)
        })
    }
}

/// Reply plus what the Gateway should hear about
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub reply: CommandReply,
    /// Job to report, if one completed
    pub completed: Option<Job>,
    /// Inventory changed and should be written back
    pub inventory_changed: bool,
}

impl Handled {
    fn rejected(reply: CommandReply) -> Self {
        Self {
            reply,
            completed: None,
            inventory_changed: false,
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Run one command against the engine
pub fn execute(engine: &ShelfEngine, command: ClientCommand) -> Result<(Value, Option<Job>), ShelfError> {
    match command {
        ClientCommand::CreateJob(request) => {
            let job = engine.create_job(request)?;
            Ok((to_value(&job), None))
        }
        ClientCommand::CompleteJob { job_id } => {
            let completion = engine.complete_job(&job_id)?;
            let result = json!({
                "job": to_value(&completion.job),
                "action": to_value(&completion.action),
            });
            Ok((result, Some(completion.job)))
        }
        ClientCommand::JobError {
            job_id,
            level,
            block,
            message,
        } => {
            let job = engine.error_job(
                &job_id,
                ErrorLocation {
                    level,
                    block,
                    message,
                },
            )?;
            Ok((to_value(&job), None))
        }
        ClientCommand::CancelJob { lot_no } => match engine.cancel_job(&lot_no) {
            CancelOutcome::Canceled(jobs) => Ok((json!({"canceled": to_value(&jobs)}), None)),
            CancelOutcome::NotFound => Ok((json!({"canceled": [], "lot_no": lot_no}), None)),
        },
        ClientCommand::SystemReset => {
            engine.system_reset();
            Ok((json!({"reset": true}), None))
        }
        ClientCommand::LedBatch(batch) => {
            let lit = engine.led_batch(&batch)?;
            Ok((json!({"lit": lit}), None))
        }
        ClientCommand::LightLevel { level, r, g, b } => {
            let lit = engine.light_level(level, Rgb::new(r, g, b))?;
            Ok((json!({"level": level, "lit": lit}), None))
        }
        ClientCommand::LedState => Ok((to_value(&engine.leds().state()), None)),
        ClientCommand::OccupiedLots => {
            let lots = engine.occupied();
            Ok((json!({"count": lots.len(), "lots": to_value(&lots)}), None))
        }
        ClientCommand::ShelfSummary => Ok((to_value(&engine.summary()), None)),
    }
}

/// Parse and run one text frame
pub fn handle_text(engine: &ShelfEngine, text: &str) -> Handled {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            log::warn!("[Daemon] Unparseable command: {}", e);
            return Handled::rejected(CommandReply::error(
                "unknown",
                &ShelfError::InvalidRequest(e.to_string()),
            ));
        }
    };

    let name = command.name();
    let mutates = command.mutates_inventory();
    match execute(engine, command) {
        Ok((result, completed)) => Handled {
            reply: CommandReply::CommandResult {
                command: name.to_string(),
                result,
            },
            completed,
            inventory_changed: mutates,
        },
        Err(e) => {
            if e.is_validation() {
                log::info!("[Daemon] {} rejected: {}", name, e);
            } else {
                log::warn!("[Daemon] {} failed: {}", name, e);
            }
            Handled::rejected(CommandReply::error(name, &e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{Layout, Position};
    use shelf_led::{LedController, NullDriver, WIRING_ORDER};

    fn engine() -> ShelfEngine {
        let layout = Layout::fallback();
        let leds = LedController::new(&layout, WIRING_ORDER, Box::new(NullDriver));
        ShelfEngine::new(layout, leds)
    }

    fn reply_json(handled: &Handled) -> Value {
        serde_json::from_str(&handled.reply.to_text()).unwrap()
    }

    #[test]
    fn test_create_and_complete() {
        let engine = engine();
        let created = handle_text(
            &engine,
            r#"{"type":"create_job","payload":{"lot_no":"A1","level":"1","block":1,"place_flg":"1","tray_count":"10","biz":"IS"}}"#,
        );
        let value = reply_json(&created);
        assert_eq!(value["type"], "command_result");
        assert_eq!(value["payload"]["result"]["jobId"], "job_1");

        let completed = handle_text(
            &engine,
            r#"{"type":"complete_job","payload":{"jobId":"job_1"}}"#,
        );
        assert_eq!(reply_json(&completed)["payload"]["result"]["action"], "placed");
        assert!(completed.inventory_changed);
        assert_eq!(completed.completed.unwrap().lot_no, "A1");
        assert_eq!(engine.find_lot("A1"), Some(Position::new(1, 1)));
    }

    #[test]
    fn test_rejection_carries_code() {
        let engine = engine();
        let handled = handle_text(
            &engine,
            r#"{"type":"create_job","payload":{"lot_no":"Z9","level":1,"block":1,"place_flg":"0","biz":"IS"}}"#,
        );
        let value = reply_json(&handled);
        assert_eq!(value["type"], "command_error");
        assert_eq!(value["payload"]["code"], "NOT_FOUND");
        assert_eq!(value["payload"]["command"], "create_job");
        assert!(!handled.inventory_changed);
    }

    #[test]
    fn test_garbage_is_invalid_request() {
        let engine = engine();
        let value = reply_json(&handle_text(&engine, "{not json"));
        assert_eq!(value["payload"]["code"], "INVALID_REQUEST");
    }

    #[test]
    fn test_cancel_unknown_lot_succeeds() {
        let engine = engine();
        let value = reply_json(&handle_text(
            &engine,
            r#"{"type":"cancel_job","payload":{"lot_no":"nope"}}"#,
        ));
        assert_eq!(value["type"], "command_result");
    }

    #[test]
    fn test_unit_command_without_payload() {
        let engine = engine();
        let handled = handle_text(&engine, r#"{"type":"system_reset"}"#);
        assert!(handled.inventory_changed);
        assert_eq!(reply_json(&handled)["payload"]["result"]["reset"], true);
    }

    #[test]
    fn test_led_batch_delay_bound() {
        let engine = engine();
        let value = reply_json(&handle_text(
            &engine,
            r#"{"type":"led_batch","payload":{"positions":[{"position":"L1B1","r":0,"g":255,"b":0}],"delay_ms":5000}}"#,
        ));
        assert_eq!(value["payload"]["code"], "INVALID_REQUEST");
    }

    #[test]
    fn test_led_batch_unknown_positions_share_code() {
        let engine = engine();
        for positions in [
            r#"[{"position":"L9B1","r":0,"g":255,"b":0}]"#,
            r#"[{"position":"L9B1","r":0,"g":255,"b":0},{"position":"L1B9","r":0,"g":255,"b":0}]"#,
        ] {
            let text = format!(r#"{{"type":"led_batch","payload":{{"positions":{positions}}}}}"#);
            let value = reply_json(&handle_text(&engine, &text));
            assert_eq!(value["payload"]["code"], "INVALID_POSITION");
        }
    }

    #[test]
    fn test_queries_report_leds_and_stock() {
        let engine = engine();
        handle_text(
            &engine,
            r#"{"type":"create_job","payload":{"lot_no":"A1","level":2,"block":3,"place_flg":"1","tray_count":4,"biz":"IS"}}"#,
        );
        handle_text(&engine, r#"{"type":"complete_job","payload":{"jobId":"job_1"}}"#);

        let leds = reply_json(&handle_text(&engine, r#"{"type":"led_state"}"#));
        assert_eq!(leds["payload"]["result"]["total_pixels"], 24);
        assert_eq!(leds["payload"]["result"]["active_count"], 1);

        let occupied = reply_json(&handle_text(&engine, r#"{"type":"occupied_lots"}"#));
        assert_eq!(occupied["payload"]["result"]["count"], 1);
        assert_eq!(occupied["payload"]["result"]["lots"][0]["lot_no"], "A1");

        let summary = reply_json(&handle_text(&engine, r#"{"type":"shelf_summary"}"#));
        assert_eq!(summary["payload"]["result"]["occupied"], 1);
        assert_eq!(summary["payload"]["result"]["total_positions"], 24);
    }

    #[test]
    fn test_light_level() {
        let engine = engine();
        let value = reply_json(&handle_text(
            &engine,
            r#"{"type":"light_level","payload":{"level":3,"r":255,"g":255,"b":255}}"#,
        ));
        assert_eq!(value["payload"]["result"]["lit"], 6);
        assert_eq!(engine.leds().state().active_count, 6);

        let missing = reply_json(&handle_text(
            &engine,
            r#"{"type":"light_level","payload":{"level":9,"r":255,"g":0,"b":0}}"#,
        ));
        assert_eq!(missing["payload"]["code"], "INVALID_REQUEST");
    }
}
