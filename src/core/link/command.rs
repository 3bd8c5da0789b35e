use crate::domain::error::LinkResult;
use serde::Serialize;
use serde_json::Value;

/// Action name carried by heartbeat commands
pub const HEARTBEAT_ACTION: &str = "heartbeat";
/// Action name of the failsafe clear command
pub const FAILSAFE_ACTION: &str = "failsafe";
/// Action name shared by every calibration command
pub const CALIBRATE_ACTION: &str = "calibrate";

/// Outbound command envelope.
///
/// Serializes to the single-key objects the controller firmware expects:
/// `{"CMD": {...}}` or `{"SET": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Command {
    #[serde(rename = "CMD")]
    Cmd(CmdBody),
    #[serde(rename = "SET")]
    Set(SetBody),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CmdBody {
    pub action: String,
    pub state: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetBody {
    pub variable: String,
    pub value: Value,
}

impl Command {
    /// `{"CMD": {"action": .., "state": ..}}`
    pub fn cmd(action: impl Into<String>, state: impl Into<Value>) -> Self {
        Command::Cmd(CmdBody {
            action: action.into(),
            state: state.into(),
            sensor: None,
            actual: None,
        })
    }

    /// `{"SET": {"variable": .., "value": ..}}`
    pub fn set(variable: impl Into<String>, value: impl Into<Value>) -> Self {
        Command::Set(SetBody {
            variable: variable.into(),
            value: value.into(),
        })
    }

    /// Calibration request for one sensor. `action` becomes the `state`
    /// field; `actual` is the reference reading when the step needs one.
    pub fn calibration(sensor: impl Into<String>, action: impl Into<String>, actual: Option<f64>) -> Self {
        Command::Cmd(CmdBody {
            action: CALIBRATE_ACTION.to_string(),
            state: Value::String(action.into()),
            sensor: Some(sensor.into()),
            actual,
        })
    }

    pub fn heartbeat() -> Self {
        Self::cmd(HEARTBEAT_ACTION, "ping")
    }

    pub fn clear_failsafe() -> Self {
        Self::cmd(FAILSAFE_ACTION, "clear")
    }

    /// Encode as one newline-terminated wire line.
    pub fn to_line(&self) -> LinkResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
