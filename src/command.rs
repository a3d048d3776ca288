use crate::events::CommandParams;
use crate::vehicle::{DriveMode, Lights};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlParams {
    pub mode: Option<DriveMode>,
    pub throttle: Option<f64>,
    pub steering: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuxParams {
    pub lights: Option<Lights>,
    pub horn: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmergencyStopParams {
    /// Informational only.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FirmwareParams {
    pub version: Option<String>,
}

/// Typed form of a command request.
///
/// Any name outside the six recognized commands becomes `Unrecognized` and is
/// acknowledged without changing vehicle state.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleCommand {
    Start,
    Stop,
    SetControls(ControlParams),
    SetAux(AuxParams),
    EmergencyStop(EmergencyStopParams),
    FirmwareUpdate(FirmwareParams),
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("parameter `{name}` of `{command}` must be {expected}")]
    InvalidParameter {
        command: &'static str,
        name: &'static str,
        expected: &'static str,
    },
}

impl VehicleCommand {
    pub const START: &'static str = "start";
    pub const STOP: &'static str = "stop";
    pub const SET_CONTROLS: &'static str = "set_controls";
    pub const SET_AUX: &'static str = "set_aux";
    pub const EMERGENCY_STOP: &'static str = "emergency_stop";
    pub const FIRMWARE_UPDATE: &'static str = "firmware_update";

    /// Parse a command name and its parameters. Names match case-insensitively;
    /// absent or `null` parameters stay `None`.
    pub fn parse(name: &str, params: &CommandParams) -> Result<Self, CommandError> {
        let command = match name.to_lowercase().as_str() {
            Self::START => VehicleCommand::Start,
            Self::STOP => VehicleCommand::Stop,
            Self::SET_CONTROLS => VehicleCommand::SetControls(ControlParams {
                mode: string_param(params, Self::SET_CONTROLS, "mode")?.map(DriveMode::from),
                throttle: number_param(params, Self::SET_CONTROLS, "throttle")?,
                steering: number_param(params, Self::SET_CONTROLS, "steering")?,
            }),
            Self::SET_AUX => VehicleCommand::SetAux(AuxParams {
                lights: string_param(params, Self::SET_AUX, "lights")?.map(Lights::from),
                horn: bool_param(params, Self::SET_AUX, "horn")?,
            }),
            Self::EMERGENCY_STOP => VehicleCommand::EmergencyStop(EmergencyStopParams {
                reason: string_param(params, Self::EMERGENCY_STOP, "reason")?,
            }),
            Self::FIRMWARE_UPDATE => VehicleCommand::FirmwareUpdate(FirmwareParams {
                version: version_param(params)?,
            }),
            _ => VehicleCommand::Unrecognized(name.to_string()),
        };
        Ok(command)
    }

    pub fn name(&self) -> &str {
        match self {
            VehicleCommand::Start => Self::START,
            VehicleCommand::Stop => Self::STOP,
            VehicleCommand::SetControls(_) => Self::SET_CONTROLS,
            VehicleCommand::SetAux(_) => Self::SET_AUX,
            VehicleCommand::EmergencyStop(_) => Self::EMERGENCY_STOP,
            VehicleCommand::FirmwareUpdate(_) => Self::FIRMWARE_UPDATE,
            VehicleCommand::Unrecognized(name) => name,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, VehicleCommand::Unrecognized(_))
    }
}

fn present<'a>(params: &'a CommandParams, name: &str) -> Option<&'a Value> {
    params.get(name).filter(|value| !value.is_null())
}

fn number_param(params: &CommandParams, command: &'static str, name: &'static str) -> Result<Option<f64>, CommandError> {
    match present(params, name) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .filter(|number| number.is_finite())
            .map(Some)
            .ok_or(CommandError::InvalidParameter { command, name, expected: "a finite number" }),
    }
}

fn string_param(params: &CommandParams, command: &'static str, name: &'static str) -> Result<Option<String>, CommandError> {
    match present(params, name) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(CommandError::InvalidParameter { command, name, expected: "a string" }),
    }
}

fn bool_param(params: &CommandParams, command: &'static str, name: &'static str) -> Result<Option<bool>, CommandError> {
    match present(params, name) {
        None => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(CommandError::InvalidParameter { command, name, expected: "a boolean" }),
    }
}

// Version labels are stored as text, numbers are accepted and stringified
fn version_param(params: &CommandParams) -> Result<Option<String>, CommandError> {
    match present(params, "version") {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(_) => Err(CommandError::InvalidParameter {
            command: VehicleCommand::FIRMWARE_UPDATE,
            name: "version",
            expected: "a string or number",
        }),
    }
}
