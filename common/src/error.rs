use core::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // Driver did not say which direction failed.
    pub const BUS: Self = Self(0x0100);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x0100 => write!(f, "I2C bus error"),
            0x0101 => write!(f, "I2C bus write failed"),
            0x0102 => write!(f, "I2C bus read failed"),
            0x0103 => write!(f, "CRC mismatch in sensor response"),
            0x0104 => write!(f, "command not allowed in current sensor state"),
            code => write!(f, "unknown sensor error {code:#06x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCommand {
    StopPeriodicMeasurement,
    GetSerialNumber,
    StartPeriodicMeasurement,
    GetDataReadyFlag,
    ReadMeasurement,
}

impl SensorCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StopPeriodicMeasurement => "stopPeriodicMeasurement()",
            Self::GetSerialNumber => "getSerialNumber()",
            Self::StartPeriodicMeasurement => "startPeriodicMeasurement()",
            Self::GetDataReadyFlag => "getDataReadyFlag()",
            Self::ReadMeasurement => "readMeasurement()",
        }
    }
}

impl fmt::Display for SensorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("Error trying to execute {command}: {code}")]
    Transport {
        command: SensorCommand,
        code: ErrorCode,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectivityError {
    #[error("Wifi connection lost")]
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("clock not synchronized; refusing to upload")]
    ClockNotSynced,
    #[error("write rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("telemetry service unreachable: {0}")]
    Unreachable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn transport_error_names_failing_command() {
        let err = SensorError::Transport {
            command: SensorCommand::ReadMeasurement,
            code: ErrorCode(0x0102),
        };

        assert_eq!(
            err.to_string(),
            "Error trying to execute readMeasurement(): I2C bus read failed"
        );
    }

    #[test]
    fn bus_error_does_not_claim_a_direction() {
        let err = SensorError::Transport {
            command: SensorCommand::StopPeriodicMeasurement,
            code: ErrorCode::BUS,
        };

        assert_eq!(
            err.to_string(),
            "Error trying to execute stopPeriodicMeasurement(): I2C bus error"
        );
    }

    #[test]
    fn unknown_codes_render_as_hex() {
        assert_eq!(ErrorCode(0x2a).to_string(), "unknown sensor error 0x002a");
    }
}
