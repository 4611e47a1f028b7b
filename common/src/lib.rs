pub mod config;
pub mod control;
pub mod error;
pub mod error_state;
pub mod frame;
pub mod indicator;
pub mod sensor;
pub mod telemetry;
pub mod topics;
pub mod types;

pub use config::{
    DisplayLinkConfig, IndicatorConfig, LoopConfig, NetworkConfig, RuntimeConfig,
    SensorBusConfig, TelemetryConfig,
};
pub use control::{
    ControlLoop, CycleContext, CycleOutcome, DisplayLink, NetworkLink, Uplink,
    INVALID_SAMPLE_NOTICE,
};
pub use error::{ConnectivityError, ErrorCode, SensorCommand, SensorError, UploadError};
pub use error_state::ErrorState;
pub use frame::DisplayFrame;
pub use indicator::{IndicatorDriver, IndicatorOutput, IndicatorState};
pub use sensor::{GasSensor, SensorReader};
pub use telemetry::{FieldValue, Point, PointWriter, TelemetrySink};
pub use topics::*;
pub use types::{LinkStatus, Reading, StatusSnapshot};
