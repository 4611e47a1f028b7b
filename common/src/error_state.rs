use crate::{
    error::{ConnectivityError, SensorError, UploadError},
    types::StatusSnapshot,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorState {
    sensor: Option<SensorError>,
    network: Option<ConnectivityError>,
    telemetry: Option<UploadError>,
}

impl ErrorState {
    pub fn record_sensor(&mut self, outcome: Result<(), SensorError>) {
        self.sensor = outcome.err();
    }

    pub fn record_network(&mut self, outcome: Result<(), ConnectivityError>) {
        self.network = outcome.err();
    }

    pub fn record_telemetry(&mut self, outcome: Result<(), UploadError>) {
        self.telemetry = outcome.err();
    }

    pub fn sensor(&self) -> bool {
        self.sensor.is_some()
    }

    pub fn network(&self) -> bool {
        self.network.is_some()
    }

    pub fn telemetry(&self) -> bool {
        self.telemetry.is_some()
    }

    pub fn sensor_error(&self) -> Option<&SensorError> {
        self.sensor.as_ref()
    }

    pub fn network_error(&self) -> Option<&ConnectivityError> {
        self.network.as_ref()
    }

    pub fn telemetry_error(&self) -> Option<&UploadError> {
        self.telemetry.as_ref()
    }

    pub fn any_error(&self) -> bool {
        self.sensor() || self.network() || self.telemetry()
    }

    pub fn snapshot(&self, indicator_target: u16, last_co2: Option<u16>) -> StatusSnapshot {
        StatusSnapshot {
            sensor_error: self.sensor.map(|err| err.to_string()),
            network_error: self.network.as_ref().map(ToString::to_string),
            telemetry_error: self.telemetry.as_ref().map(ToString::to_string),
            any_error: self.any_error(),
            indicator_target,
            last_co2,
        }
    }
}
