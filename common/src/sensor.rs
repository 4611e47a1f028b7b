use log::{info, warn};

use crate::{
    error::{ErrorCode, SensorCommand, SensorError},
    types::Reading,
};

pub trait GasSensor {
    fn stop_periodic_measurement(&mut self) -> Result<(), ErrorCode>;
    fn serial_number(&mut self) -> Result<[u16; 3], ErrorCode>;
    fn start_periodic_measurement(&mut self) -> Result<(), ErrorCode>;
    fn data_ready(&mut self) -> Result<bool, ErrorCode>;
    fn read_measurement(&mut self) -> Result<(u16, f32, f32), ErrorCode>;
}

pub struct SensorReader<S> {
    sensor: S,
}

impl<S: GasSensor> SensorReader<S> {
    pub fn new(sensor: S) -> Self {
        Self { sensor }
    }

    pub fn start(&mut self) -> Vec<SensorError> {
        let mut failures = Vec::new();

        if let Err(err) = self
            .sensor
            .stop_periodic_measurement()
            .map_err(|code| transport(SensorCommand::StopPeriodicMeasurement, code))
        {
            failures.push(err);
        }

        match self
            .sensor
            .serial_number()
            .map_err(|code| transport(SensorCommand::GetSerialNumber, code))
        {
            Ok(words) => info!("{}", format_serial(words)),
            Err(err) => failures.push(err),
        }

        if let Err(err) = self
            .sensor
            .start_periodic_measurement()
            .map_err(|code| transport(SensorCommand::StartPeriodicMeasurement, code))
        {
            failures.push(err);
        }

        for err in &failures {
            warn!("{err}");
        }
        failures
    }

    pub fn poll_ready(&mut self) -> Result<bool, SensorError> {
        self.sensor
            .data_ready()
            .map_err(|code| transport(SensorCommand::GetDataReadyFlag, code))
    }

    pub fn read(&mut self) -> Result<Reading, SensorError> {
        let (co2, temperature, humidity) = self
            .sensor
            .read_measurement()
            .map_err(|code| transport(SensorCommand::ReadMeasurement, code))?;
        Ok(Reading {
            co2,
            temperature,
            humidity,
        })
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}

fn transport(command: SensorCommand, code: ErrorCode) -> SensorError {
    SensorError::Transport { command, code }
}

pub fn format_serial(words: [u16; 3]) -> String {
    format!("Serial: 0x{:04X}{:04X}{:04X}", words[0], words[1], words[2])
}
