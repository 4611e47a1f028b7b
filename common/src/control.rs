use std::io;

use log::{info, warn};

use crate::{
    config::{IndicatorConfig, LoopConfig},
    error::{ConnectivityError, SensorError, UploadError},
    error_state::ErrorState,
    frame::DisplayFrame,
    indicator::{IndicatorDriver, IndicatorOutput, IndicatorState},
    sensor::{GasSensor, SensorReader},
    telemetry::{PointWriter, TelemetrySink},
    types::{LinkStatus, Reading, StatusSnapshot},
};

pub const INVALID_SAMPLE_NOTICE: &str = "Invalid sample detected, skipping.";

pub trait DisplayLink {
    fn send(&mut self, frame: &DisplayFrame) -> io::Result<()>;
}

pub trait NetworkLink {
    fn status(&mut self) -> LinkStatus;
}

pub struct Uplink<N, W> {
    pub network: N,
    pub sink: TelemetrySink<W>,
}

#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    pub errors: ErrorState,
    pub indicator: IndicatorState,
    pub hold_off_until_ms: Option<u64>,
    pub last_reading: Option<Reading>,
}

impl CycleContext {
    pub fn in_hold_off(&self, now_ms: u64) -> bool {
        self.hold_off_until_ms
            .is_some_and(|until_ms| now_ms < until_ms)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.errors.snapshot(
            self.indicator.target,
            self.last_reading.map(|reading| reading.co2),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    NotReady,
    HoldOff,
    SensorFault(SensorError),
    InvalidSample {
        notice: &'static str,
    },
    Published {
        reading: Reading,
        frame: DisplayFrame,
        upload: Option<Result<(), UploadError>>,
        network: Option<LinkStatus>,
    },
}

pub struct ControlLoop<S, O, D, N, W> {
    sensor: SensorReader<S>,
    indicator: IndicatorDriver<O>,
    display: D,
    uplink: Option<Uplink<N, W>>,
    cadence: LoopConfig,
}

impl<S, O, D, N, W> ControlLoop<S, O, D, N, W>
where
    S: GasSensor,
    O: IndicatorOutput,
    D: DisplayLink,
    N: NetworkLink,
    W: PointWriter,
{
    pub fn new(
        sensor: S,
        indicator: O,
        display: D,
        uplink: Option<Uplink<N, W>>,
        indicator_config: IndicatorConfig,
        cadence: LoopConfig,
    ) -> Self {
        Self {
            sensor: SensorReader::new(sensor),
            indicator: IndicatorDriver::new(indicator, indicator_config),
            display,
            uplink,
            cadence,
        }
    }

    pub fn notice(&mut self, text: &str) {
        info!("{text}");
        self.transmit(&DisplayFrame::notice(text));
    }

    pub fn start_sensor(&mut self, ctx: &mut CycleContext) {
        let failures = self.sensor.start();
        for err in &failures {
            self.transmit(&DisplayFrame::notice(&err.to_string()));
        }
        if let Some(err) = failures.first() {
            ctx.errors.record_sensor(Err(*err));
        }

        let wait_s = self.cadence.first_measurement_wait_ms / 1_000;
        self.notice(&format!("Waiting for first measurement... ({wait_s} sec)"));
    }

    pub fn start_uplink(&mut self, ctx: &mut CycleContext, ssid: &str, time_synced: bool) {
        let Some(uplink) = self.uplink.as_mut() else {
            return;
        };

        uplink.sink.add_tag("SSID", ssid);
        if time_synced {
            uplink.sink.mark_time_synced();
        } else {
            warn!("time synchronization did not complete; uploads will be refused");
        }

        let text = match uplink.sink.validate_connection() {
            Ok(()) => {
                ctx.errors.record_telemetry(Ok(()));
                format!("Connected to telemetry: {}", uplink.sink.server_url())
            }
            Err(err) => {
                let text = format!("Telemetry connection failed: {err}");
                ctx.errors.record_telemetry(Err(err));
                text
            }
        };
        self.notice(&text);
    }

    pub fn tick(&mut self, ctx: &mut CycleContext, now_ms: u64) -> CycleOutcome {
        if self.indicator.step(now_ms, ctx.indicator.target) {
            ctx.indicator.sequence_finished = true;
        }

        let ready = match self.sensor.poll_ready() {
            Ok(ready) => ready,
            Err(err) => {
                warn!("{err}");
                ctx.errors.record_sensor(Err(err));
                return CycleOutcome::SensorFault(err);
            }
        };
        if ctx.in_hold_off(now_ms) {
            return CycleOutcome::HoldOff;
        }
        if !ready {
            return CycleOutcome::NotReady;
        }

        let reading = match self.sensor.read() {
            Ok(reading) => reading,
            Err(err) => {
                warn!("{err}");
                ctx.errors.record_sensor(Err(err));
                return CycleOutcome::SensorFault(err);
            }
        };
        if !reading.is_valid() {
            info!("{INVALID_SAMPLE_NOTICE}");
            return CycleOutcome::InvalidSample {
                notice: INVALID_SAMPLE_NOTICE,
            };
        }

        ctx.errors.record_sensor(Ok(()));
        ctx.last_reading = Some(reading);
        ctx.indicator.retarget(reading.co2);
        info!(
            "Co2\t{}\tTemperature\t{:.2}\tHumidity\t{:.2}",
            reading.co2, reading.temperature, reading.humidity
        );

        let frame = DisplayFrame::status(&reading, ctx.errors.any_error());
        self.transmit(&frame);

        let (upload, network) = match self.uplink.as_mut() {
            Some(uplink) => {
                uplink.sink.begin_point();
                uplink.sink.set_field("co2", reading.co2);
                uplink.sink.set_field("temperature", reading.temperature);
                uplink.sink.set_field("humidity", reading.humidity);
                let upload = uplink.sink.upload();
                ctx.errors.record_telemetry(upload.clone());

                let status = uplink.network.status();
                ctx.errors.record_network(match status {
                    LinkStatus::Connected => Ok(()),
                    LinkStatus::Disconnected => {
                        warn!("{}", ConnectivityError::Disconnected);
                        Err(ConnectivityError::Disconnected)
                    }
                });

                ctx.hold_off_until_ms =
                    Some(now_ms.saturating_add(self.cadence.upload_interval_ms));
                info!(
                    "waiting {}s for next measurement...",
                    self.cadence.upload_interval_ms / 1_000
                );
                (Some(upload), Some(status))
            }
            None => (None, None),
        };

        CycleOutcome::Published {
            reading,
            frame,
            upload,
            network,
        }
    }

    pub fn cadence(&self) -> &LoopConfig {
        &self.cadence
    }

    pub fn uplink_mut(&mut self) -> Option<&mut Uplink<N, W>> {
        self.uplink.as_mut()
    }

    fn transmit(&mut self, frame: &DisplayFrame) {
        if let Err(err) = self.display.send(frame) {
            warn!("display link write failed: {err}");
        }
    }
}
