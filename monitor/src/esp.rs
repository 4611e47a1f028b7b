use std::{
    io, thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyOutputPin, Output, OutputPin, PinDriver},
    i2c::{I2cConfig, I2cDriver},
    units::Hertz,
    uart::{self, UartDriver},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    sntp::{EspSntp, SntpConf, SyncStatus},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use scd4x::Scd4x;

use co2_monitor_common::{
    config::{NetworkConfig, TelemetryConfig},
    ControlLoop, CycleContext, DisplayFrame, DisplayLink, ErrorCode, GasSensor, IndicatorOutput,
    LinkStatus, NetworkLink, Point, PointWriter, RuntimeConfig, TelemetrySink, Uplink,
    UploadError,
};

const SNTP_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let runtime = build_runtime_config();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals {
        modem,
        pins,
        uart1,
        i2c0,
        ..
    } = Peripherals::take()?;

    // Board wiring: LED on GPIO2, display TX/RX on GPIO12/14, sensor SDA/SCL on GPIO4/5.
    let indicator = LedIndicator::new(pins.gpio2.downgrade_output(), runtime.indicator.active_low)
        .context("failed to initialize indicator LED")?;

    let uart_config =
        uart::config::Config::default().baudrate(Hertz(runtime.display.baud_rate));
    let uart = UartDriver::new(
        uart1,
        pins.gpio12,
        pins.gpio14,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )
    .context("failed to initialize display link uart")?;

    let i2c_config = I2cConfig::new().baudrate(Hertz(runtime.sensor_bus.frequency_hz));
    let i2c = I2cDriver::new(i2c0, pins.gpio4, pins.gpio5, &i2c_config)
        .context("failed to initialize sensor i2c bus")?;

    let uplink = if runtime.telemetry.enabled {
        let network = EspNetworkLink::start(modem, sys_loop, nvs_partition, &runtime.network)
            .context("wifi startup failed")?;
        let mut sink = TelemetrySink::new(
            InfluxWriter::new(&runtime.telemetry),
            runtime.telemetry.measurement.clone(),
        );
        sink.add_tag("device", runtime.telemetry.device.clone());
        Some(Uplink { network, sink })
    } else {
        info!("telemetry disabled; running display-only");
        None
    };

    let mut control = ControlLoop::new(
        EspScd4x {
            inner: Scd4x::new(i2c, Ets),
        },
        indicator,
        UartDisplayLink { uart },
        uplink,
        runtime.indicator.clone(),
        runtime.cadence.clone(),
    );
    let mut ctx = CycleContext::default();

    control.start_sensor(&mut ctx);

    // Kept alive for the program lifetime.
    let mut _sntp = None;
    if runtime.telemetry.enabled {
        control.notice("Connecting to wifi");
        if let Some(uplink) = control.uplink_mut() {
            uplink.network.associate(runtime.cadence.association_poll_ms);
        }

        let time_synced = match sync_time(&runtime.telemetry) {
            Ok(sntp) => {
                _sntp = Some(sntp);
                true
            }
            Err(err) => {
                warn!("time sync failed: {err:#}");
                false
            }
        };
        control.start_uplink(&mut ctx, &runtime.network.wifi_ssid, time_synced);
        let wait_s = runtime.cadence.first_measurement_wait_ms / 1_000;
        control.notice(&format!("Waiting for first measurement... ({wait_s} sec)"));
    }

    let started = Instant::now();
    let tick = Duration::from_millis(runtime.cadence.tick_interval_ms);
    loop {
        let now_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        let _ = control.tick(&mut ctx, now_ms);
        thread::sleep(tick);
    }
}

fn build_runtime_config() -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime.network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or_default().to_string();
    runtime.network.wifi_pass = option_env!("WIFI_PASSWORD").unwrap_or_default().to_string();
    if let Some(url) = option_env!("INFLUXDB_URL") {
        runtime.telemetry.url = url.to_string();
    }
    runtime.telemetry.org = option_env!("INFLUXDB_ORG").unwrap_or_default().to_string();
    if let Some(bucket) = option_env!("INFLUXDB_BUCKET") {
        runtime.telemetry.bucket = bucket.to_string();
    }
    runtime.telemetry.token = option_env!("INFLUXDB_TOKEN").unwrap_or_default().to_string();
    runtime.telemetry.enabled = option_env!("MONITOR_ONLY").is_none();
    runtime.sanitize();
    runtime
}

fn sync_time(telemetry: &TelemetryConfig) -> anyhow::Result<EspSntp<'static>> {
    std::env::set_var("TZ", &telemetry.tz_info);

    let mut conf = SntpConf::default();
    for (slot, server) in conf.servers.iter_mut().zip(&telemetry.ntp_servers) {
        *slot = server.as_str();
    }
    let sntp = EspSntp::new(&conf)?;

    let deadline = Instant::now() + SNTP_TIMEOUT;
    while sntp.get_sync_status() != SyncStatus::Completed {
        if Instant::now() >= deadline {
            return Err(anyhow!("sntp sync did not complete within {SNTP_TIMEOUT:?}"));
        }
        thread::sleep(Duration::from_millis(500));
    }
    info!("time synchronized via {:?}", telemetry.ntp_servers);
    Ok(sntp)
}

struct EspScd4x {
    inner: Scd4x<I2cDriver<'static>, Ets>,
}

impl GasSensor for EspScd4x {
    fn stop_periodic_measurement(&mut self) -> Result<(), ErrorCode> {
        self.inner.stop_periodic_measurement().map_err(error_code)
    }

    fn serial_number(&mut self) -> Result<[u16; 3], ErrorCode> {
        let serial = self.inner.serial_number().map_err(error_code)?;
        Ok([(serial >> 32) as u16, (serial >> 16) as u16, serial as u16])
    }

    fn start_periodic_measurement(&mut self) -> Result<(), ErrorCode> {
        self.inner.start_periodic_measurement().map_err(error_code)
    }

    fn data_ready(&mut self) -> Result<bool, ErrorCode> {
        self.inner.data_ready_status().map_err(error_code)
    }

    fn read_measurement(&mut self) -> Result<(u16, f32, f32), ErrorCode> {
        let data = self.inner.measurement().map_err(error_code)?;
        Ok((data.co2, data.temperature, data.humidity))
    }
}

fn error_code<E: core::fmt::Debug>(err: scd4x::Error<E>) -> ErrorCode {
    match err {
        scd4x::Error::I2c(inner) => {
            warn!("scd4x i2c error: {inner:?}");
            ErrorCode::BUS
        }
        scd4x::Error::Crc => ErrorCode(0x0103),
        other => {
            warn!("scd4x error: {other:?}");
            ErrorCode(0x01ff)
        }
    }
}

struct LedIndicator {
    pin: PinDriver<'static, AnyOutputPin, Output>,
    active_low: bool,
}

impl LedIndicator {
    fn new(pin: AnyOutputPin, active_low: bool) -> anyhow::Result<Self> {
        let pin = PinDriver::output(pin)?;
        Ok(Self { pin, active_low })
    }
}

impl IndicatorOutput for LedIndicator {
    fn set_active(&mut self, active: bool) {
        let result = if active != self.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(err) = result {
            warn!("failed to drive indicator LED: {err:?}");
        }
    }
}

struct UartDisplayLink {
    uart: UartDriver<'static>,
}

impl DisplayLink for UartDisplayLink {
    fn send(&mut self, frame: &DisplayFrame) -> io::Result<()> {
        let mut remaining = frame.as_bytes();
        while !remaining.is_empty() {
            let written = self.uart.write(remaining).map_err(io::Error::other)?;
            remaining = &remaining[written..];
        }
        Ok(())
    }
}

struct EspNetworkLink {
    wifi: BlockingWifi<EspWifi<'static>>,
    ssid: String,
}

impl EspNetworkLink {
    fn start(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
        network: &NetworkConfig,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

        let auth_method = if network.wifi_pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: network
                .wifi_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi ssid too long"))?,
            password: network
                .wifi_pass
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi password too long"))?,
            auth_method,
            ..Default::default()
        }))?;
        wifi.start()?;

        Ok(Self {
            wifi,
            ssid: network.wifi_ssid.clone(),
        })
    }

    /// Blocks until the station is associated and has an address.
    fn associate(&mut self, poll_ms: u64) {
        info!("wifi started, connecting to `{}`", self.ssid);
        let mut attempt = 0_u32;
        loop {
            attempt = attempt.saturating_add(1);
            match self.wifi.connect().and_then(|()| self.wifi.wait_netif_up()) {
                Ok(()) => {
                    info!("wifi connected and netif up on attempt {attempt}");
                    return;
                }
                Err(err) => {
                    warn!("wifi connect attempt {attempt} failed: {err:?}");
                    let _ = self.wifi.disconnect();
                    thread::sleep(Duration::from_millis(poll_ms));
                }
            }
        }
    }
}

impl NetworkLink for EspNetworkLink {
    fn status(&mut self) -> LinkStatus {
        if matches!(self.wifi.is_connected(), Ok(true)) {
            return LinkStatus::Connected;
        }

        // Non-blocking; the next cycle sees the outcome.
        if let Err(err) = self.wifi.wifi_mut().connect() {
            warn!("wifi reconnect request failed: {err:?}");
        }
        LinkStatus::Disconnected
    }
}

struct InfluxWriter {
    url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxWriter {
    fn new(telemetry: &TelemetryConfig) -> Self {
        Self {
            url: telemetry.url.trim_end_matches('/').to_string(),
            org: telemetry.org.clone(),
            bucket: telemetry.bucket.clone(),
            token: telemetry.token.clone(),
        }
    }

    fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Result<(), UploadError> {
        let http_conf = HttpClientConfiguration {
            timeout: Some(HTTP_TIMEOUT),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&http_conf).map_err(unreachable)?;
        let mut client = HttpClient::wrap(connection);

        let mut request = client.request(method, url, headers).map_err(unreachable)?;
        if let Some(body) = body {
            request.write_all(body).map_err(unreachable)?;
            request.flush().map_err(unreachable)?;
        }
        let mut response = request.submit().map_err(unreachable)?;

        let status = response.status();
        if (200..300).contains(&status) {
            return Ok(());
        }

        let mut buffer = [0_u8; 256];
        let read = response.read(&mut buffer).unwrap_or(0);
        Err(UploadError::Rejected {
            status,
            message: String::from_utf8_lossy(&buffer[..read]).into_owned(),
        })
    }
}

impl PointWriter for InfluxWriter {
    fn validate_connection(&mut self) -> Result<(), UploadError> {
        let url = format!("{}/ping", self.url);
        self.send(Method::Get, &url, &[], None)
    }

    fn server_url(&self) -> String {
        self.url.clone()
    }

    fn write_point(&mut self, point: &Point) -> Result<(), UploadError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|elapsed| i64::try_from(elapsed.as_secs()).ok());
        let body = point.to_line_protocol(timestamp);

        let url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=s",
            self.url, self.org, self.bucket
        );
        let authorization = format!("Token {}", self.token);
        let content_length = body.len().to_string();
        let headers = [
            ("Authorization", authorization.as_str()),
            ("Content-Type", "text/plain; charset=utf-8"),
            ("Content-Length", content_length.as_str()),
        ];
        self.send(Method::Post, &url, &headers, Some(body.as_bytes()))
    }
}

fn unreachable<E: core::fmt::Debug>(err: E) -> UploadError {
    UploadError::Unreachable(format!("{err:?}"))
}
