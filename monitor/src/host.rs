use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tracing::{debug, info, warn};

use co2_monitor_common::{
    ControlLoop, CycleContext, CycleOutcome, DisplayFrame, DisplayLink, ErrorCode, GasSensor,
    IndicatorOutput, LinkStatus, NetworkLink, Point, PointWriter, RuntimeConfig, TelemetrySink,
    Uplink, UploadError, TOPIC_MONITOR_HEALTH, TOPIC_MONITOR_STATUS, TOPIC_TELEMETRY,
};

/// Any wall clock earlier than this is treated as never having been set.
const MIN_SYNCED_EPOCH: i64 = 1_704_067_200;
const SENSOR_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

type HostLoop =
    ControlLoop<SimulatedScd4x, LogIndicator, FileDisplayLink, BrokerLink, MqttPointWriter>;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = RuntimeConfig::default();
    apply_env_overrides(&mut runtime);
    runtime.sanitize();

    let display = FileDisplayLink::open(std::env::var("DISPLAY_LINK_PATH").ok().as_deref())?;
    if display.file.is_some() {
        info!(
            "display link expects {} baud; configure the device node before starting",
            runtime.display.baud_rate
        );
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let broker = if runtime.telemetry.enabled {
        let mut mqtt_options = MqttOptions::new("co2-monitor-rust", mqtt_host.clone(), mqtt_port);
        if let Ok(user) = std::env::var("MQTT_USER") {
            let pass = std::env::var("MQTT_PASS").unwrap_or_default();
            mqtt_options.set_credentials(user, pass);
        }
        mqtt_options.set_last_will(rumqttc::LastWill::new(
            TOPIC_MONITOR_STATUS,
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 32);
        let connected = Arc::new(AtomicBool::new(false));
        spawn_mqtt_loop(eventloop, connected.clone());
        Some((mqtt, connected))
    } else {
        info!("telemetry disabled; running display-only");
        None
    };

    let uplink = broker.as_ref().map(|(mqtt, connected)| {
        let mut sink = TelemetrySink::new(
            MqttPointWriter {
                client: mqtt.clone(),
                connected: connected.clone(),
                server: format!("mqtt://{mqtt_host}:{mqtt_port}/{TOPIC_TELEMETRY}"),
            },
            runtime.telemetry.measurement.clone(),
        );
        sink.add_tag("device", runtime.telemetry.device.clone());
        Uplink {
            network: BrokerLink {
                connected: connected.clone(),
            },
            sink,
        }
    });

    let mut control: HostLoop = ControlLoop::new(
        SimulatedScd4x::new(),
        LogIndicator,
        display,
        uplink,
        runtime.indicator.clone(),
        runtime.cadence.clone(),
    );
    let mut ctx = CycleContext::default();

    control.start_sensor(&mut ctx);

    if let Some((mqtt, connected)) = &broker {
        control.notice("Connecting to wifi");
        wait_for_association(connected, runtime.cadence.association_poll_ms).await;

        mqtt.publish(TOPIC_MONITOR_STATUS, QoS::AtLeastOnce, true, "online")
            .await
            .context("failed to publish monitor online status")?;

        let ssid = std::env::var("WIFI_SSID").unwrap_or_else(|_| "host".to_string());
        control.start_uplink(&mut ctx, &ssid, host_clock_synced());
    }

    info!("monitor loop started");
    let mut interval =
        tokio::time::interval(Duration::from_millis(runtime.cadence.tick_interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                if let Some((mqtt, _)) = &broker {
                    let _ = mqtt
                        .publish(TOPIC_MONITOR_STATUS, QoS::AtLeastOnce, true, "offline")
                        .await;
                }
                return Ok(());
            }
        }

        let outcome = control.tick(&mut ctx, monotonic_ms());

        if let (CycleOutcome::Published { .. }, Some((mqtt, _))) = (&outcome, &broker) {
            match serde_json::to_vec(&ctx.snapshot()) {
                Ok(body) => {
                    if let Err(err) = mqtt
                        .publish(TOPIC_MONITOR_HEALTH, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("health publish failed: {err}");
                    }
                }
                Err(err) => warn!("health serialization failed: {err}"),
            }
        }
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Ok(device) = std::env::var("DEVICE_NAME") {
        runtime.telemetry.device = device;
    }
    if let Some(enabled) = std::env::var("TELEMETRY_ENABLED")
        .ok()
        .and_then(|value| value.parse::<bool>().ok())
    {
        runtime.telemetry.enabled = enabled;
    }
}

fn spawn_mqtt_loop(mut eventloop: rumqttc::EventLoop, connected: Arc<AtomicBool>) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    connected.store(true, Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(err) => {
                    if connected.swap(false, Ordering::Relaxed) {
                        warn!("mqtt connection lost: {err}");
                    } else {
                        warn!("mqtt poll error: {err}");
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn wait_for_association(connected: &AtomicBool, poll_ms: u64) {
    let mut waited_ms = 0_u64;
    while !connected.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
        waited_ms = waited_ms.saturating_add(poll_ms);
        if waited_ms % 5_000 < poll_ms {
            info!("still waiting for broker after {}s", waited_ms / 1_000);
        }
    }
}

fn host_clock_synced() -> bool {
    chrono::Utc::now().timestamp() >= MIN_SYNCED_EPOCH
}

/// Stand-in for the SCD4x: a new sample every five seconds.
struct SimulatedScd4x {
    started_at: Option<Instant>,
    samples_taken: u64,
}

impl SimulatedScd4x {
    fn new() -> Self {
        Self {
            started_at: None,
            samples_taken: 0,
        }
    }

    fn samples_available(&self) -> u64 {
        self.started_at
            .map(|start| start.elapsed().as_secs() / SENSOR_SAMPLE_INTERVAL.as_secs())
            .unwrap_or(0)
    }
}

impl GasSensor for SimulatedScd4x {
    fn stop_periodic_measurement(&mut self) -> Result<(), ErrorCode> {
        self.started_at = None;
        Ok(())
    }

    fn serial_number(&mut self) -> Result<[u16; 3], ErrorCode> {
        Ok([0x5c1d, 0x0a3f, 0x3b07])
    }

    fn start_periodic_measurement(&mut self) -> Result<(), ErrorCode> {
        self.started_at = Some(Instant::now());
        self.samples_taken = 0;
        Ok(())
    }

    fn data_ready(&mut self) -> Result<bool, ErrorCode> {
        Ok(self.samples_available() > self.samples_taken)
    }

    fn read_measurement(&mut self) -> Result<(u16, f32, f32), ErrorCode> {
        if self.started_at.is_none() {
            return Err(ErrorCode(0x0104));
        }
        self.samples_taken = self.samples_available();

        // Hardware integration point:
        // replace these simulated readings with the SCD4x driver on the ESP target.
        let tick = self.samples_taken;
        let co2 = 420 + ((tick % 12) as u16 * 35);
        let temperature = 20.5 + ((tick % 8) as f32 * 0.25);
        let humidity = 41.0 + ((tick % 6) as f32 * 0.75);
        Ok((co2, temperature, humidity))
    }
}

struct LogIndicator;

impl IndicatorOutput for LogIndicator {
    fn set_active(&mut self, active: bool) {
        debug!("indicator {}", if active { "on" } else { "off" });
    }
}

struct FileDisplayLink {
    file: Option<File>,
}

impl FileDisplayLink {
    fn open(path: Option<&str>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => Some(
                OpenOptions::new()
                    .write(true)
                    .append(true)
                    .create(true)
                    .open(path)
                    .with_context(|| format!("failed to open display link at {path}"))?,
            ),
            None => None,
        };
        Ok(Self { file })
    }
}

impl DisplayLink for FileDisplayLink {
    fn send(&mut self, frame: &DisplayFrame) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(frame.as_bytes())?;
                file.flush()
            }
            None => {
                info!("[display] {}", String::from_utf8_lossy(frame.text()));
                Ok(())
            }
        }
    }
}

struct BrokerLink {
    connected: Arc<AtomicBool>,
}

impl NetworkLink for BrokerLink {
    fn status(&mut self) -> LinkStatus {
        if self.connected.load(Ordering::Relaxed) {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        }
    }
}

/// Publishes line protocol for a broker-side bridge into the time-series store.
struct MqttPointWriter {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    server: String,
}

impl PointWriter for MqttPointWriter {
    fn validate_connection(&mut self) -> Result<(), UploadError> {
        if self.connected.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(UploadError::Unreachable("broker not connected".to_string()))
        }
    }

    fn server_url(&self) -> String {
        self.server.clone()
    }

    fn write_point(&mut self, point: &Point) -> Result<(), UploadError> {
        self.validate_connection()?;
        let line = point.to_line_protocol(Some(chrono::Utc::now().timestamp()));
        self.client
            .try_publish(TOPIC_TELEMETRY, QoS::AtLeastOnce, false, line)
            .map_err(|err| UploadError::Unreachable(err.to_string()))
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
