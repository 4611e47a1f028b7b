use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndicatorConfig {
    pub active_low: bool,
    pub pulse_on_ms: u32,
    pub pulse_off_ms: u32,
    pub digit_gap_ms: u32,
    pub cycle_gap_ms: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            active_low: true,
            pulse_on_ms: 200,
            pulse_off_ms: 800,
            digit_gap_ms: 200,
            cycle_gap_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayLinkConfig {
    pub baud_rate: u32,
}

impl Default for DisplayLinkConfig {
    fn default() -> Self {
        Self { baud_rate: 9_600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorBusConfig {
    pub frequency_hz: u32,
}

impl Default for SensorBusConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopConfig {
    pub tick_interval_ms: u64,
    pub upload_interval_ms: u64,
    pub first_measurement_wait_ms: u64,
    pub association_poll_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            upload_interval_ms: 30_000,
            first_measurement_wait_ms: 5_000,
            association_poll_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub measurement: String,
    pub device: String,
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub ntp_servers: Vec<String>,
    pub tz_info: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            measurement: "environment".to_string(),
            device: "ESP8266-BUSSIGN".to_string(),
            url: "https://eu-central-1-1.aws.cloud2.influxdata.com".to_string(),
            org: String::new(),
            bucket: "environment".to_string(),
            token: String::new(),
            ntp_servers: vec!["pool.ntp.org".to_string(), "time.nis.gov".to_string()],
            tz_info: "UTC0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub indicator: IndicatorConfig,
    pub display: DisplayLinkConfig,
    pub sensor_bus: SensorBusConfig,
    #[serde(rename = "loop")]
    pub cadence: LoopConfig,
    pub telemetry: TelemetryConfig,
    pub network: NetworkConfig,
}

impl IndicatorConfig {
    pub fn sanitize(&mut self) {
        self.pulse_on_ms = self.pulse_on_ms.clamp(20, 5_000);
        self.pulse_off_ms = self.pulse_off_ms.clamp(20, 5_000);
        self.digit_gap_ms = self.digit_gap_ms.min(10_000);
        self.cycle_gap_ms = self.cycle_gap_ms.clamp(100, 60_000);
    }
}

impl LoopConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(1, 1_000);
        self.upload_interval_ms = self.upload_interval_ms.max(1_000);
        self.association_poll_ms = self.association_poll_ms.clamp(10, 5_000);
    }
}

impl TelemetryConfig {
    pub fn sanitize(&mut self) {
        if self.measurement.trim().is_empty() {
            self.measurement = "environment".to_string();
        }
        if self.device.trim().is_empty() {
            self.device = "ESP8266-BUSSIGN".to_string();
        }
        self.ntp_servers.retain(|server| !server.trim().is_empty());
        if self.ntp_servers.is_empty() {
            self.ntp_servers.push("pool.ntp.org".to_string());
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.indicator.sanitize();
        self.cadence.sanitize();
        self.telemetry.sanitize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_the_shipped_firmware() {
        let config = RuntimeConfig::default();

        assert_eq!(config.indicator.pulse_on_ms, 200);
        assert_eq!(config.indicator.pulse_off_ms, 800);
        assert_eq!(config.indicator.digit_gap_ms, 200);
        assert_eq!(config.indicator.cycle_gap_ms, 1_500);
        assert_eq!(config.display.baud_rate, 9_600);
        assert_eq!(config.cadence.upload_interval_ms, 30_000);
        assert_eq!(config.telemetry.measurement, "environment");
    }

    #[test]
    fn sanitize_clamps_degenerate_values() {
        let mut config = RuntimeConfig::default();
        config.indicator.pulse_on_ms = 0;
        config.cadence.upload_interval_ms = 10;
        config.cadence.tick_interval_ms = 0;
        config.telemetry.measurement = "  ".to_string();
        config.telemetry.ntp_servers = vec![String::new()];

        config.sanitize();

        assert_eq!(config.indicator.pulse_on_ms, 20);
        assert_eq!(config.cadence.upload_interval_ms, 1_000);
        assert_eq!(config.cadence.tick_interval_ms, 1);
        assert_eq!(config.telemetry.measurement, "environment");
        assert_eq!(config.telemetry.ntp_servers, vec!["pool.ntp.org".to_string()]);
    }

    #[test]
    fn config_serializes_loop_section_by_name() {
        let json = serde_json::to_value(RuntimeConfig::default()).unwrap();

        assert_eq!(json["loop"]["upload_interval_ms"], 30_000);
    }

    #[test]
    fn hardware_sections_carry_only_bus_settings() {
        let json = serde_json::to_value(RuntimeConfig::default()).unwrap();

        assert_eq!(json["display"], serde_json::json!({ "baud_rate": 9_600 }));
        assert_eq!(
            json["sensor_bus"],
            serde_json::json!({ "frequency_hz": 100_000 })
        );
        assert!(json["indicator"].get("pin").is_none());
    }
}
