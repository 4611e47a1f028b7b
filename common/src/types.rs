use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub co2: u16,
    pub temperature: f32,
    pub humidity: f32,
}

impl Reading {
    pub fn is_valid(&self) -> bool {
        self.co2 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    #[serde(rename = "sensorError")]
    pub sensor_error: Option<String>,
    #[serde(rename = "networkError")]
    pub network_error: Option<String>,
    #[serde(rename = "telemetryError")]
    pub telemetry_error: Option<String>,
    #[serde(rename = "anyError")]
    pub any_error: bool,
    #[serde(rename = "indicatorTarget")]
    pub indicator_target: u16,
    #[serde(rename = "lastCo2")]
    pub last_co2: Option<u16>,
}
