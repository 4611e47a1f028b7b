pub const TOPIC_MONITOR_STATUS: &str = "co2monitor/status";
pub const TOPIC_MONITOR_HEALTH: &str = "co2monitor/health";
pub const TOPIC_TELEMETRY: &str = "co2monitor/telemetry";
