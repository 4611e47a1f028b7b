use core::fmt::{self, Write};

use log::{info, warn};

use crate::error::UploadError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f32),
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}i"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(existing, _)| *existing == key) {
            Some(tag) => tag.1 = value,
            None => self.tags.push((key, value)),
        }
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some(field) => field.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn clear_fields(&mut self) {
        self.fields.clear();
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<FieldValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| *value)
    }

    pub fn to_line_protocol(&self, timestamp: Option<i64>) -> String {
        let mut line = String::with_capacity(128);
        escape_into(&mut line, &self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }
        for (index, (key, value)) in self.fields.iter().enumerate() {
            line.push(if index == 0 { ' ' } else { ',' });
            escape_into(&mut line, key, &[',', '=', ' ']);
            let _ = write!(line, "={value}");
        }
        if let Some(timestamp) = timestamp {
            let _ = write!(line, " {timestamp}");
        }
        line
    }
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for ch in raw.chars() {
        if ch == '\\' || special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}

pub trait PointWriter {
    fn validate_connection(&mut self) -> Result<(), UploadError> {
        Ok(())
    }

    fn server_url(&self) -> String;

    fn write_point(&mut self, point: &Point) -> Result<(), UploadError>;
}

// Fields are dropped if the write fails; nothing is retried.
pub struct TelemetrySink<W> {
    writer: W,
    point: Point,
    time_synced: bool,
}

impl<W: PointWriter> TelemetrySink<W> {
    pub fn new(writer: W, measurement: impl Into<String>) -> Self {
        Self {
            writer,
            point: Point::new(measurement),
            time_synced: false,
        }
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.point.add_tag(key, value);
    }

    pub fn mark_time_synced(&mut self) {
        self.time_synced = true;
    }

    pub fn is_time_synced(&self) -> bool {
        self.time_synced
    }

    pub fn validate_connection(&mut self) -> Result<(), UploadError> {
        self.writer.validate_connection()
    }

    pub fn server_url(&self) -> String {
        self.writer.server_url()
    }

    pub fn begin_point(&mut self) {
        self.point.clear_fields();
    }

    pub fn set_field(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.point.add_field(key, value);
    }

    pub fn upload(&mut self) -> Result<(), UploadError> {
        let result = if self.time_synced {
            info!("Writing: {}", self.point.to_line_protocol(None));
            self.writer.write_point(&self.point)
        } else {
            Err(UploadError::ClockNotSynced)
        };

        match &result {
            Ok(()) => info!("telemetry write success"),
            Err(err) => {
                warn!("telemetry write failed: {err}");
                self.point.clear_fields();
            }
        }
        result
    }

    pub fn point(&self) -> &Point {
        &self.point
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct ScriptedWriter {
        fail_next: bool,
        written: Vec<Point>,
    }

    impl PointWriter for ScriptedWriter {
        fn server_url(&self) -> String {
            "memory://".to_string()
        }

        fn write_point(&mut self, point: &Point) -> Result<(), UploadError> {
            if std::mem::take(&mut self.fail_next) {
                return Err(UploadError::Unreachable("connection reset".to_string()));
            }
            self.written.push(point.clone());
            Ok(())
        }
    }

    fn synced_sink() -> TelemetrySink<ScriptedWriter> {
        let mut sink = TelemetrySink::new(ScriptedWriter::default(), "environment");
        sink.add_tag("device", "ESP8266-BUSSIGN");
        sink.mark_time_synced();
        sink
    }

    #[test]
    fn line_protocol_renders_tags_fields_and_timestamp() {
        let mut point = Point::new("environment");
        point.add_tag("device", "ESP8266-BUSSIGN");
        point.add_tag("SSID", "home net");
        point.add_field("co2", 450_u16);
        point.add_field("temperature", 21.0_f32);
        point.add_field("humidity", 40.5_f32);

        assert_eq!(
            point.to_line_protocol(Some(1_750_000_000)),
            "environment,device=ESP8266-BUSSIGN,SSID=home\\ net co2=450i,temperature=21,humidity=40.5 1750000000"
        );
    }

    #[test]
    fn line_protocol_escapes_special_characters() {
        let mut point = Point::new("env,room 1");
        point.add_tag("a=b", "c,d");
        point.add_field("x y", 1_u16);

        assert_eq!(
            point.to_line_protocol(None),
            "env\\,room\\ 1,a\\=b=c\\,d x\\ y=1i"
        );
    }

    #[test]
    fn upload_requires_time_sync() {
        let mut sink = TelemetrySink::new(ScriptedWriter::default(), "environment");
        sink.begin_point();
        sink.set_field("co2", 450_u16);

        assert_eq!(sink.upload(), Err(UploadError::ClockNotSynced));
        assert!(sink.writer().written.is_empty());
        assert!(sink.point().fields().is_empty());
    }

    #[test]
    fn failed_upload_discards_fields_and_keeps_tags() {
        let mut sink = synced_sink();
        sink.writer_mut().fail_next = true;
        sink.begin_point();
        sink.set_field("co2", 450_u16);

        assert!(sink.upload().is_err());
        assert!(sink.point().fields().is_empty());
        assert_eq!(sink.point().tags().len(), 1);

        sink.begin_point();
        sink.set_field("co2", 460_u16);
        assert_eq!(sink.upload(), Ok(()));
        assert_eq!(
            sink.writer().written[0].fields(),
            &[("co2".to_string(), FieldValue::Integer(460))]
        );
    }

    #[test]
    fn begin_point_clears_previous_fields() {
        let mut sink = synced_sink();
        sink.begin_point();
        sink.set_field("co2", 450_u16);
        sink.set_field("stale", 1.0_f32);
        sink.upload().unwrap();

        sink.begin_point();
        sink.set_field("co2", 470_u16);

        assert_eq!(sink.point().field("stale"), None);
        assert_eq!(sink.point().field("co2"), Some(FieldValue::Integer(470)));
    }
}
