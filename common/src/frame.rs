use core::fmt::Write;

use crate::types::Reading;

pub const FRAME_TERMINATOR: u8 = 0;
pub const ERROR_MARKER: &str = "  E";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame(Vec<u8>);

impl DisplayFrame {
    pub fn status(reading: &Reading, any_error: bool) -> Self {
        let mut text = String::with_capacity(64);
        let _ = write!(text, "CO2: {} ppm", reading.co2);
        if any_error {
            text.push_str(ERROR_MARKER);
        }
        let _ = write!(
            text,
            "\ntemp {:.2} deg C\nhumidity {:.2} %",
            reading.temperature, reading.humidity
        );
        Self::terminated(text.into_bytes())
    }

    pub fn notice(text: &str) -> Self {
        let bytes = text
            .bytes()
            .filter(|byte| *byte != FRAME_TERMINATOR)
            .collect();
        Self::terminated(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn text(&self) -> &[u8] {
        &self.0[..self.0.len() - 1]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    fn terminated(mut bytes: Vec<u8>) -> Self {
        bytes.push(FRAME_TERMINATOR);
        Self(bytes)
    }
}
