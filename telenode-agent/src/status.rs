//! Status page content
//!
//! The sampler keeps one [`StatusPage`] and publishes its rendering after
//! every tick. Failed reads only set the error line; the values stay at the
//! last successful decode.

use std::fmt::Write;

use telenode_core::{DecodeError, Reading};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusPage {
    device_id: String,
    temperature: Option<f32>,
    humidity: Option<f32>,
    brightness: Option<u32>,
    last_error: Option<DecodeError>,
}

impl StatusPage {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            temperature: None,
            humidity: None,
            brightness: None,
            last_error: None,
        }
    }

    pub fn record_reading(&mut self, reading: &Reading) {
        self.temperature = Some(reading.temperature_c());
        self.humidity = Some(reading.humidity_pct());
        self.last_error = None;
    }

    pub fn record_error(&mut self, error: DecodeError) {
        self.last_error = Some(error);
    }

    pub fn record_brightness(&mut self, lux: u32) {
        self.brightness = Some(lux);
    }

    pub fn last_error(&self) -> Option<DecodeError> {
        self.last_error
    }

    pub fn render(&self) -> String {
        let mut html = String::with_capacity(256);
        let _ = write!(
            html,
            "<html><body><h1>Telemetry node {}</h1>",
            escape(&self.device_id)
        );
        let _ = write!(html, "<p>Temperature: {}</p>", tenths(self.temperature));
        let _ = write!(html, "<p>Humidity: {}</p>", tenths(self.humidity));
        match self.brightness {
            Some(lux) => {
                let _ = write!(html, "<p>Brightness: {}</p>", lux);
            }
            None => html.push_str("<p>Brightness: -</p>"),
        }
        if let Some(error) = self.last_error {
            let _ = write!(html, "<p>Last error: {}</p>", error.kind());
        }
        html.push_str("</body></html>");
        html
    }
}

fn tenths(value: Option<f32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
