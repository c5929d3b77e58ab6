//! Form-encoded wire body for a location event
//!
//! Field order is fixed: latitude, longitude, timestamp, accuracy, speed,
//! bearing, deviceId, appName. Keys and values are percent-encoded
//! independently, so the output never contains a raw `&`, `=` or newline
//! from a field value. The queue stores these strings verbatim.

use std::fmt;

use crate::location::LocationEvent;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireRecord(String);

impl WireRecord {
    /// Wrap a line read back from the queue
    pub(crate) fn from_stored(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for WireRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn encode(event: &LocationEvent) -> WireRecord {
    let fields = [
        ("latitude", number(event.latitude)),
        ("longitude", number(event.longitude)),
        ("timestamp", event.timestamp.clone()),
        ("accuracy", number(event.accuracy)),
        ("speed", number(event.speed)),
        ("bearing", number(event.bearing)),
        ("deviceId", event.device_id.clone()),
        ("appName", event.app_tag.clone()),
    ];

    let mut body = String::with_capacity(160);
    for (idx, (key, value)) in fields.iter().enumerate() {
        if idx > 0 {
            body.push('&');
        }
        body.push_str(&urlencoding::encode(key));
        body.push('=');
        body.push_str(&urlencoding::encode(value));
    }
    WireRecord(body)
}

/// Locale-free float text that always keeps a fractional part (`5.0`, not `5`)
fn number<T: fmt::Debug>(value: T) -> String {
    format!("{:?}", value)
}
