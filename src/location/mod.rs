//! Location sampling
//!
//! A `LocationSource` produces raw `Fix`es on its own task. Each fix that
//! passes the displacement filter is stamped with the device id and app
//! tag and handed to the delivery worker as a `LocationEvent`. The
//! producer only enqueues; it never waits on the network.
//!
//! Sources:
//! - `simulated`: deterministic walk around a configured origin
//! - `replay`: JSON-lines file of recorded fixes

pub mod replay;
pub mod simulated;

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::delivery::WorkerHandle;
use crate::error::SourceError;

pub use replay::ReplaySource;
pub use simulated::SimulatedSource;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One raw reading from a location source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub accuracy: f32,
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub bearing: f32,
}

/// A location sample ready for delivery. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    pub latitude: f64,
    pub longitude: f64,
    /// ISO-8601 UTC with millisecond precision, e.g. `2026-10-19T08:30:00.000Z`
    pub timestamp: String,
    pub accuracy: f32,
    pub speed: f32,
    pub bearing: f32,
    pub device_id: String,
    pub app_tag: String,
}

impl LocationEvent {
    pub fn from_fix(fix: &Fix, device_id: &str, app_tag: &str) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp: fix.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            accuracy: fix.accuracy,
            speed: fix.speed,
            bearing: fix.bearing,
            device_id: device_id.to_string(),
            app_tag: app_tag.to_string(),
        }
    }
}

/// Parameters handed to a source when subscribing
#[derive(Debug, Clone, Copy)]
pub struct LocationRequest {
    pub interval: Duration,
    pub min_displacement_m: f64,
}

/// A running subscription; cancel stops sampling immediately.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn cancel(self) {
        self.task.abort();
    }

    /// Cancel and wait until the sampling task is gone, so no further
    /// fixes can reach the worker.
    pub async fn cancel_and_wait(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Platform location API abstraction
pub trait LocationSource: Send {
    fn name(&self) -> &str;

    /// Fails with `SourceError::PermissionDenied` when sampling is not allowed.
    fn check_permission(&self) -> Result<(), SourceError>;

    /// Begin producing fixes into `sink` on a background task.
    fn start(&mut self, request: LocationRequest, sink: FixSink)
        -> Result<Subscription, SourceError>;
}

/// Producer-side adapter between a source and the delivery worker
pub struct FixSink {
    worker: WorkerHandle,
    device_id: String,
    app_tag: String,
    filter: DisplacementFilter,
}

impl FixSink {
    pub fn new(
        worker: WorkerHandle,
        device_id: String,
        app_tag: String,
        min_displacement_m: f64,
    ) -> Self {
        Self {
            worker,
            device_id,
            app_tag,
            filter: DisplacementFilter::new(min_displacement_m),
        }
    }

    /// Forward a fix to the worker. Returns false once the worker is gone.
    pub fn deliver(&mut self, fix: Fix) -> bool {
        if !self.filter.accept(&fix) {
            debug!(
                "Fix {:.6},{:.6} within displacement threshold, skipped",
                fix.latitude, fix.longitude
            );
            return true;
        }
        debug!(
            "Location: {:.6}, {:.6} acc={}",
            fix.latitude, fix.longitude, fix.accuracy
        );
        let event = LocationEvent::from_fix(&fix, &self.device_id, &self.app_tag);
        self.worker.submit(event)
    }
}

/// Drops fixes closer than `min_m` to the last accepted one
#[derive(Debug, Clone)]
pub struct DisplacementFilter {
    min_m: f64,
    last: Option<(f64, f64)>,
}

impl DisplacementFilter {
    pub fn new(min_m: f64) -> Self {
        Self { min_m, last: None }
    }

    pub fn accept(&mut self, fix: &Fix) -> bool {
        if let Some((lat, lon)) = self.last {
            if self.min_m > 0.0 && distance_m(lat, lon, fix.latitude, fix.longitude) < self.min_m {
                return false;
            }
        }
        self.last = Some((fix.latitude, fix.longitude));
        true
    }
}

/// Great-circle distance in meters (haversine)
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fix(lat: f64, lon: f64) -> Fix {
        Fix {
            latitude: lat,
            longitude: lon,
            time: Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap(),
            accuracy: 5.0,
            speed: 0.0,
            bearing: 0.0,
        }
    }

    #[test]
    fn test_event_timestamp_has_millis() {
        let event = LocationEvent::from_fix(&fix(47.6062, -122.3321), "device_abc123", "X");
        assert_eq!(event.timestamp, "2026-10-19T08:30:00.000Z");
        assert_eq!(event.device_id, "device_abc123");
        assert_eq!(event.app_tag, "X");
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let d = distance_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_displacement_filter() {
        let mut filter = DisplacementFilter::new(5.0);
        assert!(filter.accept(&fix(47.6062, -122.3321)));
        // ~1 m north
        assert!(!filter.accept(&fix(47.60621, -122.3321)));
        // ~11 m north
        assert!(filter.accept(&fix(47.6063, -122.3321)));
    }

    #[test]
    fn test_zero_displacement_accepts_everything() {
        let mut filter = DisplacementFilter::new(0.0);
        assert!(filter.accept(&fix(1.0, 1.0)));
        assert!(filter.accept(&fix(1.0, 1.0)));
    }

    #[test]
    fn test_fix_deserialize_defaults() {
        let fix: Fix = serde_json::from_str(r#"{"latitude": 1.5, "longitude": 2.5}"#).unwrap();
        assert_eq!(fix.latitude, 1.5);
        assert_eq!(fix.accuracy, 0.0);
    }
}
