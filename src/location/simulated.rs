//! Simulated location source
//!
//! Walks a fixed circle around an origin so the pipeline can run without
//! hardware. Useful for soak-testing delivery and the offline queue.

use std::f64::consts::PI;

use chrono::Utc;
use tracing::info;

use super::{Fix, FixSink, LocationRequest, LocationSource, Subscription, EARTH_RADIUS_M};
use crate::error::SourceError;

/// Circle radius in meters
const RADIUS_M: f64 = 100.0;
/// Points per lap
const STEPS_PER_LAP: u32 = 36;

pub struct SimulatedSource {
    origin_lat: f64,
    origin_lon: f64,
}

impl SimulatedSource {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
        }
    }

    /// Position on the circle for step `n`
    fn fix_at(&self, n: u32, interval_secs: f64) -> Fix {
        let theta = 2.0 * PI * f64::from(n % STEPS_PER_LAP) / f64::from(STEPS_PER_LAP);
        let d_lat = (RADIUS_M * theta.cos() / EARTH_RADIUS_M).to_degrees();
        let d_lon = (RADIUS_M * theta.sin()
            / (EARTH_RADIUS_M * self.origin_lat.to_radians().cos()))
        .to_degrees();

        let step_m = 2.0 * PI * RADIUS_M / f64::from(STEPS_PER_LAP);
        let speed = if interval_secs > 0.0 {
            step_m / interval_secs
        } else {
            0.0
        };
        // travelling clockwise: heading is 90 degrees ahead of the radial angle
        let bearing = (theta.to_degrees() + 90.0) % 360.0;

        Fix {
            latitude: self.origin_lat + d_lat,
            longitude: self.origin_lon + d_lon,
            time: Utc::now(),
            accuracy: 5.0,
            speed: speed as f32,
            bearing: bearing as f32,
        }
    }
}

impl LocationSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn check_permission(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn start(
        &mut self,
        request: LocationRequest,
        mut sink: FixSink,
    ) -> Result<Subscription, SourceError> {
        let source = SimulatedSource::new(self.origin_lat, self.origin_lon);
        info!(
            "Simulated source around {:.4},{:.4} every {:?}",
            self.origin_lat, self.origin_lon, request.interval
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(request.interval);
            let mut step = 0u32;
            loop {
                ticker.tick().await;
                let fix = source.fix_at(step, request.interval.as_secs_f64());
                step = step.wrapping_add(1);
                if !sink.deliver(fix) {
                    info!("Delivery worker gone, simulated source stopping");
                    break;
                }
            }
        });

        Ok(Subscription::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::distance_m;

    #[test]
    fn test_points_stay_on_circle() {
        let source = SimulatedSource::new(47.6062, -122.3321);
        for n in 0..STEPS_PER_LAP {
            let fix = source.fix_at(n, 30.0);
            let d = distance_m(47.6062, -122.3321, fix.latitude, fix.longitude);
            assert!((d - RADIUS_M).abs() < 0.5, "step {} at {} m", n, d);
        }
    }

    #[test]
    fn test_consecutive_points_exceed_default_displacement() {
        let source = SimulatedSource::new(47.6062, -122.3321);
        let a = source.fix_at(0, 30.0);
        let b = source.fix_at(1, 30.0);
        assert!(distance_m(a.latitude, a.longitude, b.latitude, b.longitude) > 5.0);
    }

    #[test]
    fn test_speed_from_interval() {
        let source = SimulatedSource::new(0.0, 0.0);
        let fix = source.fix_at(0, 30.0);
        let expected = (2.0 * PI * RADIUS_M / f64::from(STEPS_PER_LAP) / 30.0) as f32;
        assert!((fix.speed - expected).abs() < 1e-4);
    }
}
