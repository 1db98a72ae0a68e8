//! Derived metrics computed from the GPS stream: instantaneous speed and
//! finish-line lap detection.

use model::*;
use serde::Serialize;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two fixes in kilometres.
pub fn haversine_km(a: &GpsFix, b: &GpsFix) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // clamp guards asin against rounding slightly above 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Speed from consecutive fixes.
#[derive(Debug, Default, Clone)]
pub struct SpeedTracker {
    last: Option<GpsFix>,
    speed_kmh: f64,
}

impl SpeedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next fix and return the current speed in km/h.
    pub fn update(&mut self, fix: &GpsFix) -> f64 {
        match &self.last {
            None => self.speed_kmh = 0.0,
            Some(last) => {
                let hours = (fix.observed_at - last.observed_at).as_seconds_f64() / 3600.0;
                // duplicate or out-of-order fix: hold the previous value
                if hours > 0.0 {
                    self.speed_kmh = haversine_km(last, fix) / hours;
                }
            }
        }
        self.last = Some(fix.clone());
        self.speed_kmh
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }
}

/// Edge-triggered geofence lap counter.
#[derive(Debug, Clone)]
pub struct LapDetector {
    fence: Geofence,
    // None until the first fix of the session has been seen
    was_inside: Option<bool>,
    laps: Vec<LapRecord>,
}

impl LapDetector {
    pub fn new(fence: Geofence) -> Self {
        Self { fence, was_inside: None, laps: Vec::new() }
    }

    /// Returns the new lap when this fix enters the fence from outside.
    pub fn update(&mut self, fix: &GpsFix, now: OffsetDateTime) -> Option<LapRecord> {
        let inside = self.fence.contains(fix.lat, fix.lng);
        let entered = self.was_inside == Some(false) && inside;
        self.was_inside = Some(inside);
        if !entered {
            return None;
        }
        let lap = LapRecord {
            lap_number: self.laps.last().map(|l| l.lap_number).unwrap_or(0) + 1,
            completed_at: now,
        };
        self.laps.push(lap.clone());
        Some(lap)
    }

    pub fn laps(&self) -> &[LapRecord] {
        &self.laps
    }

    pub fn fence(&self) -> &Geofence {
        &self.fence
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixOutcome {
    pub speed_kmh: f64,
    pub lap: Option<LapRecord>,
}

/// Both GPS-derived duties, driven once per accepted fix.
#[derive(Debug, Clone)]
pub struct GeoMetrics {
    speed: SpeedTracker,
    laps: LapDetector,
}

impl GeoMetrics {
    pub fn new(fence: Geofence) -> Self {
        Self { speed: SpeedTracker::new(), laps: LapDetector::new(fence) }
    }

    pub fn on_fix(&mut self, fix: &GpsFix) -> FixOutcome {
        let speed_kmh = self.speed.update(fix);
        let lap = self.laps.update(fix, fix.observed_at);
        FixOutcome { speed_kmh, lap }
    }

    pub fn laps(&self) -> &[LapRecord] {
        self.laps.laps()
    }
}

/// Lap count plus timing of the lap log. Lap durations are the gaps between
/// consecutive completions, so the first completion has no duration.
pub fn lap_summary(laps: &[LapRecord]) -> Value {
    let durations: Vec<f64> = laps
        .windows(2)
        .map(|w| (w[1].completed_at - w[0].completed_at).as_seconds_f64())
        .collect();
    let best = durations.iter().copied().fold(None, |acc: Option<f64>, d| {
        Some(acc.map_or(d, |a| a.min(d)))
    });
    let last_at = laps
        .last()
        .and_then(|l| l.completed_at.format(&Rfc3339).ok());

    json!({
        "count": laps.len(),
        "last_completed_at": last_at,
        "last_lap_s": durations.last(),
        "best_lap_s": best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    const T0: OffsetDateTime = datetime!(2024-06-01 12:00:00 UTC);

    fn fix(lat: f64, lng: f64, at: OffsetDateTime) -> GpsFix {
        GpsFix { lat, lng, observed_at: at }
    }

    // inside the default finish line
    fn inside(at: OffsetDateTime) -> GpsFix {
        fix(40.7127, -74.0060, at)
    }

    fn outside(at: OffsetDateTime) -> GpsFix {
        fix(40.7200, -74.0100, at)
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = fix(0.0, 0.0, T0);
        let b = fix(1.0, 0.0, T0);
        let expected = EARTH_RADIUS_KM * 1f64.to_radians();
        assert!((haversine_km(&a, &b) - expected).abs() < 1e-9);
        assert_eq!(haversine_km(&a, &a), 0.0);
    }

    #[test]
    fn test_first_fix_speed_is_zero() {
        let mut t = SpeedTracker::new();
        assert_eq!(t.update(&fix(51.0, 0.0, T0)), 0.0);
    }

    #[test]
    fn test_one_km_in_one_hour() {
        let mut t = SpeedTracker::new();
        let dlat = (1.0 / EARTH_RADIUS_KM).to_degrees();
        t.update(&fix(10.0, 20.0, T0));
        let v = t.update(&fix(10.0 + dlat, 20.0, T0 + Duration::hours(1)));
        assert!((v - 1.0).abs() < 1e-9, "speed {v}");
    }

    #[test]
    fn test_non_positive_elapsed_holds_speed() {
        let mut t = SpeedTracker::new();
        let dlat = (1.0 / EARTH_RADIUS_KM).to_degrees();
        t.update(&fix(0.0, 0.0, T0));
        let v = t.update(&fix(dlat, 0.0, T0 + Duration::minutes(30)));
        assert!((v - 2.0).abs() < 1e-9);

        // duplicate timestamp
        assert_eq!(t.update(&fix(2.0 * dlat, 0.0, T0 + Duration::minutes(30))), v);
        // out of order
        assert_eq!(t.update(&fix(3.0 * dlat, 0.0, T0)), v);
        // last fix moved to the out-of-order one, so the next delta starts there
        let next = t.update(&fix(4.0 * dlat, 0.0, T0 + Duration::hours(1)));
        assert!((next - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_outside_only_counts_nothing() {
        let mut d = LapDetector::new(Geofence::default());
        for i in 0..10 {
            assert!(d.update(&outside(T0), T0 + Duration::seconds(i)).is_none());
        }
        assert!(d.laps().is_empty());
    }

    #[test]
    fn test_lap_counted_once_per_entry() {
        let mut d = LapDetector::new(Geofence::default());
        let seq = [outside(T0), inside(T0), inside(T0), outside(T0), inside(T0)];
        let hits: Vec<_> = seq
            .iter()
            .enumerate()
            .filter_map(|(i, f)| d.update(f, T0 + Duration::seconds(i as i64)))
            .collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(d.laps().iter().map(|l| l.lap_number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(d.laps()[0].completed_at, T0 + Duration::seconds(1));
        assert_eq!(d.laps()[1].completed_at, T0 + Duration::seconds(4));
    }

    #[test]
    fn test_first_fix_inside_is_not_a_lap() {
        let mut d = LapDetector::new(Geofence::default());
        assert!(d.update(&inside(T0), T0).is_none());
        assert!(d.update(&inside(T0), T0).is_none());
        assert!(d.update(&outside(T0), T0).is_none());
        assert!(d.update(&inside(T0), T0).is_some());
    }

    #[test]
    fn test_geo_metrics_drives_both() {
        let mut g = GeoMetrics::new(Geofence::default());
        let first = g.on_fix(&outside(T0));
        assert_eq!(first, FixOutcome { speed_kmh: 0.0, lap: None });

        let second = g.on_fix(&inside(T0 + Duration::seconds(30)));
        assert!(second.speed_kmh > 0.0);
        let lap = second.lap.expect("entered the fence");
        assert_eq!(lap.lap_number, 1);
        assert_eq!(lap.completed_at, T0 + Duration::seconds(30));
        assert_eq!(g.laps().len(), 1);
    }

    #[test]
    fn test_lap_summary() {
        let laps = vec![
            LapRecord { lap_number: 1, completed_at: T0 },
            LapRecord { lap_number: 2, completed_at: T0 + Duration::seconds(90) },
            LapRecord { lap_number: 3, completed_at: T0 + Duration::seconds(170) },
        ];
        let s = lap_summary(&laps);
        assert_eq!(s["count"], 3);
        assert_eq!(s["last_lap_s"], 80.0);
        assert_eq!(s["best_lap_s"], 80.0);
        assert_eq!(s["last_completed_at"], "2024-06-01T12:02:50Z");

        let empty = lap_summary(&[]);
        assert_eq!(empty["count"], 0);
        assert!(empty["best_lap_s"].is_null());
        assert!(empty["last_completed_at"].is_null());
    }
}
