use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Name of one physical sensor link, e.g. `COM4` or `/dev/ttyUSB0`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct LinkId(pub String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LinkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Battery,
    Gps,
}

impl LinkKind {
    /// Number of comma separated fields a line of this kind carries.
    pub fn field_count(self) -> usize {
        match self {
            LinkKind::Battery => 3,
            LinkKind::Gps => 2,
        }
    }
}

/// Deployment description of one link.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LinkConfig {
    pub link_id: LinkId,
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    pub kind: LinkKind,
}

fn default_baud_rate() -> u32 {
    9600
}

impl LinkConfig {
    pub fn new(link_id: &str, path: &str, baud_rate: u32, kind: LinkKind) -> Self {
        Self { link_id: link_id.into(), path: path.into(), baud_rate, kind }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct BatteryReading {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub source_link: LinkId,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct GpsFix {
    pub lat: f64,
    pub lng: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

/// One successfully parsed line from a link.
#[derive(Clone, Debug, PartialEq)]
pub enum Reading {
    Battery(BatteryReading),
    Gps { link: LinkId, fix: GpsFix },
}

impl Reading {
    pub fn link(&self) -> &LinkId {
        match self {
            Reading::Battery(b) => &b.source_link,
            Reading::Gps { link, .. } => link,
        }
    }
}

/// The aggregated vehicle state. Fields stay `None` until a link first
/// delivers a valid reading.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub battery: Option<BatteryReading>,
    pub gps: Option<GpsFix>,
    pub speed_kmh: f64,
    #[serde(default)]
    pub link_status: BTreeMap<LinkId, bool>,
}

/// Rectangular lat/lng zone whose entry counts a lap.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Geofence {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Geofence {
    /// Bounds are inclusive on every edge.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

impl Default for Geofence {
    fn default() -> Self {
        Self { min_lat: 40.7125, max_lat: 40.7130, min_lng: -74.0065, max_lng: -74.0055 }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LapRecord {
    pub lap_number: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}
