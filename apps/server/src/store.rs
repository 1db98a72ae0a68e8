use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::info;

use analysis::GeoMetrics;
use model::*;
use pitwall_ingest_core::ReadingSink;

/// Partial update to the shared snapshot. Each variant touches only its own fields.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotPatch {
    Battery(BatteryReading),
    Gps(GpsFix),
    Speed(f64),
    LinkSeen(LinkId),
}

/// Owner of the single live snapshot and the session's lap log.
///
/// Every operation takes the lock for its whole duration and hands out
/// copies, so readers never observe a half-applied reading.
pub struct StateStore {
    inner: Mutex<Inner>,
}

struct Inner {
    snapshot: TelemetrySnapshot,
    geo: GeoMetrics,
}

impl Inner {
    fn merge(&mut self, patch: SnapshotPatch) {
        let s = &mut self.snapshot;
        match patch {
            SnapshotPatch::Battery(b) => s.battery = Some(b),
            SnapshotPatch::Gps(fix) => s.gps = Some(fix),
            SnapshotPatch::Speed(v) => s.speed_kmh = v,
            SnapshotPatch::LinkSeen(link) => {
                s.link_status.insert(link, true);
            }
        }
    }
}

impl StateStore {
    /// Every configured link starts out reported as not connected.
    pub fn new(links: &[LinkConfig], fence: Geofence) -> Self {
        let link_status: BTreeMap<LinkId, bool> =
            links.iter().map(|l| (l.link_id.clone(), false)).collect();
        Self {
            inner: Mutex::new(Inner {
                snapshot: TelemetrySnapshot { link_status, ..Default::default() },
                geo: GeoMetrics::new(fence),
            }),
        }
    }

    pub fn merge(&self, patch: SnapshotPatch) {
        self.inner.lock().merge(patch);
    }

    pub fn read(&self) -> TelemetrySnapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn laps(&self) -> Vec<LapRecord> {
        self.inner.lock().geo.laps().to_vec()
    }

    /// Snapshot and lap log taken under one lock.
    pub fn read_with_laps(&self) -> (TelemetrySnapshot, Vec<LapRecord>) {
        let inner = self.inner.lock();
        (inner.snapshot.clone(), inner.geo.laps().to_vec())
    }
}

impl ReadingSink for StateStore {
    fn apply(&self, reading: Reading) {
        let mut inner = self.inner.lock();
        let link = reading.link().clone();
        match reading {
            Reading::Battery(b) => inner.merge(SnapshotPatch::Battery(b)),
            Reading::Gps { fix, .. } => {
                let outcome = inner.geo.on_fix(&fix);
                inner.merge(SnapshotPatch::Gps(fix));
                inner.merge(SnapshotPatch::Speed(outcome.speed_kmh));
                if let Some(lap) = outcome.lap {
                    info!(lap = lap.lap_number, %link, "lap completed");
                }
            }
        }
        inner.merge(SnapshotPatch::LinkSeen(link));
    }
}
