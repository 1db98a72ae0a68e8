use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use model::{LapRecord, LinkId, TelemetrySnapshot};

use crate::store::StateStore;

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("send to viewer {viewer} failed: {reason}")]
    ViewerSend { viewer: Uuid, reason: String },
    #[error("serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BatteryView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GpsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// One egress message. Fields never populated serialize as `{}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerFrame {
    pub battery: BatteryView,
    pub gps: GpsView,
    pub status: BTreeMap<LinkId, bool>,
    pub speed_kmh: f64,
    pub laps: Value,
}

impl ViewerFrame {
    pub fn new(snapshot: TelemetrySnapshot, laps: &[LapRecord]) -> Self {
        let battery = snapshot
            .battery
            .map(|b| BatteryView { voltage: Some(b.voltage), current: Some(b.current), power: Some(b.power) })
            .unwrap_or_default();
        let gps = snapshot
            .gps
            .map(|g| GpsView { lat: Some(g.lat), lng: Some(g.lng) })
            .unwrap_or_default();
        Self {
            battery,
            gps,
            status: snapshot.link_status,
            speed_kmh: snapshot.speed_kmh,
            laps: analysis::lap_summary(laps),
        }
    }

    pub fn from_store(store: &StateStore) -> Self {
        let (snapshot, laps) = store.read_with_laps();
        Self::new(snapshot, &laps)
    }
}

/// Outbound half of one viewer connection.
#[async_trait::async_trait]
pub trait Viewer: Send {
    fn id(&self) -> Uuid;
    async fn push(&mut self, frame: String) -> Result<(), BroadcastError>;
}

/// Push the current snapshot to `viewer` every `period` until `cancel` fires
/// or a send fails. The first frame goes out immediately. Returns the number
/// of frames delivered.
pub async fn run_viewer<V: Viewer>(
    store: Arc<StateStore>,
    mut viewer: V,
    cancel: CancellationToken,
    period: Duration,
) -> Result<u64, BroadcastError> {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let text = serde_json::to_string(&ViewerFrame::from_store(&store))?;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    res = viewer.push(text) => res?,
                }
                sent += 1;
            }
        }
    }
    tracing::debug!(viewer = %viewer.id(), sent, "broadcast stopped");
    Ok(sent)
}
