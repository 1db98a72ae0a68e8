//! Viewer registry. One entry per open connection; the entry and its
//! cancellation token live exactly as long as the connection's `ViewerGuard`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ViewerInfo {
    pub id: Uuid,
    pub peer: Option<SocketAddr>,
    #[serde(with = "time::serde::rfc3339")]
    pub connected_at: OffsetDateTime,
}

struct Entry {
    info: ViewerInfo,
    cancel: CancellationToken,
}

pub struct ConnectionHub {
    viewers: Mutex<HashMap<Uuid, Entry>>,
    shutdown: CancellationToken,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self { viewers: Mutex::new(HashMap::new()), shutdown: CancellationToken::new() }
    }

    /// Track a new viewer. Its token is a child of the hub's shutdown token.
    pub fn register(self: &Arc<Self>, peer: Option<SocketAddr>) -> ViewerGuard {
        let info = ViewerInfo { id: Uuid::new_v4(), peer, connected_at: OffsetDateTime::now_utc() };
        let cancel = self.shutdown.child_token();
        let id = info.id;
        self.viewers.lock().insert(id, Entry { info, cancel: cancel.clone() });
        info!(viewer = %id, ?peer, "viewer connected");
        ViewerGuard { id, cancel, hub: Arc::clone(self) }
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().len()
    }

    pub fn viewers(&self) -> Vec<ViewerInfo> {
        self.viewers.lock().values().map(|e| e.info.clone()).collect()
    }

    /// Stop every current and future viewer.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn unregister(&self, id: Uuid) {
        if self.viewers.lock().remove(&id).is_some() {
            info!(viewer = %id, "viewer disconnected");
        }
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration handle owned by a viewer's task. Dropping it cancels the
/// viewer and removes it from the hub.
pub struct ViewerGuard {
    id: Uuid,
    cancel: CancellationToken,
    hub: Arc<ConnectionHub>,
}

impl ViewerGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.hub.unregister(self.id);
    }
}
