use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pitwall_ingest_core::*;
use serialport::{DataBits, FlowControl, Parity, StopBits};

/// Serial-attached sensor (battery monitor or GPS receiver).
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub link: LinkConfig,
    /// How long one blocking read may wait before the loop re-checks the stop signal.
    pub poll_timeout: Duration,
}

impl SerialConfig {
    pub fn new(link: LinkConfig) -> Self {
        Self { link, poll_timeout: Duration::from_millis(200) }
    }
}

pub struct SerialSource {
    cfg: SerialConfig,
}

impl SerialSource {
    pub fn new(cfg: SerialConfig) -> Self { Self { cfg } }

    fn open(&self) -> Result<Box<dyn serialport::SerialPort>, IngestError> {
        let link = &self.cfg.link;
        serialport::new(&link.path, link.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.cfg.poll_timeout)
            .open()
            .map_err(|e| IngestError::LinkUnavailable {
                link: link.link_id.clone(),
                reason: format!("{}: {}", link.path, e),
            })
    }
}

#[async_trait::async_trait]
impl LinkSource for SerialSource {
    fn link_id(&self) -> &LinkId {
        &self.cfg.link.link_id
    }

    async fn run(&self, sink: Arc<dyn ReadingSink>, stop: StopRx) -> Result<IngestStats, IngestError> {
        let port = self.open()?;
        let link = self.cfg.link.clone();
        tracing::info!(link = %link.link_id, path = %link.path, baud = link.baud_rate, kind = ?link.kind, "opened link");

        // serial reads block; keep them off the async workers
        let stats = tokio::task::spawn_blocking(move || {
            // the port is dropped (and closed) when this closure returns
            ingest_lines(&link.link_id, link.kind, BufReader::new(port), &*sink, &stop)
        })
        .await
        .context("serial reader thread")?;
        Ok(stats)
    }
}
