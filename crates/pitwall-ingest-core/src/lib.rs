//! Core ingestion model and traits shared by every link driver

use std::sync::Arc;

pub mod ingestor;
pub mod parser;

pub use ingestor::{ingest_lines, IngestStats};
pub use model::{BatteryReading, GpsFix, LinkConfig, LinkId, LinkKind, Reading};
pub use parser::{parse_line, ParseError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("link {link} unavailable: {reason}")]
    LinkUnavailable { link: LinkId, reason: String },
    #[error("read failed on link {link}: {source}")]
    LinkIo {
        link: LinkId,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Destination for parsed readings. Implementations must be safe to call
/// from several ingestor threads at once.
pub trait ReadingSink: Send + Sync {
    fn apply(&self, reading: Reading);
}

impl<T: ReadingSink + ?Sized> ReadingSink for Arc<T> {
    fn apply(&self, reading: Reading) {
        (**self).apply(reading)
    }
}

/// Dropping every `StopTx` (or sending on it) asks the ingestors to return.
pub type StopTx = crossbeam_channel::Sender<()>;
pub type StopRx = crossbeam_channel::Receiver<()>;

pub fn stop_channel() -> (StopTx, StopRx) {
    crossbeam_channel::bounded(1)
}

pub(crate) fn stop_requested(stop: &StopRx) -> bool {
    !matches!(stop.try_recv(), Err(crossbeam_channel::TryRecvError::Empty))
}

/// Trait for any live link connector
#[async_trait::async_trait]
pub trait LinkSource: Send + Sync {
    fn link_id(&self) -> &LinkId;
    async fn run(&self, sink: Arc<dyn ReadingSink>, stop: StopRx) -> Result<IngestStats, IngestError>;
}

/// Run a source on the tokio runtime. Failures are logged and stay inside
/// the spawned task; no reconnect is attempted.
pub fn spawn_source<S: LinkSource + 'static>(
    src: S,
    sink: Arc<dyn ReadingSink>,
    stop: StopRx,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let link = src.link_id().clone();
        match src.run(sink, stop).await {
            Ok(stats) => tracing::info!(%link, ?stats, "link closed"),
            Err(e) => tracing::error!(%link, error = %e, "link stopped"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Reading>>);

    impl ReadingSink for Recorder {
        fn apply(&self, reading: Reading) {
            self.0.lock().push(reading);
        }
    }

    struct FailingSource(LinkId);

    #[async_trait::async_trait]
    impl LinkSource for FailingSource {
        fn link_id(&self) -> &LinkId { &self.0 }
        async fn run(&self, _sink: Arc<dyn ReadingSink>, _stop: StopRx) -> Result<IngestStats, IngestError> {
            Err(IngestError::LinkUnavailable { link: self.0.clone(), reason: "no such device".into() })
        }
    }

    struct CursorSource(LinkId, &'static str);

    #[async_trait::async_trait]
    impl LinkSource for CursorSource {
        fn link_id(&self) -> &LinkId { &self.0 }
        async fn run(&self, sink: Arc<dyn ReadingSink>, stop: StopRx) -> Result<IngestStats, IngestError> {
            Ok(ingest_lines(&self.0, LinkKind::Battery, Cursor::new(self.1), &*sink, &stop))
        }
    }

    #[test]
    fn stop_signal_on_send_and_on_drop() {
        let (tx, rx) = stop_channel();
        assert!(!stop_requested(&rx));
        tx.send(()).unwrap();
        assert!(stop_requested(&rx));

        let (tx, rx) = stop_channel();
        drop(tx);
        assert!(stop_requested(&rx));
    }

    #[tokio::test]
    async fn unavailable_link_is_contained_in_its_task() {
        let sink: Arc<Recorder> = Arc::default();
        let (_tx, rx) = stop_channel();
        let handle = spawn_source(FailingSource("COM9".into()), sink.clone(), rx);
        handle.await.expect("task must not panic");
        assert!(sink.0.lock().is_empty());
    }

    #[tokio::test]
    async fn spawned_source_feeds_sink() {
        let sink: Arc<Recorder> = Arc::default();
        let (_tx, rx) = stop_channel();
        spawn_source(CursorSource("COM4".into(), "12.6,5.0,63.0\n"), sink.clone(), rx)
            .await
            .unwrap();
        let got = sink.0.lock();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].link().as_str(), "COM4");
    }

    #[test]
    fn error_messages_name_the_link() {
        let e = IngestError::LinkIo {
            link: "COM7".into(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"),
        };
        assert_eq!(e.to_string(), "read failed on link COM7: unplugged");
    }
}
