use std::io::{BufRead, ErrorKind};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{parse_line, stop_requested, IngestError, LinkId, LinkKind, ReadingSink, StopRx};

// pause after a hard read error so an unplugged device does not spin the thread
const IO_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
    pub io_errors: u64,
}

/// Read newline-delimited readings from `reader` until end of stream or a
/// stop request, applying every valid line to `sink`.
///
/// Timeouts are how blocking transports yield back to this loop; they are
/// not counted as errors. Bytes received before a timeout are kept and the
/// line is completed on the next read. Pending input is not drained once a
/// stop is requested.
pub fn ingest_lines<R: BufRead>(
    link: &LinkId,
    kind: LinkKind,
    mut reader: R,
    sink: &dyn ReadingSink,
    stop: &StopRx,
) -> IngestStats {
    let mut stats = IngestStats::default();
    let mut buf = Vec::with_capacity(128);

    while !stop_requested(stop) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                if !buf.is_empty() {
                    handle_line(link, kind, &buf, sink, &mut stats);
                }
                info!(%link, "end of stream");
                break;
            }
            Ok(_) => {
                // unterminated tail; the next call reports end of stream
                if buf.last() != Some(&b'\n') {
                    continue;
                }
                handle_line(link, kind, &buf, sink, &mut stats);
                buf.clear();
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
            Err(source) => {
                stats.io_errors += 1;
                let err = IngestError::LinkIo { link: link.clone(), source };
                warn!(error = %err, "link read failed; continuing");
                std::thread::sleep(IO_ERROR_BACKOFF);
            }
        }
    }
    stats
}

fn handle_line(link: &LinkId, kind: LinkKind, raw: &[u8], sink: &dyn ReadingSink, stats: &mut IngestStats) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    debug!(%link, line, "received");
    match parse_line(line, kind, link, OffsetDateTime::now_utc()) {
        Ok(reading) => {
            stats.accepted += 1;
            sink.apply(reading);
        }
        Err(e) => {
            stats.rejected += 1;
            let err = IngestError::Parse(e);
            warn!(%link, error = %err, "dropping malformed line");
        }
    }
}
