use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tracing::{info, warn};

use crate::listing::human_size;

/// Substituted for an elapsed time that rounds to zero.
const MIN_ELAPSED_SECS: f64 = 0.000_001;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// What kind of transfer a `TransferReport` describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    /// A complete, non-ranged file download.
    Download,
    /// A `/speedtest` run.
    SpeedTest,
}

/// Throughput statistics for one completed stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransferReport {
    /// File name of the source.
    pub file: String,
    /// Number of body bytes handed to the connection.
    pub bytes_sent: u64,
    /// Wall-clock duration of the transfer, never zero.
    #[serde(rename = "duration_s")]
    pub elapsed_seconds: f64,
    /// Throughput in MiB per second.
    #[serde(rename = "mb_per_s")]
    pub throughput_mbps: f64,
}

impl TransferReport {
    /// Compute a report from a byte count and duration.
    pub fn new(file: impl Into<String>, bytes_sent: u64, elapsed: Duration) -> Self {
        let mut elapsed_seconds = elapsed.as_secs_f64();
        if elapsed_seconds == 0.0 {
            elapsed_seconds = MIN_ELAPSED_SECS;
        }
        TransferReport {
            file: file.into(),
            bytes_sent,
            elapsed_seconds,
            throughput_mbps: bytes_sent as f64 / BYTES_PER_MB / elapsed_seconds,
        }
    }

    /// Render the report as a single JSON object.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Receives reports for completed transfers.
///
/// The default sink, `LogSink`, writes them to the operator log.
pub trait ReportSink: Send + Sync {
    /// Called once per finished transfer.
    fn report(&self, kind: TransferKind, report: &TransferReport);
}

/// Writes transfer reports to the log through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&self, kind: TransferKind, report: &TransferReport) {
        match kind {
            TransferKind::Download => info!(
                target: "hyper_dirserve::transfer",
                "{} transferred {} in {:.2}s ({:.2} MB/s)",
                report.file,
                human_size(report.bytes_sent),
                report.elapsed_seconds,
                report.throughput_mbps,
            ),
            TransferKind::SpeedTest => match report.to_json() {
                Ok(json) => info!(target: "hyper_dirserve::speedtest", "{}", json),
                Err(err) => warn!("failed to encode speed test report: {}", err),
            },
        }
    }
}

/// Times a stream and hands a `TransferReport` to a sink when it ends.
pub struct TransferMeter {
    kind: TransferKind,
    file: String,
    started: Instant,
    sink: Arc<dyn ReportSink>,
}

impl TransferMeter {
    /// Start timing a transfer of `file`.
    pub fn new(kind: TransferKind, file: impl Into<String>, sink: Arc<dyn ReportSink>) -> Self {
        TransferMeter {
            kind,
            file: file.into(),
            started: Instant::now(),
            sink,
        }
    }

    /// Whether a transfer cut short still gets reported.
    ///
    /// Downloads only report on completion. Speed tests report whatever was sent.
    pub fn reports_on_abort(&self) -> bool {
        self.kind == TransferKind::SpeedTest
    }

    pub(crate) fn finish(self, bytes_sent: u64) {
        let TransferMeter {
            kind,
            file,
            started,
            sink,
        } = self;
        let report = TransferReport::new(file, bytes_sent, started.elapsed());
        sink.report(kind, &report);
    }
}
