use std::time::Instant;

use tracing::info;

/// Periodic progress line for a download in flight.
///
/// Created when metadata is adopted, dropped at completion. Throughput is
/// the mean over the whole download, not a sliding window.
#[derive(Debug)]
pub struct ProgressReporter {
    started_at: Instant,
    bytes_downloaded: u64,
}

impl ProgressReporter {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_downloaded: 0,
        }
    }

    pub fn add_bytes(&mut self, n: u64) {
        self.bytes_downloaded += n;
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded
    }

    /// Logs one progress line.
    pub fn report(&self, file_size: u64, missing_pieces: u64, piece_size: u64) {
        let done = bytes_done(file_size, missing_pieces, piece_size);
        let percent = if file_size > 0 {
            done as f64 * 100.0 / file_size as f64
        } else {
            100.0
        };
        let elapsed = self.started_at.elapsed().as_secs_f64().max(0.001);
        let kb_per_sec = self.bytes_downloaded as f64 / 1024.0 / elapsed;
        info!("{percent:.1}% ({done}/{file_size} bytes, {kb_per_sec:.1} KB/s)");
    }
}

/// Approximate completed byte count: counts every missing piece at the full
/// piece size, so the tail piece is undercounted by at most
/// `piece_size - tail_len`.
pub(super) fn bytes_done(file_size: u64, missing_pieces: u64, piece_size: u64) -> u64 {
    file_size.saturating_sub(missing_pieces * piece_size)
}
