use std::io::Write;
use std::time::Duration;

use stratus_sync::SyncEvent;
use stratus_transfer::SpeedCalculator;

/// Renders sync events as terminal output on stderr.
///
/// The upload phase draws a single in-place progress line; everything
/// else is one line per event.
pub struct ProgressRenderer {
    speed: SpeedCalculator,
    last_transferred: i64,
    drawing: bool,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self {
            speed: SpeedCalculator::new(None, None),
            last_transferred: 0,
            drawing: false,
        }
    }

    pub fn handle(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::Indexed { files, total_bytes } => {
                eprintln!("indexed {files} files ({})", format_bytes(*total_bytes));
            }
            SyncEvent::Negotiated {
                missing,
                reused,
                pending_bytes,
            } => {
                eprintln!(
                    "{missing} to upload ({}), {reused} already on server",
                    format_bytes(*pending_bytes)
                );
            }
            SyncEvent::Cached => {
                eprintln!("all content already on server");
            }
            SyncEvent::TaskStarted { path, .. } => {
                tracing::debug!(%path, "uploading");
            }
            SyncEvent::Progress {
                transferred_bytes,
                total_bytes,
            } => {
                self.speed.add_sample(transferred_bytes - self.last_transferred);
                self.last_transferred = *transferred_bytes;
                self.draw_progress(*transferred_bytes, *total_bytes);
            }
            SyncEvent::TaskAcked { path } => {
                tracing::debug!(%path, "uploaded");
            }
            SyncEvent::Finalized { deployment } => {
                self.finish_line();
                eprintln!("deployment {} created", deployment.uid);
            }
        }
    }

    fn draw_progress(&mut self, transferred: i64, total: i64) {
        let percent = if total > 0 {
            (transferred as f64 / total as f64 * 100.0).min(100.0)
        } else {
            100.0
        };
        let rate = self.speed.bytes_per_second();
        let eta = self
            .speed
            .eta(total - transferred)
            .map(format_duration)
            .unwrap_or_else(|| "--".into());

        eprint!(
            "\r\x1b[2K{:>5.1}%  {} / {}  {}/s  eta {}",
            percent,
            format_bytes(transferred),
            format_bytes(total),
            format_bytes(rate as i64),
            eta
        );
        let _ = std::io::stderr().flush();
        self.drawing = true;
    }

    /// Terminates an in-place progress line, if one is being drawn.
    pub fn finish_line(&mut self) {
        if self.drawing {
            eprintln!();
            self.drawing = false;
        }
    }
}

pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes.max(0), UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
