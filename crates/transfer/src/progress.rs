use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 100;

/// Transfer rate over a sliding window of recent samples.
///
/// Thread-safe; per-task upload loops record into one shared calculator.
pub struct SpeedCalculator {
    window: Mutex<Window>,
}

struct Window {
    samples: VecDeque<(Instant, i64)>,
    span: Duration,
    max_samples: usize,
}

impl Window {
    fn trim(&mut self, now: Instant) {
        let cutoff = now - self.span;
        while self.samples.front().is_some_and(|(at, _)| *at < cutoff) {
            self.samples.pop_front();
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }
}

impl SpeedCalculator {
    /// `window`: time span considered (default 5 s); `max_samples`: cap on
    /// retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            window: Mutex::new(Window {
                samples: VecDeque::new(),
                span: window.unwrap_or(DEFAULT_WINDOW),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES),
            }),
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: i64) {
        let now = Instant::now();
        let mut w = self.window.lock().unwrap();
        w.samples.push_back((now, bytes));
        w.trim(now);
    }

    /// Average rate in bytes/second across the window, or 0.0 with fewer
    /// than two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let w = self.window.lock().unwrap();
        let (Some((first, _)), Some((last, _))) = (w.samples.front(), w.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(*first);
        if w.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let total: i64 = w.samples.iter().map(|(_, bytes)| bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Time to move `remaining_bytes` at the current rate, if any.
    pub fn eta(&self, remaining_bytes: i64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / rate))
    }

    /// Discards all samples.
    pub fn reset(&self) {
        self.window.lock().unwrap().samples.clear();
    }
}
