// Frame-rate counter for the window title

use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// What gets shown once per reporting interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub fps: f32,
    pub frame_time_ms: f32,
}

pub struct FrameStats {
    frame_count: u32,
    last_report: Instant,
    last_frame: Instant,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_report: now,
            last_frame: now,
        }
    }

    /// Start a fresh measurement window, dropping anything counted so far
    pub fn restart(&mut self, now: Instant) {
        *self = Self::new(now);
    }

    /// Count a presented frame; yields a report at most once per second
    pub fn record(&mut self, now: Instant) -> Option<FrameReport> {
        let frame_time = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_report);
        if elapsed < REPORT_INTERVAL {
            return None;
        }

        let report = FrameReport {
            fps: self.frame_count as f32 / elapsed.as_secs_f32(),
            frame_time_ms: frame_time.as_secs_f32() * 1000.0,
        };

        self.frame_count = 0;
        self.last_report = now;

        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_second() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);

        for i in 1..60 {
            assert!(stats.record(start + Duration::from_millis(i * 16)).is_none());
        }

        let report = stats.record(start + Duration::from_millis(1000)).unwrap();
        assert!((report.fps - 60.0).abs() < 0.01);
        assert!((report.frame_time_ms - 56.0).abs() < 0.01);
    }

    #[test]
    fn counter_restarts_after_report() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);

        stats.record(start + Duration::from_secs(1)).unwrap();
        assert!(stats.record(start + Duration::from_millis(1500)).is_none());

        let report = stats.record(start + Duration::from_secs(2)).unwrap();
        assert!((report.fps - 2.0).abs() < 0.01);
    }

    #[test]
    fn restart_ignores_time_before_it() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);

        // Startup took three seconds before the first frame
        let ready = start + Duration::from_secs(3);
        stats.restart(ready);

        for i in 1..30 {
            assert!(stats.record(ready + Duration::from_millis(i * 33)).is_none());
        }

        let report = stats.record(ready + Duration::from_secs(1)).unwrap();
        assert!((report.fps - 30.0).abs() < 0.01);
    }
}
