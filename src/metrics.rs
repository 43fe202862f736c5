use std::time::{Duration, Instant};

/// Most recent timing figures. Overwritten, never aggregated.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Latency the backend reported for its own processing.
    pub hardware_latency_ms: f64,
    /// 1000 / client-observed round trip in ms.
    pub observed_fps: f64,
}

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    current: Option<MetricsSnapshot>,
    updates: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed dispatch. Round trips under 1 ms count as 1 ms.
    pub fn record(
        &mut self,
        started: Instant,
        finished: Instant,
        reported_latency_ms: f64,
    ) -> MetricsSnapshot {
        let snapshot = snapshot_for(
            finished.saturating_duration_since(started),
            reported_latency_ms,
        );
        self.current = Some(snapshot);
        self.updates += 1;
        snapshot
    }

    pub fn current(&self) -> Option<MetricsSnapshot> {
        self.current
    }

    /// Number of snapshots recorded so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

pub fn snapshot_for(round_trip: Duration, reported_latency_ms: f64) -> MetricsSnapshot {
    let elapsed_ms = (round_trip.as_secs_f64() * 1000.0).max(1.0);
    MetricsSnapshot {
        hardware_latency_ms: reported_latency_ms,
        observed_fps: 1000.0 / elapsed_ms,
    }
}
