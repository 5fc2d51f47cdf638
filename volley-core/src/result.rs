use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Serialize, Serializer};

use crate::client::ClientKind;
use crate::recorder::{ErrorKindCounts, Snapshot, StatusCounts};

pub const REPORTED_PERCENTILES: [f64; 5] = [50.0, 75.0, 90.0, 95.0, 99.0];

/// Why the worker pool stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// Every request of a count-bounded run was issued.
    Completed,
    /// The configured duration elapsed.
    Deadline,
    /// The stop handle was cancelled from outside.
    Cancelled,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Percentile {
    pub percentile: f64,
    pub micros: u64,
}

/// Latency summary in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub mean: f64,
    pub stdev: f64,
    pub max: u64,
    pub percentiles: Vec<Percentile>,
}

impl LatencyStats {
    #[must_use]
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self {
                mean: 0.0,
                stdev: 0.0,
                max: 0,
                percentiles: REPORTED_PERCENTILES
                    .iter()
                    .map(|&percentile| Percentile { percentile, micros: 0 })
                    .collect(),
            };
        }
        Self {
            mean: hist.mean(),
            stdev: hist.stdev(),
            max: hist.max(),
            percentiles: REPORTED_PERCENTILES
                .iter()
                .map(|&percentile| Percentile {
                    percentile,
                    micros: hist.value_at_percentile(percentile),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<u64> {
        self.percentiles
            .iter()
            .find(|p| (p.percentile - percentile).abs() < f64::EPSILON)
            .map(|p| p.micros)
    }
}

/// Distribution of per-tick request rates, in requests per second.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize)]
pub struct RateStats {
    pub mean: f64,
    pub stdev: f64,
    pub max: f64,
}

impl RateStats {
    #[must_use]
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self::default();
        }
        Self {
            mean: hist.mean(),
            stdev: hist.stdev(),
            max: hist.max() as f64,
        }
    }
}

/// Final statistics of one run, taken after every worker stopped.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub client: ClientKind,
    pub stop_cause: StopCause,
    #[serde(rename = "time_taken_secs", serialize_with = "as_secs_f64")]
    pub duration: Duration,
    pub requests: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_read: u64,
    pub requests_per_sec: f64,
    pub bytes_per_sec: f64,
    pub rps: RateStats,
    pub latency: LatencyStats,
    pub status: StatusCounts,
    pub error_kinds: ErrorKindCounts,
    pub error_messages: Vec<(String, u64)>,
}

impl RunResult {
    #[must_use]
    pub fn new(
        client: ClientKind,
        stop_cause: StopCause,
        snapshot: Snapshot,
        rps: &Histogram<u64>,
    ) -> Self {
        let secs = snapshot.elapsed.as_secs_f64();
        let per_sec = |v: u64| if secs > 0.0 { v as f64 / secs } else { 0.0 };
        let counts = snapshot.counts;
        Self {
            client,
            stop_cause,
            duration: snapshot.elapsed,
            requests: counts.requests,
            errors: counts.errors,
            timeouts: counts.timeouts(),
            bytes_read: counts.bytes_read,
            requests_per_sec: per_sec(counts.requests),
            bytes_per_sec: per_sec(counts.bytes_read),
            rps: RateStats::from_histogram(rps),
            latency: LatencyStats::from_histogram(&snapshot.latencies),
            status: counts.status,
            error_kinds: counts.error_kinds,
            error_messages: snapshot.error_messages,
        }
    }

    #[inline]
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.requests - self.errors
    }
}

fn as_secs_f64<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
