//! Concurrent aggregation of request outcomes.
//!
//! Every worker writes through a [`Lane`] bound to one shard. A shard is a set
//! of atomic counters plus a mutex-guarded latency histogram that is only ever
//! held for a single `record` or a single merge, so readers never stall writers
//! for longer than one histogram update.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{ErrorKind, FatalError};
use crate::outcome::{RequestOutcome, StatusClass};

const MAX_SHARDS: usize = 64;
const LATENCY_SIGFIG: u8 = 3;
/// Latencies are kept in microseconds, saturating at one hour.
const MAX_LATENCY_US: u64 = 60 * 60 * 1_000_000;
pub const MAX_ERROR_MESSAGES: usize = 32;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    #[serde(rename = "1xx")]
    pub informational: u64,
    #[serde(rename = "2xx")]
    pub success: u64,
    #[serde(rename = "3xx")]
    pub redirect: u64,
    #[serde(rename = "4xx")]
    pub client_error: u64,
    #[serde(rename = "5xx")]
    pub server_error: u64,
    pub others: u64,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorKindCounts {
    pub timeout: u64,
    pub connection: u64,
    pub protocol: u64,
}

impl ErrorKindCounts {
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        self.timeout + self.connection + self.protocol
    }
}

/// Cumulative counters. Every field only ever grows during a run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Attempts that produced an outcome, successful or not.
    pub requests: u64,
    pub errors: u64,
    pub bytes_read: u64,
    pub status: StatusCounts,
    pub error_kinds: ErrorKindCounts,
}

impl Counts {
    #[inline]
    #[must_use]
    pub fn timeouts(&self) -> u64 {
        self.error_kinds.timeout
    }
}

/// Interim view pushed to progress observers.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Progress {
    pub elapsed: Duration,
    pub counts: Counts,
}

/// Point-in-time view of everything recorded so far.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub elapsed: Duration,
    pub counts: Counts,
    /// Microsecond latencies.
    pub latencies: Histogram<u64>,
    /// Distinct error messages with counts, most frequent first.
    pub error_messages: Vec<(String, u64)>,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    bytes_read: AtomicU64,
    status: [AtomicU64; StatusClass::COUNT],
    kinds: [AtomicU64; 3],
}

#[repr(align(128))]
struct Shard {
    counters: Counters,
    latencies: Mutex<Histogram<u64>>,
    messages: Mutex<HashMap<String, u64>>,
}

impl Shard {
    fn new() -> Result<Self, FatalError> {
        Ok(Self {
            counters: Counters::default(),
            latencies: Mutex::new(Histogram::new_with_bounds(
                1,
                MAX_LATENCY_US,
                LATENCY_SIGFIG,
            )?),
            messages: Mutex::new(HashMap::new()),
        })
    }

    #[inline]
    fn record_latency(&self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX).max(1);
        self.latencies.lock().saturating_record(us);
    }

    fn note_message(&self, msg: String) {
        let mut messages = self.messages.lock();
        if let Some(count) = messages.get_mut(&msg) {
            *count += 1;
        } else if messages.len() < MAX_ERROR_MESSAGES {
            messages.insert(msg, 1);
        }
    }
}

pub struct Recorder {
    shards: Box<[Shard]>,
    started: Instant,
    record_failed_latencies: bool,
}

impl Recorder {
    /// Creates a recorder sized for `lanes` concurrent writers.
    pub fn new(lanes: usize, record_failed_latencies: bool) -> Result<Self, FatalError> {
        let shards = (0..lanes.clamp(1, MAX_SHARDS))
            .map(|_| Shard::new())
            .collect::<Result<Vec<_>, _>>()?
            .into_boxed_slice();
        Ok(Self {
            shards,
            started: Instant::now(),
            record_failed_latencies,
        })
    }

    /// Write handle for one worker.
    #[must_use]
    pub fn lane(self: &Arc<Self>, worker_id: usize) -> Lane {
        Lane {
            recorder: Arc::clone(self),
            index: worker_id % self.shards.len(),
        }
    }

    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn record_on(&self, index: usize, outcome: &RequestOutcome) {
        let shard = &self.shards[index];
        let counters = &shard.counters;
        match &outcome.result {
            Ok(done) => {
                counters.status[StatusClass::of(done.status).index()]
                    .fetch_add(1, Ordering::Relaxed);
                counters
                    .bytes_read
                    .fetch_add(done.bytes_read, Ordering::Relaxed);
                shard.record_latency(outcome.latency);
            }
            Err(err) => {
                let kind = match err.kind() {
                    ErrorKind::Timeout => 0,
                    ErrorKind::Connection => 1,
                    ErrorKind::Protocol => 2,
                };
                counters.kinds[kind].fetch_add(1, Ordering::Relaxed);
                if self.record_failed_latencies {
                    shard.record_latency(outcome.latency);
                }
                shard.note_message(err.to_string());
            }
        }
        counters.requests.fetch_add(1, Ordering::Release);
    }

    /// Sums the counters of every shard without touching the histograms.
    #[must_use]
    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for shard in self.shards.iter() {
            let c = &shard.counters;
            counts.requests += c.requests.load(Ordering::Acquire);
            counts.bytes_read += c.bytes_read.load(Ordering::Relaxed);
            let status = |class: StatusClass| c.status[class.index()].load(Ordering::Relaxed);
            counts.status.informational += status(StatusClass::Informational);
            counts.status.success += status(StatusClass::Success);
            counts.status.redirect += status(StatusClass::Redirect);
            counts.status.client_error += status(StatusClass::ClientError);
            counts.status.server_error += status(StatusClass::ServerError);
            counts.status.others += status(StatusClass::Other);
            counts.error_kinds.timeout += c.kinds[0].load(Ordering::Relaxed);
            counts.error_kinds.connection += c.kinds[1].load(Ordering::Relaxed);
            counts.error_kinds.protocol += c.kinds[2].load(Ordering::Relaxed);
        }
        counts.errors = counts.error_kinds.total();
        counts
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        Progress {
            elapsed: self.elapsed(),
            counts: self.counts(),
        }
    }

    /// Merges all shards into one view. Each shard lock is held only while its
    /// histogram is added, so concurrent writers keep going.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let elapsed = self.elapsed();
        let counts = self.counts();

        let mut latencies = Histogram::new_from(&*self.shards[0].latencies.lock());
        let mut messages: HashMap<String, u64> = HashMap::new();
        for shard in self.shards.iter() {
            if let Err(err) = latencies.add(&*shard.latencies.lock()) {
                tracing::warn!(%err, "dropping shard latencies from snapshot");
            }
            for (msg, count) in shard.messages.lock().iter() {
                *messages.entry(msg.clone()).or_default() += count;
            }
        }
        let mut error_messages: Vec<(String, u64)> = messages.into_iter().collect();
        error_messages.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        error_messages.truncate(MAX_ERROR_MESSAGES);

        Snapshot {
            elapsed,
            counts,
            latencies,
            error_messages,
        }
    }
}

/// A worker's write path into the recorder.
#[derive(Clone)]
pub struct Lane {
    recorder: Arc<Recorder>,
    index: usize,
}

impl Lane {
    #[inline]
    pub fn record(&self, outcome: &RequestOutcome) {
        self.recorder.record_on(self.index, outcome);
    }
}
