//! Worker pool and run controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hdrhistogram::Histogram;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::{Client, Target, Transport};
use crate::error::FatalError;
use crate::limiter::RateLimiter;
use crate::outcome::RequestOutcome;
use crate::recorder::{Lane, Progress, Recorder};
use crate::result::{RunResult, StopCause};
use crate::spec::RunSpec;

const RPS_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const MAX_TRACKED_RPS: u64 = 100_000_000;

/// Owns one run: builds the transport, starts the workers, decides when they
/// stop and freezes the recorder into a [`RunResult`] once all have exited.
pub struct Runner {
    spec: RunSpec,
    stop: CancellationToken,
    progress_tx: watch::Sender<Progress>,
}

impl Runner {
    pub fn new(spec: RunSpec) -> Result<Self, FatalError> {
        spec.validate()?;
        let (progress_tx, _) = watch::channel(Progress::default());
        Ok(Self {
            spec,
            stop: CancellationToken::new(),
            progress_tx,
        })
    }

    /// Cancelling the returned token stops the run early. Workers finish the
    /// request they are on and the run still produces a result.
    #[must_use]
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Interim counters, refreshed every `progress_interval`.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    #[inline]
    #[must_use]
    pub fn spec(&self) -> &RunSpec {
        &self.spec
    }

    pub async fn run(self) -> Result<RunResult, FatalError> {
        let spec = &self.spec;
        let transport = Transport::connect(spec).await?;
        let target = Arc::new(Target::prepare(spec).await?);
        let recorder = Arc::new(Recorder::new(spec.workers, spec.record_failed_latencies)?);
        let mut rps = Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_RPS, 3)?;
        let limiter = Arc::new(RateLimiter::new(spec.rate));
        let budget = spec.requests.map(|total| Arc::new(Budget::new(total)));

        tracing::info!(
            url = %target.url(),
            workers = spec.workers,
            requests = ?spec.requests,
            duration = ?spec.duration,
            rate = ?spec.rate,
            client = %transport.kind(),
            "starting run",
        );

        let mut workers = JoinSet::new();
        for id in 0..spec.workers {
            let worker = Worker {
                id,
                client: transport.client(spec.timeout, spec.keep_alive),
                target: Arc::clone(&target),
                limiter: Arc::clone(&limiter),
                lane: recorder.lane(id),
                budget: budget.clone(),
                stop: self.stop.clone(),
            };
            workers.spawn(worker.run());
        }

        let started = Instant::now();
        let deadline = spec.duration.map(|d| started + d);
        // Never polled when there is no deadline.
        let deadline_sleep = sleep_until(deadline.unwrap_or(started));
        tokio::pin!(deadline_sleep);

        let mut sampler = interval_at(started + RPS_SAMPLE_INTERVAL, RPS_SAMPLE_INTERVAL);
        sampler.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress = interval_at(started + spec.progress_interval, spec.progress_interval);
        progress.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_sample = (started, 0u64);
        let mut cause = None;

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(err)) => tracing::error!(%err, "worker task failed"),
                    None => break,
                },
                () = &mut deadline_sleep, if deadline.is_some() && cause.is_none() => {
                    tracing::info!("duration elapsed, stopping workers");
                    cause = Some(StopCause::Deadline);
                    self.stop.cancel();
                }
                () = self.stop.cancelled(), if cause.is_none() => {
                    tracing::info!("cancellation requested, stopping workers");
                    cause = Some(StopCause::Cancelled);
                }
                now = sampler.tick(), if cause.is_none() => {
                    let requests = recorder.counts().requests;
                    let (at, seen) = last_sample;
                    let secs = now.duration_since(at).as_secs_f64();
                    if secs > 0.0 {
                        rps.saturating_record(((requests - seen) as f64 / secs).round() as u64);
                    }
                    last_sample = (now, requests);
                }
                _ = progress.tick() => {
                    self.progress_tx.send_replace(recorder.progress());
                }
            }
        }

        let cause = cause.unwrap_or(StopCause::Completed);
        let snapshot = recorder.snapshot();
        self.progress_tx.send_replace(Progress {
            elapsed: snapshot.elapsed,
            counts: snapshot.counts,
        });
        // Runs shorter than one sample tick still get a rate.
        if rps.is_empty() && !snapshot.elapsed.is_zero() {
            let overall = snapshot.counts.requests as f64 / snapshot.elapsed.as_secs_f64();
            rps.saturating_record(overall.round() as u64);
        }
        let kind = transport.kind();
        transport.teardown();

        tracing::info!(
            ?cause,
            requests = snapshot.counts.requests,
            errors = snapshot.counts.errors,
            elapsed = ?snapshot.elapsed,
            "run finished",
        );
        Ok(RunResult::new(kind, cause, snapshot, &rps))
    }
}

/// Shared request allowance for count-bounded runs. Exactly `total` claims
/// succeed no matter how many workers race for them.
struct Budget {
    claimed: AtomicU64,
    total: u64,
}

impl Budget {
    fn new(total: u64) -> Self {
        Self {
            claimed: AtomicU64::new(0),
            total,
        }
    }

    #[inline]
    fn try_claim(&self) -> bool {
        self.claimed.fetch_add(1, Ordering::AcqRel) < self.total
    }
}

struct Worker {
    id: usize,
    client: Client,
    target: Arc<Target>,
    limiter: Arc<RateLimiter>,
    lane: Lane,
    budget: Option<Arc<Budget>>,
    stop: CancellationToken,
}

impl Worker {
    /// Issue loop. The stop signal is observed only between requests, an
    /// in-flight request always completes and is recorded.
    async fn run(mut self) {
        tracing::debug!(worker_id = self.id, "worker started");
        let mut issued = 0u64;
        loop {
            if self.stop.is_cancelled() {
                break;
            }
            if let Some(budget) = &self.budget {
                if !budget.try_claim() {
                    break;
                }
            }
            tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                () = self.limiter.acquire() => {}
            }
            let started = Instant::now();
            let result = self.client.send(&self.target).await;
            self.lane
                .record(&RequestOutcome::new(started.elapsed(), result));
            issued += 1;
        }
        self.client.teardown();
        tracing::debug!(worker_id = self.id, issued, "worker stopped");
    }
}
