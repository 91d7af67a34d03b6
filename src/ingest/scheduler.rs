// src/ingest/scheduler.rs
//! The poll loop: Fetch → Transform → Publish, then sleep, forever.
//!
//! Every cycle ends in a [`CycleOutcome`]; none of them stops the loop. The
//! interval is slept after a cycle finishes, so the effective period drifts by
//! the cycle's own duration.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use metrics::{counter, gauge, histogram};

use crate::error::{FetchError, PublishError};
use crate::ingest::transform::transform;
use crate::ingest::types::FeedFetcher;
use crate::publish::BatchPublisher;
use crate::telemetry;

/// Cadence timer. Production sleeps on tokio; tests record the request.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, period: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, period: Duration) {
        tokio::time::sleep(period).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Transforming,
    Publishing,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Published { events: usize, batches: usize },
    NoEvents,
    FetchFailed(FetchError),
    PublishFailed(PublishError),
    Unexpected(String),
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::NoEvents => "no_events",
            Self::FetchFailed(_) => "fetch_failed",
            Self::PublishFailed(_) => "publish_failed",
            Self::Unexpected(_) => "unexpected",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Published { .. } | Self::NoEvents)
    }
}

/// One in-flight cycle. Lives from fetch start to publish completion.
struct Cycle {
    seq: u64,
    started: Instant,
    state: PollState,
}

impl Cycle {
    fn start(seq: u64) -> Self {
        Self {
            seq,
            started: Instant::now(),
            state: PollState::Idle,
        }
    }

    fn enter(&mut self, next: PollState) {
        tracing::debug!(cycle = self.seq, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}

pub struct PollLoop {
    fetcher: Box<dyn FeedFetcher>,
    publisher: Box<dyn BatchPublisher>,
    sleeper: Box<dyn Sleeper>,
    interval: Duration,
    seq: std::sync::atomic::AtomicU64,
}

impl PollLoop {
    pub fn new(
        fetcher: Box<dyn FeedFetcher>,
        publisher: Box<dyn BatchPublisher>,
        sleeper: Box<dyn Sleeper>,
        interval: Duration,
    ) -> Self {
        telemetry::ensure_metrics_described();
        Self {
            fetcher,
            publisher,
            sleeper,
            interval,
            seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until the process is stopped.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            fetcher = self.fetcher.name(),
            publisher = self.publisher.name(),
            "poll loop started"
        );
        loop {
            self.tick().await;
        }
    }

    /// One cycle followed by the inter-cycle sleep.
    pub async fn tick(&self) -> CycleOutcome {
        let outcome = self.run_cycle().await;
        self.sleeper.sleep(self.interval).await;
        outcome
    }

    /// Exactly one cycle. Panics inside the cycle are caught here.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let seq = self
            .seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        let started = Instant::now();

        let outcome = match AssertUnwindSafe(self.cycle(seq)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => CycleOutcome::Unexpected(telemetry::panic_message(panic.as_ref())),
        };

        let ms = started.elapsed().as_secs_f64() * 1_000.0;
        histogram!("bridge_cycle_ms").record(ms);
        counter!("bridge_cycles_total", "outcome" => outcome.label()).increment(1);
        if outcome.is_success() {
            gauge!("bridge_last_success_ts").set(chrono::Utc::now().timestamp() as f64);
        }
        log_outcome(seq, &outcome, ms);
        outcome
    }

    async fn cycle(&self, seq: u64) -> CycleOutcome {
        let mut cycle = Cycle::start(seq);

        cycle.enter(PollState::Fetching);
        let doc = match self.fetcher.fetch().await {
            Ok(doc) => doc,
            Err(e) => {
                counter!("bridge_fetch_errors_total", "reason" => e.kind()).increment(1);
                return CycleOutcome::FetchFailed(e);
            }
        };

        cycle.enter(PollState::Transforming);
        let events = transform(Some(&doc));
        if events.is_empty() {
            cycle.enter(PollState::Idle);
            return CycleOutcome::NoEvents;
        }

        cycle.enter(PollState::Publishing);
        let outcome = match self.publisher.publish(&events).await {
            Ok(report) => CycleOutcome::Published {
                events: report.events,
                batches: report.batches,
            },
            Err(e) => {
                counter!("bridge_publish_errors_total", "reason" => e.kind()).increment(1);
                CycleOutcome::PublishFailed(e)
            }
        };
        tracing::trace!(
            cycle = seq,
            elapsed_ms = cycle.started.elapsed().as_millis() as u64,
            "cycle done"
        );
        cycle.enter(PollState::Idle);
        outcome
    }
}

fn log_outcome(seq: u64, outcome: &CycleOutcome, ms: f64) {
    match outcome {
        CycleOutcome::Published { events, batches } => tracing::info!(
            cycle = seq,
            events,
            batches,
            elapsed_ms = ms as u64,
            "published earthquake events"
        ),
        CycleOutcome::NoEvents => {
            tracing::info!(cycle = seq, "no events in feed, skipping publish")
        }
        CycleOutcome::FetchFailed(e) => {
            tracing::warn!(cycle = seq, error = %e, "fetch failed, waiting for next tick")
        }
        CycleOutcome::PublishFailed(e) => {
            tracing::warn!(cycle = seq, error = %e, "publish failed, waiting for next tick")
        }
        CycleOutcome::Unexpected(cause) => {
            tracing::error!(cycle = seq, cause = %cause, "unexpected failure in cycle")
        }
    }
}
