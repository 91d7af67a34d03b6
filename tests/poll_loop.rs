// tests/poll_loop.rs
//
// PollLoop behaviour with scripted collaborators. No sockets, no real sleeping.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quake_bridge::error::{FetchError, PublishError};
use quake_bridge::ingest::scheduler::{CycleOutcome, PollLoop, Sleeper};
use quake_bridge::ingest::types::{FeedFetcher, NormalizedEvent, RawFeedDocument};
use quake_bridge::publish::{BatchPublisher, PublishReport};
use reqwest::StatusCode;
use serde_json::json;

enum Step {
    Doc(serde_json::Value),
    Timeout,
    Panic,
}

struct ScriptedFetcher {
    steps: Mutex<VecDeque<Step>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedFetcher {
    fn new(steps: Vec<Step>) -> (Self, Arc<Mutex<usize>>) {
        let calls = Arc::new(Mutex::new(0));
        (
            Self {
                steps: Mutex::new(steps.into()),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<RawFeedDocument, FetchError> {
        *self.calls.lock().unwrap() += 1;
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Doc(v)) => Ok(RawFeedDocument::new(v)),
            Some(Step::Timeout) => Err(FetchError::Timeout("operation timed out".into())),
            Some(Step::Panic) => panic!("malformed feature blew up"),
            None => Ok(RawFeedDocument::new(json!({"features": []}))),
        }
    }
    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingPublisher {
    calls: Arc<Mutex<Vec<usize>>>,
    fail_next: Mutex<VecDeque<bool>>,
}

#[async_trait]
impl BatchPublisher for RecordingPublisher {
    async fn publish(&self, events: &[NormalizedEvent]) -> Result<PublishReport, PublishError> {
        self.calls.lock().unwrap().push(events.len());
        if self.fail_next.lock().unwrap().pop_front().unwrap_or(false) {
            return Err(PublishError::Unauthorized {
                status: StatusCode::UNAUTHORIZED,
            });
        }
        Ok(PublishReport {
            events: events.len(),
            batches: 1,
        })
    }
    fn name(&self) -> &str {
        "recording"
    }
}

#[derive(Clone, Default)]
struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, period: Duration) {
        self.slept.lock().unwrap().push(period);
    }
}

const INTERVAL: Duration = Duration::from_secs(300);

struct Harness {
    poll: PollLoop,
    fetch_calls: Arc<Mutex<usize>>,
    publish_calls: Arc<Mutex<Vec<usize>>>,
    slept: Arc<Mutex<Vec<Duration>>>,
}

fn harness(steps: Vec<Step>, publish_failures: Vec<bool>) -> Harness {
    let (fetcher, fetch_calls) = ScriptedFetcher::new(steps);
    let publisher = RecordingPublisher {
        fail_next: Mutex::new(publish_failures.into()),
        ..Default::default()
    };
    let publish_calls = publisher.calls.clone();
    let sleeper = RecordingSleeper::default();
    let slept = sleeper.slept.clone();
    let poll = PollLoop::new(
        Box::new(fetcher),
        Box::new(publisher),
        Box::new(sleeper),
        INTERVAL,
    );
    Harness {
        poll,
        fetch_calls,
        publish_calls,
        slept,
    }
}

fn one_quake() -> serde_json::Value {
    json!({"features":[{"id":"eq1","properties":{"time":1000,"mag":4.5,"place":"Test","type":"earthquake"},"geometry":{"coordinates":[1,2,3]}}]})
}

#[tokio::test]
async fn events_are_published_then_loop_sleeps() {
    let h = harness(vec![Step::Doc(one_quake())], vec![]);
    let outcome = h.poll.tick().await;

    assert!(matches!(outcome, CycleOutcome::Published { events: 1, batches: 1 }));
    assert_eq!(*h.publish_calls.lock().unwrap(), vec![1]);
    assert_eq!(*h.slept.lock().unwrap(), vec![INTERVAL]);
}

#[tokio::test]
async fn empty_feed_skips_publish() {
    let h = harness(vec![Step::Doc(json!({"features": []}))], vec![]);
    let outcome = h.poll.tick().await;

    assert!(matches!(outcome, CycleOutcome::NoEvents));
    assert!(h.publish_calls.lock().unwrap().is_empty());
    assert_eq!(h.slept.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn fetch_timeout_aborts_before_publish_and_next_tick_recovers() {
    let h = harness(vec![Step::Timeout, Step::Doc(one_quake())], vec![]);

    let first = h.poll.tick().await;
    assert!(matches!(first, CycleOutcome::FetchFailed(FetchError::Timeout(_))));
    assert!(h.publish_calls.lock().unwrap().is_empty());

    let second = h.poll.tick().await;
    assert!(matches!(second, CycleOutcome::Published { events: 1, .. }));
    assert_eq!(*h.fetch_calls.lock().unwrap(), 2);
    assert_eq!(*h.slept.lock().unwrap(), vec![INTERVAL, INTERVAL]);
}

#[tokio::test]
async fn publish_auth_failure_is_contained() {
    let h = harness(
        vec![Step::Doc(one_quake()), Step::Doc(one_quake())],
        vec![true, false],
    );

    let first = h.poll.tick().await;
    assert!(matches!(
        first,
        CycleOutcome::PublishFailed(PublishError::Unauthorized { .. })
    ));
    assert_eq!(h.slept.lock().unwrap().len(), 1);

    let second = h.poll.tick().await;
    assert!(second.is_success());
    assert_eq!(*h.publish_calls.lock().unwrap(), vec![1, 1]);
}

#[tokio::test]
async fn panic_inside_cycle_becomes_unexpected_failure() {
    let h = harness(vec![Step::Panic, Step::Doc(one_quake())], vec![]);

    let first = h.poll.tick().await;
    match first {
        CycleOutcome::Unexpected(cause) => assert!(cause.contains("malformed feature")),
        other => panic!("expected Unexpected, got {other:?}"),
    }
    assert!(h.publish_calls.lock().unwrap().is_empty());

    let second = h.poll.tick().await;
    assert!(second.is_success());
    assert_eq!(h.slept.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn publisher_never_sees_an_empty_slice() {
    let h = harness(
        vec![
            Step::Doc(json!({"features": []})),
            Step::Doc(json!(null)),
            Step::Timeout,
            Step::Doc(one_quake()),
            Step::Doc(json!({"nothing": true})),
        ],
        vec![],
    );
    for _ in 0..5 {
        h.poll.run_cycle().await;
    }
    let calls = h.publish_calls.lock().unwrap();
    assert_eq!(*calls, vec![1]);
    assert!(calls.iter().all(|n| *n > 0));
    // run_cycle alone never sleeps
    assert!(h.slept.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_keeps_cycling_on_the_tokio_clock() {
    let (fetcher, fetch_calls) = ScriptedFetcher::new(vec![Step::Timeout, Step::Timeout]);
    let poll = Arc::new(PollLoop::new(
        Box::new(fetcher),
        Box::new(RecordingPublisher::default()),
        Box::new(quake_bridge::ingest::scheduler::TokioSleeper),
        Duration::from_secs(60),
    ));

    let runner = poll.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_secs(60 * 3 + 1)).await;
    handle.abort();

    // cycles at t=0, 60, 120, 180
    assert_eq!(*fetch_calls.lock().unwrap(), 4);
}
