use std::time::{Duration, Instant};

use bytes::Bytes;
use hyper::{Method, Uri};
use mock_target::{EchoResponse, MockTarget};
use volley_core::{BodySource, ClientKind, RunSpec, Runner, StopCause};

const ALL_CLIENTS: [ClientKind; 3] = [ClientKind::Fast, ClientKind::Http1, ClientKind::Http2];

fn spec_for(target: &MockTarget, path: &str) -> RunSpec {
    let url: Uri = target.url(path).parse().unwrap();
    RunSpec::new(url)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_request_single_worker() {
    for client in ALL_CLIENTS {
        let target = MockTarget::spawn().await.unwrap();
        let spec = RunSpec {
            workers: 1,
            requests: Some(1),
            client,
            ..spec_for(&target, "/")
        };
        let result = Runner::new(spec).unwrap().run().await.unwrap();
        assert_eq!(result.requests, 1, "{client:?}");
        assert_eq!(result.errors, 0, "{client:?}: {:?}", result.error_messages);
        assert_eq!(result.status.success, 1, "{client:?}");
        assert_eq!(result.bytes_read, mock_target::INDEX_BODY.len() as u64);
        assert_eq!(result.stop_cause, StopCause::Completed);
        assert_eq!(result.client, client);
        assert_eq!(target.hits(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn count_bound_is_exact_under_contention() {
    for client in ALL_CLIENTS {
        let target = MockTarget::spawn().await.unwrap();
        let spec = RunSpec {
            workers: 64,
            requests: Some(2_000),
            client,
            ..spec_for(&target, "/")
        };
        let result = Runner::new(spec).unwrap().run().await.unwrap();
        assert_eq!(result.requests, 2_000, "{client:?}");
        assert_eq!(result.status.success, 2_000, "{client:?}");
        assert_eq!(target.hits(), 2_000, "{client:?}");
        assert_eq!(result.latency.percentiles.len(), 5);
        assert!(result.latency.max > 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_more_workers_than_threads() {
    let target = MockTarget::spawn().await.unwrap();
    let spec = RunSpec {
        workers: 1_000,
        requests: Some(5_000),
        timeout: Duration::from_secs(10),
        ..spec_for(&target, "/")
    };
    let result = Runner::new(spec).unwrap().run().await.unwrap();
    assert_eq!(result.requests, 5_000);
    assert_eq!(
        result.successes() + result.errors,
        result.requests,
        "{:?}",
        result.error_messages
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rate_limit_caps_total_across_workers() {
    let target = MockTarget::spawn().await.unwrap();
    let spec = RunSpec {
        workers: 10,
        duration: Some(Duration::from_secs(1)),
        rate: Some(5),
        ..spec_for(&target, "/")
    };
    let started = Instant::now();
    let result = Runner::new(spec).unwrap().run().await.unwrap();
    let wall = started.elapsed();
    assert!((4..=6).contains(&result.requests), "{}", result.requests);
    assert_eq!(result.stop_cause, StopCause::Deadline);
    assert!(wall >= Duration::from_secs(1), "{wall:?}");
    assert!(wall < Duration::from_millis(1_500), "{wall:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rate_limit_converges_over_longer_runs() {
    let target = MockTarget::spawn().await.unwrap();
    let spec = RunSpec {
        workers: 20,
        duration: Some(Duration::from_secs(2)),
        rate: Some(200),
        ..spec_for(&target, "/")
    };
    let result = Runner::new(spec).unwrap().run().await.unwrap();
    assert!((360..=440).contains(&result.requests), "{}", result.requests);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_request_times_out() {
    for client in ALL_CLIENTS {
        let target = MockTarget::spawn().await.unwrap();
        let spec = RunSpec {
            workers: 4,
            requests: Some(100),
            timeout: Duration::from_millis(10),
            client,
            ..spec_for(&target, "/hang")
        };
        let result = Runner::new(spec).unwrap().run().await.unwrap();
        assert_eq!(result.requests, 100, "{client:?}");
        assert_eq!(result.errors, 100, "{client:?}");
        assert_eq!(result.timeouts, 100, "{client:?}");
        assert_eq!(result.error_kinds.timeout, 100);
        assert_eq!(result.status.success, 0);
        // timed out attempts stay out of the latency distribution
        assert_eq!(result.latency.max, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duration_bound_stops_after_deadline() {
    let target = MockTarget::spawn().await.unwrap();
    let timeout = Duration::from_millis(500);
    let spec = RunSpec {
        workers: 8,
        duration: Some(Duration::from_millis(300)),
        timeout,
        ..spec_for(&target, "/delay/20")
    };
    let result = Runner::new(spec).unwrap().run().await.unwrap();
    assert_eq!(result.stop_cause, StopCause::Deadline);
    assert!(result.duration >= Duration::from_millis(300));
    assert!(result.duration < Duration::from_millis(300) + timeout);
    assert!(result.requests > 0);
    assert!(result.rps.mean > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn external_cancellation_produces_result() {
    let target = MockTarget::spawn().await.unwrap();
    let timeout = Duration::from_secs(1);
    let spec = RunSpec {
        workers: 16,
        timeout,
        ..spec_for(&target, "/")
    };
    let runner = Runner::new(spec).unwrap();
    let stop = runner.stop_handle();
    let run = tokio::spawn(runner.run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let cancelled_at = Instant::now();
    stop.cancel();
    let result = run.await.unwrap().unwrap();

    assert!(cancelled_at.elapsed() < timeout);
    assert_eq!(result.stop_cause, StopCause::Cancelled);
    assert!(result.requests > 0);
    assert_eq!(result.successes(), result.requests);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_before_any_request_reports_zeroes() {
    let target = MockTarget::spawn().await.unwrap();
    let spec = RunSpec {
        workers: 4,
        rate: Some(1),
        ..spec_for(&target, "/")
    };
    let runner = Runner::new(spec).unwrap();
    runner.stop_handle().cancel();
    let result = runner.run().await.unwrap();
    assert_eq!(result.stop_cause, StopCause::Cancelled);
    assert_eq!(result.requests, 0);
    assert_eq!(result.errors, 0);
    assert_eq!(result.latency.max, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn status_classes_are_not_errors() {
    let target = MockTarget::spawn().await.unwrap();
    let spec = RunSpec {
        workers: 3,
        requests: Some(30),
        ..spec_for(&target, "/status/503")
    };
    let result = Runner::new(spec).unwrap().run().await.unwrap();
    assert_eq!(result.requests, 30);
    assert_eq!(result.errors, 0);
    assert_eq!(result.status.server_error, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bodies_reach_the_target() {
    let payload = Bytes::from(vec![b'x'; 50_000]);
    let expected = serde_json::to_vec(&EchoResponse {
        received: payload.len(),
    })
    .unwrap();
    for client in ALL_CLIENTS {
        for stream in [false, true] {
            let target = MockTarget::spawn().await.unwrap();
            let mut spec = RunSpec {
                workers: 2,
                requests: Some(10),
                stream,
                client,
                ..spec_for(&target, "/echo")
            };
            spec.request.method = Method::POST;
            spec.request.body = BodySource::Bytes(payload.clone());
            let result = Runner::new(spec).unwrap().run().await.unwrap();
            assert_eq!(result.status.success, 10, "{client:?} stream={stream}");
            assert_eq!(
                result.bytes_read,
                10 * expected.len() as u64,
                "{client:?} stream={stream}"
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn streams_body_from_file() {
    let path = std::env::temp_dir().join(format!("volley-stream-{}", std::process::id()));
    tokio::fs::write(&path, vec![b'y'; 100_000]).await.unwrap();
    let expected = serde_json::to_vec(&EchoResponse { received: 100_000 }).unwrap();

    let target = MockTarget::spawn().await.unwrap();
    let mut spec = RunSpec {
        workers: 4,
        requests: Some(20),
        stream: true,
        ..spec_for(&target, "/echo")
    };
    spec.request.method = Method::PUT;
    spec.request.body = BodySource::File(path.clone());
    let result = Runner::new(spec).unwrap().run().await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    assert_eq!(result.status.success, 20, "{:?}", result.error_messages);
    assert_eq!(result.bytes_read, 20 * expected.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn streams_empty_body() {
    for client in ALL_CLIENTS {
        let target = MockTarget::spawn().await.unwrap();
        let spec = RunSpec {
            workers: 2,
            requests: Some(6),
            stream: true,
            client,
            ..spec_for(&target, "/echo")
        };
        let result = Runner::new(spec).unwrap().run().await.unwrap();
        assert_eq!(result.status.success, 6, "{client:?}: {:?}", result.error_messages);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn progress_is_monotonic() {
    let target = MockTarget::spawn().await.unwrap();
    let spec = RunSpec {
        workers: 4,
        duration: Some(Duration::from_millis(500)),
        progress_interval: Duration::from_millis(50),
        ..spec_for(&target, "/delay/5")
    };
    let runner = Runner::new(spec).unwrap();
    let mut progress = runner.progress();
    let run = tokio::spawn(runner.run());

    let mut seen = Vec::new();
    while progress.changed().await.is_ok() {
        seen.push(*progress.borrow_and_update());
    }
    let result = run.await.unwrap().unwrap();

    assert!(seen.len() >= 3, "{}", seen.len());
    for pair in seen.windows(2) {
        assert!(pair[1].counts.requests >= pair[0].counts.requests);
        assert!(pair[1].counts.bytes_read >= pair[0].counts.bytes_read);
        assert!(pair[1].elapsed >= pair[0].elapsed);
    }
    assert_eq!(seen.last().unwrap().counts.requests, result.requests);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keep_alive_off_still_completes() {
    for client in ALL_CLIENTS {
        let target = MockTarget::spawn().await.unwrap();
        let spec = RunSpec {
            workers: 4,
            requests: Some(40),
            keep_alive: false,
            client,
            ..spec_for(&target, "/")
        };
        let result = Runner::new(spec).unwrap().run().await.unwrap();
        assert_eq!(result.status.success, 40, "{client:?}");
    }
}

#[test]
fn blocking_entry_point() {
    let server_rt = tokio::runtime::Runtime::new().unwrap();
    let target = server_rt.block_on(MockTarget::spawn()).unwrap();
    let spec = RunSpec {
        workers: 2,
        requests: Some(10),
        ..spec_for(&target, "/")
    };
    let result = volley_core::run(spec).unwrap();
    assert_eq!(result.requests, 10);
    assert_eq!(result.status.success, 10);
    drop(target);
}
