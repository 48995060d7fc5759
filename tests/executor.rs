use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use reqwest::{Body, StatusCode};
use resilient_http::{
    BoxError, CallContext, Cancelled, ConstantBackoff, Error, ExponentialBackoff, Request,
    ResilientClient, ResolveError, Response, Transport,
};

#[derive(Clone, Copy, Debug)]
enum Step {
    Status(u16),
    Fail(io::ErrorKind),
    Unresolvable { temporary: bool },
    Hang,
}

#[derive(Default)]
struct StubTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    bodies: Mutex<Vec<Option<Vec<u8>>>>,
}

impl StubTransport {
    fn scripted(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bodies(&self) -> Vec<Option<Vec<u8>>> {
        self.bodies
            .lock()
            .expect("body log mutex must not be poisoned")
            .clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .lock()
            .expect("body log mutex must not be poisoned")
            .push(request.body_bytes().map(<[u8]>::to_vec));

        let step = self
            .steps
            .lock()
            .expect("step mutex must not be poisoned")
            .pop_front()
            .unwrap_or(Step::Status(200));

        match step {
            Step::Status(code) => Ok(Response::new(
                StatusCode::from_u16(code)?,
                format!("status {code}"),
            )),
            Step::Fail(kind) => Err(io::Error::new(kind, "scripted failure").into()),
            Step::Unresolvable { temporary } => {
                Err(ResolveError::new(request.url().host_str().unwrap_or(""), temporary).into())
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

fn zero_delay() -> ExponentialBackoff {
    ExponentialBackoff::new(Duration::ZERO, Duration::ZERO, 2.0, Duration::ZERO)
}

fn client(stub: &Arc<StubTransport>, retries: u32) -> ResilientClient<Arc<StubTransport>> {
    ResilientClient::new(stub.clone())
        .with_retry_count(retries)
        .with_backoff(zero_delay())
}

fn get() -> Request {
    Request::get("http://api.example.test/items").expect("valid url")
}

#[tokio::test]
async fn recovers_after_two_server_errors() {
    let stub = StubTransport::scripted([Step::Status(500), Step::Status(500), Step::Status(200)]);

    let response = client(&stub, 2)
        .execute(get(), &CallContext::new())
        .await
        .expect("third attempt must succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(stub.calls(), 3);
}

#[tokio::test]
async fn client_error_is_returned_without_retry() {
    let stub = StubTransport::scripted([Step::Status(400), Step::Status(200)]);

    let response = client(&stub, 2)
        .execute(get(), &CallContext::new())
        .await
        .expect("400 is a response, not an error");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.expect("body"), "status 400");
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn exhausted_budget_returns_last_response() {
    let stub = StubTransport::scripted([Step::Status(503); 5]);

    let response = client(&stub, 2)
        .execute(get(), &CallContext::new())
        .await
        .expect("final 503 is surfaced as a response");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(stub.calls(), 3);
}

#[tokio::test]
async fn cancel_during_backoff_stops_further_attempts() {
    let stub = StubTransport::scripted([Step::Status(503), Step::Status(200)]);
    let client = ResilientClient::new(stub.clone())
        .with_retry_count(2)
        .with_backoff(ConstantBackoff::new(Duration::from_secs(30)));

    let ctx = CallContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = client
        .execute(get(), &ctx)
        .await
        .expect_err("cancellation must win");

    assert!(matches!(err, Error::Cancelled(Cancelled::Canceled)));
    assert_eq!(stub.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn replayable_body_is_resent_identically() {
    let stub = StubTransport::scripted([Step::Status(500), Step::Status(201)]);
    let request = Request::post("http://api.example.test/items")
        .expect("valid url")
        .json(&serde_json::json!({ "name": "Kit", "tags": ["a", "b"] }))
        .expect("serialisable body");

    let response = client(&stub, 1)
        .execute(request, &CallContext::new())
        .await
        .expect("retry must succeed");

    assert_eq!(response.status(), StatusCode::CREATED);
    let bodies = stub.bodies();
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0].is_some());
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn identical_inputs_give_identical_outcomes() {
    let script = [Step::Status(502), Step::Status(429), Step::Status(404)];
    let mut observed = Vec::new();

    for _ in 0..2 {
        let stub = StubTransport::scripted(script);
        let response = client(&stub, 3)
            .execute(get(), &CallContext::new())
            .await
            .expect("404 response");
        observed.push((stub.calls(), response.status()));
    }

    assert_eq!(observed[0], (3, StatusCode::NOT_FOUND));
    assert_eq!(observed[0], observed[1]);
}

#[tokio::test]
async fn transient_transport_errors_are_retried() {
    let stub = StubTransport::scripted([
        Step::Fail(io::ErrorKind::ConnectionRefused),
        Step::Fail(io::ErrorKind::ConnectionReset),
        Step::Unresolvable { temporary: true },
        Step::Status(200),
    ]);

    let response = client(&stub, 3)
        .execute(get(), &CallContext::new())
        .await
        .expect("fourth attempt must succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(stub.calls(), 4);
}

#[tokio::test]
async fn exhausted_transport_errors_surface_the_last_error() {
    let stub = StubTransport::scripted([
        Step::Fail(io::ErrorKind::TimedOut),
        Step::Fail(io::ErrorKind::TimedOut),
        Step::Fail(io::ErrorKind::TimedOut),
    ]);

    let err = client(&stub, 2)
        .execute(get(), &CallContext::new())
        .await
        .expect_err("every attempt timed out");

    assert!(err.is_timeout());
    assert!(!err.is_cancelled());
    assert_eq!(stub.calls(), 3);
}

#[tokio::test]
async fn permanent_transport_errors_are_not_retried() {
    for step in [
        Step::Fail(io::ErrorKind::PermissionDenied),
        Step::Unresolvable { temporary: false },
    ] {
        let stub = StubTransport::scripted([step, Step::Status(200)]);

        let err = client(&stub, 3)
            .execute(get(), &CallContext::new())
            .await
            .expect_err("permanent failure");

        assert!(matches!(err, Error::Transport(_)), "{step:?}");
        assert_eq!(stub.calls(), 1, "{step:?}");
    }
}

#[tokio::test]
async fn body_factory_failure_is_fatal() {
    let stub = StubTransport::scripted([Step::Status(500), Step::Status(200)]);
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = produced.clone();
    let request = Request::post("http://api.example.test/upload")
        .expect("valid url")
        .body_with(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Body::from("chunk"))
            } else {
                Err("upload source closed".into())
            }
        })
        .expect("first body");

    let err = client(&stub, 3)
        .execute(request, &CallContext::new())
        .await
        .expect_err("factory failure ends the call");

    assert!(matches!(err, Error::BodyReproduction(_)));
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn one_shot_body_is_not_resent() {
    let stub = StubTransport::scripted([Step::Status(500), Step::Status(200)]);
    let request = Request::post("http://api.example.test/upload")
        .expect("valid url")
        .stream(Body::wrap_stream(futures_util::stream::iter(vec![
            Ok::<_, io::Error>("part-1"),
            Ok("part-2"),
        ])));

    let err = client(&stub, 3)
        .execute(request, &CallContext::new())
        .await
        .expect_err("stream cannot be replayed");

    assert!(matches!(err, Error::BodyNotReplayable { attempt: 1 }));
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn one_shot_body_is_fine_without_retries_needed() {
    let stub = StubTransport::scripted([Step::Status(200)]);
    let request = Request::post("http://api.example.test/upload")
        .expect("valid url")
        .stream(Body::wrap_stream(futures_util::stream::iter(vec![
            Ok::<_, io::Error>("only"),
        ])));

    let response = client(&stub, 3)
        .execute(request, &CallContext::new())
        .await
        .expect("single attempt succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn deadline_interrupts_a_hanging_attempt() {
    let stub = StubTransport::scripted([Step::Hang]);
    let ctx = CallContext::new().with_timeout(Duration::from_millis(50));

    let err = client(&stub, 3)
        .execute(get(), &ctx)
        .await
        .expect_err("deadline must fire");

    assert!(matches!(err, Error::Cancelled(Cancelled::DeadlineExceeded)));
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn expired_deadline_makes_no_calls() {
    let stub = StubTransport::scripted([]);
    let ctx = CallContext::new().with_timeout(Duration::ZERO);

    let err = client(&stub, 3)
        .execute(get(), &ctx)
        .await
        .expect_err("deadline already passed");

    assert!(matches!(err, Error::Cancelled(Cancelled::DeadlineExceeded)));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn backoff_delays_are_waited_out() {
    let stub = StubTransport::scripted([Step::Status(503), Step::Status(408), Step::Status(200)]);
    let client = ResilientClient::new(stub.clone())
        .with_retry_count(2)
        .with_backoff(ConstantBackoff::new(Duration::from_millis(25)));

    let started = Instant::now();
    let response = client
        .execute(get(), &CallContext::new())
        .await
        .expect("third attempt succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn shared_client_serves_concurrent_callers() {
    let stub = StubTransport::scripted([]);
    let client = client(&stub, 2);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.execute(get(), &CallContext::new()).await })
        })
        .collect();

    for task in tasks {
        let response = task
            .await
            .expect("task must not panic")
            .expect("request must succeed");
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(stub.calls(), 8);
}
