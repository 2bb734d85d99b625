//! Per-request statistics for a backend.
//!
//! # Responsibilities
//! - Count requests currently running against the backend
//! - Accumulate latency, request and error counts until the monitor drains them
//! - Wrap the request executor so every proxied request is measured
//!
//! # Design Decisions
//! - One mutex guards all counters; it is never held across a request
//! - Connection errors and status >= 500 count as errors
//! - Classification never alters what the caller receives

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

/// Counters shared by the request path and the monitor loop.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Counters {
    /// Requests currently running. Adjusted, never reset.
    pub in_flight: usize,
    /// Summed round-trip time of completed requests.
    pub latency_sum: Duration,
    /// Completed requests.
    pub requests: u64,
    /// Completed requests classified as errors.
    pub errors: u64,
}

/// Samples produced by draining [`Counters`] at the end of a period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drained {
    pub requests: u64,
    pub errors: u64,
    /// Summed latency divided by the period length and the request count.
    pub latency: f64,
    /// Errors divided by requests.
    pub failure_rate: f64,
}

impl Counters {
    /// Compute the period's samples and reset the cumulative counters.
    ///
    /// A period without requests yields zero samples.
    pub fn drain(&mut self, elapsed: Duration) -> Drained {
        let requests = self.requests;
        let errors = self.errors;

        let (latency, failure_rate) = if requests == 0 {
            (0.0, 0.0)
        } else {
            let period = elapsed.as_secs_f64();
            let latency = if period > 0.0 {
                self.latency_sum.as_secs_f64() / period / requests as f64
            } else {
                0.0
            };
            (latency, errors as f64 / requests as f64)
        };

        self.latency_sum = Duration::ZERO;
        self.requests = 0;
        self.errors = 0;

        Drained {
            requests,
            errors,
            latency,
            failure_rate,
        }
    }
}

/// Request statistics for a single backend.
#[derive(Debug, Default)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently running.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Record the start of a request.
    ///
    /// The returned guard records the outcome on [`InFlightGuard::finish`]; if
    /// it is dropped first the request only leaves the in-flight count.
    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        self.lock().in_flight += 1;
        InFlightGuard {
            collector: self.clone(),
            start: Instant::now(),
            finished: false,
        }
    }

    /// Lock the counters.
    ///
    /// When both are needed this lock must be taken before the stats lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A RAII guard for one running request.
#[derive(Debug)]
pub struct InFlightGuard {
    collector: Arc<StatsCollector>,
    start: Instant,
    finished: bool,
}

impl InFlightGuard {
    /// Record a completed request.
    pub fn finish(mut self, failed: bool) {
        let elapsed = self.start.elapsed();
        let mut counters = self.collector.lock();
        counters.in_flight = counters.in_flight.saturating_sub(1);
        counters.requests += 1;
        counters.latency_sum += elapsed;
        if failed {
            counters.errors += 1;
        }
        self.finished = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.finished {
            let mut counters = self.collector.lock();
            counters.in_flight = counters.in_flight.saturating_sub(1);
        }
    }
}

/// Whether a response should be counted as a backend failure.
pub fn is_failure<B>(response: &Response<B>) -> bool {
    response.status().as_u16() >= 500
}

/// A request executor that records statistics for every request.
#[derive(Debug, Clone)]
pub struct StatsTransport<S> {
    inner: S,
    collector: Arc<StatsCollector>,
}

impl<S> StatsTransport<S> {
    pub fn new(inner: S, collector: Arc<StatsCollector>) -> Self {
        Self { inner, collector }
    }

    pub fn collector(&self) -> &Arc<StatsCollector> {
        &self.collector
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for StatsTransport<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let guard = self.collector.begin();
        let response = self.inner.call(request);

        Box::pin(async move {
            let result = response.await;
            let failed = match &result {
                Ok(response) => is_failure(response),
                Err(_) => true,
            };
            guard.finish(failed);
            result
        })
    }
}

/// Layer that wraps a service in a [`StatsTransport`].
#[derive(Debug, Clone)]
pub struct StatsLayer {
    collector: Arc<StatsCollector>,
}

impl StatsLayer {
    pub fn new(collector: Arc<StatsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for StatsLayer {
    type Service = StatsTransport<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatsTransport::new(inner, self.collector.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    fn respond(status: StatusCode) -> Result<Response<()>, Infallible> {
        Ok(Response::builder().status(status).body(()).unwrap())
    }

    #[test]
    fn test_drain_with_requests() {
        let mut counters = Counters {
            in_flight: 3,
            latency_sum: Duration::from_secs(2),
            requests: 10,
            errors: 2,
        };

        let drained = counters.drain(Duration::from_secs(1));
        assert_eq!(drained.requests, 10);
        assert_eq!(drained.errors, 2);
        assert!((drained.latency - 0.2).abs() < 1e-9);
        assert!((drained.failure_rate - 0.2).abs() < 1e-9);

        assert_eq!(counters.in_flight, 3);
        assert_eq!(counters.requests, 0);
        assert_eq!(counters.errors, 0);
        assert_eq!(counters.latency_sum, Duration::ZERO);
    }

    #[test]
    fn test_drain_idle_period() {
        let mut counters = Counters {
            in_flight: 1,
            ..Counters::default()
        };
        let drained = counters.drain(Duration::from_secs(1));
        assert_eq!(drained.latency, 0.0);
        assert_eq!(drained.failure_rate, 0.0);
        assert_eq!(counters.in_flight, 1);
    }

    #[test]
    fn test_guard_dropped_without_finishing() {
        let collector = Arc::new(StatsCollector::new());
        let guard = collector.begin();
        assert_eq!(collector.in_flight(), 1);

        drop(guard);
        let counters = collector.lock().clone();
        assert_eq!(counters.in_flight, 0);
        assert_eq!(counters.requests, 0);
    }

    #[tokio::test]
    async fn test_server_errors_are_counted_but_returned() {
        let collector = Arc::new(StatsCollector::new());
        let service = StatsTransport::new(
            service_fn(|_req: Request<()>| async { respond(StatusCode::SERVICE_UNAVAILABLE) }),
            collector.clone(),
        );

        let response = service.oneshot(Request::new(())).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let counters = collector.lock().clone();
        assert_eq!(counters.requests, 1);
        assert_eq!(counters.errors, 1);
        assert_eq!(counters.in_flight, 0);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_failures() {
        let collector = Arc::new(StatsCollector::new());
        let service = StatsTransport::new(
            service_fn(|_req: Request<()>| async { respond(StatusCode::NOT_FOUND) }),
            collector.clone(),
        );

        service.oneshot(Request::new(())).await.unwrap();
        assert_eq!(collector.lock().errors, 0);
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let collector = Arc::new(StatsCollector::new());
        let service = ServiceBuilder::new()
            .layer(StatsLayer::new(collector.clone()))
            .service(service_fn(|_req: Request<()>| async {
                Err::<Response<()>, _>("connection refused")
            }));

        let err = service.oneshot(Request::new(())).await.unwrap_err();
        assert_eq!(err, "connection refused");

        let counters = collector.lock().clone();
        assert_eq!(counters.requests, 1);
        assert_eq!(counters.errors, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let collector = Arc::new(StatsCollector::new());
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        let service = StatsTransport::new(
            service_fn(move |req: Request<()>| {
                let mut release = release_rx.clone();
                async move {
                    let _ = release.wait_for(|go| *go).await;
                    let fail = req.uri().path() == "/fail";
                    respond(if fail {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::OK
                    })
                }
            }),
            collector.clone(),
        );

        let mut tasks = Vec::new();
        for i in 0..10 {
            let path = if i < 2 { "/fail" } else { "/ok" };
            let request = Request::builder().uri(path).body(()).unwrap();
            tasks.push(tokio::spawn(service.clone().oneshot(request)));
        }

        while collector.in_flight() < 10 {
            tokio::task::yield_now().await;
        }

        release_tx.send_replace(true);
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut counters = collector.lock();
        assert_eq!(counters.in_flight, 0);
        let drained = counters.drain(Duration::from_secs(1));
        assert_eq!(drained.requests, 10);
        assert!((drained.failure_rate - 0.2).abs() < 1e-9);
    }
}
