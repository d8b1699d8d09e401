//! Request dispatcher.
//!
//! # Responsibilities
//! - Buffer the request body so a failed attempt can be replayed
//! - Send the request to the current primary under connect/read bounds
//! - Report every attempt outcome to the pool registry
//! - Replay once on the alternate backend after a retryable failure
//! - Answer 502 when no backend could serve the request
//!
//! Attempts are strictly sequential. If the client goes away the handler
//! future is dropped mid-attempt and nothing is reported for it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{header, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::alerts::TrafficObserver;
use crate::config::ProxyConfig;
use crate::health::{Outcome, RequestAttempt, StatusClassifier};
use crate::http::{request, response};
use crate::load_balancer::{Backend, PoolRegistry};
use crate::resilience::{AttemptTimeouts, RetryPolicy, TimeoutPhase, UpstreamError};

pub struct Dispatcher {
    registry: Arc<PoolRegistry>,
    timeouts: AttemptTimeouts,
    classifier: StatusClassifier,
    retry_policy: RetryPolicy,
    max_body_size: usize,
    observer: Option<TrafficObserver>,
}

impl Dispatcher {
    pub fn new(config: &ProxyConfig, registry: Arc<PoolRegistry>) -> Self {
        Self {
            registry,
            timeouts: AttemptTimeouts::from_config(&config.timeouts),
            classifier: StatusClassifier::new(config.failover.retry_statuses.iter().copied()),
            retry_policy: RetryPolicy::new(config.failover.retry_non_idempotent),
            max_body_size: config.limits.max_body_size,
            observer: None,
        }
    }

    /// Publish every client-facing response to the traffic monitor.
    pub fn with_observer(mut self, observer: TrafficObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Serve one client request.
    pub async fn dispatch(&self, request: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let request_id = request::request_id(request.headers()).to_string();
        let (parts, body) = request.into_parts();

        tracing::debug!(
            request_id = %request_id,
            method = %parts.method,
            path = %parts.uri.path(),
            "Proxying request"
        );

        let body = match self.buffer_body(&parts, body).await {
            Ok(bytes) => bytes,
            Err(response) => {
                self.observe_unserved(response.status());
                return response;
            }
        };

        let Some(mut target) = self.registry.current_primary(Instant::now()) else {
            let err = UpstreamError::AllBackendsDown { attempts: 0 };
            tracing::error!(request_id = %request_id, error = %err, "Failover exhausted");
            return self.gateway_failure();
        };

        let max_attempts = self.registry.all_backends().len();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let started = Instant::now();
            let result = self.attempt(&target, &parts, &body, client_addr).await;

            let outcome = match &result {
                Ok(_) => Outcome::Success,
                Err(err) => err.outcome().unwrap_or(Outcome::ConnectionError),
            };
            let record = RequestAttempt::new(target.name(), started, outcome);
            self.registry.report_outcome(&target, outcome);

            let err = match result {
                Ok(upstream) => {
                    tracing::debug!(
                        request_id = %request_id,
                        backend = %record.backend,
                        attempt = attempts,
                        status = upstream.status().as_u16(),
                        elapsed_ms = record.elapsed().as_millis() as u64,
                        "Request served"
                    );
                    if let Some(observer) = &self.observer {
                        observer.served(&target, upstream.status(), upstream.headers());
                    }
                    return response::passthrough(upstream);
                }
                Err(err) => err,
            };

            tracing::warn!(
                request_id = %request_id,
                backend = %record.backend,
                attempt = attempts,
                outcome = record.outcome.as_str(),
                elapsed_ms = record.elapsed().as_millis() as u64,
                error = %err,
                "Upstream attempt failed"
            );

            if attempts < max_attempts && self.retry_policy.is_retryable(&parts.method, &err) {
                if let Some(alternate) = self.registry.alternate_of(&target, Instant::now()) {
                    tracing::info!(
                        request_id = %request_id,
                        from = %target.name(),
                        to = %alternate.name(),
                        "Retrying on alternate backend"
                    );
                    target = alternate;
                    continue;
                }
            }

            let exhausted = UpstreamError::AllBackendsDown { attempts };
            tracing::error!(
                request_id = %request_id,
                last_error = %err,
                error = %exhausted,
                "Failover exhausted"
            );
            return self.gateway_failure();
        }
    }

    /// One bounded attempt against one backend. Retry-trigger statuses come
    /// back as errors; their bodies are discarded.
    async fn attempt(
        &self,
        backend: &Backend,
        parts: &Parts,
        body: &Bytes,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<Incoming>, UpstreamError> {
        let mut sender = self.open(backend).await?;

        let mut upstream = Request::new(Body::from(body.clone()));
        *upstream.method_mut() = parts.method.clone();
        *upstream.uri_mut() = request::origin_form(&parts.uri);
        *upstream.headers_mut() = request::forward_headers(&parts.headers, client_addr);
        request::ensure_host(upstream.headers_mut(), backend.authority());

        let response = match self.timeouts.read_within(sender.send_request(upstream)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(UpstreamError::exchange_failed(backend.name(), &e)),
            Err(after) => {
                return Err(UpstreamError::Timeout {
                    backend: backend.name().to_string(),
                    phase: TimeoutPhase::Read,
                    after,
                })
            }
        };

        let status = response.status();
        if self.classifier.is_retry_trigger(status) {
            return Err(UpstreamError::Status {
                backend: backend.name().to_string(),
                status,
            });
        }
        Ok(response)
    }

    /// Connect under the connect bound and start an HTTP/1 connection task.
    ///
    /// The task outlives the attempt so the response body can stream to the
    /// client; it ends when the backend closes or the body is dropped.
    async fn open(&self, backend: &Backend) -> Result<SendRequest<Body>, UpstreamError> {
        let connect = TcpStream::connect(backend.authority().as_str());
        let stream = match self.timeouts.connect_within(connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(UpstreamError::connect_failed(backend.name(), &e)),
            Err(after) => {
                return Err(UpstreamError::Timeout {
                    backend: backend.name().to_string(),
                    phase: TimeoutPhase::Connect,
                    after,
                })
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(backend = %backend.name(), error = %e, "Failed to set TCP_NODELAY");
        }

        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| UpstreamError::handshake_failed(backend.name(), &e))?;

        let name = backend.name().to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(backend = %name, error = %e, "Upstream connection closed with error");
            }
        });

        sender
            .ready()
            .await
            .map_err(|e| UpstreamError::handshake_failed(backend.name(), &e))?;
        Ok(sender)
    }

    async fn buffer_body(&self, parts: &Parts, body: Body) -> Result<Bytes, Response<Body>> {
        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > self.max_body_size as u64) {
            tracing::warn!(
                declared,
                limit = self.max_body_size,
                "Request body exceeds limit"
            );
            return Err(response::payload_too_large());
        }

        axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to read request body");
                response::bad_request("Failed to read request body\n")
            })
    }

    fn gateway_failure(&self) -> Response<Body> {
        self.observe_unserved(StatusCode::BAD_GATEWAY);
        response::gateway_failure()
    }

    fn observe_unserved(&self, status: StatusCode) {
        if let Some(observer) = &self.observer {
            observer.unserved(status);
        }
    }
}
