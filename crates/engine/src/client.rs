//! Client for the external primitive execution service.
//!
//! The client owns the fault-isolation boundary (circuit breaker and
//! per-call timeout) but never retries: retry policy belongs to the
//! orchestrator so attempt counts reported in events stay accurate.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, warn};

use voxflow_core::config::ExecutionConfig;
use voxflow_core::{PrimitiveError, PrimitiveOutcome, PrimitiveRequest};

pub const CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";
pub const EXECUTION_TIMEOUT: &str = "EXECUTION_TIMEOUT";
pub const TRANSPORT_FAILURE: &str = "TRANSPORT_FAILURE";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to reach execution service: {0}")]
    Connect(String),
    #[error("execution service call failed: {0}")]
    Call(String),
    #[error("execution service returned malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ExecutionTransport: Send + Sync {
    async fn send(&self, request: &PrimitiveRequest) -> Result<PrimitiveOutcome, TransportError>;
}

#[derive(Clone, Copy, Debug)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(30) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

/// Stops calling a failing remote dependency: after `failure_threshold`
/// consecutive transport-level failures the breaker opens for a cooldown
/// window, then half-opens to let a probe through.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config, state: Mutex::new(BreakerState::Closed { consecutive_failures: 0 }) }
    }

    /// Whether a call may proceed right now; transitions open → half-open
    /// once the cooldown has elapsed.
    pub fn try_acquire(&self) -> bool {
        let mut state = lock(&self.state);
        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.cooldown {
                    *state = BreakerState::HalfOpen;
                    debug!("circuit breaker half-open; allowing probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = lock(&self.state);
        *state = BreakerState::Closed { consecutive_failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = lock(&self.state);
        *state = match *state {
            BreakerState::Closed { consecutive_failures } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    warn!(failures, "circuit breaker opened");
                    BreakerState::Open { opened_at: Instant::now() }
                } else {
                    BreakerState::Closed { consecutive_failures: failures }
                }
            }
            BreakerState::HalfOpen | BreakerState::Open { .. } => {
                BreakerState::Open { opened_at: Instant::now() }
            }
        };
    }

    pub fn state_name(&self) -> &'static str {
        match *lock(&self.state) {
            BreakerState::Closed { .. } => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), breaker: CircuitBreakerConfig::default() }
    }
}

impl ClientOptions {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            breaker: CircuitBreakerConfig {
                failure_threshold: config.breaker_failure_threshold.max(1),
                cooldown: Duration::from_secs(config.breaker_cooldown_secs),
            },
        }
    }
}

/// Request/response facade over a transport. Every failure mode becomes a
/// failed `PrimitiveOutcome` with a structured error code; this method
/// never returns an error and never panics.
pub struct ExecutionClient {
    transport: Arc<dyn ExecutionTransport>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl ExecutionClient {
    pub fn new(transport: Arc<dyn ExecutionTransport>, options: ClientOptions) -> Self {
        Self { transport, breaker: CircuitBreaker::new(options.breaker), timeout: options.timeout }
    }

    pub async fn execute(&self, request: PrimitiveRequest) -> PrimitiveOutcome {
        if !self.breaker.try_acquire() {
            return PrimitiveOutcome::failed(PrimitiveError::new(
                CIRCUIT_OPEN,
                format!(
                    "execution service circuit is open; `{}` not attempted",
                    request.primitive_type
                ),
            ));
        }

        match tokio::time::timeout(self.timeout, self.transport.send(&request)).await {
            Ok(Ok(outcome)) => {
                // The service answered; a business-level failure inside the
                // outcome is the engine's concern, not the breaker's.
                self.breaker.record_success();
                outcome
            }
            Ok(Err(error)) => {
                self.breaker.record_failure();
                warn!(
                    primitive_type = %request.primitive_type,
                    error = %error,
                    "execution transport failed"
                );
                PrimitiveOutcome::failed(PrimitiveError::new(TRANSPORT_FAILURE, error.to_string()))
            }
            Err(_elapsed) => {
                self.breaker.record_failure();
                warn!(
                    primitive_type = %request.primitive_type,
                    timeout_secs = self.timeout.as_secs(),
                    "execution call timed out"
                );
                PrimitiveOutcome::failed(PrimitiveError::new(
                    EXECUTION_TIMEOUT,
                    format!("no response within {}s", self.timeout.as_secs()),
                ))
            }
        }
    }

    pub fn breaker_state(&self) -> &'static str {
        self.breaker.state_name()
    }
}

/// HTTP transport: `POST {base_url}/primitives/{type}/execute` with the
/// request as JSON, expecting a `PrimitiveOutcome` body.
pub struct HttpExecutionTransport {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<SecretString>,
}

impl HttpExecutionTransport {
    pub fn new(base_url: impl Into<String>, auth_token: Option<SecretString>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), auth_token }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(config.base_url.clone(), config.auth_token.clone())
    }
}

#[async_trait]
impl ExecutionTransport for HttpExecutionTransport {
    async fn send(&self, request: &PrimitiveRequest) -> Result<PrimitiveOutcome, TransportError> {
        let url = format!(
            "{}/primitives/{}/execute",
            self.base_url.trim_end_matches('/'),
            request.primitive_type
        );

        let mut builder = self.client.post(url).json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| TransportError::Connect(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Call(format!("execution service returned {status}")));
        }
        response
            .json::<PrimitiveOutcome>()
            .await
            .map_err(|error| TransportError::Malformed(error.to_string()))
    }
}

/// Scripted transport: answers from a queue of canned results. Used by
/// engine tests to drive the walk without any real service.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<PrimitiveOutcome, TransportError>>>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Result<PrimitiveOutcome, TransportError>>) -> Self {
        Self { script: Arc::new(Mutex::new(steps.into())) }
    }

    pub fn push(&self, step: Result<PrimitiveOutcome, TransportError>) {
        lock(&self.script).push_back(step);
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl ExecutionTransport for ScriptedTransport {
    async fn send(&self, _request: &PrimitiveRequest) -> Result<PrimitiveOutcome, TransportError> {
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Call("scripted transport exhausted".to_owned())))
    }
}

/// Stub transport for `voxflow simulate`: every primitive succeeds with a
/// small captured payload, except the configured failing types.
#[derive(Clone, Debug, Default)]
pub struct StubExecutionTransport {
    failing_primitives: BTreeSet<String>,
}

impl StubExecutionTransport {
    pub fn new(failing_primitives: impl IntoIterator<Item = String>) -> Self {
        Self { failing_primitives: failing_primitives.into_iter().collect() }
    }
}

#[async_trait]
impl ExecutionTransport for StubExecutionTransport {
    async fn send(&self, request: &PrimitiveRequest) -> Result<PrimitiveOutcome, TransportError> {
        if self.failing_primitives.contains(&request.primitive_type) {
            return Ok(PrimitiveOutcome::failed(PrimitiveError::new(
                "PRIMITIVE_FAILED",
                format!("stubbed failure for `{}`", request.primitive_type),
            )));
        }
        Ok(PrimitiveOutcome::succeeded(Some(serde_json::json!({
            "captured": true,
            "primitive_type": request.primitive_type,
        }))))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
