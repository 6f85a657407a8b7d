// Circuit Breaker - Failure isolation around the upstream position source
// Admits or rejects calls based on rolling failure/success counts; recovery
// probing happens through the half-open state.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::utils::{now_ms, Logger, TelemetryError, TelemetryResult};

/// Circuit breaker configuration, read once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in the closed state before the circuit opens.
    pub failure_threshold: u32,
    /// Consecutive successes in the half-open state before the circuit closes.
    pub success_threshold: u32,
    /// Cooldown after the last failure before an open circuit admits a probe.
    pub recovery_timeout_secs: u64,
    /// Deadline applied to each call made through `execute_with_timeout`.
    pub request_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout_secs: 30,
            request_timeout_ms: 10_000,
        }
    }
}

impl CircuitBreakerConfig {
    /// Slower to trip, slower to recover. Suited to flaky long-haul links
    /// where individual failures carry little signal.
    pub fn high_reliability() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 5,
            recovery_timeout_secs: 120,
            request_timeout_ms: 15_000,
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.failure_threshold == 0 {
            return Err(TelemetryError::configuration_error(
                "Failure threshold must be greater than 0",
            ));
        }

        if self.success_threshold == 0 {
            return Err(TelemetryError::configuration_error(
                "Success threshold must be greater than 0",
            ));
        }

        if self.recovery_timeout_secs == 0 {
            return Err(TelemetryError::configuration_error(
                "Recovery timeout must be greater than 0",
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(TelemetryError::configuration_error(
                "Request timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Circuit breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }
}

/// Read-only snapshot of breaker health, recomputed and republished after
/// every state transition. Safe to clone across threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<u64>,
    pub last_success_at: Option<u64>,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub success_rate: f64,
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            last_success_at: None,
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
            success_rate: 1.0,
        }
    }
}

/// Mutable breaker state. Lives behind the single lock that serializes all
/// transitions between concurrent callers.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_instant: Option<Instant>,
    last_failure_at: Option<u64>,
    last_success_at: Option<u64>,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_instant: None,
            last_failure_at: None,
            last_success_at: None,
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
        }
    }

    fn snapshot(&self) -> CircuitBreakerMetrics {
        let success_rate = if self.total_requests == 0 {
            1.0
        } else {
            self.total_successes as f64 / self.total_requests as f64
        };

        CircuitBreakerMetrics {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            last_failure_at: self.last_failure_at,
            last_success_at: self.last_success_at,
            total_requests: self.total_requests,
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            success_rate,
        }
    }
}

/// Circuit breaker wrapping a single fallible dependency. Does not retry
/// internally: it only decides admit-or-reject and tracks health; retry and
/// backoff belong to the caller.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    metrics_tx: watch::Sender<CircuitBreakerMetrics>,
    logger: Logger,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> TelemetryResult<Self> {
        config.validate()?;

        let (metrics_tx, _) = watch::channel(CircuitBreakerMetrics::default());
        Ok(Self {
            config,
            inner: Mutex::new(BreakerInner::new()),
            metrics_tx,
            logger: Logger::new("circuit_breaker"),
        })
    }

    /// Whether a call would currently be admitted. An open circuit whose
    /// recovery timeout has elapsed transitions to half-open here, before the
    /// caller proceeds.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovery = Duration::from_secs(self.config.recovery_timeout_secs);
                match inner.last_failure_instant {
                    Some(last_failure) if last_failure.elapsed() >= recovery => {
                        self.transition(&mut inner, CircuitState::HalfOpen);
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Record a successful call against the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.total_requests += 1;
        inner.total_successes += 1;
        inner.last_success_at = Some(now_ms());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                    return;
                }
            }
            CircuitState::Closed | CircuitState::Open => {
                inner.failure_count = 0;
            }
        }
        self.publish(&inner);
    }

    /// Record a failed call against the breaker. Timeouts count as failures.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.total_requests += 1;
        inner.total_failures += 1;
        inner.failure_count += 1;
        inner.last_failure_instant = Some(Instant::now());
        inner.last_failure_at = Some(now_ms());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                    return;
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
                return;
            }
            CircuitState::Open => {}
        }
        self.publish(&inner);
    }

    /// Run an operation through the breaker. Rejected immediately with a
    /// circuit-open error when the breaker does not admit calls.
    pub async fn execute<T, F>(&self, operation: F) -> TelemetryResult<T>
    where
        F: Future<Output = TelemetryResult<T>>,
    {
        if !self.can_execute() {
            return Err(TelemetryError::circuit_open(
                "circuit breaker is open, rejecting call",
            ));
        }

        match operation.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Run an operation through the breaker under the configured request
    /// deadline. Exceeding the deadline counts as a failure.
    pub async fn execute_with_timeout<T, F>(&self, operation: F) -> TelemetryResult<T>
    where
        F: Future<Output = TelemetryResult<T>>,
    {
        if !self.can_execute() {
            return Err(TelemetryError::circuit_open(
                "circuit breaker is open, rejecting call",
            ));
        }

        let deadline = Duration::from_millis(self.config.request_timeout_ms);
        match tokio::time::timeout(deadline, operation).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(err)
            }
            Err(_) => {
                self.record_failure();
                Err(TelemetryError::timeout_error(format!(
                    "upstream call exceeded {}ms deadline",
                    self.config.request_timeout_ms
                )))
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.inner
            .lock()
            .expect("breaker lock poisoned")
            .snapshot()
    }

    /// Watch stream of metrics snapshots; a fresh value is published after
    /// every state transition and recorded call.
    pub fn subscribe_metrics(&self) -> watch::Receiver<CircuitBreakerMetrics> {
        self.metrics_tx.subscribe()
    }

    // Forced transitions for operational override and testing.

    pub fn force_open(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.last_failure_instant = Some(Instant::now());
        inner.last_failure_at = Some(now_ms());
        self.transition(&mut inner, CircuitState::Open);
    }

    pub fn force_closed(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn force_half_open(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.transition(&mut inner, CircuitState::HalfOpen);
    }

    /// Reset all counters and return to the closed state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        *inner = BreakerInner::new();
        self.publish(&inner);
    }

    fn transition(&self, inner: &mut BreakerInner, next: CircuitState) {
        let previous = inner.state;
        inner.state = next;
        inner.failure_count = 0;
        inner.success_count = 0;
        self.publish(inner);

        if previous != next {
            self.logger.info(&format!(
                "circuit transition {} -> {}",
                previous.as_str(),
                next.as_str()
            ));
        }
    }

    fn publish(&self, inner: &BreakerInner) {
        self.metrics_tx.send_replace(inner.snapshot());
    }
}
