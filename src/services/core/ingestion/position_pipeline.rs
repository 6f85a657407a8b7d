// Position Ingestion Pipeline - Polling subscriptions over the upstream
// source, routed through the circuit breaker and the security validator.
// Subscriptions degrade gracefully on failure; they never terminate on error.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::services::core::infrastructure::circuit_breaker::CircuitBreaker;
use crate::services::core::ingestion::security_validator::SecurityValidator;
use crate::services::core::ingestion::upstream::PositionSource;
use crate::services::core::ingestion::IngestionError;
use crate::types::{ConnectionStatus, DataQuality, TrainPosition};
use crate::utils::{now_ms, Logger, TelemetryError, TelemetryResult};

/// Pipeline configuration, read once at construction. Retry and backoff are
/// configured here, independently of any other component's policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPipelineConfig {
    /// Sleep between successful poll iterations.
    pub poll_interval_ms: u64,
    /// Fixed backoff applied while the circuit breaker rejects calls.
    pub failure_backoff_ms: u64,
    /// Attempts over which the exponential backoff keeps growing.
    pub max_retry_attempts: u32,
    /// First exponential backoff delay.
    pub initial_retry_delay_ms: u64,
    /// Exponential backoff ceiling.
    pub max_retry_delay_ms: u64,
    /// Most-recent-N limit for section fetches.
    pub section_fetch_limit: usize,
    /// Per-train window used to detect duplicate and out-of-order arrivals.
    pub reorder_buffer_size: usize,
    /// End-to-end latency above which a record is logged as slow.
    pub latency_warning_ms: u64,
    /// End-to-end latency above which a record is logged as critically slow.
    pub latency_critical_ms: u64,
    /// Capacity of each subscription's broadcast channel.
    pub channel_capacity: usize,
}

impl Default for PositionPipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            failure_backoff_ms: 10_000,
            max_retry_attempts: 5,
            initial_retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            section_fetch_limit: 50,
            reorder_buffer_size: 10,
            latency_warning_ms: 1_000,
            latency_critical_ms: 5_000,
            channel_capacity: 64,
        }
    }
}

impl PositionPipelineConfig {
    /// Tighter polling for dense sections where position freshness matters
    /// more than upstream load.
    pub fn low_latency() -> Self {
        Self {
            poll_interval_ms: 500,
            failure_backoff_ms: 5_000,
            initial_retry_delay_ms: 250,
            max_retry_delay_ms: 10_000,
            ..Default::default()
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(TelemetryError::configuration_error(
                "Poll interval must be greater than 0",
            ));
        }

        if self.max_retry_attempts == 0 {
            return Err(TelemetryError::configuration_error(
                "Max retry attempts must be greater than 0",
            ));
        }

        if self.initial_retry_delay_ms == 0 || self.initial_retry_delay_ms > self.max_retry_delay_ms
        {
            return Err(TelemetryError::configuration_error(
                "Retry delay bounds are inconsistent",
            ));
        }

        if self.reorder_buffer_size == 0 {
            return Err(TelemetryError::configuration_error(
                "Reorder buffer size must be greater than 0",
            ));
        }

        if self.latency_warning_ms >= self.latency_critical_ms {
            return Err(TelemetryError::configuration_error(
                "Latency warning threshold must be below the critical threshold",
            ));
        }

        if self.channel_capacity == 0 {
            return Err(TelemetryError::configuration_error(
                "Channel capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Rolling ingestion counters and latency aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionMetrics {
    pub total_fetches: u64,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub circuit_rejections: u64,
    pub records_received: u64,
    pub records_emitted: u64,
    pub records_dropped: u64,
    pub validation_failures: u64,
    pub duplicates_dropped: u64,
    pub out_of_order: u64,
    pub latency_samples: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub last_error: Option<String>,
    pub last_success_at: Option<u64>,
    pub last_updated: u64,
}

impl Default for IngestionMetrics {
    fn default() -> Self {
        Self {
            total_fetches: 0,
            successful_fetches: 0,
            failed_fetches: 0,
            circuit_rejections: 0,
            records_received: 0,
            records_emitted: 0,
            records_dropped: 0,
            validation_failures: 0,
            duplicates_dropped: 0,
            out_of_order: 0,
            latency_samples: 0,
            avg_latency_ms: 0.0,
            max_latency_ms: 0.0,
            last_error: None,
            last_success_at: None,
            last_updated: now_ms(),
        }
    }
}

impl IngestionMetrics {
    /// Share of fetch attempts that failed, in [0, 1].
    pub fn error_rate(&self) -> f64 {
        if self.total_fetches == 0 {
            return 0.0;
        }
        (self.failed_fetches + self.circuit_rejections) as f64 / self.total_fetches as f64
    }
}

/// How a record relates to what the pipeline has already seen from its train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrivalKind {
    Fresh,
    Duplicate,
    OutOfOrder,
}

/// Bounded per-train window of recently seen timestamps.
struct ReorderBuffer {
    capacity: usize,
    seen: HashMap<String, VecDeque<u64>>,
}

impl ReorderBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: HashMap::new(),
        }
    }

    fn observe(&mut self, train_id: &str, timestamp: u64) -> ArrivalKind {
        let window = self.seen.entry(train_id.to_string()).or_default();

        if window.contains(&timestamp) {
            return ArrivalKind::Duplicate;
        }

        let newest = window.iter().max().copied();
        let kind = match newest {
            Some(newest) if timestamp < newest => ArrivalKind::OutOfOrder,
            _ => ArrivalKind::Fresh,
        };

        window.push_back(timestamp);
        while window.len() > self.capacity {
            window.pop_front();
        }

        kind
    }
}

/// State shared between the pipeline handle and its spawned polling tasks.
struct PipelineShared {
    config: PositionPipelineConfig,
    source: Arc<dyn PositionSource>,
    breaker: Arc<CircuitBreaker>,
    validator: Arc<SecurityValidator>,
    running: AtomicBool,
    connection_tx: watch::Sender<ConnectionStatus>,
    quality_tx: watch::Sender<DataQuality>,
    metrics: RwLock<IngestionMetrics>,
    reorder: Mutex<ReorderBuffer>,
    logger: Logger,
}

/// Resilient position ingestion pipeline. One polling task per subscription;
/// each iteration runs fetch -> validate -> emit strictly in order, and every
/// upstream call goes through the circuit breaker under a bounded deadline.
pub struct PositionPipeline {
    shared: Arc<PipelineShared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PositionPipeline {
    pub fn new(
        config: PositionPipelineConfig,
        source: Arc<dyn PositionSource>,
        breaker: Arc<CircuitBreaker>,
        validator: Arc<SecurityValidator>,
    ) -> TelemetryResult<Self> {
        config.validate()?;

        let (connection_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (quality_tx, _) = watch::channel(DataQuality::default());
        let reorder = Mutex::new(ReorderBuffer::new(config.reorder_buffer_size));

        Ok(Self {
            shared: Arc::new(PipelineShared {
                config,
                source,
                breaker,
                validator,
                running: AtomicBool::new(false),
                connection_tx,
                quality_tx,
                metrics: RwLock::new(IngestionMetrics::default()),
                reorder,
                logger: Logger::new("position_pipeline"),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the pipeline. No-op when already running.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared
            .connection_tx
            .send_replace(ConnectionStatus::Connecting);
        self.shared.logger.info("pipeline started");
    }

    /// Stop the pipeline and cancel all subscription tasks promptly. No-op
    /// when already stopped.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for handle in self.tasks.lock().expect("task list lock poisoned").drain(..) {
            handle.abort();
        }
        self.shared
            .connection_tx
            .send_replace(ConnectionStatus::Disconnected);
        self.shared.logger.info("pipeline stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Continuous stream of validated position batches for one track section.
    /// Starts the pipeline implicitly if it is not running yet.
    pub fn subscribe_to_section_updates(
        &self,
        section_id: &str,
    ) -> broadcast::Receiver<Vec<TrainPosition>> {
        self.start();

        let (tx, rx) = broadcast::channel(self.shared.config.channel_capacity);
        let shared = self.shared.clone();
        let section_id = section_id.to_string();
        let handle = tokio::spawn(async move {
            run_section_loop(shared, section_id, tx).await;
        });
        self.tasks
            .lock()
            .expect("task list lock poisoned")
            .push(handle);
        rx
    }

    /// Continuous stream of validated positions for one train. Starts the
    /// pipeline implicitly if it is not running yet.
    pub fn subscribe_to_train_updates(
        &self,
        train_id: &str,
    ) -> broadcast::Receiver<TrainPosition> {
        self.start();

        let (tx, rx) = broadcast::channel(self.shared.config.channel_capacity);
        let shared = self.shared.clone();
        let train_id = train_id.to_string();
        let handle = tokio::spawn(async move {
            run_train_loop(shared, train_id, tx).await;
        });
        self.tasks
            .lock()
            .expect("task list lock poisoned")
            .push(handle);
        rx
    }

    /// Validate and push a single position update to the upstream store.
    pub async fn update_position(&self, position: TrainPosition) -> TelemetryResult<()> {
        let validation = self.shared.validator.validate(&position);
        if validation.should_drop() {
            let reason = validation.drop_reason().unwrap_or_default();
            self.shared.record_validation_failure();
            return Err(IngestionError::Validation { reason }.into());
        }

        self.shared
            .breaker
            .execute_with_timeout(self.shared.source.insert_position(&position))
            .await
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.shared.connection_tx.borrow()
    }

    pub fn subscribe_connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.connection_tx.subscribe()
    }

    pub fn data_quality(&self) -> DataQuality {
        self.shared.quality_tx.borrow().clone()
    }

    pub fn subscribe_data_quality(&self) -> watch::Receiver<DataQuality> {
        self.shared.quality_tx.subscribe()
    }

    pub fn metrics(&self) -> IngestionMetrics {
        self.shared
            .metrics
            .read()
            .expect("metrics lock poisoned")
            .clone()
    }
}

impl PipelineShared {
    /// Validate, deduplicate, and score a fetched batch; returns the records
    /// that survive for emission.
    fn process_batch(&self, batch: Vec<TrainPosition>) -> Vec<TrainPosition> {
        let mut survivors = Vec::with_capacity(batch.len());

        for position in batch {
            {
                let mut metrics = self.metrics.write().expect("metrics lock poisoned");
                metrics.records_received += 1;
            }

            let validation = self.validator.validate(&position);
            if validation.should_drop() {
                self.record_validation_failure();
                continue;
            }

            let arrival = self
                .reorder
                .lock()
                .expect("reorder lock poisoned")
                .observe(&position.train_id, position.recorded_at);
            match arrival {
                ArrivalKind::Duplicate => {
                    let mut metrics = self.metrics.write().expect("metrics lock poisoned");
                    metrics.duplicates_dropped += 1;
                    metrics.records_dropped += 1;
                    continue;
                }
                ArrivalKind::OutOfOrder => {
                    let mut metrics = self.metrics.write().expect("metrics lock poisoned");
                    metrics.out_of_order += 1;
                }
                ArrivalKind::Fresh => {}
            }

            let latency_ms = position.age_ms();
            self.observe_latency(latency_ms);
            self.update_data_quality(latency_ms, position.accuracy_m);

            {
                let mut metrics = self.metrics.write().expect("metrics lock poisoned");
                metrics.records_emitted += 1;
                metrics.last_updated = now_ms();
            }
            survivors.push(position);
        }

        survivors
    }

    fn record_validation_failure(&self) {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        metrics.validation_failures += 1;
        metrics.records_dropped += 1;
        metrics.last_updated = now_ms();
    }

    fn observe_latency(&self, latency_ms: u64) {
        if latency_ms > self.config.latency_critical_ms {
            self.logger.error(&format!(
                "end-to-end latency {}ms above critical threshold",
                latency_ms
            ));
        } else if latency_ms > self.config.latency_warning_ms {
            self.logger
                .warn(&format!("end-to-end latency {}ms above warning threshold", latency_ms));
        }

        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        metrics.latency_samples += 1;
        let n = metrics.latency_samples as f64;
        metrics.avg_latency_ms += (latency_ms as f64 - metrics.avg_latency_ms) / n;
        metrics.max_latency_ms = metrics.max_latency_ms.max(latency_ms as f64);
    }

    /// Recompute the composite quality score from latency, reported accuracy,
    /// and the breaker's rolling success ratio.
    fn update_data_quality(&self, latency_ms: u64, accuracy_m: Option<f64>) {
        let latency_score =
            (1.0 - latency_ms as f64 / self.config.latency_critical_ms as f64).clamp(0.0, 1.0);
        let accuracy_score = match accuracy_m {
            Some(accuracy) => (1.0 - accuracy / 100.0).clamp(0.0, 1.0),
            None => 0.5,
        };
        let reliability = self.breaker.metrics().success_rate;
        let overall_score = 0.4 * latency_score + 0.3 * accuracy_score + 0.3 * reliability;

        self.quality_tx.send_replace(DataQuality {
            latency_ms: latency_ms as f64,
            latency_score,
            accuracy_score,
            reliability,
            overall_score,
            last_updated: now_ms(),
        });
    }

    fn record_fetch_attempt(&self) {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        metrics.total_fetches += 1;
    }

    fn record_fetch_success(&self) {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        metrics.successful_fetches += 1;
        metrics.last_success_at = Some(now_ms());
        metrics.last_updated = now_ms();
    }

    /// Classify a fetch failure, update status and metrics, and pick the
    /// backoff delay for this iteration.
    fn handle_fetch_failure(&self, err: TelemetryError, consecutive_failures: u32) -> Duration {
        let ingestion_err = IngestionError::classify(err);

        let delay = {
            let mut metrics = self.metrics.write().expect("metrics lock poisoned");
            metrics.last_error = Some(ingestion_err.to_string());
            metrics.last_updated = now_ms();

            match &ingestion_err {
                IngestionError::CircuitOpen => {
                    metrics.circuit_rejections += 1;
                    self.connection_tx.send_replace(ConnectionStatus::Degraded);
                    Duration::from_millis(self.config.failure_backoff_ms)
                }
                IngestionError::Timeout { .. }
                | IngestionError::Upstream(_)
                | IngestionError::Validation { .. } => {
                    metrics.failed_fetches += 1;
                    self.connection_tx
                        .send_replace(ConnectionStatus::Disconnected);
                    self.exponential_backoff(consecutive_failures)
                }
            }
        };

        let message = format!(
            "fetch failed ({}), next action: {}",
            ingestion_err,
            ingestion_err.recovery_action()
        );
        if ingestion_err.is_high_priority() {
            self.logger.warn(&message);
        } else {
            self.logger.debug(&message);
        }

        with_jitter(delay)
    }

    fn exponential_backoff(&self, consecutive_failures: u32) -> Duration {
        let attempt = consecutive_failures
            .saturating_sub(1)
            .min(self.config.max_retry_attempts);
        let delay = self
            .config
            .initial_retry_delay_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.config.max_retry_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Up to 10% random jitter so concurrent subscriptions do not retry in
/// lockstep.
fn with_jitter(delay: Duration) -> Duration {
    let base = delay.as_millis() as u64;
    if base == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=base / 10);
    Duration::from_millis(base + jitter)
}

async fn run_section_loop(
    shared: Arc<PipelineShared>,
    section_id: String,
    tx: broadcast::Sender<Vec<TrainPosition>>,
) {
    let mut consecutive_failures: u32 = 0;

    while shared.running.load(Ordering::SeqCst) {
        shared.record_fetch_attempt();
        let fetch = shared
            .source
            .recent_section_positions(&section_id, shared.config.section_fetch_limit);

        match shared.breaker.execute_with_timeout(fetch).await {
            Ok(batch) => {
                consecutive_failures = 0;
                shared.record_fetch_success();
                let survivors = shared.process_batch(batch);
                shared
                    .connection_tx
                    .send_replace(ConnectionStatus::Connected);
                let _ = tx.send(survivors);
                tokio::time::sleep(Duration::from_millis(shared.config.poll_interval_ms)).await;
            }
            Err(err) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let delay = shared.handle_fetch_failure(err, consecutive_failures);
                // Emit an empty result so consumers observe the gap instead
                // of a silently dead stream.
                let _ = tx.send(Vec::new());
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn run_train_loop(
    shared: Arc<PipelineShared>,
    train_id: String,
    tx: broadcast::Sender<TrainPosition>,
) {
    let mut consecutive_failures: u32 = 0;

    while shared.running.load(Ordering::SeqCst) {
        shared.record_fetch_attempt();
        let fetch = shared.source.recent_train_positions(&train_id, 1);

        match shared.breaker.execute_with_timeout(fetch).await {
            Ok(batch) => {
                consecutive_failures = 0;
                shared.record_fetch_success();
                let survivors = shared.process_batch(batch);
                shared
                    .connection_tx
                    .send_replace(ConnectionStatus::Connected);
                if let Some(position) = survivors.into_iter().next() {
                    let _ = tx.send(position);
                }
                tokio::time::sleep(Duration::from_millis(shared.config.poll_interval_ms)).await;
            }
            Err(err) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let delay = shared.handle_fetch_failure(err, consecutive_failures);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
