use anyhow::Result;
use flume::{bounded, Receiver, Sender};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::types::ActivityLog;

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Queue capacity (max logs in memory before backpressure)
    pub queue_capacity: usize,

    /// Batch size for database inserts
    pub batch_size: usize,

    /// Max wait time before flushing batch (milliseconds)
    pub batch_timeout_ms: u64,

    /// Number of worker threads for database inserts
    pub worker_count: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
            worker_count: 2,
        }
    }
}

enum Sink {
    Postgres(PgPool),
    Discard,
}

/// Async activity logger: callers enqueue and return immediately, a pool
/// of background workers drains the queue in batches. Used in both a
/// database-backed mode (`new`) and a no-op mode (`disabled`) for when no
/// `DATABASE_URL` is configured, so orchestrator/ingest code never has to
/// branch on whether logging is active.
#[derive(Clone)]
pub struct ActivityLogger {
    sender: Sender<ActivityLog>,
}

impl ActivityLogger {
    /// Initialize logger with background workers writing into `pool`.
    pub fn new(pool: PgPool, config: LoggerConfig) -> Self {
        Self::spawn(Sink::Postgres(pool), config)
    }

    /// No-op logger: queued entries are drained and dropped without ever
    /// touching a database. Used for the in-memory fallback deployment.
    pub fn disabled() -> Self {
        Self::spawn(Sink::Discard, LoggerConfig::default())
    }

    fn spawn(sink: Sink, config: LoggerConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);

        info!(
            "Initializing ActivityLogger: queue={}, batch={}, timeout={}ms, workers={}",
            config.queue_capacity, config.batch_size, config.batch_timeout_ms, config.worker_count
        );

        let sink = std::sync::Arc::new(sink);
        for worker_id in 0..config.worker_count {
            let sink = sink.clone();
            let receiver = receiver.clone();
            let config = config.clone();

            tokio::spawn(async move {
                Self::worker_loop(worker_id, sink, receiver, config).await;
            });
        }

        Self { sender }
    }

    /// Log activity (non-blocking, fire-and-forget)
    pub fn log(&self, activity: ActivityLog) {
        if let Err(e) = self.sender.try_send(activity) {
            warn!("Failed to enqueue log (queue full?): {}", e);
        }
    }

    /// Log activity async (waits if queue full, but doesn't block caller)
    pub fn log_async(&self, activity: ActivityLog) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            if let Err(e) = sender.send_async(activity).await {
                error!("Failed to send log to queue: {}", e);
            }
        });
    }

    async fn worker_loop(
        worker_id: usize,
        sink: std::sync::Arc<Sink>,
        receiver: Receiver<ActivityLog>,
        config: LoggerConfig,
    ) {
        info!("Logger worker {} started", worker_id);

        let mut batch: Vec<ActivityLog> = Vec::with_capacity(config.batch_size);
        let batch_timeout = Duration::from_millis(config.batch_timeout_ms);

        loop {
            let deadline = tokio::time::Instant::now() + batch_timeout;

            while batch.len() < config.batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(log)) => batch.push(log),
                    Ok(Err(_)) => {
                        if !batch.is_empty() {
                            Self::flush_batch(&sink, &batch, worker_id).await;
                        }
                        info!("Logger worker {} shutting down (channel closed)", worker_id);
                        return;
                    }
                    Err(_) => break,
                }
            }

            if !batch.is_empty() {
                Self::flush_batch(&sink, &batch, worker_id).await;
                batch.clear();
            } else {
                sleep(Duration::from_millis(100)).await;
            }
        }
    }

    async fn flush_batch(sink: &Sink, batch: &[ActivityLog], worker_id: usize) {
        let pool = match sink {
            Sink::Postgres(pool) => pool,
            Sink::Discard => {
                debug!("Worker {} discarding {} logs (no database configured)", worker_id, batch.len());
                return;
            }
        };

        let start = std::time::Instant::now();
        let batch_size = batch.len();

        debug!("Worker {} flushing {} logs to database", worker_id, batch_size);

        match Self::insert_batch(pool, batch).await {
            Ok(inserted) => {
                let duration = start.elapsed();
                debug!(
                    "Worker {} inserted {} logs in {:?} ({:.2} logs/sec)",
                    worker_id,
                    inserted,
                    duration,
                    inserted as f64 / duration.as_secs_f64()
                );
            }
            Err(e) => {
                error!("Worker {} failed to insert batch: {}", worker_id, e);
            }
        }
    }

    async fn insert_batch(pool: &PgPool, logs: &[ActivityLog]) -> Result<usize> {
        let mut query_builder = sqlx::QueryBuilder::new(
            r#"
            INSERT INTO activity_logs (
                tenant_id, conversation_id, activity_type, activity_status,
                intent, retrieval_hit_count, message_content, response_content,
                processing_time_ms, error_message, error_type, created_at, custom_fields
            )
            "#,
        );

        query_builder.push_values(logs, |mut b, log| {
            b.push_bind(log.tenant_id)
                .push_bind(log.conversation_id)
                .push_bind(log.activity_type.as_str())
                .push_bind(log.activity_status.as_str())
                .push_bind(&log.intent)
                .push_bind(log.retrieval_hit_count)
                .push_bind(&log.message_content)
                .push_bind(&log.response_content)
                .push_bind(log.processing_time_ms)
                .push_bind(&log.error_message)
                .push_bind(&log.error_type)
                .push_bind(log.created_at)
                .push_bind(log.custom_fields.as_ref().map(|fields| serde_json::json!(fields)));
        });

        let query = query_builder.build();
        let result = query.execute(pool).await?;

        Ok(result.rows_affected() as usize)
    }

    /// Get queue statistics (for monitoring)
    pub fn queue_len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_queue_full(&self) -> bool {
        self.sender.is_full()
    }
}
