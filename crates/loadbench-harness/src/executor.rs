//! Wraps catalog queries into timed [`TaskResult`]s.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use loadbench_core::{QueryDefinition, QueryParams, StoreSession, TaskResult};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    executions: u64,
    successes: u64,
    failures: u64,
    total_latency_ms: f64,
}

/// Running totals reported by [`QueryExecutor::metrics_summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSummary {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub success_rate_percent: f64,
    pub average_latency_ms: f64,
    pub total_latency_ms: f64,
}

/// Runs query handlers against a shared session and times them.
///
/// Handler errors never escape: they become `success = false` results.
pub struct QueryExecutor {
    session: Arc<dyn StoreSession>,
    counters: Mutex<Counters>,
}

impl QueryExecutor {
    pub fn new(session: Arc<dyn StoreSession>) -> Self {
        Self {
            session,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn session(&self) -> &Arc<dyn StoreSession> {
        &self.session
    }

    /// Execute `definition` with freshly generated parameters.
    pub async fn execute(&self, definition: &QueryDefinition) -> TaskResult {
        let params = definition.generate_params();
        self.execute_with_params(definition, params).await
    }

    /// Execute `definition` with explicit parameters.
    pub async fn execute_with_params(
        &self,
        definition: &QueryDefinition,
        params: QueryParams,
    ) -> TaskResult {
        let start = Instant::now();
        let outcome = definition
            .handler
            .execute(self.session.as_ref(), params)
            .await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = match outcome {
            Ok(payload) => TaskResult::success(definition, latency_ms, payload),
            Err(e) => {
                tracing::warn!(
                    query_id = %definition.query_id,
                    error = %e,
                    "Query execution error"
                );
                TaskResult::failure(definition, latency_ms, format!("Query execution error: {e}"))
            }
        };

        let mut counters = self.counters.lock();
        counters.executions += 1;
        if result.success {
            counters.successes += 1;
        } else {
            counters.failures += 1;
        }
        counters.total_latency_ms += result.latency_ms;

        result
    }

    /// Run every definition in order, `iterations` times over.
    pub async fn execute_batch(
        &self,
        definitions: &[QueryDefinition],
        iterations: usize,
    ) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(definitions.len() * iterations);
        for _ in 0..iterations {
            for definition in definitions {
                results.push(self.execute(definition).await);
                if results.len() % 100 == 0 {
                    tracing::info!(executed = results.len(), "Batch progress");
                }
            }
        }
        results
    }

    pub fn metrics_summary(&self) -> ExecutorSummary {
        let c = *self.counters.lock();
        let (avg, rate) = if c.executions > 0 {
            (
                c.total_latency_ms / c.executions as f64,
                c.successes as f64 / c.executions as f64 * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        ExecutorSummary {
            total_executions: c.executions,
            successful_executions: c.successes,
            failed_executions: c.failures,
            success_rate_percent: rate,
            average_latency_ms: avg,
            total_latency_ms: c.total_latency_ms,
        }
    }

    pub fn reset_metrics(&self) {
        *self.counters.lock() = Counters::default();
        tracing::debug!("Executor counters reset");
    }
}
