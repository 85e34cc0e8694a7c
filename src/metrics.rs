//! Prometheus metrics for the agent pipeline
//!
//! All metrics live in the default registry and are registered lazily on
//! first use. `render()` produces the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Generation attempts by outcome: success, error, offline
    pub static ref GENERATIONS: IntCounterVec = register_int_counter_vec!(
        "yt_agent_generations_total",
        "Code generation attempts by outcome",
        &["outcome"]
    )
    .expect("metric can be registered");

    /// Latency of remote generation calls
    pub static ref LLM_CALL_TIME: HistogramVec = register_histogram_vec!(
        "yt_agent_llm_call_duration_seconds",
        "Duration of remote generateContent calls",
        &["model", "mode"],
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("metric can be registered");

    /// Cache lifecycle events: reused, created, skipped, failed, invalidated
    pub static ref CACHE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "yt_agent_cache_events_total",
        "Context cache lifecycle events",
        &["event"]
    )
    .expect("metric can be registered");

    /// Sandbox executions by status: success, fault, timeout
    pub static ref CODE_EXECUTIONS: IntCounterVec = register_int_counter_vec!(
        "yt_agent_code_executions_total",
        "Sandboxed code executions by status",
        &["status"]
    )
    .expect("metric can be registered");

    /// Wall time of sandboxed executions
    pub static ref CODE_EXECUTION_DURATION: Histogram = register_histogram!(
        "yt_agent_code_execution_duration_seconds",
        "Duration of sandboxed code executions",
        vec![0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 300.0]
    )
    .expect("metric can be registered");

    /// Interaction history writes: written, failed
    pub static ref HISTORY_WRITES: IntCounterVec = register_int_counter_vec!(
        "yt_agent_history_writes_total",
        "Interaction log appends by result",
        &["result"]
    )
    .expect("metric can be registered");
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
