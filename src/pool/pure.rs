//! Pure functions for connection-pool bookkeeping: health thresholds,
//! exponential backoff, and latency percentiles. Kept free of I/O and
//! wall-clock sampling so they can be exhaustively unit tested.

use std::collections::HashMap;
use std::time::Duration;

/// Whether a new connection can be accepted given the current count.
pub fn can_accept_connection(current_connections: usize, max_connections: usize) -> bool {
    current_connections < max_connections
}

/// Whether the pool should report itself healthy, given utilization
/// percentages already expressed as `0..=100`.
pub fn is_system_healthy(
    cpu_percent: f32,
    memory_percent: f32,
    unhealthy_cpu_percent: f32,
    unhealthy_memory_percent: f32,
    active_connections: usize,
    max_connections: usize,
) -> bool {
    const MAX_CONNECTION_RATIO: f32 = 0.95;

    if cpu_percent > unhealthy_cpu_percent {
        return false;
    }
    if memory_percent > unhealthy_memory_percent {
        return false;
    }
    let connection_ratio = active_connections as f32 / max_connections as f32;
    connection_ratio <= MAX_CONNECTION_RATIO
}

/// Whether the pool should switch from the standard health-check tier to
/// the relaxed tier, based on a moving window of recent acquire latencies:
/// once p90 latency exceeds the standard deep-tier timeout, health checks
/// are themselves likely to be the bottleneck, so checks are relaxed to
/// avoid compounding the slowdown.
pub fn should_use_relaxed_tier(p90_latency_ms: f64, standard_deep_timeout_ms: u64) -> bool {
    p90_latency_ms > standard_deep_timeout_ms as f64
}

/// Whether a leased connection should be recycled rather than returned to
/// the pool: it has exceeded its max age, or its last operation raised a
/// transport error.
pub fn should_recycle(age: Duration, recycle_after: Duration, saw_transport_error: bool) -> bool {
    saw_transport_error || age >= recycle_after
}

/// Exponential backoff: `base * 2^attempt`, capped at `max_duration`.
pub fn calculate_backoff_duration(
    attempt: u32,
    base_duration: Duration,
    max_duration: Duration,
) -> Duration {
    let backoff_ms = base_duration.as_millis().saturating_mul(1u128 << attempt.min(32));
    let backoff = Duration::from_millis(backoff_ms.min(u64::MAX as u128) as u64);
    std::cmp::min(backoff, max_duration)
}

/// p50/p90/p95/p99/min/max over a set of latency samples (milliseconds).
/// Empty input returns an empty map.
pub fn calculate_latency_percentiles(latency_samples: &[f64]) -> HashMap<String, f64> {
    if latency_samples.is_empty() {
        return HashMap::new();
    }

    let mut sorted_samples = latency_samples.to_vec();
    sorted_samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let len = sorted_samples.len();

    let mut percentiles = HashMap::new();
    percentiles.insert("p50".to_string(), percentile(&sorted_samples, 50.0));
    percentiles.insert("p90".to_string(), percentile(&sorted_samples, 90.0));
    percentiles.insert("p95".to_string(), percentile(&sorted_samples, 95.0));
    percentiles.insert("p99".to_string(), percentile(&sorted_samples, 99.0));
    percentiles.insert("min".to_string(), sorted_samples[0]);
    percentiles.insert("max".to_string(), sorted_samples[len - 1]);
    percentiles
}

fn percentile(sorted_data: &[f64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        sorted_data[lower]
    } else {
        let weight = index - lower as f64;
        sorted_data[lower] * (1.0 - weight) + sorted_data[upper] * weight
    }
}
