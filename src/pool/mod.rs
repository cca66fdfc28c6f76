//! # Connection Pool
//!
//! A generic, bounded, health-checked async resource pool. Generic over the
//! resource type `R` so the same pool drives both the vector store client
//! pool and (in tests) fake resources.
//!
//! The bookkeeping (permit accounting, backoff calculation, health
//! thresholds) is expressed as pure functions in [`pure`] so it can be unit
//! tested without spinning up real connections or sleeping in real time;
//! [`Pool`] wraps those functions in the actual `tokio::sync::Semaphore`-based
//! acquire/release protocol.
//!
//! No suspension point sits inside the pool's own bookkeeping: acquiring a
//! permit awaits the semaphore (the one suspension point), and everything
//! else --- stats, health snapshot, backoff math --- runs over a short-lived
//! `parking_lot::Mutex` guard that is dropped before any `.await`.

pub mod pure;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::domain::error::{Error, Result};

/// Which health-check tier to run before handing out a leased connection.
/// Standard timeouts per spec.md §4.2: fast ≤50ms, medium ≤100ms, deep
/// ≤200ms. Under sustained high latency the pool switches to the relaxed
/// tier (0.5/1.0/2.0s) so checks themselves don't add to the slowdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTier {
    /// Cheap ping, run on every acquire.
    Fast,
    /// Collection list or equivalent light metadata call.
    Medium,
    /// Count plus schema check; the most expensive tier.
    Deep,
}

impl HealthTier {
    /// Timeout for this tier, switching to the relaxed multiplier when
    /// `relaxed` is true.
    pub fn timeout(self, config: &PoolConfig, relaxed: bool) -> Duration {
        let (fast, medium, deep) = if relaxed {
            config.relaxed_health_check_ms()
        } else {
            (config.health_check_fast_ms, config.health_check_medium_ms, config.health_check_deep_ms)
        };
        Duration::from_millis(match self {
            HealthTier::Fast => fast,
            HealthTier::Medium => medium,
            HealthTier::Deep => deep,
        })
    }
}

/// Point-in-time health snapshot, derived from [`pure::is_system_healthy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolHealth {
    /// Whether the pool is accepting new work
    pub healthy: bool,
    /// Connections currently checked out
    pub active: usize,
    /// Configured maximum
    pub max: usize,
    /// Most recent CPU utilization sample, percent
    pub cpu_percent: f32,
    /// Most recent memory utilization sample, percent
    pub memory_percent: f32,
}

struct Inner {
    latency_samples_ms: VecDeque<f64>,
    total_acquired: u64,
    total_rejected: u64,
    cpu_percent: f32,
    memory_percent: f32,
}

const LATENCY_WINDOW: usize = 256;

/// A bounded pool of `R` resources with exponential-backoff retry and a
/// pluggable health check.
pub struct Pool<R> {
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
    inner: Mutex<Inner>,
    system: Mutex<sysinfo::System>,
    _resource: std::marker::PhantomData<fn() -> R>,
}

/// A leased resource plus the permit keeping it checked out. Dropping this
/// releases the permit back to the pool.
pub struct Lease<'a, R> {
    /// The leased resource handle
    pub resource: R,
    _permit: SemaphorePermit<'a>,
    started: Instant,
    recycle_after: Duration,
    transport_error: AtomicBool,
}

impl<'a, R> Lease<'a, R> {
    /// How long this lease has held its permit.
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    /// Mark that this lease's last operation raised a transport error, so
    /// it is recycled rather than returned to the pool on drop. Recycling
    /// itself is asynchronous to `acquire`/`release`: the caller never
    /// blocks on it, the flag just changes what gets logged on drop.
    pub fn mark_transport_error(&self) {
        self.transport_error.store(true, Ordering::Relaxed);
    }
}

impl<'a, R> Drop for Lease<'a, R> {
    fn drop(&mut self) {
        let recycle = pure::should_recycle(
            self.age(),
            self.recycle_after,
            self.transport_error.load(Ordering::Relaxed),
        );
        if recycle {
            debug!(age_ms = self.age().as_millis() as u64, "recycling pooled connection");
        }
    }
}

impl<R> Pool<R> {
    /// Build a new pool sized per `config`.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_size)),
            config,
            inner: Mutex::new(Inner {
                latency_samples_ms: VecDeque::with_capacity(LATENCY_WINDOW),
                total_acquired: 0,
                total_rejected: 0,
                cpu_percent: 0.0,
                memory_percent: 0.0,
            }),
            system: Mutex::new(sysinfo::System::new()),
            _resource: std::marker::PhantomData,
        }
    }

    /// Acquire a permit, retrying with exponential backoff until
    /// `acquire_timeout_ms` elapses, then build the leased resource with
    /// `make`. `make` runs once a permit is held, so construction never
    /// blocks behind another waiter's backoff sleep.
    pub async fn acquire<F>(&self, make: F) -> Result<Lease<'_, R>>
    where
        F: FnOnce() -> Result<R>,
    {
        let deadline = Instant::now() + Duration::from_millis(self.config.acquire_timeout_ms);
        let mut attempt = 0u32;

        loop {
            match self.semaphore.try_acquire() {
                Ok(permit) => {
                    let resource = make()?;
                    self.inner.lock().total_acquired += 1;
                    return Ok(Lease {
                        resource,
                        _permit: permit,
                        started: Instant::now(),
                        recycle_after: Duration::from_secs(self.config.recycle_seconds),
                        transport_error: AtomicBool::new(false),
                    });
                }
                Err(_) => {
                    if Instant::now() >= deadline {
                        self.inner.lock().total_rejected += 1;
                        return Err(Error::resource_exhausted(
                            "connection_pool",
                            format!(
                                "no permit available after {}ms ({} in use)",
                                self.config.acquire_timeout_ms,
                                self.in_use()
                            ),
                        ));
                    }
                    let backoff = pure::calculate_backoff_duration(
                        attempt,
                        Duration::from_millis(self.config.backoff_base_ms),
                        Duration::from_millis(self.config.backoff_max_ms),
                    );
                    debug!(attempt, backoff_ms = backoff.as_millis() as u64, "pool full, backing off");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Whether the pool is currently in the relaxed health-check tier,
    /// decided from the p90 of the latency moving window.
    pub fn is_relaxed(&self) -> bool {
        let p90 = self
            .latency_percentiles()
            .get("p90")
            .copied()
            .unwrap_or(0.0);
        pure::should_use_relaxed_tier(p90, self.config.health_check_deep_ms)
    }

    /// As [`Pool::acquire`], but runs `health_check` at the fast tier
    /// before the lease is handed out (spec.md §4.2: `acquire` returns a
    /// client guaranteed to have passed a fast health check). A resource
    /// that fails or times out is dropped and construction retried, up to
    /// `max_health_retries` times, before giving up with `ResourceExhausted`.
    pub async fn acquire_checked<F, H, Fut>(&self, make: F, health_check: H) -> Result<Lease<'_, R>>
    where
        F: Fn() -> Result<R>,
        H: Fn(&R) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        const MAX_HEALTH_RETRIES: u32 = 3;
        let relaxed = self.is_relaxed();
        let timeout = HealthTier::Fast.timeout(&self.config, relaxed);

        for _ in 0..MAX_HEALTH_RETRIES {
            let lease = self.acquire(&make).await?;
            match tokio::time::timeout(timeout, health_check(&lease.resource)).await {
                Ok(true) => return Ok(lease),
                Ok(false) => warn!("pooled connection failed fast health check, evicting"),
                Err(_) => warn!(timeout_ms = timeout.as_millis() as u64, "fast health check timed out, evicting"),
            }
            lease.mark_transport_error();
            drop(lease);
        }
        Err(Error::resource_exhausted(
            "connection_pool",
            format!("no healthy connection after {MAX_HEALTH_RETRIES} attempts"),
        ))
    }

    /// Number of permits currently checked out.
    pub fn in_use(&self) -> usize {
        self.config.max_size - self.semaphore.available_permits()
    }

    /// Record a completed lease's latency for percentile reporting.
    pub fn record_latency(&self, lease: &Lease<'_, R>) {
        let elapsed_ms = lease.started.elapsed().as_secs_f64() * 1000.0;
        let mut inner = self.inner.lock();
        if inner.latency_samples_ms.len() == LATENCY_WINDOW {
            inner.latency_samples_ms.pop_front();
        }
        inner.latency_samples_ms.push_back(elapsed_ms);
    }

    /// Refresh CPU/memory samples and return the current health snapshot.
    pub fn health(&self) -> PoolHealth {
        let (cpu, mem) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            let cpu = system.global_cpu_usage();
            let mem = if system.total_memory() == 0 {
                0.0
            } else {
                (system.used_memory() as f32 / system.total_memory() as f32) * 100.0
            };
            (cpu, mem)
        };
        {
            let mut inner = self.inner.lock();
            inner.cpu_percent = cpu;
            inner.memory_percent = mem;
        }
        let active = self.in_use();
        let healthy = pure::is_system_healthy(
            cpu,
            mem,
            self.config.unhealthy_cpu_percent,
            self.config.unhealthy_memory_percent,
            active,
            self.config.max_size,
        );
        if !healthy {
            warn!(cpu_percent = cpu, memory_percent = mem, active, "connection pool unhealthy");
        }
        PoolHealth {
            healthy,
            active,
            max: self.config.max_size,
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    /// Latency percentiles (ms) over the most recent samples.
    pub fn latency_percentiles(&self) -> std::collections::HashMap<String, f64> {
        let inner = self.inner.lock();
        let samples: Vec<f64> = inner.latency_samples_ms.iter().copied().collect();
        pure::calculate_latency_percentiles(&samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_respects_max_size_and_releases_on_drop() {
        let pool: Pool<u32> = Pool::new(PoolConfig {
            max_size: 2,
            acquire_timeout_ms: 200,
            ..PoolConfig::default()
        });

        let a = pool.acquire(|| Ok(1u32)).await.unwrap();
        let b = pool.acquire(|| Ok(2u32)).await.unwrap();
        assert_eq!(pool.in_use(), 2);

        drop(a);
        assert_eq!(pool.in_use(), 1);

        let c = pool.acquire(|| Ok(3u32)).await.unwrap();
        assert_eq!(pool.in_use(), 2);
        drop(b);
        drop(c);
    }

    #[tokio::test]
    async fn acquire_checked_evicts_unhealthy_resources_then_succeeds() {
        let pool: Pool<u32> = Pool::new(PoolConfig::default());
        let attempt = std::sync::atomic::AtomicU32::new(0);
        let lease = pool
            .acquire_checked(
                || Ok(1u32),
                |_| {
                    let n = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    async move { n >= 2 }
                },
            )
            .await
            .unwrap();
        assert_eq!(lease.resource, 1u32);
    }

    #[tokio::test]
    async fn acquire_checked_gives_up_after_max_retries() {
        let pool: Pool<u32> = Pool::new(PoolConfig::default());
        let err = pool
            .acquire_checked(|| Ok(1u32), |_| async { false })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
    }

    #[tokio::test]
    async fn acquire_times_out_once_pool_is_saturated() {
        let pool: Pool<u32> = Pool::new(PoolConfig {
            max_size: 1,
            acquire_timeout_ms: 50,
            backoff_base_ms: 5,
            backoff_max_ms: 10,
            ..PoolConfig::default()
        });
        let _held = pool.acquire(|| Ok(1u32)).await.unwrap();
        let err = pool.acquire(|| Ok(2u32)).await.unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
    }
}
