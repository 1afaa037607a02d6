use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::CacheError;
use crate::logging::sanitize_log_message;
use crate::observability::record_cache_lookup;
use crate::schema::{CalcOutcome, OperationType};

/// Snapshot of cache counters and partition sizes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    /// Percentage rounded to two decimals, 0 before the first lookup
    pub hit_rate: f64,
    pub cache_sizes: CacheSizes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSizes {
    pub calculator: usize,
    pub fibonacci: usize,
    pub factorial: usize,
}

impl CacheStats {
    pub fn calculate_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            let rate = hits as f64 / total as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        }
    }
}

/// Partitions and counters live behind one guard so a lookup and its counter
/// bump are never observed separately.
#[derive(Debug, Default)]
struct CacheState {
    partitions: HashMap<OperationType, HashMap<String, CalcOutcome>>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn partition_len(&self, operation: OperationType) -> usize {
        self.partitions.get(&operation).map_or(0, HashMap::len)
    }
}

/// Process-wide result cache partitioned by operation type.
///
/// Entries never expire. Keys are trimmed before use, and a key in one
/// partition never shadows the same text in another. Cloning is cheap and
/// every clone shares the same storage.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    state: Arc<RwLock<CacheState>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a result, counting the access as a hit or a miss
    pub async fn get(&self, operation: OperationType, input: &str) -> Option<CalcOutcome> {
        let key = input.trim();
        let started = Instant::now();

        let mut state = self.state.write().await;
        let found = state
            .partitions
            .get(&operation)
            .and_then(|partition| partition.get(key))
            .cloned();

        let access_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &found {
            Some(result) => {
                state.hits += 1;
                info!(
                    event = "CACHE_HIT",
                    operation = %operation,
                    input = %sanitize_log_message(key),
                    result = %result,
                    access_time_ms = access_ms,
                    "Cache hit"
                );
                record_cache_lookup(operation, true);
            }
            None => {
                state.misses += 1;
                info!(
                    event = "CACHE_MISS",
                    operation = %operation,
                    input = %sanitize_log_message(key),
                    access_time_ms = access_ms,
                    "Cache miss"
                );
                record_cache_lookup(operation, false);
            }
        }

        found
    }

    /// Store or overwrite the result for a key
    pub async fn set(&self, operation: OperationType, input: &str, result: CalcOutcome) {
        let key = input.trim().to_string();
        debug!(operation = %operation, input = %sanitize_log_message(&key), result = %result, "Cache store");

        let mut state = self.state.write().await;
        state.partitions.entry(operation).or_default().insert(key, result);
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        CacheStats {
            hit_count: state.hits,
            miss_count: state.misses,
            hit_rate: CacheStats::calculate_hit_rate(state.hits, state.misses),
            cache_sizes: CacheSizes {
                calculator: state.partition_len(OperationType::Calculator),
                fibonacci: state.partition_len(OperationType::Fibonacci),
                factorial: state.partition_len(OperationType::Factorial),
            },
        }
    }

    /// Empty one partition, or everything when `operation` is `None`.
    ///
    /// A targeted clear keeps the hit/miss counters; a full clear resets them.
    /// Returns the number of entries removed.
    pub async fn clear(&self, operation: Option<OperationType>) -> usize {
        let mut state = self.state.write().await;
        match operation {
            Some(operation) => {
                let removed = state
                    .partitions
                    .get_mut(&operation)
                    .map(|partition| {
                        let count = partition.len();
                        partition.clear();
                        count
                    })
                    .unwrap_or(0);
                info!(
                    event = "CACHE_CLEAR",
                    operation = %operation,
                    cleared_items = removed,
                    "Cache partition cleared"
                );
                removed
            }
            None => {
                let removed = state.partitions.values().map(HashMap::len).sum();
                state.partitions.clear();
                state.hits = 0;
                state.misses = 0;
                info!(
                    event = "CACHE_CLEAR_ALL",
                    cleared_items = removed,
                    "All cache partitions cleared"
                );
                removed
            }
        }
    }

    /// Clear by wire name, rejecting names outside the operation set
    pub async fn clear_named(&self, operation: Option<&str>) -> Result<usize, CacheError> {
        let operation = operation.map(str::parse::<OperationType>).transpose()?;
        Ok(self.clear(operation).await)
    }

    pub async fn size(&self, operation: OperationType) -> usize {
        self.state.read().await.partition_len(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CalcValue, DomainFailure};

    fn value(n: i64) -> CalcOutcome {
        CalcOutcome::Value(CalcValue::from(n))
    }

    #[tokio::test]
    async fn test_first_lookup_misses_then_hits_after_set() {
        let cache = CacheStore::new();

        assert!(cache.get(OperationType::Calculator, "2 + 2").await.is_none());
        cache.set(OperationType::Calculator, "2 + 2", value(4)).await;
        assert_eq!(cache.get(OperationType::Calculator, "2 + 2").await, Some(value(4)));

        let stats = cache.stats().await;
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.cache_sizes.calculator, 1);
    }

    #[tokio::test]
    async fn test_keys_are_trimmed() {
        let cache = CacheStore::new();
        cache.set(OperationType::Fibonacci, " 7 ", value(13)).await;

        assert_eq!(cache.get(OperationType::Fibonacci, "7").await, Some(value(13)));
        assert_eq!(cache.get(OperationType::Fibonacci, "\t7\n").await, Some(value(13)));
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let cache = CacheStore::new();
        cache.set(OperationType::Fibonacci, "5", value(5)).await;

        assert!(cache.get(OperationType::Factorial, "5").await.is_none());
        assert!(cache.get(OperationType::Calculator, "5").await.is_none());
        assert_eq!(cache.get(OperationType::Fibonacci, "5").await, Some(value(5)));
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_entry() {
        let cache = CacheStore::new();
        cache.set(OperationType::Factorial, "-3", value(0)).await;
        cache
            .set(OperationType::Factorial, "-3", CalcOutcome::Failure(DomainFailure::NegativeNumber))
            .await;

        assert_eq!(
            cache.get(OperationType::Factorial, "-3").await,
            Some(CalcOutcome::Failure(DomainFailure::NegativeNumber))
        );
        assert_eq!(cache.size(OperationType::Factorial).await, 1);
    }

    #[tokio::test]
    async fn test_hit_rate_is_zero_without_requests() {
        let stats = CacheStore::new().stats().await;
        assert_eq!(stats.hit_count, 0);
        assert_eq!(stats.miss_count, 0);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.cache_sizes, CacheSizes::default());
    }

    #[test]
    fn test_hit_rate_rounding() {
        assert_eq!(CacheStats::calculate_hit_rate(1, 2), 33.33);
        assert_eq!(CacheStats::calculate_hit_rate(2, 1), 66.67);
        assert_eq!(CacheStats::calculate_hit_rate(3, 0), 100.0);
    }

    #[tokio::test]
    async fn test_targeted_clear_keeps_counters() {
        let cache = CacheStore::new();
        cache.set(OperationType::Fibonacci, "10", value(55)).await;
        cache.set(OperationType::Factorial, "5", value(120)).await;
        cache.get(OperationType::Fibonacci, "10").await;
        cache.get(OperationType::Fibonacci, "11").await;

        let removed = cache.clear(Some(OperationType::Fibonacci)).await;
        assert_eq!(removed, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.cache_sizes.fibonacci, 0);
        assert_eq!(stats.cache_sizes.factorial, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[tokio::test]
    async fn test_full_clear_resets_counters() {
        let cache = CacheStore::new();
        for op in OperationType::ALL {
            cache.set(op, "1", value(1)).await;
            cache.get(op, "1").await;
            cache.get(op, "2").await;
        }

        let removed = cache.clear(None).await;
        assert_eq!(removed, 3);

        let stats = cache.stats().await;
        assert_eq!(stats.hit_count, 0);
        assert_eq!(stats.miss_count, 0);
        assert_eq!(stats.cache_sizes, CacheSizes::default());
    }

    #[tokio::test]
    async fn test_clear_named_rejects_unknown_operation() {
        let cache = CacheStore::new();
        cache.set(OperationType::Calculator, "1+1", value(2)).await;

        let err = cache.clear_named(Some("sqrt")).await.unwrap_err();
        assert!(matches!(err, CacheError::UnknownOperationType(_)));
        assert_eq!(cache.size(OperationType::Calculator).await, 1);

        assert_eq!(cache.clear_named(Some("calculator")).await.unwrap(), 1);
        assert_eq!(cache.clear_named(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counters_exact_under_concurrency() {
        let cache = CacheStore::new();
        cache.set(OperationType::Calculator, "hit", value(1)).await;

        let mut handles = Vec::new();
        for i in 0..64 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = if i % 2 == 0 { "hit".to_string() } else { format!("miss-{}", i) };
                cache.get(OperationType::Calculator, &key).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = cache.stats().await;
        assert_eq!(stats.hit_count + stats.miss_count, 64);
        assert_eq!(stats.hit_count, 32);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_lookups_are_logged() {
        let cache = CacheStore::new();
        cache.get(OperationType::Factorial, "5").await;
        cache.set(OperationType::Factorial, "5", value(120)).await;
        cache.get(OperationType::Factorial, "5").await;

        assert!(logs_contain("Cache miss"));
        assert!(logs_contain("Cache hit"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_logged_keys_are_sanitized() {
        let cache = CacheStore::new();
        cache.get(OperationType::Calculator, "alice@example.com").await;
        cache
            .set(OperationType::Calculator, "token=abc123", value(1))
            .await;
        cache.get(OperationType::Calculator, "token=abc123").await;

        assert!(logs_contain("***@example.com"));
        assert!(logs_contain("token=[REDACTED]"));
        assert!(!logs_contain("alice@"));
        assert!(!logs_contain("abc123"));
    }
}
