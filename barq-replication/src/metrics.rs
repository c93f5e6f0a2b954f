//! Replication-core metrics, following the `metrics` crate usage already
//! established in `barq-storage`/`barq-api` (counters/gauges keyed by
//! label, no direct exporter wiring here — that's `barq-api`'s job).

use ::metrics::{counter, gauge, histogram};

use crate::ids::ShardId;

pub fn record_primary_acquired(shard: &ShardId) {
    counter!("replication_primary_lock_acquired_total", "shard" => shard.to_string()).increment(1);
}

pub fn record_primary_released(shard: &ShardId) {
    counter!("replication_primary_lock_released_total", "shard" => shard.to_string()).increment(1);
}

pub fn record_retry(shard: &ShardId, reason: &'static str) {
    counter!(
        "replication_retries_total",
        "shard" => shard.to_string(),
        "reason" => reason,
    )
    .increment(1);
}

pub fn record_replica_failure(shard: &ShardId) {
    counter!("replication_replica_failures_total", "shard" => shard.to_string()).increment(1);
}

pub fn record_in_flight_replicas(shard: &ShardId, count: usize) {
    gauge!("replication_in_flight_replicas", "shard" => shard.to_string()).set(count as f64);
}

pub fn record_operation_duration_ms(shard: &ShardId, millis: f64) {
    histogram!("replication_operation_duration_ms", "shard" => shard.to_string()).record(millis);
}
