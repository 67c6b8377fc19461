// Read-side aggregation: collapse per-instance delta series into host-level
// per-bucket rollups. Buckets are identified by `when / bucket_secs`, so
// series from instances snapshotted at unsynchronized clocks land together.

use crate::models::{AggregatedStat, Sample};
use std::collections::BTreeMap;

/// Sum per-instance series into one AggregatedStat per bucket, newest first.
pub fn aggregate_by_bucket(
    all_stats: &BTreeMap<String, Vec<Sample>>,
    bucket_secs: i64,
) -> Vec<AggregatedStat> {
    let mut stats = aggregate_oldest_first(all_stats, bucket_secs);
    stats.reverse();
    stats
}

/// Same rollup ordered oldest first, the order the metrics backend wants
/// its point arrays in.
pub fn aggregate_oldest_first(
    all_stats: &BTreeMap<String, Vec<Sample>>,
    bucket_secs: i64,
) -> Vec<AggregatedStat> {
    if all_stats.is_empty() || bucket_secs == 0 {
        return Vec::new();
    }

    let mut by_bucket: BTreeMap<i64, AggregatedStat> = BTreeMap::new();
    for sis in all_stats.values() {
        for s in sis {
            let bucket_id = s.when / bucket_secs;
            let agg = by_bucket.entry(bucket_id).or_default();
            agg.time = bucket_id * bucket_secs;

            agg.disk_reads += s.os_disk_read;
            agg.disk_writes += s.os_disk_write;
            agg.net_received += s.os_net_received;
            agg.net_sent += s.os_net_sent;

            // Activated fields are per-bucket deltas; deactivated fields
            // carry the live population (see the delta converter).
            agg.new_handlers_ephemeral += s.ephemeral_handlers_activated;
            agg.new_handlers_continuous += s.continuous_handlers_activated;
            agg.new_handlers_discovery += s.discovery_handlers_activated;
            agg.new_handlers_notification += s.notification_handlers_activated;
            agg.handlers_ephemeral += s.ephemeral_handlers_deactivated;
            agg.handlers_continuous += s.continuous_handlers_deactivated;
            agg.handlers_discovery += s.discovery_handlers_deactivated;
            agg.handlers_notification += s.notification_handlers_deactivated;

            agg.events_received += s.events_enqueued;
            agg.events_routed += s.events_routed;

            for (key, db) in &s.databases {
                agg.database_reads += db.reads;
                agg.database_writes += db.writes;
                let v = agg.databases.entry(key.clone()).or_default();
                v.reads += db.reads;
                v.writes += db.writes;
                v.read_ms_max = v.read_ms_max.max(db.read_ms_max);
                v.write_ms_max = v.write_ms_max.max(db.write_ms_max);
            }

            for (key, cache) in &s.caches {
                let v = agg.caches.entry(key.clone()).or_default();
                v.invalidations += cache.invalidations;
                v.entries += cache.entries;
                v.entries_hwm = v.entries_hwm.max(cache.entries_hwm);
            }

            for (key, calls) in &s.api {
                agg.api_total += calls;
                *agg.api.entry(key.clone()).or_default() += calls;
            }

            for (key, fatals) in &s.fatals {
                *agg.fatals.entry(key.clone()).or_default() += fatals;
            }
        }
    }

    by_bucket.into_values().collect()
}

/// Reproduce a bucket-aligned sample series from an aggregated array, so
/// host-level views can share the per-instance rendering path.
pub fn aggregate_as_samples(
    all_stats: &BTreeMap<String, Vec<Sample>>,
    bucket_secs: i64,
) -> Vec<Sample> {
    aggregate_by_bucket(all_stats, bucket_secs)
        .into_iter()
        .map(|agg| Sample {
            when: agg.time,
            os_disk_read: agg.disk_reads,
            os_disk_write: agg.disk_writes,
            os_net_received: agg.net_received,
            os_net_sent: agg.net_sent,
            discovery_handlers_activated: agg.new_handlers_discovery,
            ephemeral_handlers_activated: agg.new_handlers_ephemeral,
            continuous_handlers_activated: agg.new_handlers_continuous,
            notification_handlers_activated: agg.new_handlers_notification,
            discovery_handlers_deactivated: agg.handlers_discovery,
            ephemeral_handlers_deactivated: agg.handlers_ephemeral,
            continuous_handlers_deactivated: agg.handlers_continuous,
            notification_handlers_deactivated: agg.handlers_notification,
            events_enqueued: agg.events_received,
            events_routed: agg.events_routed,
            databases: agg.databases,
            caches: agg.caches,
            api: agg.api,
            fatals: agg.fatals,
            ..Default::default()
        })
        .collect()
}
