// Cross-instance aggregation tests: counters sum, caches sum invalidations
// with high-water maxima, and bucket identity comes from when / bucket_secs.

use hubwatch::grid::aggregate::{
    aggregate_as_samples, aggregate_by_bucket, aggregate_oldest_first,
};
use hubwatch::models::{CacheSample, DatabaseSample, Sample};
use std::collections::BTreeMap;

const BUCKET_SECS: i64 = 300;
const T0: i64 = 1_700_000_000 - (1_700_000_000 % 300);

fn delta_bucket(when: i64, routed: i64) -> Sample {
    Sample {
        when,
        bucket_mins: 5,
        os_mem_total: 1024,
        events_routed: routed,
        ..Default::default()
    }
}

fn two_instances() -> BTreeMap<String, Vec<Sample>> {
    let mut a0 = delta_bucket(T0, 10);
    a0.os_disk_read = 100;
    a0.continuous_handlers_deactivated = 3;
    a0.databases.insert(
        "events".to_string(),
        DatabaseSample {
            reads: 5,
            read_ms_max: 40,
            ..Default::default()
        },
    );
    a0.caches.insert(
        "device".to_string(),
        CacheSample {
            invalidations: 4,
            entries: 100,
            entries_hwm: 120,
        },
    );
    a0.api.insert("hub.app.get".to_string(), 7);

    let mut b0 = delta_bucket(T0, 32);
    b0.os_disk_read = 50;
    b0.continuous_handlers_deactivated = 2;
    b0.databases.insert(
        "events".to_string(),
        DatabaseSample {
            reads: 9,
            read_ms_max: 55,
            ..Default::default()
        },
    );
    b0.caches.insert(
        "device".to_string(),
        CacheSample {
            invalidations: 6,
            entries: 80,
            entries_hwm: 150,
        },
    );
    b0.api.insert("hub.app.get".to_string(), 2);

    let mut map = BTreeMap::new();
    map.insert("a".to_string(), vec![a0, delta_bucket(T0 - 300, 8)]);
    map.insert("b".to_string(), vec![b0, delta_bucket(T0 - 300, 4)]);
    map
}

#[test]
fn empty_input_aggregates_to_nothing() {
    let map: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    assert!(aggregate_by_bucket(&map, BUCKET_SECS).is_empty());
}

#[test]
fn counters_sum_across_instances() {
    let out = aggregate_by_bucket(&two_instances(), BUCKET_SECS);
    assert_eq!(out.len(), 2);

    // Newest first.
    assert_eq!(out[0].time, T0);
    assert_eq!(out[1].time, T0 - 300);
    assert_eq!(out[0].events_routed, 42);
    assert_eq!(out[0].disk_reads, 150);
    assert_eq!(out[0].handlers_continuous, 5);
    assert_eq!(out[1].events_routed, 12);
}

#[test]
fn database_keys_merge_with_max_ms() {
    let out = aggregate_by_bucket(&two_instances(), BUCKET_SECS);
    let db = &out[0].databases["events"];
    assert_eq!(db.reads, 14);
    assert_eq!(db.read_ms_max, 55);
    assert_eq!(out[0].database_reads, 14);
}

#[test]
fn cache_invalidations_sum_and_hwm_maxes() {
    let out = aggregate_by_bucket(&two_instances(), BUCKET_SECS);
    let cache = &out[0].caches["device"];
    assert_eq!(cache.invalidations, 10);
    assert_eq!(cache.entries, 180);
    assert_eq!(cache.entries_hwm, 150);
}

#[test]
fn api_keys_sum_into_total() {
    let out = aggregate_by_bucket(&two_instances(), BUCKET_SECS);
    assert_eq!(out[0].api["hub.app.get"], 9);
    assert_eq!(out[0].api_total, 9);
}

#[test]
fn oldest_first_variant_reverses_order() {
    let out = aggregate_oldest_first(&two_instances(), BUCKET_SECS);
    assert_eq!(out[0].time, T0 - 300);
    assert_eq!(out[1].time, T0);
}

#[test]
fn unaligned_snapshots_share_a_bucket() {
    // Two instances snapshotted 40 seconds apart still aggregate into the
    // same bucket because identity is when / bucket_secs.
    let mut map = BTreeMap::new();
    map.insert("a".to_string(), vec![delta_bucket(T0 + 10, 5)]);
    map.insert("b".to_string(), vec![delta_bucket(T0 + 50, 6)]);

    let out = aggregate_by_bucket(&map, BUCKET_SECS);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].time, T0);
    assert_eq!(out[0].events_routed, 11);
}

#[test]
fn samples_round_trip_through_aggregation() {
    let out = aggregate_as_samples(&two_instances(), BUCKET_SECS);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].when, T0);
    assert_eq!(out[0].events_routed, 42);
    assert_eq!(out[0].os_disk_read, 150);
    // Population counts ride the deactivated fields either side of the trip.
    assert_eq!(out[0].continuous_handlers_deactivated, 5);
    assert_eq!(out[0].databases["events"].reads, 14);
}
