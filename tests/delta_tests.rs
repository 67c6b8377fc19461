// Delta converter tests: counter subtraction, wrap clamping, handler
// population rules, and database ms averaging.

use hubwatch::grid::delta::absolute_to_relative;
use hubwatch::models::{CacheSample, DatabaseSample, Sample};

fn cumulative(when: i64) -> Sample {
    Sample {
        when,
        bucket_mins: 5,
        os_mem_total: 1024,
        ..Default::default()
    }
}

#[test]
fn empty_input_yields_empty_output() {
    assert!(absolute_to_relative(&[]).is_empty());
}

#[test]
fn single_snapshot_only_normalizes_database_averages() {
    let mut s = cumulative(1_700_000_000);
    s.databases.insert(
        "d".to_string(),
        DatabaseSample {
            reads: 100,
            read_ms: 500,
            writes: 10,
            write_ms: 40,
            ..Default::default()
        },
    );
    s.events_enqueued = 42;

    let out = absolute_to_relative(&[s]);
    assert_eq!(out.len(), 1);
    // No counter subtraction on a lone snapshot.
    assert_eq!(out[0].events_enqueued, 42);
    assert_eq!(out[0].databases["d"].read_ms, 5);
    assert_eq!(out[0].databases["d"].write_ms, 4);
}

#[test]
fn counters_become_per_bucket_deltas() {
    let mut cur = cumulative(1_700_000_300);
    cur.os_disk_read = 500;
    cur.events_enqueued = 70;
    cur.events_dequeued = 65;
    cur.events_routed = 60;
    let mut prev = cumulative(1_700_000_000);
    prev.os_disk_read = 420;
    prev.events_enqueued = 50;
    prev.events_dequeued = 48;
    prev.events_routed = 45;

    let out = absolute_to_relative(&[cur, prev]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].os_disk_read, 80);
    assert_eq!(out[0].events_enqueued, 20);
    assert_eq!(out[0].events_routed, 15);
    // Dequeued is only tracked live.
    assert_eq!(out[0].events_dequeued, 0);
}

#[test]
fn net_counter_wrap_clamps_to_zero() {
    let series: Vec<Sample> = [100u64, 200, 180]
        .iter()
        .enumerate()
        .map(|(i, &received)| {
            let mut s = cumulative(1_700_000_600 - i as i64 * 300);
            s.os_net_received = received;
            s
        })
        .collect();

    let out = absolute_to_relative(&series);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].os_net_received, 0);
    assert_eq!(out[1].os_net_received, 20);
}

#[test]
fn activated_is_delta_deactivated_is_population() {
    let mut cur = cumulative(1_700_000_300);
    cur.continuous_handlers_activated = 50;
    cur.continuous_handlers_deactivated = 44;
    let mut prev = cumulative(1_700_000_000);
    prev.continuous_handlers_activated = 40;
    prev.continuous_handlers_deactivated = 38;

    let out = absolute_to_relative(&[cur, prev]);
    // 10 new activations in the bucket, 6 currently active at its close.
    assert_eq!(out[0].continuous_handlers_activated, 10);
    assert_eq!(out[0].continuous_handlers_deactivated, 6);
}

#[test]
fn database_ms_becomes_average_per_op() {
    let mut cur = cumulative(1_700_000_300);
    cur.databases.insert(
        "d".to_string(),
        DatabaseSample {
            reads: 100,
            read_ms: 500,
            ..Default::default()
        },
    );
    let mut prev = cumulative(1_700_000_000);
    prev.databases.insert(
        "d".to_string(),
        DatabaseSample {
            reads: 80,
            read_ms: 400,
            ..Default::default()
        },
    );

    let out = absolute_to_relative(&[cur, prev]);
    assert_eq!(out[0].databases["d"].reads, 20);
    assert_eq!(out[0].databases["d"].read_ms, 5);
}

#[test]
fn cache_entries_pass_through_invalidations_delta() {
    let mut cur = cumulative(1_700_000_300);
    cur.caches.insert(
        "device".to_string(),
        CacheSample {
            invalidations: 30,
            entries: 1000,
            entries_hwm: 1500,
        },
    );
    let mut prev = cumulative(1_700_000_000);
    prev.caches.insert(
        "device".to_string(),
        CacheSample {
            invalidations: 22,
            entries: 900,
            entries_hwm: 1500,
        },
    );

    let out = absolute_to_relative(&[cur, prev]);
    assert_eq!(out[0].caches["device"].invalidations, 8);
    assert_eq!(out[0].caches["device"].entries, 1000);
    assert_eq!(out[0].caches["device"].entries_hwm, 1500);
}

#[test]
fn api_key_missing_in_prior_counts_from_zero() {
    let mut cur = cumulative(1_700_000_300);
    cur.api.insert("hub.app.get".to_string(), 17);
    cur.api.insert("hub.env.get".to_string(), 9);
    let mut prev = cumulative(1_700_000_000);
    prev.api.insert("hub.app.get".to_string(), 12);

    let out = absolute_to_relative(&[cur, prev]);
    assert_eq!(out[0].api["hub.app.get"], 5);
    assert_eq!(out[0].api["hub.env.get"], 9);
}

#[test]
fn when_is_snapped_to_the_bucket_grid() {
    let mut cur = cumulative(1_700_000_313);
    cur.bucket_mins = 5;
    let prev = cumulative(1_700_000_000);

    let out = absolute_to_relative(&[cur, prev]);
    assert_eq!(out[0].when, 1_700_000_100);
}

#[test]
fn reconstructing_cumulative_reproduces_deltas() {
    // Build a cumulative series from known per-bucket activity, convert,
    // and check the per-bucket activity comes back out.
    let deltas = [7i64, 13, 4];
    let mut cumulative_total = 100i64;
    let mut series: Vec<Sample> = vec![{
        let mut s = cumulative(1_700_000_000);
        s.events_routed = cumulative_total;
        s
    }];
    for (i, d) in deltas.iter().enumerate() {
        cumulative_total += d;
        let mut s = cumulative(1_700_000_000 + (i as i64 + 1) * 300);
        s.events_routed = cumulative_total;
        series.push(s);
    }
    series.reverse();

    let out = absolute_to_relative(&series);
    let recovered: Vec<i64> = out.iter().map(|s| s.events_routed).collect();
    assert_eq!(recovered, vec![4, 13, 7]);
}
