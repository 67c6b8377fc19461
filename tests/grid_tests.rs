// Bucket grid tests: add/extend/assign behavior and the uniform-length,
// shared-time, exact-spacing invariants.

mod common;

use common::{bucket, incoming};
use hubwatch::grid::{GridError, StatsGrid, ROLLING_WINDOW_SECS};
use hubwatch::models::{HostStats, Sample};

const BUCKET_SECS: i64 = 300;
const T0: i64 = 1_700_000_000;

fn grid_with_host(name: &str) -> StatsGrid {
    let grid = StatsGrid::new();
    grid.verify(name, "host.example.net", "v1", BUCKET_SECS);
    grid
}

fn assert_invariants(hs: &HostStats) {
    let bucket_secs = hs.bucket_secs();
    let mut lens: Vec<usize> = Vec::new();
    for (siid, sis) in &hs.stats {
        lens.push(sis.len());
        assert!(
            sis.len() as i64 * bucket_secs <= ROLLING_WINDOW_SECS,
            "{siid} exceeds the rolling window"
        );
        if let Some(first) = sis.first() {
            assert_eq!(first.when, hs.time, "{siid} series head disagrees with host time");
        }
        for pair in sis.windows(2) {
            assert_eq!(
                pair[0].when - pair[1].when,
                bucket_secs,
                "{siid} buckets are not exactly spaced"
            );
        }
    }
    lens.dedup();
    assert!(lens.len() <= 1, "series lengths are not uniform: {lens:?}");
}

#[test]
fn add_two_buckets_to_empty_host() {
    let grid = grid_with_host("h");
    let outcome = grid
        .add("h", "host.example.net", &incoming("a", vec![bucket(T0, 1024), bucket(T0 - 300, 1024)]))
        .unwrap();
    assert_eq!(outcome.added, 2);

    let hs = grid.extract("h", 0, 0).unwrap();
    assert_eq!(hs.time, T0);
    assert_eq!(hs.stats["a"].len(), 2);
    assert_eq!(hs.stats["a"][0].os_mem_total, 1024);
    assert_eq!(hs.stats["a"][1].os_mem_total, 1024);
    assert_invariants(&hs);
}

#[test]
fn front_extend_retains_prior_real_buckets() {
    let grid = grid_with_host("h");
    grid.add("h", "host.example.net", &incoming("a", vec![bucket(T0, 1024), bucket(T0 - 300, 1024)]))
        .unwrap();

    // One newer bucket arrives; the prior real sample must survive at
    // index 1 rather than being shadowed by a placeholder.
    grid.add("h", "host.example.net", &incoming("a", vec![bucket(T0 + 300, 1024)]))
        .unwrap();

    let hs = grid.extract("h", 0, 0).unwrap();
    assert_eq!(hs.time, T0 + 300);
    assert_eq!(hs.stats["a"].len(), 3);
    assert_eq!(hs.stats["a"][0].when, T0 + 300);
    assert_eq!(hs.stats["a"][0].os_mem_total, 1024);
    assert_eq!(hs.stats["a"][1].when, T0);
    assert_eq!(hs.stats["a"][1].os_mem_total, 1024);
    assert_eq!(hs.stats["a"][2].when, T0 - 300);
    assert_invariants(&hs);
}

#[test]
fn placeholder_never_overwrites_real_bucket() {
    let grid = grid_with_host("h");
    grid.add("h", "host.example.net", &incoming("a", vec![bucket(T0, 1024)]))
        .unwrap();

    let outcome = grid
        .add("h", "host.example.net", &incoming("a", vec![Sample::placeholder(T0)]))
        .unwrap();
    assert_eq!(outcome.added, 0);
    assert!(outcome.added_by_instance.is_empty());

    let hs = grid.extract("h", 0, 0).unwrap();
    assert_eq!(hs.stats["a"][0].os_mem_total, 1024);
}

#[test]
fn new_instance_backfills_to_common_length() {
    let grid = grid_with_host("h");
    grid.add(
        "h",
        "host.example.net",
        &incoming("a", vec![bucket(T0, 1024), bucket(T0 - 300, 1024), bucket(T0 - 600, 1024)]),
    )
    .unwrap();

    // A new service instance appears with a single bucket; its series must
    // be padded to match the established length.
    grid.add("h", "host.example.net", &incoming("b", vec![bucket(T0, 2048)]))
        .unwrap();

    let hs = grid.extract("h", 0, 0).unwrap();
    assert_eq!(hs.stats["a"].len(), 3);
    assert_eq!(hs.stats["b"].len(), 3);
    assert_eq!(hs.stats["b"][0].os_mem_total, 2048);
    assert!(hs.stats["b"][1].is_placeholder());
    assert!(hs.stats["b"][2].is_placeholder());
    assert_invariants(&hs);
}

#[test]
fn older_window_lands_at_correct_depth() {
    let grid = grid_with_host("h");
    grid.add("h", "host.example.net", &incoming("a", vec![bucket(T0, 1024)]))
        .unwrap();

    // A window older than the grid head (the reload-yesterday path) must
    // slot by bucket time, not by position.
    grid.add(
        "h",
        "host.example.net",
        &incoming("a", vec![bucket(T0 - 600, 777), bucket(T0 - 900, 888)]),
    )
    .unwrap();

    let hs = grid.extract("h", 0, 0).unwrap();
    assert_eq!(hs.time, T0);
    assert_eq!(hs.stats["a"][0].os_mem_total, 1024);
    assert!(hs.stats["a"][1].is_placeholder());
    assert_eq!(hs.stats["a"][2].os_mem_total, 777);
    assert_eq!(hs.stats["a"][3].os_mem_total, 888);
    assert_invariants(&hs);
}

#[test]
fn nonuniform_incoming_lengths_are_rejected() {
    let grid = grid_with_host("h");
    let mut stats = incoming("a", vec![bucket(T0, 1024), bucket(T0 - 300, 1024)]);
    stats.insert("b".to_string(), vec![bucket(T0, 1024)]);

    let err = grid.add("h", "host.example.net", &stats).unwrap_err();
    assert!(matches!(err, GridError::InputNonUniform(_)));

    // Nothing was merged for the host.
    let hs = grid.extract("h", 0, 0).unwrap();
    assert!(hs.stats.is_empty());
}

#[test]
fn nonuniform_incoming_times_are_rejected() {
    let grid = grid_with_host("h");
    let mut stats = incoming("a", vec![bucket(T0, 1024)]);
    stats.insert("b".to_string(), vec![bucket(T0 - 300, 1024)]);

    let err = grid.add("h", "host.example.net", &stats).unwrap_err();
    assert!(matches!(err, GridError::InputNonUniform(_)));
}

#[test]
fn add_requires_verified_host() {
    let grid = StatsGrid::new();
    let err = grid
        .add("h", "host.example.net", &incoming("a", vec![bucket(T0, 1024)]))
        .unwrap_err();
    assert!(matches!(err, GridError::NotConfigured(_)));
}

#[test]
fn series_are_trimmed_to_rolling_window() {
    let grid = grid_with_host("h");
    let cap = (ROLLING_WINDOW_SECS / BUCKET_SECS) as usize;

    grid.add("h", "host.example.net", &incoming("a", vec![bucket(T0, 1024)]))
        .unwrap();
    // Jump two days ahead; the front-extension alone would exceed the cap.
    let t1 = T0 + ROLLING_WINDOW_SECS + 600;
    grid.add("h", "host.example.net", &incoming("a", vec![bucket(t1, 1024)]))
        .unwrap();

    let hs = grid.extract("h", 0, 0).unwrap();
    assert!(hs.stats["a"].len() <= cap);
    assert_eq!(hs.stats["a"][0].when, t1);
    assert_invariants(&hs);
}

#[test]
fn verify_resets_on_service_version_change() {
    let grid = grid_with_host("h");
    grid.add("h", "host.example.net", &incoming("a", vec![bucket(T0, 1024)]))
        .unwrap();
    assert!(grid.loaded("h"));
    assert_eq!(grid.service_version("h").as_deref(), Some("v1"));

    grid.verify("h", "host.example.net", "v2", BUCKET_SECS);
    let hs = grid.extract("h", 0, 0).unwrap();
    assert!(hs.stats.is_empty(), "version change must clear the grid");
    assert_eq!(grid.service_version("h").as_deref(), Some("v2"));

    // Same version again is a no-op.
    grid.add("h", "host.example.net", &incoming("a", vec![bucket(T0, 512)]))
        .unwrap();
    grid.verify("h", "host.example.net", "v2", BUCKET_SECS);
    let hs = grid.extract("h", 0, 0).unwrap();
    assert_eq!(hs.stats["a"][0].os_mem_total, 512);
}

#[test]
fn extract_filters_to_window() {
    let grid = grid_with_host("h");
    grid.add(
        "h",
        "host.example.net",
        &incoming(
            "a",
            vec![
                bucket(T0, 1024),
                bucket(T0 - 300, 1024),
                bucket(T0 - 600, 1024),
                bucket(T0 - 900, 1024),
            ],
        ),
    )
    .unwrap();

    let hs = grid.extract("h", T0 - 600, 600).unwrap();
    assert_eq!(hs.time, T0 - 300);
    let whens: Vec<i64> = hs.stats["a"].iter().map(|s| s.when).collect();
    assert_eq!(whens, vec![T0 - 300, T0 - 600]);
}

#[test]
fn extract_unknown_host_is_none() {
    let grid = grid_with_host("h");
    assert!(grid.extract("other", 0, 0).is_none());
}

#[test]
fn loaded_requires_version_and_row() {
    let grid = StatsGrid::new();
    assert!(!grid.loaded("h"));
    grid.verify("h", "host.example.net", "v1", BUCKET_SECS);
    assert!(grid.loaded("h"));
    grid.reset_version("h");
    assert!(!grid.loaded("h"));
}
