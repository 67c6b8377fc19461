// Shared test helpers

#![allow(dead_code)]

use hubwatch::models::Sample;
use std::collections::BTreeMap;

/// A real (non-placeholder) bucket at the given grid time.
pub fn bucket(when: i64, mem_total: u64) -> Sample {
    Sample {
        when,
        bucket_mins: 5,
        os_mem_total: mem_total,
        ..Default::default()
    }
}

/// One-instance incoming map for grid adds.
pub fn incoming(siid: &str, samples: Vec<Sample>) -> BTreeMap<String, Vec<Sample>> {
    let mut map = BTreeMap::new();
    map.insert(siid.to_string(), samples);
    map
}
