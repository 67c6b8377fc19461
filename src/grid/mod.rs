// In-memory rolling stats grid: per-host, per-service-instance bucket series
// kept length-aligned on a shared time base. All mutation is serialized
// behind one lock; reads copy out under the lock.

pub mod aggregate;
pub mod delta;

use crate::models::{HostStats, Sample};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{error, info, warn};

/// The grid retains at most a rolling 48 hours per series.
pub const ROLLING_WINDOW_SECS: i64 = 48 * 60 * 60;

#[derive(Debug, Error)]
pub enum GridError {
    /// The host has no recorded bucket width (Verify never ran).
    #[error("{0}: no bucket width recorded for host")]
    NotConfigured(String),
    /// Incoming series disagree on length or base time; nothing was merged.
    #[error("non-uniform incoming stats: {0}")]
    InputNonUniform(String),
    /// Post-merge validation failed. The grid is left as-is for forensics;
    /// the next poll's front/tail extension may heal it.
    #[error("grid invariant violated: {0}")]
    InvariantViolation(String),
}

/// Buckets merged by one `add` call, for fan-out to the metrics backend.
#[derive(Debug, Default)]
pub struct AddOutcome {
    pub added: usize,
    pub added_by_instance: BTreeMap<String, Vec<Sample>>,
}

#[derive(Default)]
struct GridInner {
    hosts: HashMap<String, HostStats>,
    service_versions: HashMap<String, String>,
}

/// The in-memory set of HostStats for all monitored hosts.
#[derive(Default)]
pub struct StatsGrid {
    inner: Mutex<GridInner>,
}

impl StatsGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff a service version is recorded for the host and its row exists.
    pub fn loaded(&self, hostname: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .service_versions
            .get(hostname)
            .is_some_and(|v| !v.is_empty())
            && inner.hosts.contains_key(hostname)
    }

    /// The service version currently recorded for the host.
    pub fn service_version(&self, hostname: &str) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .service_versions
            .get(hostname)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    /// Forget the recorded service version so the next `verify` clears the
    /// host row. Used by the reload path.
    pub fn reset_version(&self, hostname: &str) {
        let mut inner = self.inner.lock();
        inner.service_versions.insert(hostname.to_string(), String::new());
    }

    /// If `service_version` differs from the recorded one, clear the host's
    /// grid and record the new version and bucket width. Never fails: node
    /// ids are version-scoped, so a version change is a reset event.
    pub fn verify(&self, hostname: &str, hostaddr: &str, service_version: &str, bucket_secs: i64) {
        let mut inner = self.inner.lock();
        let current = inner
            .service_versions
            .get(hostname)
            .cloned()
            .unwrap_or_default();
        if current != service_version {
            inner
                .service_versions
                .insert(hostname.to_string(), service_version.to_string());
            inner.hosts.insert(
                hostname.to_string(),
                HostStats {
                    name: hostname.to_string(),
                    addr: hostaddr.to_string(),
                    bucket_mins: bucket_secs / 60,
                    ..Default::default()
                },
            );
            info!(host = hostname, service_version, "reset stats for host");
        }
    }

    /// Merge `incoming` bucket series into the host grid, extending every
    /// stored series at the front and tail as needed so all series stay the
    /// same length on the same time base, then slotting each real incoming
    /// bucket at its grid index. Placeholders never overwrite real buckets.
    pub fn add(
        &self,
        hostname: &str,
        hostaddr: &str,
        incoming: &BTreeMap<String, Vec<Sample>>,
    ) -> Result<AddOutcome, GridError> {
        let mut inner = self.inner.lock();
        let hs = inner
            .hosts
            .get_mut(hostname)
            .ok_or_else(|| GridError::NotConfigured(hostname.to_string()))?;
        if hs.bucket_mins == 0 {
            return Err(GridError::NotConfigured(hostname.to_string()));
        }
        let bucket_secs = hs.bucket_secs();
        if hs.addr.is_empty() {
            hs.addr = hostaddr.to_string();
        }

        let mut outcome = AddOutcome::default();
        if incoming.is_empty() {
            return Ok(outcome);
        }

        // The incoming window must be uniform: identical lengths, shared
        // base time at index 0.
        let mut buckets: i64 = 0;
        let mut most_recent: i64 = 0;
        for (siid, sis) in incoming {
            if buckets == 0 {
                buckets = sis.len() as i64;
                most_recent = sis.first().map(|s| s.when).unwrap_or(0);
            }
            if sis.len() as i64 != buckets || buckets == 0 {
                return Err(GridError::InputNonUniform(format!(
                    "{hostname}: {siid} has {} buckets, expected {buckets}",
                    sis.len()
                )));
            }
            if sis[0].when != most_recent || most_recent == 0 {
                return Err(GridError::InputNonUniform(format!(
                    "{hostname}: {siid} starts at {}, expected {most_recent}",
                    sis[0].when
                )));
            }
        }
        let least_recent = most_recent - buckets * bucket_secs;

        // Every incoming instance needs a stored series.
        for siid in incoming.keys() {
            hs.stats.entry(siid.clone()).or_default();
        }

        if hs.time == 0 {
            hs.time = most_recent;
        }

        // Front-extend every series when the incoming window is newer.
        if most_recent > hs.time {
            let entries = (most_recent - hs.time) / bucket_secs;
            for sis in hs.stats.values_mut() {
                let mut front: Vec<Sample> = (0..entries)
                    .map(|i| Sample::placeholder(most_recent - bucket_secs * i))
                    .collect();
                front.append(sis);
                *sis = front;
            }
            hs.time = most_recent;
        }

        // Tail-extend so every series reaches both the incoming window's
        // oldest bucket and the longest stored series. A freshly created
        // series back-fills with placeholders to the common length here.
        let grid_time = hs.time;
        let max_len = hs.stats.values().map(Vec::len).max().unwrap_or(0) as i64;
        let target_least = least_recent.min(grid_time - max_len * bucket_secs);
        for sis in hs.stats.values_mut() {
            let series_least = grid_time - sis.len() as i64 * bucket_secs;
            if series_least > target_least {
                let entries = (series_least - target_least) / bucket_secs;
                sis.extend((0..entries).map(|i| Sample::placeholder(series_least - bucket_secs * i)));
            }
        }

        // All series must now share one length and cover the incoming window.
        let mut common_len: usize = 0;
        for (siid, sis) in &hs.stats {
            let first_when = sis.first().map(|s| s.when).unwrap_or(0);
            if first_when != grid_time {
                return Err(GridError::InvariantViolation(format!(
                    "{hostname}: {siid} starts at {first_when}, grid time is {grid_time}"
                )));
            }
            if common_len == 0 {
                common_len = sis.len();
                let series_least = grid_time - common_len as i64 * bucket_secs;
                if series_least > least_recent {
                    return Err(GridError::InvariantViolation(format!(
                        "{hostname}: grid truncated, reaches {series_least} but needs {least_recent}"
                    )));
                }
            }
            if sis.len() != common_len {
                return Err(GridError::InvariantViolation(format!(
                    "{hostname}: {siid} has {} buckets, others have {common_len}",
                    sis.len()
                )));
            }
        }

        // Slot each real incoming bucket at its index from the front.
        for (siid, sis) in incoming {
            let Some(stored) = hs.stats.get_mut(siid) else {
                continue;
            };
            let mut new_stats: Vec<Sample> = Vec::new();
            for snew in sis {
                // Index from the grid's base time: when the incoming window
                // is older than the grid (reloading yesterday's slice after
                // today's), its buckets land deeper in the series.
                let i = (grid_time - snew.when) / bucket_secs;
                if i < 0 || i as usize >= stored.len() {
                    error!(
                        host = hostname,
                        index = i,
                        len = stored.len(),
                        "bucket index out of bounds"
                    );
                    continue;
                }
                let slot = &mut stored[i as usize];
                if slot.when != snew.when {
                    warn!(
                        host = hostname,
                        slot_when = slot.when,
                        sample_when = snew.when,
                        "bucket slot out of place"
                    );
                }
                if !snew.is_placeholder() {
                    *slot = snew.clone();
                    new_stats.push(snew.clone());
                    outcome.added += 1;
                }
            }
            if !new_stats.is_empty() {
                outcome.added_by_instance.insert(siid.clone(), new_stats);
            }
        }

        // Rolling 48-hour cap, applied uniformly at the tail.
        let cap = (ROLLING_WINDOW_SECS / bucket_secs) as usize;
        for sis in hs.stats.values_mut() {
            if sis.len() > cap {
                sis.truncate(cap);
            }
        }

        validate_host(hs).map_err(GridError::InvariantViolation)?;
        Ok(outcome)
    }

    /// Copy out the host's stats restricted to buckets with
    /// `when ∈ [begin_time, begin_time + duration)`. A zero duration returns
    /// the whole grid. The returned copy is owned; the lock is not held by
    /// the caller.
    pub fn extract(&self, hostname: &str, begin_time: i64, duration: i64) -> Option<HostStats> {
        let inner = self.inner.lock();
        if !inner
            .service_versions
            .get(hostname)
            .is_some_and(|v| !v.is_empty())
        {
            return None;
        }
        let hs = inner.hosts.get(hostname)?;
        if duration == 0 {
            return Some(hs.clone());
        }

        let mut out = HostStats {
            name: hs.name.clone(),
            addr: hs.addr.clone(),
            bucket_mins: hs.bucket_mins,
            ..Default::default()
        };
        for (siid, sis) in &hs.stats {
            if sis.is_empty() {
                continue;
            }
            let mut kept: Vec<Sample> = Vec::new();
            // Series are ordered most- to least-recent; stop at the first
            // bucket older than the window.
            for s in sis {
                if s.when < begin_time {
                    break;
                }
                if s.when < begin_time + duration {
                    if s.when > out.time {
                        out.time = s.when;
                    }
                    kept.push(s.clone());
                }
            }
            if !kept.is_empty() {
                out.stats.insert(siid.clone(), kept);
            }
        }
        Some(out)
    }
}

/// Check the grid invariants for one host row: uniform series length, shared
/// base time, exact bucket spacing, rolling-window cap.
fn validate_host(hs: &HostStats) -> Result<(), String> {
    let bucket_secs = hs.bucket_secs();
    if bucket_secs == 0 {
        return Err(format!("{}: zero bucket width", hs.name));
    }
    let cap = (ROLLING_WINDOW_SECS / bucket_secs) as usize;
    let mut common_len: Option<usize> = None;
    for (siid, sis) in &hs.stats {
        match common_len {
            None => common_len = Some(sis.len()),
            Some(l) if l != sis.len() => {
                return Err(format!(
                    "{}: {siid} has {} buckets, others have {l}",
                    hs.name,
                    sis.len()
                ));
            }
            _ => {}
        }
        if sis.len() > cap {
            return Err(format!(
                "{}: {siid} has {} buckets, cap is {cap}",
                hs.name,
                sis.len()
            ));
        }
        if let Some(first) = sis.first() {
            if first.when != hs.time {
                return Err(format!(
                    "{}: {siid} starts at {}, host time is {}",
                    hs.name, first.when, hs.time
                ));
            }
        }
        for (i, pair) in sis.windows(2).enumerate() {
            if pair[0].when - pair[1].when != bucket_secs {
                return Err(format!(
                    "{}: {siid} entries {i},{} are {}s apart, expected {bucket_secs}s",
                    hs.name,
                    i + 1,
                    pair[0].when - pair[1].when
                ));
            }
        }
    }
    Ok(())
}

/// Rebuild any series whose length or bucket times disagree with the rest of
/// the map, placing each sample at its slot on the normalized time base.
/// Used when merging persisted slices back in, where partial writes may have
/// left a file internally inconsistent. Returns (total, blank) entry counts.
pub fn normalize_series(
    s: &mut BTreeMap<String, Vec<Sample>>,
    normalized_time: i64,
    bucket_secs: i64,
) -> (usize, usize) {
    if bucket_secs == 0 {
        return (0, 0);
    }

    let mut normalized_len = 0usize;
    let mut max_time = 0i64;
    for sis in s.values() {
        if let Some(first) = sis.first() {
            if first.when > max_time {
                max_time = first.when;
            }
        }
        normalized_len = normalized_len.max(sis.len());
    }
    let normalized_time = if normalized_time == 0 {
        max_time
    } else {
        normalized_time
    };

    let mut total = 0usize;
    let mut blank = 0usize;
    for (siid, sis) in s.iter_mut() {
        let mut bad = sis.len() != normalized_len;
        for (i, stat) in sis.iter().enumerate() {
            if stat.when != normalized_time - (i as i64) * bucket_secs {
                bad = true;
            }
            if stat.is_placeholder() {
                blank += 1;
            }
            total += 1;
        }
        if !bad {
            continue;
        }

        warn!(siid = %siid, len = sis.len(), normalized_len, "rebuilding misaligned series");
        let mut rebuilt: Vec<Sample> = (0..normalized_len)
            .map(|i| Sample::placeholder(normalized_time - bucket_secs * i as i64))
            .collect();
        for stat in sis.iter() {
            let i = (normalized_time - stat.when) / bucket_secs;
            if i < 0 || i as usize >= normalized_len {
                warn!(siid = %siid, when = stat.when, "cannot place sample during rebuild");
                continue;
            }
            rebuilt[i as usize] = stat.clone();
        }
        *sis = rebuilt;
    }
    (total, blank)
}
