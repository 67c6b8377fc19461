// Cumulative-to-delta conversion. The diagnostic endpoint reports counters
// as since-process-start totals; the grid stores per-bucket activity so that
// cross-instance aggregation is plain addition.

use crate::models::Sample;

/// Convert a descending sequence of cumulative snapshots (index 0 is the
/// live sample) into per-bucket relative samples, one fewer than the input.
///
/// Counter rules, preserved for downstream parity:
///   - net counters clamp to zero on wrap or host-level reset;
///   - handler `activated` fields stay deltas while `deactivated` fields
///     become the instantaneous active population at the bucket's close;
///   - `events_dequeued` is only meaningful live and is zeroed per-bucket;
///   - database ms totals become average ms per operation;
///   - cache entries and high-water marks are instantaneous and pass through.
pub fn absolute_to_relative(stats: &[Sample]) -> Vec<Sample> {
    if stats.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<Sample> = stats.to_vec();

    // A single stat just after a server reboot: no prior bucket to subtract,
    // only the database ms totals get normalized to averages.
    if stats.len() == 1 {
        for db in out[0].databases.values_mut() {
            if db.reads > 0 {
                db.read_ms /= db.reads;
            }
            if db.writes > 0 {
                db.write_ms /= db.writes;
            }
        }
        return out;
    }

    for i in 0..stats.len() - 1 {
        let cur = &stats[i];
        let next = &stats[i + 1];
        let rel = &mut out[i];

        rel.os_disk_read = cur.os_disk_read.saturating_sub(next.os_disk_read);
        rel.os_disk_write = cur.os_disk_write.saturating_sub(next.os_disk_write);

        // A larger value in the next (older) snapshot means the counter
        // wrapped or the host reset; the bucket's delta is zero.
        rel.os_net_received = cur.os_net_received.saturating_sub(next.os_net_received);
        rel.os_net_sent = cur.os_net_sent.saturating_sub(next.os_net_sent);

        rel.discovery_handlers_activated =
            cur.discovery_handlers_activated - next.discovery_handlers_activated;
        rel.discovery_handlers_deactivated =
            cur.discovery_handlers_activated - cur.discovery_handlers_deactivated;
        rel.continuous_handlers_activated =
            cur.continuous_handlers_activated - next.continuous_handlers_activated;
        rel.continuous_handlers_deactivated =
            cur.continuous_handlers_activated - cur.continuous_handlers_deactivated;
        rel.notification_handlers_activated =
            cur.notification_handlers_activated - next.notification_handlers_activated;
        rel.notification_handlers_deactivated =
            cur.notification_handlers_activated - cur.notification_handlers_deactivated;
        rel.ephemeral_handlers_activated =
            cur.ephemeral_handlers_activated - next.ephemeral_handlers_activated;
        rel.ephemeral_handlers_deactivated =
            cur.ephemeral_handlers_activated - cur.ephemeral_handlers_deactivated;

        rel.events_enqueued = cur.events_enqueued - next.events_enqueued;
        rel.events_dequeued = 0;
        rel.events_routed = cur.events_routed - next.events_routed;

        for (key, db) in rel.databases.iter_mut() {
            if let Some(prev) = next.databases.get(key) {
                db.reads -= prev.reads;
                db.read_ms -= prev.read_ms;
                if db.reads > 0 {
                    db.read_ms /= db.reads;
                }
                db.writes -= prev.writes;
                db.write_ms -= prev.write_ms;
                if db.writes > 0 {
                    db.write_ms /= db.writes;
                }
            }
        }

        for (key, cache) in rel.caches.iter_mut() {
            if let Some(prev) = next.caches.get(key) {
                cache.invalidations -= prev.invalidations;
            }
        }

        for (key, calls) in rel.api.iter_mut() {
            if let Some(prev) = next.api.get(key) {
                *calls -= prev;
            }
        }

        for (key, fatals) in rel.fatals.iter_mut() {
            if let Some(prev) = next.fatals.get(key) {
                *fatals -= prev;
            }
        }

        // Snap the bucket onto the grid.
        let bucket_secs = cur.bucket_mins * 60;
        if bucket_secs > 0 {
            rel.when = (cur.when / bucket_secs) * bucket_secs;
        }
    }

    out.truncate(stats.len() - 1);
    out
}
