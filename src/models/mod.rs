// Domain models: diagnostic-endpoint wire shapes, the bucketed stats store,
// and the inbound canary event. JSON field names are pinned to the notehub
// ping contract; BTreeMap keeps serialized map keys deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

/// Envelope wrapping every /ping response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingEnvelope {
    #[serde(default)]
    pub body: PingStatus,
}

/// Body of a /ping response. Which fields are populated depends on the
/// `show` query: "handlers" fills `handlers`, "lb" fills `status_lb`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PingStatus {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_version: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub started: i64,
    #[serde(rename = "status_goroutine", skip_serializing_if = "String::is_empty")]
    pub goroutine_status: String,
    #[serde(rename = "status_heap", skip_serializing_if = "String::is_empty")]
    pub heap_status: String,
    #[serde(rename = "status_lb", skip_serializing_if = "Option::is_none")]
    pub lb_status: Option<Vec<Sample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handlers: Option<Vec<HandlerNode>>,
}

/// One service instance as reported by /ping?show="handlers".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerNode {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub node_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datacenter: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ipv4: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub tcp_port: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub tcps_port: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub http_port: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub https_port: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub public_ipv4: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub public_path: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub load_level: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub primary_service: String,
}

impl HandlerNode {
    /// Service instance id: node id qualified by its primary service.
    /// Node ids are minted per service version, so these never survive
    /// a version change.
    pub fn siid(&self) -> String {
        format!("{}:{}", self.node_id, self.primary_service)
    }
}

/// Per-device-handler event queue counters within one Sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerActivity {
    #[serde(rename = "device", skip_serializing_if = "String::is_empty")]
    pub device_uid: String,
    #[serde(rename = "app", skip_serializing_if = "String::is_empty")]
    pub app_uid: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub discovery: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub continuous: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub notification: bool,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub events_enqueued: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub events_dequeued: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub events_routed: i64,
}

/// Per-database counters within one Sample. Cumulative in a live snapshot,
/// per-bucket (with ms fields as per-op averages) after delta conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSample {
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub reads: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub read_ms: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub read_ms_max: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub writes: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub write_ms: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub write_ms_max: i64,
}

/// Per-cache counters within one Sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSample {
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub invalidations: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub entries: i64,
    #[serde(rename = "hwm", skip_serializing_if = "is_zero_i64")]
    pub entries_hwm: i64,
}

/// One statistics bucket for one service instance. The diagnostic endpoint
/// reports these with counters cumulative since process start; the grid
/// stores them delta-converted. A placeholder bucket carries only `when`
/// (sentinel: `os_mem_total == 0`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sample {
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub started: i64,
    #[serde(rename = "minutes", skip_serializing_if = "is_zero_i64")]
    pub bucket_mins: i64,
    #[serde(rename = "when", skip_serializing_if = "is_zero_i64")]
    pub when: i64,
    #[serde(rename = "mem_total", skip_serializing_if = "is_zero_u64")]
    pub os_mem_total: u64,
    #[serde(rename = "mem_free", skip_serializing_if = "is_zero_u64")]
    pub os_mem_free: u64,
    #[serde(rename = "disk_read", skip_serializing_if = "is_zero_u64")]
    pub os_disk_read: u64,
    #[serde(rename = "disk_write", skip_serializing_if = "is_zero_u64")]
    pub os_disk_write: u64,
    #[serde(rename = "net_received", skip_serializing_if = "is_zero_u64")]
    pub os_net_received: u64,
    #[serde(rename = "net_sent", skip_serializing_if = "is_zero_u64")]
    pub os_net_sent: u64,
    #[serde(
        rename = "handlers_discovery_activated",
        skip_serializing_if = "is_zero_i64"
    )]
    pub discovery_handlers_activated: i64,
    #[serde(
        rename = "handlers_ephemeral_activated",
        skip_serializing_if = "is_zero_i64"
    )]
    pub ephemeral_handlers_activated: i64,
    #[serde(
        rename = "handlers_continuous_activated",
        skip_serializing_if = "is_zero_i64"
    )]
    pub continuous_handlers_activated: i64,
    #[serde(
        rename = "handlers_notification_activated",
        skip_serializing_if = "is_zero_i64"
    )]
    pub notification_handlers_activated: i64,
    #[serde(
        rename = "handlers_discovery_deactivated",
        skip_serializing_if = "is_zero_i64"
    )]
    pub discovery_handlers_deactivated: i64,
    #[serde(
        rename = "handlers_ephemeral_deactivated",
        skip_serializing_if = "is_zero_i64"
    )]
    pub ephemeral_handlers_deactivated: i64,
    #[serde(
        rename = "handlers_continuous_deactivated",
        skip_serializing_if = "is_zero_i64"
    )]
    pub continuous_handlers_deactivated: i64,
    #[serde(
        rename = "handlers_notification_deactivated",
        skip_serializing_if = "is_zero_i64"
    )]
    pub notification_handlers_deactivated: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub events_enqueued: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub events_dequeued: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub events_routed: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub handlers: BTreeMap<String, HandlerActivity>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub databases: BTreeMap<String, DatabaseSample>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub caches: BTreeMap<String, CacheSample>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub api: BTreeMap<String, i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fatals: BTreeMap<String, i64>,
}

impl Sample {
    /// Placeholder buckets occupy grid slots with no real measurement.
    pub fn is_placeholder(&self) -> bool {
        self.os_mem_total == 0
    }

    /// A bare placeholder at the given grid time.
    pub fn placeholder(when: i64) -> Self {
        Sample {
            when,
            ..Default::default()
        }
    }
}

/// Rolling stats for one monitored host: a length-aligned grid of per-instance
/// bucket series. `time` is the `when` of index 0 of every non-empty series.
/// The same shape is persisted as the one-day file slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostStats {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "address", skip_serializing_if = "String::is_empty")]
    pub addr: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub time: i64,
    #[serde(rename = "minutes", skip_serializing_if = "is_zero_i64")]
    pub bucket_mins: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, Vec<Sample>>,
}

impl HostStats {
    pub fn bucket_secs(&self) -> i64 {
        self.bucket_mins * 60
    }
}

/// One bucket of stats summed across all service instances of a host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatedStat {
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub started: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub time: i64,
    #[serde(rename = "disk_read", skip_serializing_if = "is_zero_u64")]
    pub disk_reads: u64,
    #[serde(rename = "disk_write", skip_serializing_if = "is_zero_u64")]
    pub disk_writes: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub net_received: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub net_sent: u64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub handlers_ephemeral: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub handlers_discovery: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub handlers_continuous: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub handlers_notification: i64,
    #[serde(rename = "handlers_ephemeral_new", skip_serializing_if = "is_zero_i64")]
    pub new_handlers_ephemeral: i64,
    #[serde(rename = "handlers_discovery_new", skip_serializing_if = "is_zero_i64")]
    pub new_handlers_discovery: i64,
    #[serde(rename = "handlers_continuous_new", skip_serializing_if = "is_zero_i64")]
    pub new_handlers_continuous: i64,
    #[serde(
        rename = "handlers_notification_new",
        skip_serializing_if = "is_zero_i64"
    )]
    pub new_handlers_notification: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub events_received: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub events_routed: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub database_reads: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub database_writes: i64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub api_total: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub databases: BTreeMap<String, DatabaseSample>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub caches: BTreeMap<String, CacheSample>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub api: BTreeMap<String, i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fatals: BTreeMap<String, i64>,
}

/// Live handler population for one host, derived from the most recent
/// snapshot of every service instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceSummary {
    pub service_version: String,
    pub bucket_secs: i64,
    pub handlers_continuous: i64,
    pub handlers_notification: i64,
    pub handlers_ephemeral: i64,
    pub handlers_discovery: i64,
    pub events_pending: i64,
}

/// Inbound webhook event shape for the canary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryEvent {
    #[serde(rename = "event", skip_serializing_if = "String::is_empty")]
    pub event_uid: String,
    #[serde(rename = "session", skip_serializing_if = "String::is_empty")]
    pub session_uid: String,
    #[serde(rename = "device", skip_serializing_if = "String::is_empty")]
    pub device_uid: String,
    #[serde(rename = "sn", skip_serializing_if = "String::is_empty")]
    pub device_sn: String,
    #[serde(rename = "file", skip_serializing_if = "String::is_empty")]
    pub notefile_id: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub when: i64,
    pub received: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}
