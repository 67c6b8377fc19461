// Polls each host's diagnostic endpoint: discovers service instances,
// pulls per-instance bucket history, converts it to deltas, and watches for
// service-version and topology churn.

use crate::grid::delta::absolute_to_relative;
use crate::models::{HandlerNode, PingEnvelope, PingStatus, Sample, ServiceSummary};
use crate::notify::Notifier;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const INSTANCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything one poll of one host produced.
#[derive(Debug, Default)]
pub struct ScrapeResult {
    pub service_version_changed: bool,
    pub summary: ServiceSummary,
    pub handlers: BTreeMap<String, HandlerNode>,
    /// Delta-converted bucket series per service instance, ready for the grid.
    pub stats: BTreeMap<String, Vec<Sample>>,
}

#[derive(Default, Clone)]
struct HostCache {
    service_version: String,
    handler_set: BTreeSet<String>,
}

pub struct Scraper {
    client: reqwest::Client,
    state: Mutex<HashMap<String, HostCache>>,
    notifier: Arc<Notifier>,
    pending_events_warning: i64,
}

impl Scraper {
    pub fn new(notifier: Arc<Notifier>, pending_events_warning: i64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            state: Mutex::new(HashMap::new()),
            notifier,
            pending_events_warning,
        })
    }

    /// Discover the host's service instances and service version.
    pub async fn discover(&self, addr: &str) -> anyhow::Result<(String, Vec<HandlerNode>)> {
        let url = format!("{}/ping?show=\"handlers\"", base_url(addr));
        let status = self.ping(&url, DISCOVERY_TIMEOUT).await?;
        let handlers = status
            .handlers
            .ok_or_else(|| anyhow::anyhow!("no handlers reported by {addr}"))?;
        Ok((format_service_version(&status.service_version), handlers))
    }

    /// Fetch one instance's bucket history (`status_lb`).
    pub async fn instance_status(&self, addr: &str, siid: &str) -> anyhow::Result<PingStatus> {
        self.instance_show(addr, siid, "lb").await
    }

    /// Ask one instance for a particular diagnostic view.
    pub async fn instance_show(
        &self,
        addr: &str,
        siid: &str,
        what: &str,
    ) -> anyhow::Result<PingStatus> {
        let url = format!("{}/ping?node=\"{siid}\"&show=\"{what}\"", base_url(addr));
        self.ping(&url, INSTANCE_TIMEOUT).await
    }

    /// Plain liveness ping, returning the reported process start time.
    pub async fn ping_started(&self, addr: &str) -> anyhow::Result<i64> {
        let url = format!("{}/ping", base_url(addr));
        let status = self.ping(&url, DISCOVERY_TIMEOUT).await?;
        Ok(status.started)
    }

    /// Poll the host: discovery, per-instance history, delta conversion,
    /// live-handler summary, and churn detection against the cached
    /// version/topology.
    pub async fn scrape_host(&self, hostname: &str, addr: &str) -> anyhow::Result<ScrapeResult> {
        let (service_version, nodes) = self.discover(addr).await?;

        let mut result = ScrapeResult::default();
        for node in nodes {
            result.handlers.insert(node.siid(), node);
        }
        let siids: BTreeSet<String> = result.handlers.keys().cloned().collect();

        // Compare against the last poll's version and topology.
        let mut notices: Vec<String> = Vec::new();
        {
            let mut state = self.state.lock();
            let cache = state.entry(hostname.to_string()).or_default();
            if !cache.service_version.is_empty() && cache.service_version != service_version {
                result.service_version_changed = true;
                notices.push(format!(
                    "{hostname}: service version changed from {} to {service_version}",
                    cache.service_version
                ));
            }
            if !cache.handler_set.is_empty() && cache.handler_set != siids {
                let added: Vec<&str> = siids
                    .difference(&cache.handler_set)
                    .map(String::as_str)
                    .collect();
                let dropped: Vec<&str> = cache
                    .handler_set
                    .difference(&siids)
                    .map(String::as_str)
                    .collect();
                if !added.is_empty() {
                    notices.push(format!("{hostname}: handlers added: {}", added.join(", ")));
                }
                if !dropped.is_empty() {
                    notices.push(format!("{hostname}: handlers dropped: {}", dropped.join(", ")));
                }
            }
            cache.service_version = service_version.clone();
            cache.handler_set = siids.clone();
        }

        result.summary.service_version = service_version.clone();
        for siid in &siids {
            let status = match self.instance_status(addr, siid).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(host = hostname, siid = %siid, error = %e, "instance poll failed");
                    continue;
                }
            };

            // A node reporting a different version than the host is mid-
            // deploy; skip it this cycle rather than mixing generations.
            if !status.service_version.is_empty()
                && format_service_version(&status.service_version) != service_version
            {
                warn!(
                    host = hostname,
                    siid = %siid,
                    instance_version = %status.service_version,
                    host_version = %service_version,
                    "instance service version mismatch, skipping"
                );
                continue;
            }

            let lb = status.lb_status.unwrap_or_default();
            let Some(current) = lb.first() else {
                info!(host = hostname, siid = %siid, "no lb status reported");
                continue;
            };

            if result.summary.bucket_secs == 0 {
                result.summary.bucket_secs = current.bucket_mins * 60;
            }
            result.summary.handlers_continuous +=
                current.continuous_handlers_activated - current.continuous_handlers_deactivated;
            result.summary.handlers_notification +=
                current.notification_handlers_activated - current.notification_handlers_deactivated;
            result.summary.handlers_ephemeral +=
                current.ephemeral_handlers_activated - current.ephemeral_handlers_deactivated;
            result.summary.handlers_discovery +=
                current.discovery_handlers_activated - current.discovery_handlers_deactivated;

            let pending = current.events_enqueued - current.events_dequeued;
            result.summary.events_pending += pending;
            if pending > self.pending_events_warning {
                notices.push(pending_notice(hostname, siid, pending, &lb));
            }

            // One current plus at least two closed buckets are needed to
            // form a single delta.
            if lb.len() >= 3 {
                result.stats.insert(siid.clone(), absolute_to_relative(&lb[1..]));
            } else {
                info!(
                    host = hostname,
                    siid = %siid,
                    buckets = lb.len(),
                    "not enough history to form deltas"
                );
            }
        }

        for notice in notices {
            self.notifier.send(&notice).await;
        }
        Ok(result)
    }

    async fn ping(&self, url: &str, timeout: Duration) -> anyhow::Result<PingStatus> {
        let rsp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let body = rsp.bytes().await.map_err(|e| anyhow::anyhow!("{e}"))?;
        let envelope: PingEnvelope = serde_json::from_slice(&body).map_err(|e| {
            if e.to_string().contains("EOF while parsing") {
                anyhow::anyhow!("server not responding")
            } else {
                anyhow::anyhow!("{e}")
            }
        })?;
        Ok(envelope.body)
    }
}

fn pending_notice(hostname: &str, siid: &str, pending: i64, lb: &[Sample]) -> String {
    let mut msg = format!("{hostname}: {siid} has {pending} events pending");
    if lb.len() >= 2 {
        let dequeued = lb[0].events_dequeued - lb[1].events_dequeued;
        let mins = lb[0].bucket_mins.max(1);
        msg.push_str(&format!(
            " (dequeuing {} events/min)",
            dequeued / mins
        ));
    }
    msg
}

/// Hosts are configured by bare name; the diagnostic endpoint is HTTPS
/// unless the address already carries a scheme (tests, local dev).
pub fn base_url(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.trim_end_matches('/').to_string()
    } else {
        format!("https://{addr}")
    }
}

/// Legacy services report their version as a bare Unix epoch; render it the
/// way release builds are tagged.
pub fn format_service_version(version: &str) -> String {
    if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(epoch) = version.parse::<i64>() {
            if let Some(t) = chrono::DateTime::from_timestamp(epoch, 0) {
                return t.format("%Y%m%d-%H%M%S").to_string();
            }
        }
    }
    version.to_string()
}
