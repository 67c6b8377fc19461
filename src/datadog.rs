// Metrics backend fan-out: newly merged buckets are aggregated across
// service instances and submitted as named gauge series of
// (epoch seconds, value) points.

use crate::config::DatadogConfig;
use crate::grid::aggregate::aggregate_oldest_first;
use crate::models::{AggregatedStat, Sample};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct Series {
    metric: String,
    #[serde(rename = "type")]
    series_type: &'static str,
    points: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
struct MetricsPayload {
    series: Vec<Series>,
}

pub struct MetricsClient {
    client: reqwest::Client,
    site: String,
    api_key: String,
    app_key: String,
    prefix: String,
}

impl MetricsClient {
    pub fn new(cfg: &DatadogConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            site: cfg.site.clone(),
            api_key: cfg.api_key.clone(),
            app_key: cfg.app_key.clone(),
            prefix: cfg.metric_prefix.clone(),
        })
    }

    /// Submit the host-level series derived from one poll's newly added
    /// buckets. Points are ordered oldest first.
    pub async fn upload_stats(
        &self,
        hostname: &str,
        bucket_secs: i64,
        added_stats: &BTreeMap<String, Vec<Sample>>,
    ) -> anyhow::Result<()> {
        let aggregated = aggregate_oldest_first(added_stats, bucket_secs);
        if aggregated.is_empty() {
            return Ok(());
        }

        let series = build_series(&self.prefix, hostname, &aggregated);
        let url = format!("https://api.{}/api/v1/series", self.site);
        let rsp = self
            .client
            .post(&url)
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
            .json(&MetricsPayload { series })
            .send()
            .await?;
        if !rsp.status().is_success() {
            anyhow::bail!("metrics submit returned {}", rsp.status());
        }
        Ok(())
    }
}

fn build_series(prefix: &str, hostname: &str, stats: &[AggregatedStat]) -> Vec<Series> {
    let gauge = |metric: &str, value: fn(&AggregatedStat) -> f64| Series {
        metric: format!("{prefix}.{hostname}.{metric}"),
        series_type: "gauge",
        points: stats
            .iter()
            .map(|s| [s.time as f64, value(s)])
            .collect(),
    };

    vec![
        gauge("disk.reads", |s| s.disk_reads as f64),
        gauge("disk.writes", |s| s.disk_writes as f64),
        gauge("net.received", |s| s.net_received as f64),
        gauge("net.sent", |s| s.net_sent as f64),
        gauge("handlers", |s| {
            (s.handlers_discovery + s.handlers_continuous) as f64
        }),
        gauge("events.received", |s| s.events_received as f64),
        gauge("events.routed", |s| s.events_routed as f64),
        gauge("database.reads", |s| s.database_reads as f64),
        gauge("database.writes", |s| s.database_writes as f64),
        gauge("api.calls", |s| s.api_total as f64),
    ]
}
