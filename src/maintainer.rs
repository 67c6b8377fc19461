// Periodic maintenance driver: scrape each enabled host, merge the deltas
// into the grid, persist, and fan newly added buckets out to the metrics
// backend. One cycle runs at a time; an edge-triggered signal can cut the
// wait short.

use crate::config::MonitoredHost;
use crate::datadog::MetricsClient;
use crate::grid::{GridError, StatsGrid};
use crate::notify::Notifier;
use crate::persist::{today_start, Persistor};
use crate::scraper::Scraper;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{info, warn};

/// Fan-out is suppressed this long after startup so history merged from
/// persisted slices is not re-submitted as fresh points.
const STARTUP_FANOUT_DELAY_SECS: i64 = 60;

pub struct Maintainer {
    grid: Arc<StatsGrid>,
    scraper: Arc<Scraper>,
    persistor: Arc<Persistor>,
    metrics: Option<Arc<MetricsClient>>,
    notifier: Arc<Notifier>,
    hosts: Vec<MonitoredHost>,
    period: Duration,
    maintain_now: Notify,
    update_lock: tokio::sync::Mutex<()>,
    started_at: i64,
}

impl Maintainer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        grid: Arc<StatsGrid>,
        scraper: Arc<Scraper>,
        persistor: Arc<Persistor>,
        metrics: Option<Arc<MetricsClient>>,
        notifier: Arc<Notifier>,
        hosts: Vec<MonitoredHost>,
        monitor_period_mins: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            grid,
            scraper,
            persistor,
            metrics,
            notifier,
            hosts,
            period: Duration::from_secs(monitor_period_mins * 60),
            maintain_now: Notify::new(),
            update_lock: tokio::sync::Mutex::new(()),
            started_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Request an immediate maintenance cycle. Multiple requests during one
    /// wait coalesce into a single wake.
    pub fn request_maintenance_now(&self) {
        self.maintain_now.notify_one();
    }

    pub fn spawn(self: &Arc<Self>, shutdown_rx: oneshot::Receiver<()>) -> tokio::task::JoinHandle<()> {
        let maintainer = self.clone();
        tokio::spawn(async move {
            maintainer.run(shutdown_rx).await;
        })
    }

    async fn run(&self, mut shutdown_rx: oneshot::Receiver<()>) {
        // Pre-trigger one cycle so startup does not wait a full period.
        self.maintain_now.notify_one();
        loop {
            let last_updated_day = today_start();
            tokio::select! {
                _ = self.maintain_now.notified() => {}
                _ = tokio::time::sleep(self.period) => {}
                _ = &mut shutdown_rx => break,
            }
            let day_rolled_over = last_updated_day != today_start();
            for host in self.hosts.iter().filter(|h| !h.disabled) {
                if let Err(e) = self.update_host(&host.name, &host.addr, day_rolled_over).await {
                    warn!(host = %host.name, error = %e, "error updating stats");
                }
            }
        }
    }

    /// One scrape-merge-persist cycle for one host.
    pub async fn update_host(
        &self,
        hostname: &str,
        hostaddr: &str,
        reload_on_day_boundary: bool,
    ) -> anyhow::Result<()> {
        let _cycle = self.update_lock.lock().await;

        let result = self.scraper.scrape_host(hostname, hostaddr).await?;
        let mut version_changed = result.service_version_changed;
        let service_version = result.summary.service_version.clone();
        let bucket_secs = result.summary.bucket_secs;
        if bucket_secs == 0 {
            anyhow::bail!("{hostname}: no bucket width reported");
        }

        // First contact for this host since startup: pull its persisted
        // slices in before merging anything fresh.
        if !self.grid.loaded(hostname) {
            self.persistor
                .reload_host(&self.grid, hostname, hostaddr, &service_version, bucket_secs)
                .await?;
            version_changed = false;
        }

        // A version change invalidates every node id, and a UTC day
        // rollover changes the file key: persist what we hold under the old
        // identity, then reopen under the new one.
        if reload_on_day_boundary || version_changed {
            info!(
                host = hostname,
                version_changed, "persisting and reloading stats"
            );
            let save_version = self
                .grid
                .service_version(hostname)
                .unwrap_or_else(|| service_version.clone());
            if let Err(e) = self.persistor.save_host(&self.grid, hostname, &save_version).await {
                warn!(host = hostname, error = %e, "error saving stats");
            }
            if let Err(e) = self
                .persistor
                .reload_host(&self.grid, hostname, hostaddr, &service_version, bucket_secs)
                .await
            {
                warn!(host = hostname, error = %e, "error reloading stats");
            }
        }

        self.grid
            .verify(hostname, hostaddr, &service_version, bucket_secs);
        let outcome = match self.grid.add(hostname, hostaddr, &result.stats) {
            Ok(outcome) => outcome,
            Err(e @ GridError::InvariantViolation(_)) => {
                // Left as-is for forensics; the next poll may heal it.
                self.notifier.send(&format!("{hostname}: {e}")).await;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        if outcome.added > 0 {
            info!(host = hostname, added = outcome.added, "added new stats");
        }

        if let Err(e) = self
            .persistor
            .save_host(&self.grid, hostname, &service_version)
            .await
        {
            warn!(host = hostname, error = %e, "error saving stats");
        }

        let warmed_up = chrono::Utc::now().timestamp() > self.started_at + STARTUP_FANOUT_DELAY_SECS;
        if !outcome.added_by_instance.is_empty() && warmed_up {
            if let Some(metrics) = &self.metrics {
                if let Err(e) = metrics
                    .upload_stats(hostname, bucket_secs, &outcome.added_by_instance)
                    .await
                {
                    warn!(host = hostname, error = %e, "metrics fan-out failed");
                }
            }
        }
        Ok(())
    }
}
