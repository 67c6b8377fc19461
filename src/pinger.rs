// Host liveness watcher: pings every enabled host once a minute and raises
// an operator alert when the reported process start time drifts, which
// means the service restarted.

use crate::config::MonitoredHost;
use crate::notify::Notifier;
use crate::scraper::Scraper;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Start-time drift beyond this means a restart rather than clock jitter.
const RESTART_DRIFT_SECS: i64 = 300;

pub fn spawn(
    hosts: Vec<MonitoredHost>,
    scraper: Arc<Scraper>,
    notifier: Arc<Notifier>,
    shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(hosts, scraper, notifier, shutdown_rx).await;
    })
}

async fn run(
    hosts: Vec<MonitoredHost>,
    scraper: Arc<Scraper>,
    notifier: Arc<Notifier>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut start_times: HashMap<String, i64> = HashMap::new();
    loop {
        for host in hosts.iter().filter(|h| !h.disabled) {
            match scraper.ping_started(&host.addr).await {
                Ok(started) => {
                    let prev = *start_times.get(&host.name).unwrap_or(&started);
                    if (prev - started).abs() > RESTART_DRIFT_SECS {
                        notifier
                            .send(&format!(
                                "@channel: {} was just restarted after having been active for {}",
                                host.name,
                                uptime_str(prev, started)
                            ))
                            .await;
                    }
                    start_times.insert(host.name.clone(), started);
                }
                Err(e) => {
                    notifier
                        .send(&format!("{}: error pinging host: {e}", host.name))
                        .await;
                }
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(60)) => {}
            _ = &mut shutdown_rx => break,
        }
    }
}

/// Render an uptime span as days, hours, minutes.
fn uptime_str(from: i64, to: i64) -> String {
    let mut secs = (to - from).abs();
    let days = secs / (24 * 60 * 60);
    secs -= days * 24 * 60 * 60;
    let hours = secs / (60 * 60);
    secs -= hours * 60 * 60;
    let mins = secs / 60;
    format!("{days}d:{hours}h:{mins}m")
}
