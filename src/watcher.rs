// Operator command dispatch for the slash-command surface: request a
// maintenance cycle, proxy textual snapshots from a host, render the
// workbook, or show live per-instance queue activity.

use crate::config::AppConfig;
use crate::maintainer::Maintainer;
use crate::scraper::Scraper;
use crate::sheet;
use std::path::PathBuf;
use std::sync::Arc;

const USAGE: &str = "/watcher <host> stats\n\
    /watcher <host> show [goroutines|heap|handlers|lb]\n\
    /watcher <host> activity\n\
    <host> is prod, staging, or your dev hostname\n";

// Fleet domains behind the short aliases.
const PROD_DOMAIN: &str = "notefile.net";
const STAGING_DOMAIN: &str = "staging.blues.tools";
const DEV_DOMAIN_SUFFIX: &str = ".blues.tools";

/// Resolve an operator-typed host to its diagnostic API target: fixed
/// domains for production and staging, the dev suffix for bare names, and
/// always the `api.` subdomain.
pub fn resolve_target(name: &str) -> String {
    let target = match name {
        "p" | "prod" | "production" => PROD_DOMAIN.to_string(),
        "s" | "staging" => STAGING_DOMAIN.to_string(),
        other if !other.contains('.') => format!("{other}{DEV_DOMAIN_SUFFIX}"),
        other => other.to_string(),
    };
    if target.starts_with("api.") {
        target
    } else {
        format!("api.{target}")
    }
}

/// Short host label for workbook filenames and replies.
pub fn host_label(target: &str) -> String {
    let label = target.strip_suffix(DEV_DOMAIN_SUFFIX).unwrap_or(target);
    let label = label.strip_prefix("api.").unwrap_or(label);
    if label == PROD_DOMAIN {
        "prod".to_string()
    } else {
        label.to_string()
    }
}

pub struct Watcher {
    scraper: Arc<Scraper>,
    maintainer: Arc<Maintainer>,
    config: AppConfig,
    data_dir: PathBuf,
}

impl Watcher {
    pub fn new(
        scraper: Arc<Scraper>,
        maintainer: Arc<Maintainer>,
        config: AppConfig,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            scraper,
            maintainer,
            config,
            data_dir,
        }
    }

    /// Dispatch one slash-command invocation, returning the reply text.
    pub async fn command(&self, text: &str) -> String {
        let args: Vec<&str> = text.split_whitespace().collect();
        if args.len() < 2 {
            return USAGE.to_string();
        }
        let addr = resolve_target(args[0]);
        let label = host_label(&addr);

        match args[1] {
            "stats" => {
                self.maintainer.request_maintenance_now();
                "maintenance cycle requested".to_string()
            }
            "show" => match args.get(2).copied() {
                None => self.workbook(&label, &addr).await,
                Some(what) => self.show(&addr, what).await,
            },
            "activity" => self.activity(&addr).await,
            other => format!("request '{other}' not recognized\n{USAGE}"),
        }
    }

    async fn workbook(&self, label: &str, addr: &str) -> String {
        match sheet::host_workbook(
            &self.scraper,
            &self.data_dir,
            &self.config.data.host_url,
            label,
            addr,
        )
        .await
        {
            Ok(link) => link,
            Err(e) => format!("{e}"),
        }
    }

    async fn show(&self, addr: &str, what: &str) -> String {
        let nodes = match self.scraper.discover(addr).await {
            Ok((_version, nodes)) => nodes,
            Err(e) => return format!("{e}"),
        };

        let mut response = String::new();
        for node in nodes {
            response.push('\n');
            response.push_str(&format!(
                "*NODE {} ({})*\n",
                node.node_id, node.primary_service
            ));
            match self.scraper.instance_show(addr, &node.siid(), what).await {
                Err(e) => response.push_str(&format!("  {e}\n")),
                Ok(status) => match what {
                    "goroutines" => response.push_str(&status.goroutine_status),
                    "heap" => response.push_str(&status.heap_status),
                    "handlers" => match status.handlers {
                        None => response.push_str("no handler information available\n"),
                        Some(handlers) => response.push_str(
                            &serde_json::to_string_pretty(&handlers).unwrap_or_default(),
                        ),
                    },
                    "lb" => match status.lb_status {
                        None => response.push_str("no load balancer information available\n"),
                        Some(lb) => response
                            .push_str(&serde_json::to_string_pretty(&lb).unwrap_or_default()),
                    },
                    _ => return format!("unknown 'show' type: {what}"),
                },
            }
        }
        response
    }

    /// Live per-instance pending-events view from the most recent snapshot.
    async fn activity(&self, addr: &str) -> String {
        let nodes = match self.scraper.discover(addr).await {
            Ok((_version, nodes)) => nodes,
            Err(e) => return format!("{e}"),
        };

        let mut response = String::new();
        for node in nodes {
            let siid = node.siid();
            match self.scraper.instance_status(addr, &siid).await {
                Err(e) => response.push_str(&format!("{siid}: {e}\n")),
                Ok(status) => {
                    let Some(current) = status.lb_status.as_ref().and_then(|lb| lb.first())
                    else {
                        response.push_str(&format!("{siid}: no activity reported\n"));
                        continue;
                    };
                    response.push_str(&format!(
                        "{siid}: {} pending (enqueued {}, dequeued {}, routed {})\n",
                        current.events_enqueued - current.events_dequeued,
                        current.events_enqueued,
                        current.events_dequeued,
                        current.events_routed
                    ));
                }
            }
        }
        response
    }
}
