use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub hosts: Vec<MonitoredHost>,
    pub data: DataConfig,
    #[serde(default)]
    pub aws: Option<AwsConfig>,
    #[serde(default)]
    pub datadog: Option<DatadogConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoredHost {
    pub name: String,
    pub addr: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Upper bound on the wait between maintenance cycles. Services only
    /// retain about an hour of buckets, so this must stay well under that.
    pub monitor_period_mins: u64,
    #[serde(default)]
    pub canary_disabled: bool,
    #[serde(default = "default_pending_events_warning")]
    pub pending_events_warning: i64,
}

fn default_pending_events_warning() -> i64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub directory: String,
    /// Public base URL of this service, used to form sheet download links.
    pub host_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatadogConfig {
    pub site: String,
    pub api_key: String,
    pub app_key: String,
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
}

fn default_metric_prefix() -> String {
    "notehub".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.monitoring.monitor_period_mins > 0,
            "monitoring.monitor_period_mins must be > 0, got {}",
            self.monitoring.monitor_period_mins
        );
        anyhow::ensure!(
            self.monitoring.pending_events_warning > 0,
            "monitoring.pending_events_warning must be > 0, got {}",
            self.monitoring.pending_events_warning
        );
        anyhow::ensure!(
            !self.data.directory.is_empty(),
            "data.directory must be non-empty"
        );
        for host in &self.hosts {
            anyhow::ensure!(!host.name.is_empty(), "hosts entries need a name");
            anyhow::ensure!(
                !host.addr.is_empty(),
                "host {} needs an addr",
                host.name
            );
        }
        if let Some(aws) = &self.aws {
            anyhow::ensure!(!aws.bucket.is_empty(), "aws.bucket must be non-empty");
            anyhow::ensure!(!aws.region.is_empty(), "aws.region must be non-empty");
        }
        if let Some(dd) = &self.datadog {
            anyhow::ensure!(!dd.site.is_empty(), "datadog.site must be non-empty");
            anyhow::ensure!(!dd.api_key.is_empty(), "datadog.api_key must be non-empty");
        }
        Ok(())
    }
}
