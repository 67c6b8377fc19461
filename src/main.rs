use anyhow::Result;
use hubwatch::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let notifier = Arc::new(notify::Notifier::new(
        app_config.slack.as_ref().map(|s| s.webhook_url.clone()),
    ));
    let uploader = app_config
        .aws
        .as_ref()
        .map(|aws| Arc::new(persist::S3Uploader::new(aws)));
    let persistor = Arc::new(persist::Persistor::new(
        &app_config.data.directory,
        uploader,
    )?);
    let metrics = match &app_config.datadog {
        Some(dd) => Some(Arc::new(datadog::MetricsClient::new(dd)?)),
        None => None,
    };

    let grid = Arc::new(grid::StatsGrid::new());
    let scraper = Arc::new(scraper::Scraper::new(
        notifier.clone(),
        app_config.monitoring.pending_events_warning,
    )?);
    let maintainer = maintainer::Maintainer::new(
        grid.clone(),
        scraper.clone(),
        persistor.clone(),
        metrics,
        notifier.clone(),
        app_config.hosts.clone(),
        app_config.monitoring.monitor_period_mins,
    );
    let (maintainer_shutdown_tx, maintainer_shutdown_rx) = tokio::sync::oneshot::channel();
    let maintainer_handle = maintainer.spawn(maintainer_shutdown_rx);

    let canary = Arc::new(canary::Canary::new(notifier.clone()));
    if !app_config.monitoring.canary_disabled {
        let sweep_canary = canary.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                sweep_canary.sweep(chrono::Utc::now().timestamp()).await;
            }
        });
    }

    let (pinger_shutdown_tx, pinger_shutdown_rx) = tokio::sync::oneshot::channel();
    let pinger_handle = pinger::spawn(
        app_config.hosts.clone(),
        scraper.clone(),
        notifier.clone(),
        pinger_shutdown_rx,
    );

    let watcher = Arc::new(watcher::Watcher::new(
        scraper.clone(),
        maintainer.clone(),
        app_config.clone(),
        persistor.data_dir().to_path_buf(),
    ));
    let app = routes::app(
        grid,
        canary,
        watcher,
        persistor.data_dir().to_path_buf(),
    );

    let bind_addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    tracing::info!(
        version = version::VERSION,
        addr = %bind_addr,
        hosts = app_config.hosts.len(),
        "starting hubwatch"
    );
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("received shutdown signal");
            let _ = maintainer_shutdown_tx.send(());
            let _ = pinger_shutdown_tx.send(());
            // Let an in-flight maintenance cycle and its uploads finish.
            let _ = maintainer_handle.await;
            let _ = pinger_handle.await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
