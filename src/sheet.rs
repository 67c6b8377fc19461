// On-demand workbook rendering: one worksheet per service instance with the
// node's identity, live handler counts, and per-bucket history sections.

use crate::grid::delta::absolute_to_relative;
use crate::models::Sample;
use crate::scraper::Scraper;
use rust_xlsxwriter::{Workbook, Worksheet};
use std::collections::HashMap;
use std::path::Path;

pub const SHEET_ROUTE: &str = "/sheet/";

const MIB: f64 = 1024.0 * 1024.0;

// Primary-service names as registered with service discovery.
const SERVICE_DISCOVERY: &str = "notediscovery";
const SERVICE_NOTEBOARD: &str = "noteboard-http";
const SERVICE_HANDLER_TCP: &str = "notehandler-tcp";

/// Render a workbook for the host and save it under the data directory.
/// Returns a markdown link for the operator channel.
pub async fn host_workbook(
    scraper: &Scraper,
    data_dir: &Path,
    host_url: &str,
    host_label: &str,
    addr: &str,
) -> anyhow::Result<String> {
    let (_service_version, nodes) = scraper.discover(addr).await?;

    let mut workbook = Workbook::new();
    let mut sheet_nums: HashMap<String, u32> = HashMap::new();
    for node in &nodes {
        let label = match node.primary_service.as_str() {
            SERVICE_DISCOVERY => "Discovery",
            SERVICE_NOTEBOARD => "Noteboard",
            SERVICE_HANDLER_TCP => "Handler",
            other => other,
        };
        let n = sheet_nums.entry(label.to_string()).or_insert(0);
        *n += 1;
        let sheet_name = format!("{label} #{n}");

        let status = scraper.instance_status(addr, &node.siid()).await?;
        let lb = status.lb_status.unwrap_or_default();
        if lb.is_empty() {
            anyhow::bail!("no data available from handler {}", node.node_id);
        }

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet_name)?;
        add_node_sheet(worksheet, &node.node_id, &lb)?;
    }

    let filename = format!(
        "{host_label}-{}.xlsx",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    );
    workbook.save(data_dir.join(&filename))?;

    Ok(format!("[{filename}]({host_url}{SHEET_ROUTE}{filename})"))
}

fn add_node_sheet(ws: &mut Worksheet, node_id: &str, lb: &[Sample]) -> anyhow::Result<()> {
    ws.write(1, 1, "Node")?;
    ws.write(1, 2, node_id)?;

    let mut uptime_secs = chrono::Utc::now().timestamp() - lb[0].started;
    let uptime_days = uptime_secs / (24 * 60 * 60);
    uptime_secs -= uptime_days * 24 * 60 * 60;
    let uptime_hours = uptime_secs / (60 * 60);
    uptime_secs -= uptime_hours * 60 * 60;
    let uptime_mins = uptime_secs / 60;
    ws.write(2, 1, "Uptime")?;
    ws.write(2, 2, format!("{uptime_days}d:{uptime_hours}h:{uptime_mins}m"))?;

    let continuous =
        lb[0].continuous_handlers_activated - lb[0].continuous_handlers_deactivated;
    let notification =
        lb[0].notification_handlers_activated - lb[0].notification_handlers_deactivated;
    let ephemeral = lb[0].ephemeral_handlers_activated - lb[0].ephemeral_handlers_deactivated;
    let discovery = lb[0].discovery_handlers_activated - lb[0].discovery_handlers_deactivated;
    ws.write(4, 1, "Handlers")?;
    ws.write(4, 2, (continuous + notification + ephemeral + discovery) as f64)?;
    ws.write(5, 3, "continuous")?;
    ws.write(5, 2, continuous as f64)?;
    ws.write(6, 3, "notification")?;
    ws.write(6, 2, notification as f64)?;
    ws.write(7, 3, "ephemeral")?;
    ws.write(7, 2, ephemeral as f64)?;
    ws.write(8, 3, "discovery")?;
    ws.write(8, 2, discovery as f64)?;

    // Aggregate history is only renderable once there are closed buckets.
    if lb.len() < 2 {
        return Ok(());
    }
    let stats = absolute_to_relative(&lb[1..]);
    let bucket_mins = lb[0].bucket_mins;
    let mut row: u32 = 10;

    ws.write(row, 0, "OS (MiB)")?;
    time_header(ws, row, 1, bucket_mins, stats.len())?;
    row += 1;
    number_row(ws, &mut row, "mfree", stats.iter().map(|s| s.os_mem_free as f64 / MIB))?;
    number_row(ws, &mut row, "mtotal", stats.iter().map(|s| s.os_mem_total as f64 / MIB))?;
    number_row(ws, &mut row, "diskrd", stats.iter().map(|s| s.os_disk_read as f64 / MIB))?;
    number_row(ws, &mut row, "diskwr", stats.iter().map(|s| s.os_disk_write as f64 / MIB))?;
    number_row(ws, &mut row, "netrcv", stats.iter().map(|s| s.os_net_received as f64 / MIB))?;
    number_row(ws, &mut row, "netsnd", stats.iter().map(|s| s.os_net_sent as f64 / MIB))?;
    row += 1;

    if !stats[0].fatals.is_empty() {
        ws.write(row, 0, "Fatals")?;
        time_header(ws, row, 1, bucket_mins, stats.len())?;
        row += 1;
        for key in stats[0].fatals.keys() {
            number_row(
                ws,
                &mut row,
                key,
                stats.iter().map(|s| s.fatals.get(key).copied().unwrap_or(0) as f64),
            )?;
        }
        row += 1;
    }

    ws.write(row, 0, "Caches")?;
    row += 1;
    for key in stats[0].caches.keys() {
        ws.write(row, 0, format!("{key} cache"))?;
        row += 1;
        time_header(ws, row, 1, bucket_mins, stats.len())?;
        row += 1;
        number_row(
            ws,
            &mut row,
            "refresh",
            stats
                .iter()
                .map(|s| s.caches.get(key).map(|c| c.invalidations).unwrap_or(0) as f64),
        )?;
        number_row(
            ws,
            &mut row,
            "entries",
            stats
                .iter()
                .map(|s| s.caches.get(key).map(|c| c.entries).unwrap_or(0) as f64),
        )?;
    }
    row += 1;

    ws.write(row, 0, "Handlers")?;
    time_header(ws, row, 1, bucket_mins, stats.len())?;
    row += 1;
    number_row(ws, &mut row, "contin", stats.iter().map(|s| s.continuous_handlers_activated as f64))?;
    number_row(ws, &mut row, "notif", stats.iter().map(|s| s.notification_handlers_activated as f64))?;
    number_row(ws, &mut row, "ephem", stats.iter().map(|s| s.ephemeral_handlers_activated as f64))?;
    number_row(ws, &mut row, "disco", stats.iter().map(|s| s.discovery_handlers_activated as f64))?;
    row += 1;

    ws.write(row, 0, "Events")?;
    time_header(ws, row, 1, bucket_mins, stats.len())?;
    row += 1;
    number_row(ws, &mut row, "queued", stats.iter().map(|s| s.events_enqueued as f64))?;
    number_row(ws, &mut row, "routed", stats.iter().map(|s| s.events_routed as f64))?;
    row += 1;

    ws.write(row, 0, "Databases")?;
    row += 1;
    for key in stats[0].databases.keys() {
        ws.write(row, 0, key.as_str())?;
        row += 1;
        time_header(ws, row, 1, bucket_mins, stats.len())?;
        row += 1;
        number_row(
            ws,
            &mut row,
            "reads",
            stats.iter().map(|s| s.databases.get(key).map(|d| d.reads).unwrap_or(0) as f64),
        )?;
        number_row(
            ws,
            &mut row,
            "writes",
            stats.iter().map(|s| s.databases.get(key).map(|d| d.writes).unwrap_or(0) as f64),
        )?;
        number_row(
            ws,
            &mut row,
            "readMs",
            stats.iter().map(|s| s.databases.get(key).map(|d| d.read_ms).unwrap_or(0) as f64),
        )?;
        number_row(
            ws,
            &mut row,
            "writeMs",
            stats.iter().map(|s| s.databases.get(key).map(|d| d.write_ms).unwrap_or(0) as f64),
        )?;
    }
    row += 1;

    if !stats[0].api.is_empty() {
        ws.write(row, 0, "API")?;
        row += 1;
        for key in stats[0].api.keys() {
            ws.write(row, 0, key.as_str())?;
            row += 1;
            time_header(ws, row, 1, bucket_mins, stats.len())?;
            row += 1;
            number_row(
                ws,
                &mut row,
                "calls",
                stats.iter().map(|s| s.api.get(key).copied().unwrap_or(0) as f64),
            )?;
        }
    }

    Ok(())
}

fn time_header(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    bucket_mins: i64,
    buckets: usize,
) -> anyhow::Result<()> {
    for i in 0..buckets {
        ws.write(row, col + i as u16, format!("{}m", (i as i64 + 1) * bucket_mins))?;
    }
    Ok(())
}

fn number_row(
    ws: &mut Worksheet,
    row: &mut u32,
    label: &str,
    values: impl Iterator<Item = f64>,
) -> anyhow::Result<()> {
    ws.write(*row, 0, label)?;
    for (i, v) in values.enumerate() {
        ws.write(*row, 1 + i as u16, v)?;
    }
    *row += 1;
    Ok(())
}
