// Day-slice persistence. Each monitored host gets one file per UTC day,
// named {host}-{serviceVersion}-{yyyymmdd}.zip, holding a single JSON entry
// with the HostStats slice for that day. The reader accepts the zip
// container or a bare .json slice. Files mirror to the object store after
// every local write.

use crate::config::AwsConfig;
use crate::grid::{normalize_series, StatsGrid};
use crate::models::HostStats;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const SECS_PER_DAY: i64 = 24 * 60 * 60;
const ZIP_EXT: &str = ".zip";
const JSON_EXT: &str = ".json";

/// UTC midnight starting the current day.
pub fn today_start() -> i64 {
    chrono::Utc::now().timestamp() / SECS_PER_DAY * SECS_PER_DAY
}

pub fn yesterday_start() -> i64 {
    today_start() - SECS_PER_DAY
}

/// Day-slice filename for a host under a given service version.
pub fn stats_filename(host: &str, service_version: &str, file_time: i64, ext: &str) -> String {
    let day = chrono::DateTime::from_timestamp(file_time, 0)
        .map(|t| t.format("%Y%m%d").to_string())
        .unwrap_or_default();
    format!("{host}-{service_version}-{day}{ext}")
}

/// Uploads day slices to the configured bucket with a public-read ACL.
pub struct S3Uploader {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Uploader {
    pub fn new(cfg: &AwsConfig) -> Self {
        let credentials = Credentials::new(
            cfg.access_key_id.clone(),
            cfg.secret_access_key.clone(),
            None,
            None,
            "hubwatch",
        );
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        }
    }

    pub async fn upload(&self, filename: &str, contents: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .acl(ObjectCannedAcl::PublicRead)
            .key(filename)
            .body(ByteStream::from(contents))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("s3 upload of {filename}: {e}"))?;
        Ok(())
    }
}

pub struct Persistor {
    data_dir: PathBuf,
    s3: Option<Arc<S3Uploader>>,
}

impl Persistor {
    pub fn new(data_dir: impl Into<PathBuf>, s3: Option<Arc<S3Uploader>>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir, s3 })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Snapshot the host's today and yesterday slices to disk, mirroring
    /// each to the object store. A failed upload never rolls back the local
    /// write; the in-memory grid stays authoritative either way.
    pub async fn save_host(
        &self,
        grid: &StatsGrid,
        hostname: &str,
        service_version: &str,
    ) -> anyhow::Result<()> {
        let mut first_err: Option<anyhow::Error> = None;
        for day in [today_start(), yesterday_start()] {
            match self.write_slice(grid, hostname, service_version, day) {
                Ok((filename, contents)) => {
                    if let Some(s3) = &self.s3 {
                        if let Err(e) = s3.upload(&filename, contents).await {
                            warn!(host = hostname, error = %e, "object store upload failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        host = hostname,
                        file = stats_filename(hostname, service_version, day, ZIP_EXT),
                        error = %e,
                        "failed to write stats slice"
                    );
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Clear the host's grid, then merge its persisted today and yesterday
    /// slices back in under the given service version. Missing files are
    /// not errors; slices from other versions are intentionally invisible.
    pub async fn reload_host(
        &self,
        grid: &StatsGrid,
        hostname: &str,
        hostaddr: &str,
        service_version: &str,
        bucket_secs: i64,
    ) -> anyhow::Result<usize> {
        grid.reset_version(hostname);
        grid.verify(hostname, hostaddr, service_version, bucket_secs);

        let mut total = 0usize;
        for (label, day) in [("today", today_start()), ("yesterday", yesterday_start())] {
            let hs = match self.read_slice(hostname, service_version, day) {
                Ok(Some(hs)) => hs,
                Ok(None) => continue,
                Err(e) => {
                    warn!(host = hostname, day = label, error = %e, "failed to read stats slice");
                    continue;
                }
            };
            let addr = if hs.addr.is_empty() {
                hostaddr.to_string()
            } else {
                hs.addr.clone()
            };
            let mut stats = hs.stats;
            normalize_series(&mut stats, 0, bucket_secs);
            match grid.add(hostname, &addr, &stats) {
                Ok(outcome) => {
                    if outcome.added > 0 {
                        info!(
                            host = hostname,
                            day = label,
                            added = outcome.added,
                            "loaded persisted stats"
                        );
                        total += outcome.added;
                    }
                }
                Err(e) => {
                    warn!(host = hostname, day = label, error = %e, "failed to merge persisted stats");
                }
            }
        }
        Ok(total)
    }

    fn write_slice(
        &self,
        grid: &StatsGrid,
        hostname: &str,
        service_version: &str,
        day_start: i64,
    ) -> anyhow::Result<(String, Vec<u8>)> {
        let hs = grid
            .extract(hostname, day_start, SECS_PER_DAY)
            .unwrap_or_default();
        let json = serde_json::to_vec(&hs)?;

        let mut buf = Cursor::new(Vec::new());
        {
            let mut archive = zip::ZipWriter::new(&mut buf);
            archive.start_file(
                stats_filename(hostname, service_version, day_start, JSON_EXT),
                zip::write::FileOptions::default(),
            )?;
            archive.write_all(&json)?;
            archive.finish()?;
        }
        let contents = buf.into_inner();

        let filename = stats_filename(hostname, service_version, day_start, ZIP_EXT);
        std::fs::write(self.data_dir.join(&filename), &contents)?;
        Ok((filename, contents))
    }

    fn read_slice(
        &self,
        hostname: &str,
        service_version: &str,
        day_start: i64,
    ) -> anyhow::Result<Option<HostStats>> {
        let contents = match self.read_either(hostname, service_version, day_start)? {
            Some(c) => c,
            None => return Ok(None),
        };

        // The current container is zip with one JSON entry; older slices
        // are bare JSON.
        let json = match zip::ZipArchive::new(Cursor::new(&contents[..])) {
            Ok(mut archive) => {
                let mut data = Vec::new();
                for i in 0..archive.len() {
                    let mut entry = archive.by_index(i)?;
                    data.clear();
                    entry.read_to_end(&mut data)?;
                    if !data.is_empty() {
                        break;
                    }
                }
                data
            }
            Err(_) => contents,
        };
        Ok(Some(serde_json::from_slice(&json)?))
    }

    fn read_either(
        &self,
        hostname: &str,
        service_version: &str,
        day_start: i64,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        for ext in [ZIP_EXT, JSON_EXT] {
            let path = self
                .data_dir
                .join(stats_filename(hostname, service_version, day_start, ext));
            match std::fs::read(&path) {
                Ok(contents) => return Ok(Some(contents)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}
