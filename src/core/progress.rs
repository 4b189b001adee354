//! 未完成下载的进度估算

use crate::config::AppConfig;
use crate::core::download::{local_destination, partial_path};
use crate::db::{DownloadRecord, Store};
use serde::Serialize;

/// 进度百分比与预计耗时
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub percent: u8,
    /// 分钟，进度为 0 时未知
    pub eta_minutes: Option<i64>,
}

impl Progress {
    pub const UNKNOWN: Progress = Progress {
        percent: 0,
        eta_minutes: None,
    };
}

/// 根据远程大小和本地临时文件大小估算进度
///
/// `local_size` 为 `None` 表示本地临时文件不存在
pub fn estimate(remote_size: u64, local_size: Option<u64>, started: i64, now: i64) -> Progress {
    let Some(local_size) = local_size else {
        return Progress::UNKNOWN;
    };
    if remote_size == 0 {
        return Progress::UNKNOWN;
    }

    let remaining = remote_size.saturating_sub(local_size) as f64;
    let ratio = 1.0 - remaining / remote_size as f64;
    let percent = (100.0 * ratio).round().clamp(0.0, 100.0) as u8;
    if percent == 0 {
        return Progress {
            percent,
            eta_minutes: None,
        };
    }

    let elapsed = (now - started).max(0) as f64;
    let eta = elapsed / (f64::from(percent) / 100.0) / 60.0;
    Progress {
        percent,
        eta_minutes: Some(eta.round() as i64),
    }
}

/// 一条未完成下载及其进度
#[derive(Debug, Clone, Serialize)]
pub struct PendingDownload {
    #[serde(flatten)]
    pub record: DownloadRecord,
    pub partial_size: Option<u64>,
    #[serde(flatten)]
    pub progress: Progress,
}

/// 读取未完成的下载，并根据本地临时文件估算进度
pub async fn pending_progress(
    store: &Store,
    config: &AppConfig,
    limit: Option<u32>,
    now: i64,
) -> Result<Vec<PendingDownload>, sqlx::Error> {
    let records = store.list_pending_downloads(limit).await?;
    let mut pending = Vec::with_capacity(records.len());

    for record in records {
        let dest = local_destination(
            &config.local.download_path,
            &config.seedbox.prefixed_path,
            &record.path,
        );
        let part = partial_path(&dest, &config.seedbox.part_suffix);
        let partial_size = tokio::fs::metadata(&part).await.ok().map(|m| m.len());
        let progress = estimate(record.seedbox_size, partial_size, record.started, now);
        pending.push(PendingDownload {
            record,
            partial_size,
            progress,
        });
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_config;
    use crate::transport::local::remote_path;
    use std::fs;

    #[test]
    fn test_estimate_half_done() {
        let progress = estimate(1000, Some(500), 1_000, 1_600);
        assert_eq!(progress.percent, 50);
        assert_eq!(progress.eta_minutes, Some(20));
    }

    #[test]
    fn test_estimate_nothing_downloaded() {
        assert_eq!(estimate(1000, Some(0), 1_000, 1_600), Progress::UNKNOWN);
        assert_eq!(estimate(1000, Some(4), 1_000, 1_600), Progress::UNKNOWN);
    }

    #[test]
    fn test_estimate_without_partial_file_or_size() {
        assert_eq!(estimate(1000, None, 0, 60), Progress::UNKNOWN);
        assert_eq!(estimate(0, Some(10), 0, 60), Progress::UNKNOWN);
    }

    #[test]
    fn test_estimate_clamped() {
        let progress = estimate(1000, Some(1500), 0, 600);
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.eta_minutes, Some(10));
    }

    #[tokio::test]
    async fn test_pending_progress_reads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store = Store::in_memory().await.unwrap();

        let with_part = remote_path(dir.path(), "remote/files/s1/e1.mkv");
        let without_part = remote_path(dir.path(), "remote/files/s1/e2.mkv");
        store.begin_download(&with_part, 1000).await.unwrap();
        store.begin_download(&without_part, 1000).await.unwrap();

        fs::create_dir_all(dir.path().join("local/download/s1")).unwrap();
        fs::write(dir.path().join("local/download/s1/e1.mkv.part"), vec![0u8; 250]).unwrap();

        let now = chrono::Utc::now().timestamp();
        let mut pending = pending_progress(&store, &config, None, now).await.unwrap();
        pending.sort_by(|a, b| a.record.path.cmp(&b.record.path));

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].partial_size, Some(250));
        assert_eq!(pending[0].progress.percent, 25);
        assert!(pending[0].progress.eta_minutes.is_some());
        assert_eq!(pending[1].partial_size, None);
        assert_eq!(pending[1].progress, Progress::UNKNOWN);
    }
}
