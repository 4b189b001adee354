//! seedbox 同步：把 finished 目录中完成的文件下载到本地

use crate::core::task::{SyncContext, SyncReport, SyncTask, TaskKind};
use crate::error::{SyncError, TransferError};
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 下载任务
#[derive(Debug, Default, Clone, Copy)]
pub struct DownloadSync;

/// 远程文件筛选：未完成的分片文件和命中排除规则的文件不下载
#[derive(Debug, Clone)]
pub struct DownloadFilter {
    part_suffix: String,
    exclude: Option<Regex>,
}

impl DownloadFilter {
    pub fn new(part_suffix: impl Into<String>, exclude: Option<Regex>) -> Self {
        Self {
            part_suffix: part_suffix.into(),
            exclude,
        }
    }

    /// 按文件名判断
    pub fn accepts(&self, file_name: &str) -> bool {
        if !self.part_suffix.is_empty() && file_name.ends_with(&self.part_suffix) {
            return false;
        }
        match &self.exclude {
            Some(re) => !re.is_match(file_name),
            None => true,
        }
    }
}

/// 远程路径去掉前缀后放到本地下载目录下
pub fn local_destination(download_root: &Path, prefix: &str, remote: &str) -> PathBuf {
    let prefix = prefix.trim_end_matches('/');
    let relative = match remote.strip_prefix(prefix) {
        Some(rest) if !prefix.is_empty() && (rest.is_empty() || rest.starts_with('/')) => rest,
        _ => remote,
    };

    let mut dest = download_root.to_path_buf();
    for segment in relative.split('/') {
        // 不允许跳出下载目录
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }
        dest.push(segment);
    }
    dest
}

/// 下载过程中使用的临时文件路径
pub fn partial_path(dest: &Path, part_suffix: &str) -> PathBuf {
    if part_suffix.is_empty() {
        return dest.to_path_buf();
    }
    let mut name = OsString::from(dest.as_os_str());
    name.push(part_suffix);
    PathBuf::from(name)
}

impl DownloadSync {
    /// 下载单个文件，返回本地文件大小
    async fn fetch(&self, ctx: &SyncContext, remote: &str) -> Result<u64, TransferError> {
        let seedbox = &ctx.config.seedbox;
        let dest = local_destination(&ctx.config.local.download_path, &seedbox.prefixed_path, remote);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let seedbox_size = ctx.transport.stat_size(remote).await?;
        let id = ctx.store.begin_download(remote, seedbox_size).await?;

        let part = partial_path(&dest, &seedbox.part_suffix);
        debug!("下载 {} -> {:?}", remote, part);
        ctx.transport.get(remote, &part).await?;
        if part != dest {
            tokio::fs::rename(&part, &dest).await?;
        }

        let local_size = tokio::fs::metadata(&dest).await?.len();
        ctx.store.complete_download(id, local_size).await?;
        Ok(local_size)
    }
}

#[async_trait]
impl SyncTask for DownloadSync {
    fn kind(&self) -> TaskKind {
        TaskKind::Download
    }

    async fn run(&self, ctx: &SyncContext) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new(self.kind());
        let seedbox = &ctx.config.seedbox;
        let filter = DownloadFilter::new(seedbox.part_suffix.clone(), seedbox.exclude_regex()?);

        let mut dirs = ctx.transport.walk(&seedbox.finished_path);
        while let Some(listing) = dirs.next().await {
            let dir = match listing {
                Ok(dir) => dir,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("无法读取远程目录: {}", e);
                    report.record_failure(&seedbox.finished_path, &e);
                    continue;
                }
            };

            for name in &dir.files {
                report.files_scanned += 1;
                if !filter.accepts(name) {
                    debug!("跳过: {}", dir.file_path(name));
                    report.files_skipped += 1;
                    continue;
                }

                let remote = dir.file_path(name);
                if ctx.store.has_completed_download(&remote).await? {
                    debug!("已下载，跳过: {}", remote);
                    report.files_skipped += 1;
                    continue;
                }

                match self.fetch(ctx, &remote).await {
                    Ok(bytes) => {
                        info!("已下载: {}", remote);
                        report.files_copied += 1;
                        report.bytes_transferred += bytes;
                    }
                    Err(e) if e.is_fatal() => {
                        report.record_failure(&remote, &e);
                        return Err(e.into());
                    }
                    Err(e) => {
                        warn!("下载 {} 失败: {}", remote, e);
                        report.record_failure(&remote, &e);
                    }
                }
            }
        }

        Ok(report.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{test_config, FaultyTransport};
    use crate::db::Store;
    use crate::error::TransportError;
    use crate::transport::local::remote_path;
    use crate::transport::{LocalTransport, Transport};
    use std::fs;
    use std::sync::Arc;

    async fn context_with(base: &Path, exclude: &str) -> SyncContext {
        let mut config = test_config(base);
        config.seedbox.exclude_syncing = exclude.to_string();
        fs::create_dir_all(base.join("remote/files/s1")).unwrap();
        SyncContext::new(
            Arc::new(config),
            Box::new(LocalTransport::new()),
            Store::in_memory().await.unwrap(),
        )
    }

    #[test]
    fn test_filter_skips_partial_and_excluded() {
        let filter = DownloadFilter::new(".part", Some(Regex::new(r"\.nfo$").unwrap()));
        assert!(filter.accepts("e1.mkv"));
        assert!(!filter.accepts("e2.mkv.part"));
        assert!(!filter.accepts("release.nfo"));

        let open = DownloadFilter::new("", None);
        assert!(open.accepts("e2.mkv.part"));
    }

    #[test]
    fn test_local_destination_strips_prefix() {
        let root = Path::new("/data/dl");
        assert_eq!(
            local_destination(root, "/files", "/files/s1/e1.mkv"),
            PathBuf::from("/data/dl/s1/e1.mkv")
        );
        assert_eq!(
            local_destination(root, "/files/", "/files/e1.mkv"),
            PathBuf::from("/data/dl/e1.mkv")
        );
        // 前缀只在路径边界上匹配
        assert_eq!(
            local_destination(root, "/files", "/filesX/e1.mkv"),
            PathBuf::from("/data/dl/filesX/e1.mkv")
        );
        assert_eq!(
            local_destination(root, "/files", "/files/../../etc/passwd"),
            PathBuf::from("/data/dl/etc/passwd")
        );
    }

    #[test]
    fn test_partial_path() {
        let dest = Path::new("/data/dl/e1.mkv");
        assert_eq!(partial_path(dest, ".part"), PathBuf::from("/data/dl/e1.mkv.part"));
        assert_eq!(partial_path(dest, ""), dest);
    }

    #[tokio::test]
    async fn test_download_skips_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with(dir.path(), "").await;
        fs::write(dir.path().join("remote/files/s1/e1.mkv"), b"episode one").unwrap();
        fs::write(dir.path().join("remote/files/s1/e2.mkv.part"), b"partial").unwrap();

        let report = DownloadSync.run(&ctx).await.unwrap();

        assert_eq!(report.files_copied, 1);
        assert_eq!(report.files_skipped, 1);
        let local = dir.path().join("local/download/s1/e1.mkv");
        assert_eq!(fs::read(&local).unwrap(), b"episode one");
        assert!(!dir.path().join("local/download/s1/e1.mkv.part").exists());
        assert!(!dir.path().join("local/download/s1/e2.mkv.part").exists());
        assert!(dir.path().join("remote/files/s1/e2.mkv.part").exists());

        let e1 = remote_path(dir.path(), "remote/files/s1/e1.mkv");
        let e2 = remote_path(dir.path(), "remote/files/s1/e2.mkv.part");
        assert!(ctx.store.has_completed_download(&e1).await.unwrap());
        assert!(!ctx.store.has_completed_download(&e2).await.unwrap());

        let done = ctx.store.list_completed_downloads(None).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].seedbox_size, 11);
        assert_eq!(done[0].local_size, Some(11));
        assert!(ctx.store.list_pending_downloads(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with(dir.path(), "").await;
        fs::write(dir.path().join("remote/files/s1/e1.mkv"), b"episode one").unwrap();

        DownloadSync.run(&ctx).await.unwrap();
        let second = DownloadSync.run(&ctx).await.unwrap();

        assert_eq!(second.files_copied, 0);
        assert_eq!(second.files_skipped, 1);
        assert_eq!(ctx.store.list_completed_downloads(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_excluded_files_never_selected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with(dir.path(), r"(?i)sample").await;
        fs::write(dir.path().join("remote/files/s1/e1.mkv"), b"1").unwrap();
        fs::write(dir.path().join("remote/files/s1/Sample.mkv"), b"2").unwrap();

        let report = DownloadSync.run(&ctx).await.unwrap();

        assert_eq!(report.files_copied, 1);
        assert!(!dir.path().join("local/download/s1/Sample.mkv").exists());
        let sample = remote_path(dir.path(), "remote/files/s1/Sample.mkv");
        assert!(!ctx.store.has_completed_download(&sample).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_finished_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with(dir.path(), "").await;
        fs::remove_dir_all(dir.path().join("remote/files")).unwrap();

        let report = DownloadSync.run(&ctx).await.unwrap();

        assert_eq!(report.files_scanned, 0);
        assert_eq!(report.files_failed, 1);
    }

    fn context_sharing_store(base: &Path, transport: Box<dyn Transport>, store: &Store) -> SyncContext {
        SyncContext::new(Arc::new(test_config(base)), transport, store.clone())
    }

    #[tokio::test]
    async fn test_failed_get_stays_pending_and_next_run_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::in_memory().await.unwrap();
        fs::create_dir_all(dir.path().join("remote/files/s1")).unwrap();
        fs::write(dir.path().join("remote/files/s1/e1.mkv"), b"episode one").unwrap();

        let failing = context_sharing_store(
            dir.path(),
            Box::new(FaultyTransport::failing_get(|| {
                TransportError::Remote("permission denied".to_string())
            })),
            &store,
        );
        let report = DownloadSync.run(&failing).await.unwrap();

        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_copied, 0);
        assert!(!dir.path().join("local/download/s1/e1.mkv").exists());
        assert_eq!(store.list_pending_downloads(None).await.unwrap().len(), 1);
        assert!(store.list_completed_downloads(None).await.unwrap().is_empty());

        let healthy = context_sharing_store(dir.path(), Box::new(LocalTransport::new()), &store);
        let report = DownloadSync.run(&healthy).await.unwrap();

        assert_eq!(report.files_copied, 1);
        assert_eq!(
            fs::read(dir.path().join("local/download/s1/e1.mkv")).unwrap(),
            b"episode one"
        );
        let e1 = remote_path(dir.path(), "remote/files/s1/e1.mkv");
        assert!(store.has_completed_download(&e1).await.unwrap());
    }

    #[tokio::test]
    async fn test_connection_lost_aborts_walk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::in_memory().await.unwrap();
        fs::create_dir_all(dir.path().join("remote/files/s1")).unwrap();
        fs::write(dir.path().join("remote/files/s1/e1.mkv"), b"1").unwrap();
        fs::write(dir.path().join("remote/files/s1/e2.mkv"), b"2").unwrap();

        let ctx = context_sharing_store(
            dir.path(),
            Box::new(FaultyTransport::failing_get(|| {
                TransportError::Connection("reset".to_string())
            })),
            &store,
        );
        let err = DownloadSync.run(&ctx).await.unwrap_err();

        assert!(matches!(err, SyncError::Connection(_)));
        assert_eq!(err.exit_code(), 4);
        // 第一个文件失败后不再尝试第二个
        assert_eq!(store.list_pending_downloads(None).await.unwrap().len(), 1);
        assert!(store.list_completed_downloads(None).await.unwrap().is_empty());
    }
}
