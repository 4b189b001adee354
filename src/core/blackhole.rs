//! blackhole 同步：把本地 watch 目录中的种子发布到 seedbox

use crate::config::AppConfig;
use crate::core::task::{SyncContext, SyncReport, SyncTask, TaskKind};
use crate::core::torrent::decode_torrent;
use crate::error::{SyncError, TransferError, TransportError};
use crate::transport::join_remote;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const TORRENT_EXTENSION: &str = "torrent";

/// 上传任务
#[derive(Debug, Default, Clone, Copy)]
pub struct BlackholeSync;

/// 扫描目录下的种子文件（不递归，扩展名不区分大小写，按名称排序）
pub fn scan_descriptors(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_torrent = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(TORRENT_EXTENSION));
        if is_torrent {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

impl BlackholeSync {
    /// 上传单个种子，成功后返回种子文件大小
    async fn upload(
        &self,
        ctx: &SyncContext,
        local: &Path,
        name: &str,
        chmod: Option<u32>,
    ) -> Result<u64, TransferError> {
        let seedbox = &ctx.config.seedbox;
        let tmp = join_remote(&seedbox.tmp_path, name);
        let watch = join_remote(&seedbox.watch_path, name);

        debug!("上传 {:?} -> {}", local, tmp);
        ctx.transport.put(local, &tmp).await?;

        if let Some(mode) = chmod {
            match ctx.transport.chmod(&tmp, mode).await {
                Ok(()) => {}
                // 协议不支持时照常发布
                Err(TransportError::Unsupported { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        ctx.transport.rename(&tmp, &watch).await?;

        let data = tokio::fs::read(local).await?;
        let meta = decode_torrent(&data)?;
        let torrent_id = ctx
            .store
            .record_upload(name, &meta.announce, &meta.files)
            .await?;
        debug!("种子 {} 已记录，id={}", name, torrent_id);

        // 发布和入库都成功后才删除本地文件
        tokio::fs::remove_file(local).await?;
        Ok(data.len() as u64)
    }
}

#[async_trait]
impl SyncTask for BlackholeSync {
    fn kind(&self) -> TaskKind {
        TaskKind::Blackhole
    }

    fn has_work(&self, config: &AppConfig) -> Result<bool, SyncError> {
        let descriptors = match scan_descriptors(&config.local.watch_path) {
            Ok(found) => found,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("{:?} 不存在，没有种子文件", config.local.watch_path);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if descriptors.is_empty() {
            info!("{:?} 中没有种子文件", config.local.watch_path);
            return Ok(false);
        }
        Ok(true)
    }

    async fn run(&self, ctx: &SyncContext) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new(self.kind());
        let chmod = ctx.config.seedbox.chmod_mode()?;
        let descriptors = scan_descriptors(&ctx.config.local.watch_path)?;

        for local in descriptors {
            report.files_scanned += 1;
            let Some(name) = local.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };

            match self.upload(ctx, &local, &name, chmod).await {
                Ok(bytes) => {
                    info!("已上传种子: {}", name);
                    report.files_copied += 1;
                    report.bytes_transferred += bytes;
                }
                Err(e) if e.is_fatal() => {
                    report.record_failure(&name, &e);
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("上传种子 {} 失败: {}", name, e);
                    report.record_failure(&name, &e);
                }
            }
        }

        Ok(report.finish())
    }
}
