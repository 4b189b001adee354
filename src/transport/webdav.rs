use super::{RemoteDir, Transport};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use opendal::{layers::TimeoutLayer, EntryMode, Operator};
use std::ops::Range;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// 非 IO 操作超时（秒）- stat, rename 等
const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
const IO_TIMEOUT_SECS: u64 = 300;
/// 分块传输大小
const CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// 把 `[0, size)` 切分为不超过 `chunk` 的区间
fn chunk_ranges(size: u64, chunk: u64) -> impl Iterator<Item = Range<u64>> {
    let chunk = chunk.max(1);
    (0..size.div_ceil(chunk)).map(move |i| {
        let start = i * chunk;
        start..(start + chunk).min(size)
    })
}

/// WebDAV 传输（部分 seedbox 只开放 WebDAV）
pub struct WebDavTransport {
    operator: Operator,
    name: String,
}

impl WebDavTransport {
    pub async fn new(endpoint: &str, username: &str, password: &str) -> TransportResult<Self> {
        use opendal::services::Webdav;

        let builder = Webdav::default()
            .endpoint(endpoint)
            .username(username)
            .password(password)
            .root("/");

        let operator = Operator::new(builder)
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        // 建立会话时探测一次，尽早暴露连接错误
        operator
            .check()
            .await
            .map_err(|e| TransportError::Connection(format!("{}: {}", endpoint, e)))?;

        Ok(Self {
            operator,
            name: format!("webdav://{}", endpoint.trim_end_matches('/')),
        })
    }

    fn map_err(path: &str, e: opendal::Error) -> TransportError {
        match e.kind() {
            opendal::ErrorKind::NotFound => TransportError::NotFound(path.to_string()),
            opendal::ErrorKind::Unexpected if e.is_temporary() => {
                TransportError::Connection(format!("{}: {}", path, e))
            }
            _ => TransportError::Remote(format!("{}: {}", path, e)),
        }
    }

    /// opendal 使用相对路径，目录以 / 结尾
    fn dir_path(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", trimmed)
        }
    }

    async fn read_dir(&self, dir: &str) -> TransportResult<(Vec<String>, Vec<String>)> {
        let entries = self
            .operator
            .list(&Self::dir_path(dir))
            .await
            .map_err(|e| Self::map_err(dir, e))?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in entries {
            // 部分版本会把目录自身也列出来
            if entry.path().trim_matches('/') == dir.trim_matches('/') {
                continue;
            }
            let name = entry.name().trim_end_matches('/').to_string();
            if name.is_empty() {
                continue;
            }
            match entry.metadata().mode() {
                EntryMode::DIR => dirs.push(super::join_remote(dir, &name)),
                EntryMode::FILE => files.push(name),
                EntryMode::Unknown => debug!("忽略未知类型: {}", entry.path()),
            }
        }
        files.sort();
        Ok((dirs, files))
    }
}

#[async_trait]
impl Transport for WebDavTransport {
    /// 只用于上传种子文件，一次写入
    async fn put(&self, local: &Path, remote: &str) -> TransportResult<()> {
        let data = tokio::fs::read(local).await?;
        self.operator
            .write(remote, data)
            .await
            .map_err(|e| Self::map_err(remote, e))?;
        Ok(())
    }

    /// 分块下载，本地文件随传输增长
    async fn get(&self, remote: &str, local: &Path) -> TransportResult<()> {
        let size = self.stat_size(remote).await?;
        let mut target = tokio::fs::File::create(local).await?;

        for range in chunk_ranges(size, CHUNK_SIZE) {
            let data = self
                .operator
                .read_with(remote)
                .range(range)
                .await
                .map_err(|e| Self::map_err(remote, e))?;
            target.write_all(&data.to_vec()).await?;
            target.flush().await?;
        }
        target.sync_all().await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> TransportResult<()> {
        self.operator
            .rename(from, to)
            .await
            .map_err(|e| Self::map_err(from, e))
    }

    async fn chmod(&self, remote: &str, _mode: u32) -> TransportResult<()> {
        warn!("WebDAV 不支持 chmod: {}", remote);
        Err(TransportError::Unsupported {
            op: "chmod",
            transport: self.name.clone(),
        })
    }

    async fn stat_size(&self, remote: &str) -> TransportResult<u64> {
        let meta = self
            .operator
            .stat(remote)
            .await
            .map_err(|e| Self::map_err(remote, e))?;
        Ok(meta.content_length())
    }

    fn walk<'a>(&'a self, root: &'a str) -> BoxStream<'a, TransportResult<RemoteDir>> {
        let root = match root.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        stream::unfold(vec![root.to_string()], move |mut pending| async move {
            let dir = pending.pop()?;
            let listing = self.read_dir(&dir).await;
            let item = listing.map(|(subdirs, files)| {
                pending.extend(subdirs);
                RemoteDir { path: dir, files }
            });
            Some((item, pending))
        })
        .boxed()
    }

    async fn close(&self) -> TransportResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
