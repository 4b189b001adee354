//! 测试辅助：临时目录配置与可注入故障的传输

use crate::config::AppConfig;
use crate::error::{TransportError, TransportResult};
use crate::transport::local::remote_path;
use crate::transport::{LocalTransport, RemoteDir, Transport};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;

/// seedbox 和本地目录都放在 `base` 下，使用 local 协议
pub(crate) fn test_config(base: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.seedbox.protocol = "local".to_string();
    config.seedbox.chmod = None;
    config.seedbox.tmp_path = remote_path(base, "remote/tmp");
    config.seedbox.watch_path = remote_path(base, "remote/watch");
    config.seedbox.finished_path = remote_path(base, "remote/files");
    config.seedbox.prefixed_path = remote_path(base, "remote/files");
    config.local.watch_path = base.join("local/watch");
    config.local.download_path = base.join("local/download");
    config.local.db_file = base.join("local/seedboxsync.db");
    config.pid.blackhole_path = base.join("lock/blackhole.pid");
    config.pid.download_path = base.join("lock/download.pid");
    config
}

/// 本地传输，put / get 可以按需返回指定错误
pub(crate) struct FaultyTransport {
    inner: LocalTransport,
    put_error: Option<fn() -> TransportError>,
    get_error: Option<fn() -> TransportError>,
}

impl FaultyTransport {
    pub(crate) fn failing_put(error: fn() -> TransportError) -> Self {
        Self {
            inner: LocalTransport::new(),
            put_error: Some(error),
            get_error: None,
        }
    }

    pub(crate) fn failing_get(error: fn() -> TransportError) -> Self {
        Self {
            inner: LocalTransport::new(),
            put_error: None,
            get_error: Some(error),
        }
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn put(&self, local: &Path, remote: &str) -> TransportResult<()> {
        match self.put_error {
            Some(error) => Err(error()),
            None => self.inner.put(local, remote).await,
        }
    }

    async fn get(&self, remote: &str, local: &Path) -> TransportResult<()> {
        match self.get_error {
            Some(error) => Err(error()),
            None => self.inner.get(remote, local).await,
        }
    }

    async fn rename(&self, from: &str, to: &str) -> TransportResult<()> {
        self.inner.rename(from, to).await
    }

    async fn chmod(&self, remote: &str, mode: u32) -> TransportResult<()> {
        self.inner.chmod(remote, mode).await
    }

    async fn stat_size(&self, remote: &str) -> TransportResult<u64> {
        self.inner.stat_size(remote).await
    }

    fn walk<'a>(&'a self, root: &'a str) -> BoxStream<'a, TransportResult<RemoteDir>> {
        self.inner.walk(root)
    }

    async fn close(&self) -> TransportResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "faulty"
    }
}
