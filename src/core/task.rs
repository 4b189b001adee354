//! 同步任务抽象：共享的运行上下文与任务报告

use crate::config::AppConfig;
use crate::db::Store;
use crate::error::SyncError;
use crate::transport::Transport;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// 任务类型，每种类型有独立的锁
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// 本地 blackhole -> seedbox
    Blackhole,
    /// seedbox -> 本地
    Download,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Blackhole => write!(f, "blackhole"),
            TaskKind::Download => write!(f, "download"),
        }
    }
}

/// 一次运行期间共享的资源
pub struct SyncContext {
    pub config: Arc<AppConfig>,
    pub transport: Box<dyn Transport>,
    pub store: Store,
}

impl SyncContext {
    pub fn new(config: Arc<AppConfig>, transport: Box<dyn Transport>, store: Store) -> Self {
        Self {
            config,
            transport,
            store,
        }
    }

    /// 关闭远程会话和数据库
    pub async fn shutdown(self) {
        if let Err(e) = self.transport.close().await {
            warn!("关闭传输 {} 失败: {}", self.transport.name(), e);
        }
        self.store.close().await;
    }
}

/// 同步任务
#[async_trait]
pub trait SyncTask: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// 返回 false 时不建立连接，直接结束
    fn has_work(&self, _config: &AppConfig) -> Result<bool, SyncError> {
        Ok(true)
    }

    async fn run(&self, ctx: &SyncContext) -> Result<SyncReport, SyncError>;
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub task: TaskKind,
    pub start_time: i64,
    pub end_time: i64,
    pub files_scanned: u32,
    pub files_copied: u32,
    pub files_skipped: u32,
    pub files_failed: u32,
    pub bytes_transferred: u64,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn new(task: TaskKind) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            task,
            start_time: now,
            end_time: now,
            files_scanned: 0,
            files_copied: 0,
            files_skipped: 0,
            files_failed: 0,
            bytes_transferred: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, item: &str, error: impl fmt::Display) {
        self.files_failed += 1;
        self.errors.push(format!("{}: {}", item, error));
    }

    pub fn finish(mut self) -> Self {
        self.end_time = chrono::Utc::now().timestamp();
        self
    }

    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 完成: 扫描 {}, 传输 {}, 跳过 {}, 失败 {}, {} 字节, 耗时 {}s",
            self.task,
            self.files_scanned,
            self.files_copied,
            self.files_skipped,
            self.files_failed,
            self.bytes_transferred,
            (self.end_time - self.start_time).max(0)
        )
    }
}
