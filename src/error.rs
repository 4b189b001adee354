//! 错误类型与退出码映射

use crate::core::task::TaskKind;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 配置错误（加锁之前即失败）
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("未找到配置文件，已搜索: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },

    #[error("无法读取配置文件 {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("配置文件格式错误 {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("缺少必填配置项: {0}")]
    MissingKey(&'static str),

    #[error("无效的 chmod 值: {0}")]
    InvalidChmod(String),

    #[error("无效的排除规则 {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// 传输层错误
#[derive(Debug, Error)]
pub enum TransportError {
    /// 连接级错误，整个任务终止
    #[error("连接失败: {0}")]
    Connection(String),

    #[error("远程对象不存在: {0}")]
    NotFound(String),

    #[error("远程操作失败: {0}")]
    Remote(String),

    #[error("{op} 不被 {transport} 支持")]
    Unsupported {
        op: &'static str,
        transport: String,
    },

    #[error("本地文件错误: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// 种子文件解析错误
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bencode 数据在偏移 {0} 处意外结束")]
    UnexpectedEof(usize),

    #[error("bencode 数据在偏移 {offset} 处无效: {reason}")]
    Malformed { offset: usize, reason: &'static str },

    #[error("种子缺少字段: {0}")]
    MissingField(&'static str),
}

/// 单个文件（种子或下载文件）的传输错误，只影响当前条目
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("数据库操作失败: {0}")]
    Store(#[from] sqlx::Error),

    #[error("本地文件错误: {0}")]
    Io(#[from] io::Error),

    #[error("种子解析失败: {0}")]
    Decode(#[from] DecodeError),
}

impl TransferError {
    /// 连接错误需要中止整个任务
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransferError::Transport(e) if e.is_fatal())
    }
}

/// 进程边界上的错误，每种对应一个退出码
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("{0} 任务已在运行")]
    AlreadyRunning(TaskKind),

    #[error("无法创建锁文件 {path:?}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("连接失败: {0}")]
    Connection(String),

    #[error("不支持的传输协议: {0}")]
    UnsupportedProtocol(String),

    #[error("缺少依赖: {0}")]
    Dependency(String),

    #[error("日志初始化失败: {0}")]
    Logging(String),

    #[error("数据库错误: {0}")]
    Store(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::AlreadyRunning(_) => 0,
            SyncError::Store(_) | SyncError::Migrate(_) | SyncError::Io(_) | SyncError::Other(_) => 1,
            SyncError::Logging(_) => 2,
            SyncError::Lock { .. } => 3,
            SyncError::Connection(_) => 4,
            SyncError::Configuration(_) => 5,
            SyncError::UnsupportedProtocol(_) => 6,
            SyncError::Dependency(_) => 8,
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Connection(msg) => SyncError::Connection(msg),
            TransportError::Io(io) => SyncError::Io(io),
            other => SyncError::Other(other.into()),
        }
    }
}

impl From<TransferError> for SyncError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Transport(t) => t.into(),
            TransferError::Store(s) => SyncError::Store(s),
            TransferError::Io(io) => SyncError::Io(io),
            TransferError::Decode(d) => SyncError::Other(d.into()),
        }
    }
}
