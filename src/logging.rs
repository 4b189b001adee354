//! 日志模块 - 提供文件日志和大小管理功能

use crate::core::task::TaskKind;
use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    pub level: String,
    /// 最大日志文件大小（MB）
    pub max_size_mb: u32,
    /// blackhole 任务的日志文件，未设置时输出到 stderr
    pub blackhole_file: Option<PathBuf>,
    /// download 任务的日志文件
    pub download_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            max_size_mb: 5,
            blackhole_file: None,
            download_file: None,
        }
    }
}

impl LogConfig {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" | "warning" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }

    /// 任务对应的日志文件
    pub fn file_for(&self, task: Option<TaskKind>) -> Option<&Path> {
        match task? {
            TaskKind::Blackhole => self.blackhole_file.as_deref(),
            TaskKind::Download => self.download_file.as_deref(),
        }
    }
}

/// 初始化全局日志，只在入口处调用一次
pub fn init_logging(config: &LogConfig, task: Option<TaskKind>) -> Result<(), SyncError> {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.tracing_level().into())
        .from_env_lossy();

    match config.file_for(task) {
        Some(file_path) => {
            let writer = SizeRotatingWriter::new(file_path, config.max_size_mb)
                .map_err(|e| SyncError::Logging(format!("{:?}: {}", file_path, e)))?;
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .try_init()
                .map_err(|e| SyncError::Logging(e.to_string()))?;
        }
        None => {
            let console_layer = tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()
                .map_err(|e| SyncError::Logging(e.to_string()))?;
        }
    }
    Ok(())
}

/// 带大小限制的日志写入器
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl SizeRotatingWriter {
    pub fn new(file_path: &Path, max_size_mb: u32) -> io::Result<Self> {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let max_size = (max_size_mb.max(1) as u64) * 1024 * 1024;
        let writer = Self::open_file(file_path, max_size)?;

        Ok(Self {
            file_path: file_path.to_path_buf(),
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
        // 检查现有文件大小，如果超过限制则轮转
        if Self::exceeds(file_path, max_size) {
            Self::rotate_log(file_path)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(BufWriter::new(file))
    }

    fn exceeds(file_path: &Path, max_size: u64) -> bool {
        fs::metadata(file_path)
            .map(|m| m.len() > max_size)
            .unwrap_or(false)
    }

    /// 轮转日志文件: xxx.log -> xxx.log.old
    fn rotate_log(file_path: &Path) -> io::Result<()> {
        let mut backup = file_path.as_os_str().to_owned();
        backup.push(".old");
        let backup_path = PathBuf::from(backup);

        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }
        fs::rename(file_path, &backup_path)
    }

    fn lock(inner: &Mutex<Option<BufWriter<File>>>) -> MutexGuard<'_, Option<BufWriter<File>>> {
        inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 检查并轮转日志
    fn check_and_rotate(&self) -> io::Result<()> {
        if !Self::exceeds(&self.file_path, self.max_size) {
            return Ok(());
        }
        let mut guard = Self::lock(&self.writer);
        if let Some(mut w) = guard.take() {
            let _ = w.flush();
        }
        Self::rotate_log(&self.file_path)?;
        *guard = Some(Self::open_file(&self.file_path, self.max_size)?);
        Ok(())
    }
}

/// 日志写入器包装
pub struct LogWriter {
    inner: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = SizeRotatingWriter::lock(&self.inner);
        match guard.as_mut() {
            Some(writer) => {
                let written = writer.write(buf)?;
                writer.flush()?;
                Ok(written)
            }
            None => Err(io::Error::other("Writer not available")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match SizeRotatingWriter::lock(&self.inner).as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        // 在创建写入器前检查轮转
        let _ = self.check_and_rotate();

        LogWriter {
            inner: self.writer.clone(),
        }
    }
}
