//! 任务锁 - 基于 pid 文件防止同一任务重复运行

use crate::core::task::TaskKind;
use crate::error::SyncError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// 持有期间独占某个任务类型的锁文件
#[derive(Debug)]
pub struct LockGuard {
    kind: TaskKind,
    path: PathBuf,
}

/// 接管过期锁文件时持有的辅助文件超过该时长视为遗留
const TAKEOVER_TIMEOUT: Duration = Duration::from_secs(30);

impl LockGuard {
    /// 获取锁。锁文件存在且持有进程仍存活时返回 `AlreadyRunning`
    pub fn acquire(kind: TaskKind, path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| lock_error(path, e))?;
            }
        }

        debug!("锁定任务 {} : {:?}", kind, path);
        match Self::create_marker(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let seen = read_marker(path).map_err(|e| lock_error(path, e))?;
                if !is_stale(path, seen.as_deref()) {
                    info!("{} 任务已在运行", kind);
                    return Err(SyncError::AlreadyRunning(kind));
                }
                warn!("发现过期的锁文件 {:?}，尝试接管", path);
                Self::take_over(kind, path, seen.as_deref())?;
            }
            Err(e) => return Err(lock_error(path, e)),
        }

        Ok(Self {
            kind,
            path: path.to_path_buf(),
        })
    }

    /// 替换过期的锁文件。
    ///
    /// 同一时间只有持有 `<marker>.takeover` 的进程可以删除锁文件，并且只在锁文件内容
    /// 仍是判定过期时读到的内容时才删除
    fn take_over(kind: TaskKind, path: &Path, seen: Option<&str>) -> Result<(), SyncError> {
        let takeover = takeover_path(path);
        match OpenOptions::new().write(true).create_new(true).open(&takeover) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                clear_abandoned_takeover(&takeover);
                info!("{} 任务的锁正在被其他进程接管", kind);
                return Err(SyncError::AlreadyRunning(kind));
            }
            Err(e) => return Err(lock_error(path, e)),
        }
        let _takeover = scopeguard::guard(takeover, |p| {
            let _ = fs::remove_file(p);
        });

        let current = read_marker(path).map_err(|e| lock_error(path, e))?;
        if current.as_deref() != seen {
            info!("{} 任务的锁已被其他进程获取", kind);
            return Err(SyncError::AlreadyRunning(kind));
        }
        if current.is_some() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(lock_error(path, e)),
            }
        }

        Self::create_marker(path).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                SyncError::AlreadyRunning(kind)
            } else {
                lock_error(path, e)
            }
        })
    }

    fn create_marker(path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// 释放锁。锁文件已不存在时只记录日志
    pub fn release(self) {
        debug!("解锁任务 {} : {:?}", self.kind, self.path);
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("移除锁文件 {:?} 失败: {}", self.path, e);
        }
    }
}

fn lock_error(path: &Path, source: io::Error) -> SyncError {
    SyncError::Lock {
        path: path.to_path_buf(),
        source,
    }
}

/// 读取锁文件内容，文件不存在时返回 None
fn read_marker(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// 锁文件不存在、内容不是 pid 或记录的进程已退出时视为过期。
/// 空文件可能是刚创建还未写入 pid，超时后才视为过期
fn is_stale(path: &Path, content: Option<&str>) -> bool {
    let Some(content) = content.map(str::trim) else {
        return true;
    };
    if content.is_empty() {
        return age_exceeds(path, TAKEOVER_TIMEOUT);
    }
    match content.parse::<u32>() {
        Ok(pid) => !process_alive(pid),
        Err(_) => true,
    }
}

fn age_exceeds(path: &Path, limit: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .is_some_and(|age| age > limit)
}

fn takeover_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".takeover");
    PathBuf::from(name)
}

/// 接管进程崩溃留下的辅助文件，超时后删除，下一次运行即可接管
fn clear_abandoned_takeover(takeover: &Path) {
    if age_exceeds(takeover, TAKEOVER_TIMEOUT) {
        warn!("移除遗留的接管文件 {:?}", takeover);
        let _ = fs::remove_file(takeover);
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// 没有存活探测手段的平台上锁文件总是有效
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}
