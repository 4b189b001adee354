pub mod local;
#[cfg(feature = "sftp")]
pub mod sftp;
#[cfg(feature = "webdav")]
pub mod webdav;

use crate::config::SeedboxConfig;
use crate::error::{SyncError, TransportResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;

pub use local::LocalTransport;
#[cfg(feature = "sftp")]
pub use sftp::SftpTransport;
#[cfg(feature = "webdav")]
pub use webdav::WebDavTransport;

/// 遍历时产生的一个远程目录及其直接包含的文件名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDir {
    pub path: String,
    pub files: Vec<String>,
}

impl RemoteDir {
    /// 目录下文件的完整远程路径
    pub fn file_path(&self, name: &str) -> String {
        join_remote(&self.path, name)
    }
}

/// 远程文件系统抽象
#[async_trait]
pub trait Transport: Send + Sync {
    /// 上传本地文件
    async fn put(&self, local: &Path, remote: &str) -> TransportResult<()>;

    /// 下载远程文件到本地路径
    async fn get(&self, remote: &str, local: &Path) -> TransportResult<()>;

    /// 重命名，目标已存在时覆盖
    async fn rename(&self, from: &str, to: &str) -> TransportResult<()>;

    async fn chmod(&self, remote: &str, mode: u32) -> TransportResult<()>;

    /// 远程文件大小（字节）
    async fn stat_size(&self, remote: &str) -> TransportResult<u64>;

    /// 递归遍历目录。每次调用产生新的惰性流，目录顺序不保证
    fn walk<'a>(&'a self, root: &'a str) -> BoxStream<'a, TransportResult<RemoteDir>>;

    /// 关闭会话
    async fn close(&self) -> TransportResult<()>;

    /// 获取传输名称（用于日志）
    fn name(&self) -> &str;
}

/// 拼接远程路径（始终使用 /）
pub fn join_remote(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// 在加锁之前检查协议是否可用
pub fn check_protocol(config: &SeedboxConfig) -> Result<(), SyncError> {
    match config.protocol.as_str() {
        "local" => Ok(()),
        "sftp" if cfg!(feature = "sftp") => Ok(()),
        "sftp" => Err(SyncError::Dependency(
            "sftp 支持未编译（启用 sftp feature）".to_string(),
        )),
        "webdav" if cfg!(feature = "webdav") => Ok(()),
        "webdav" => Err(SyncError::Dependency(
            "webdav 支持未编译（启用 webdav feature）".to_string(),
        )),
        other => Err(SyncError::UnsupportedProtocol(other.to_string())),
    }
}

/// 根据配置创建传输实例
pub async fn create_transport(config: &SeedboxConfig) -> Result<Box<dyn Transport>, SyncError> {
    check_protocol(config)?;
    match config.protocol.as_str() {
        #[cfg(feature = "sftp")]
        "sftp" => {
            tracing::info!("连接 SFTP: {}@{}:{}", config.login, config.host, config.port);
            let transport =
                SftpTransport::connect(&config.host, config.port, &config.login, &config.password)
                    .await?;
            Ok(Box::new(transport))
        }
        #[cfg(feature = "webdav")]
        "webdav" => {
            let endpoint = config.webdav_endpoint();
            tracing::info!("创建 WebDAV 传输: {}", endpoint);
            let transport =
                WebDavTransport::new(&endpoint, &config.login, &config.password).await?;
            Ok(Box::new(transport))
        }
        "local" => {
            tracing::info!("使用本地挂载的 seedbox");
            Ok(Box::new(LocalTransport::new()))
        }
        other => Err(SyncError::UnsupportedProtocol(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/files", "a.mkv"), "/files/a.mkv");
        assert_eq!(join_remote("/files/", "a.mkv"), "/files/a.mkv");
        assert_eq!(join_remote("", "a.mkv"), "a.mkv");
        assert_eq!(join_remote("/", "/a.mkv"), "/a.mkv");
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let config = SeedboxConfig {
            protocol: "ftp".to_string(),
            ..SeedboxConfig::default()
        };
        assert!(matches!(
            check_protocol(&config),
            Err(SyncError::UnsupportedProtocol(p)) if p == "ftp"
        ));
    }

    #[test]
    fn test_local_protocol_always_available() {
        let config = SeedboxConfig {
            protocol: "local".to_string(),
            ..SeedboxConfig::default()
        };
        assert!(check_protocol(&config).is_ok());
    }
}
