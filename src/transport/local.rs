use super::{RemoteDir, Transport};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use std::path::Path;
use tokio::fs;

/// 本地挂载的 seedbox（NFS / sshfs 等），远程路径即本地绝对路径
pub struct LocalTransport {
    name: String,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            name: "local".to_string(),
        }
    }

    fn map_err(path: &str, e: io::Error) -> TransportError {
        if e.kind() == io::ErrorKind::NotFound {
            TransportError::NotFound(path.to_string())
        } else {
            TransportError::Remote(format!("{}: {}", path, e))
        }
    }

    /// 读取单个目录，返回 (子目录, 文件名)
    async fn read_dir(dir: &str) -> TransportResult<(Vec<String>, Vec<String>)> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| Self::map_err(dir, e))?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_err(dir, e))? {
            let file_type = entry.file_type().await.map_err(|e| Self::map_err(dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if file_type.is_dir() {
                dirs.push(super::join_remote(dir, &name));
            } else if file_type.is_file() {
                files.push(name);
            }
        }

        files.sort();
        Ok((dirs, files))
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn put(&self, local: &Path, remote: &str) -> TransportResult<()> {
        fs::copy(local, remote)
            .await
            .map_err(|e| Self::map_err(remote, e))?;
        Ok(())
    }

    async fn get(&self, remote: &str, local: &Path) -> TransportResult<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(remote, local)
            .await
            .map_err(|e| Self::map_err(remote, e))?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> TransportResult<()> {
        fs::rename(from, to)
            .await
            .map_err(|e| Self::map_err(from, e))
    }

    #[cfg(unix)]
    async fn chmod(&self, remote: &str, mode: u32) -> TransportResult<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(remote, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| Self::map_err(remote, e))
    }

    #[cfg(not(unix))]
    async fn chmod(&self, _remote: &str, _mode: u32) -> TransportResult<()> {
        Err(TransportError::Unsupported {
            op: "chmod",
            transport: self.name.clone(),
        })
    }

    async fn stat_size(&self, remote: &str) -> TransportResult<u64> {
        let meta = fs::metadata(remote)
            .await
            .map_err(|e| Self::map_err(remote, e))?;
        Ok(meta.len())
    }

    fn walk<'a>(&'a self, root: &'a str) -> BoxStream<'a, TransportResult<RemoteDir>> {
        let root = match root.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        let pending = vec![root.to_string()];
        stream::unfold(pending, |mut pending| async move {
            let dir = pending.pop()?;
            let listing = Self::read_dir(&dir).await;
            let item = match listing {
                Ok((subdirs, files)) => {
                    pending.extend(subdirs);
                    Ok(RemoteDir { path: dir, files })
                }
                Err(e) => Err(e),
            };
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

/// 测试用：把 `relative` 放到 `base` 下并返回远程风格的路径
#[cfg(test)]
pub(crate) fn remote_path(base: &Path, relative: &str) -> String {
    let full: std::path::PathBuf = base.join(relative.trim_start_matches('/'));
    full.to_string_lossy().replace('\\', "/")
}
