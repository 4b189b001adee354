use super::{RemoteDir, Transport};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// TCP 连接超时（秒）
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// SFTP 状态码
const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_NO_SUCH_PATH: i32 = 10;

/// 基于 libssh2 的 SFTP 传输，使用密码认证
pub struct SftpTransport {
    session: Session,
    sftp: Sftp,
    name: String,
}

impl SftpTransport {
    pub async fn connect(host: &str, port: u16, login: &str, password: &str) -> TransportResult<Self> {
        let addr = format!("{}:{}", host, port);
        let socket = addr
            .to_socket_addrs()
            .map_err(|e| TransportError::Connection(format!("无法解析地址 {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| TransportError::Connection(format!("无法解析地址 {}", addr)))?;

        let tcp = TcpStream::connect_timeout(&socket, Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .map_err(|e| TransportError::Connection(format!("TCP 连接 {} 失败: {}", addr, e)))?;

        let mut session = Session::new()
            .map_err(|e| TransportError::Connection(format!("创建 SSH 会话失败: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| TransportError::Connection(format!("SSH 握手失败: {}", e)))?;
        session
            .userauth_password(login, password)
            .map_err(|e| TransportError::Connection(format!("认证失败: {}", e)))?;
        if !session.authenticated() {
            return Err(TransportError::Connection("认证失败".to_string()));
        }

        let sftp = session
            .sftp()
            .map_err(|e| TransportError::Connection(format!("打开 SFTP 通道失败: {}", e)))?;

        Ok(Self {
            session,
            sftp,
            name: format!("sftp://{}@{}", login, addr),
        })
    }

    fn map_err(path: &str, e: ssh2::Error) -> TransportError {
        match e.code() {
            ErrorCode::SFTP(SFTP_NO_SUCH_FILE) | ErrorCode::SFTP(SFTP_NO_SUCH_PATH) => {
                TransportError::NotFound(path.to_string())
            }
            ErrorCode::SFTP(_) => TransportError::Remote(format!("{}: {}", path, e)),
            ErrorCode::Session(_) => TransportError::Connection(format!("{}: {}", path, e)),
        }
    }

    /// 流复制时的错误：远程侧 io 错误多为连接断开
    fn map_copy_err(path: &str, e: io::Error) -> TransportError {
        match e.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportError::Connection(format!("{}: {}", path, e)),
            _ => TransportError::Remote(format!("{}: {}", path, e)),
        }
    }

    fn read_dir(&self, dir: &str) -> TransportResult<(Vec<String>, Vec<String>)> {
        let entries = self
            .sftp
            .readdir(Path::new(dir))
            .map_err(|e| Self::map_err(dir, e))?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for (path, stat) in entries {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if name == "." || name == ".." {
                continue;
            }
            if stat.is_dir() {
                dirs.push(super::join_remote(dir, &name));
            } else if stat.is_file() {
                files.push(name);
            }
        }
        files.sort();
        Ok((dirs, files))
    }
}

#[async_trait]
impl Transport for SftpTransport {
    async fn put(&self, local: &Path, remote: &str) -> TransportResult<()> {
        let mut source = File::open(local)?;
        let mut target = self
            .sftp
            .create(Path::new(remote))
            .map_err(|e| Self::map_err(remote, e))?;
        let bytes = io::copy(&mut source, &mut target).map_err(|e| Self::map_copy_err(remote, e))?;
        debug!("上传 {:?} -> {} ({} 字节)", local, remote, bytes);
        Ok(())
    }

    async fn get(&self, remote: &str, local: &Path) -> TransportResult<()> {
        let mut source = self
            .sftp
            .open(Path::new(remote))
            .map_err(|e| Self::map_err(remote, e))?;
        let mut target = File::create(local)?;
        let bytes = io::copy(&mut source, &mut target).map_err(|e| Self::map_copy_err(remote, e))?;
        target.sync_all()?;
        debug!("下载 {} -> {:?} ({} 字节)", remote, local, bytes);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> TransportResult<()> {
        // SFTP v3 的 rename 不覆盖目标，先删除
        if self.sftp.stat(Path::new(to)).is_ok() {
            self.sftp
                .unlink(Path::new(to))
                .map_err(|e| Self::map_err(to, e))?;
        }
        self.sftp
            .rename(Path::new(from), Path::new(to), None)
            .map_err(|e| Self::map_err(from, e))
    }

    async fn chmod(&self, remote: &str, mode: u32) -> TransportResult<()> {
        let stat = FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: Some(mode),
            atime: None,
            mtime: None,
        };
        self.sftp
            .setstat(Path::new(remote), stat)
            .map_err(|e| Self::map_err(remote, e))
    }

    async fn stat_size(&self, remote: &str) -> TransportResult<u64> {
        let stat = self
            .sftp
            .stat(Path::new(remote))
            .map_err(|e| Self::map_err(remote, e))?;
        Ok(stat.size.unwrap_or(0))
    }

    fn walk<'a>(&'a self, root: &'a str) -> BoxStream<'a, TransportResult<RemoteDir>> {
        let root = match root.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        stream::unfold(vec![root.to_string()], move |mut pending| async move {
            let dir = pending.pop()?;
            let item = self.read_dir(&dir).map(|(subdirs, files)| {
                pending.extend(subdirs);
                RemoteDir { path: dir, files }
            });
            Some((item, pending))
        })
        .boxed()
    }

    async fn close(&self) -> TransportResult<()> {
        self.session
            .disconnect(None, "seedboxsync done", None)
            .map_err(|e| TransportError::Connection(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
