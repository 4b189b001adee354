use serde::Serialize;

/// 已上传的种子
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TorrentRecord {
    pub id: i64,
    pub name: String,
    pub announce: String,
    /// 上传时间（Unix 秒）
    pub sent: i64,
}

/// 种子中的单个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentFileEntry {
    /// 相对路径的各级片段
    pub path: Vec<String>,
    pub length: u64,
}

impl TorrentFileEntry {
    pub fn new<S: Into<String>>(path: impl IntoIterator<Item = S>, length: u64) -> Self {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            length,
        }
    }

    /// 数据库中以 / 连接存储
    pub fn joined_path(&self) -> String {
        self.path.join("/")
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TorrentFileRow {
    pub path: String,
    pub length: i64,
}

impl From<TorrentFileRow> for TorrentFileEntry {
    fn from(row: TorrentFileRow) -> Self {
        TorrentFileEntry {
            path: row.path.split('/').map(str::to_string).collect(),
            length: row.length.max(0) as u64,
        }
    }
}

/// 下载记录，finished 为空表示传输未完成
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRecord {
    pub id: i64,
    /// 远程完整路径
    pub path: String,
    pub seedbox_size: u64,
    pub local_size: Option<u64>,
    pub started: i64,
    pub finished: Option<i64>,
}

impl DownloadRecord {
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DownloadRow {
    id: i64,
    path: String,
    seedbox_size: i64,
    local_size: Option<i64>,
    started: i64,
    finished: Option<i64>,
}

impl From<DownloadRow> for DownloadRecord {
    fn from(row: DownloadRow) -> Self {
        DownloadRecord {
            id: row.id,
            path: row.path,
            seedbox_size: row.seedbox_size.max(0) as u64,
            local_size: row.local_size.map(|s| s.max(0) as u64),
            started: row.started,
            finished: row.finished,
        }
    }
}
