pub mod models;
pub use models::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
pub use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// 本地状态库：记录上传的种子和下载的文件，用于去重和查询
#[derive(Clone)]
pub struct Store {
    db: SqlitePool,
}

impl Store {
    /// 打开（或创建）数据库并执行迁移
    pub async fn open(db_file: &Path) -> Result<Self, crate::error::SyncError> {
        if let Some(parent) = db_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_file)
            .create_if_missing(true)
            .foreign_keys(true);

        // 同一时间只有一个任务写入，连接数不需要太多
        let db = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        debug!("打开数据库: {:?}", db_file);
        Self::from_pool(db).await
    }

    /// 内存数据库，仅用于测试和临时查询
    pub async fn in_memory() -> Result<Self, crate::error::SyncError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(db).await
    }

    async fn from_pool(db: SqlitePool) -> Result<Self, crate::error::SyncError> {
        sqlx::migrate!("./migrations").run(&db).await?;
        Ok(Self { db })
    }

    /// 在单个事务中写入种子及其文件列表
    pub async fn record_upload(
        &self,
        name: &str,
        announce: &str,
        files: &[TorrentFileEntry],
    ) -> Result<i64, sqlx::Error> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.db.begin().await?;

        let torrent_id = sqlx::query("INSERT INTO torrent (name, announce, sent) VALUES (?, ?, ?)")
            .bind(name)
            .bind(announce)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for file in files {
            let path = file.joined_path();
            debug!("种子文件: {} \"{}\" {}o", torrent_id, path, file.length);
            sqlx::query("INSERT INTO torrent_file (torrent_id, path, length) VALUES (?, ?, ?)")
                .bind(torrent_id)
                .bind(&path)
                .bind(file.length as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(torrent_id)
    }

    /// 是否已存在该路径的完成记录
    pub async fn has_completed_download(&self, path: &str) -> Result<bool, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM download WHERE path = ? AND finished IS NOT NULL",
        )
        .bind(path)
        .fetch_one(&self.db)
        .await?;
        Ok(count > 0)
    }

    /// 开始下载，插入未完成记录并返回 id
    pub async fn begin_download(&self, path: &str, seedbox_size: u64) -> Result<i64, sqlx::Error> {
        let now = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("INSERT INTO download (path, seedbox_size, started) VALUES (?, ?, ?)")
                .bind(path)
                .bind(seedbox_size as i64)
                .bind(now)
                .execute(&self.db)
                .await?;
        Ok(result.last_insert_rowid())
    }

    /// 标记下载完成
    pub async fn complete_download(&self, id: i64, local_size: u64) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE download SET finished = ?, local_size = ? WHERE id = ?")
            .bind(now)
            .bind(local_size as i64)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// 最近上传的种子，新的在前
    pub async fn list_uploads(&self, limit: Option<u32>) -> Result<Vec<TorrentRecord>, sqlx::Error> {
        sqlx::query_as::<_, TorrentRecord>(
            "SELECT id, name, announce, sent FROM torrent ORDER BY sent DESC, id DESC LIMIT ?",
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.db)
        .await
    }

    /// 种子包含的文件，按写入顺序
    pub async fn list_torrent_files(
        &self,
        torrent_id: i64,
    ) -> Result<Vec<TorrentFileEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TorrentFileRow>(
            "SELECT path, length FROM torrent_file WHERE torrent_id = ? ORDER BY id ASC",
        )
        .bind(torrent_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// 最近完成的下载，新的在前
    pub async fn list_completed_downloads(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<DownloadRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, DownloadRow>(
            "SELECT * FROM download WHERE finished IS NOT NULL ORDER BY finished DESC, id DESC LIMIT ?",
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// 未完成的下载，新的在前
    pub async fn list_pending_downloads(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<DownloadRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, DownloadRow>(
            "SELECT * FROM download WHERE finished IS NULL ORDER BY started DESC, id DESC LIMIT ?",
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.db.close().await;
    }
}

/// SQLite 中 LIMIT -1 表示不限制
fn sql_limit(limit: Option<u32>) -> i64 {
    limit.map_or(-1, i64::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_upload_stores_entries_in_order() {
        let store = Store::in_memory().await.unwrap();
        let files = vec![
            TorrentFileEntry::new(["Show", "e1.mkv"], 1000),
            TorrentFileEntry::new(["Show", "e2.mkv"], 2000),
        ];

        let id = store
            .record_upload("show.torrent", "tracker://x", &files)
            .await
            .unwrap();

        let uploads = store.list_uploads(None).await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].id, id);
        assert_eq!(uploads[0].name, "show.torrent");
        assert_eq!(uploads[0].announce, "tracker://x");
        assert_eq!(store.list_torrent_files(id).await.unwrap(), files);
    }

    #[tokio::test]
    async fn test_completed_only_after_complete_download() {
        let store = Store::in_memory().await.unwrap();
        let path = "/files/s1/e1.mkv";

        assert!(!store.has_completed_download(path).await.unwrap());
        let id = store.begin_download(path, 1000).await.unwrap();
        assert!(!store.has_completed_download(path).await.unwrap());
        assert_eq!(store.list_pending_downloads(None).await.unwrap().len(), 1);

        store.complete_download(id, 1000).await.unwrap();
        assert!(store.has_completed_download(path).await.unwrap());
        assert!(store.list_pending_downloads(None).await.unwrap().is_empty());

        let done = store.list_completed_downloads(None).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].local_size, Some(1000));
        assert!(done[0].is_finished());
    }

    #[tokio::test]
    async fn test_failed_attempt_leaves_orphan_pending_record() {
        let store = Store::in_memory().await.unwrap();
        let path = "/files/movie.mkv";

        store.begin_download(path, 10).await.unwrap();
        let retry = store.begin_download(path, 10).await.unwrap();
        store.complete_download(retry, 10).await.unwrap();

        assert!(store.has_completed_download(path).await.unwrap());
        let pending = store.list_pending_downloads(None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, path);
    }

    #[tokio::test]
    async fn test_second_completed_record_for_same_path_rejected() {
        let store = Store::in_memory().await.unwrap();
        let first = store.begin_download("/files/a", 1).await.unwrap();
        store.complete_download(first, 1).await.unwrap();

        let second = store.begin_download("/files/a", 1).await.unwrap();
        assert!(store.complete_download(second, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_list_limit_and_order() {
        let store = Store::in_memory().await.unwrap();
        for name in ["a.torrent", "b.torrent", "c.torrent"] {
            store.record_upload(name, "", &[]).await.unwrap();
        }

        let uploads = store.list_uploads(Some(2)).await.unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].name, "c.torrent");
        assert_eq!(uploads[1].name, "b.torrent");
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_file = dir.path().join("nested").join("seedboxsync.db");

        let store = Store::open(&db_file).await.unwrap();
        store.begin_download("/files/x", 1).await.unwrap();
        store.close().await;

        assert!(db_file.exists());
        let reopened = Store::open(&db_file).await.unwrap();
        assert_eq!(reopened.list_pending_downloads(None).await.unwrap().len(), 1);
    }
}
