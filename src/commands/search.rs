//! 查询命令：最近上传、最近下载、下载进度

use super::{print_json, OutputFormat};
use crate::config::AppConfig;
use crate::core::{pending_progress, PendingDownload};
use crate::db::{DownloadRecord, Store, TorrentRecord};
use crate::error::SyncError;
use std::fmt::Write as _;

/// 表格中路径最多显示的字符数（保留末尾）
const PATH_DISPLAY_CHARS: usize = 100;

/// 查询类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchQuery {
    Uploaded,
    Downloaded,
    Progress,
}

pub async fn run_search(
    config: &AppConfig,
    query: SearchQuery,
    limit: u32,
    format: OutputFormat,
) -> Result<(), SyncError> {
    let store = Store::open(&config.local.db_file).await?;
    let result = search(&store, config, query, limit, format).await;
    store.close().await;
    result
}

async fn search(
    store: &Store,
    config: &AppConfig,
    query: SearchQuery,
    limit: u32,
    format: OutputFormat,
) -> Result<(), SyncError> {
    // 取最近的 N 条，按时间正序显示
    match query {
        SearchQuery::Uploaded => {
            let mut rows = store.list_uploads(Some(limit)).await?;
            rows.reverse();
            match format {
                OutputFormat::Json => print_json(&rows)?,
                OutputFormat::Table => print!("{}", uploads_table(&rows)),
            }
        }
        SearchQuery::Downloaded => {
            let mut rows = store.list_completed_downloads(Some(limit)).await?;
            rows.reverse();
            match format {
                OutputFormat::Json => print_json(&rows)?,
                OutputFormat::Table => print!("{}", downloads_table(&rows)),
            }
        }
        SearchQuery::Progress => {
            let now = chrono::Utc::now().timestamp();
            let mut rows = pending_progress(store, config, Some(limit), now).await?;
            for row in rows.iter().filter(|r| r.partial_size.is_none()) {
                tracing::warn!("未找到本地临时文件: {}", row.record.path);
            }
            rows.reverse();
            match format {
                OutputFormat::Json => print_json(&rows)?,
                OutputFormat::Table => print!("{}", progress_table(&rows)),
            }
        }
    }
    Ok(())
}

fn uploads_table(rows: &[TorrentRecord]) -> String {
    let mut out = format!("{:>6}  {:<19}  NAME\n", "ID", "SENT");
    for row in rows {
        let _ = writeln!(out, "{:>6}  {:<19}  {}", row.id, format_time(row.sent), row.name);
    }
    out
}

fn downloads_table(rows: &[DownloadRecord]) -> String {
    let mut out = format!("{:>6}  {:<19}  {:>10}  PATH\n", "ID", "FINISHED", "SIZE");
    for row in rows {
        let finished = row.finished.map(format_time).unwrap_or_default();
        let size = row.local_size.map(format_bytes).unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>6}  {:<19}  {:>10}  {}",
            row.id,
            finished,
            size,
            tail(&row.path, PATH_DISPLAY_CHARS)
        );
    }
    out
}

fn progress_table(rows: &[PendingDownload]) -> String {
    let mut out = format!(
        "{:>6}  {:<19}  {:>10}  {:>5}  {:>8}  PATH\n",
        "ID", "STARTED", "SIZE", "PROG", "ETA"
    );
    for row in rows {
        let eta = row
            .progress
            .eta_minutes
            .map(|m| format!("{m} mn"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>6}  {:<19}  {:>10}  {:>5}  {:>8}  {}",
            row.record.id,
            format_time(row.record.started),
            format_bytes(row.record.seedbox_size),
            format!("{}%", row.progress.percent),
            eta,
            tail(&row.record.path, PATH_DISPLAY_CHARS)
        );
    }
    out
}

fn format_time(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| ts.to_string())
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes as f64;
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

/// 保留字符串末尾的 `max` 个字符
fn tail(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
