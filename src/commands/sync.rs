//! 同步命令

use super::{print_json, OutputFormat};
use crate::config::AppConfig;
use crate::core::{BlackholeSync, DownloadSync, SyncEngine, SyncReport, TaskKind};
use crate::error::SyncError;

/// 运行一次同步任务
pub async fn run_sync(config: AppConfig, kind: TaskKind) -> Result<SyncReport, SyncError> {
    let engine = SyncEngine::new(config);
    match kind {
        TaskKind::Blackhole => engine.run(&BlackholeSync).await,
        TaskKind::Download => engine.run(&DownloadSync).await,
    }
}

/// 表格模式下保持静默（适合 cron），结果只写日志
pub fn render_report(report: &SyncReport, format: OutputFormat) -> Result<(), SyncError> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_config;
    use std::fs;

    #[tokio::test]
    async fn test_run_blackhole_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        for sub in ["local/watch", "remote/tmp", "remote/watch"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        fs::write(
            dir.path().join("local/watch/a.torrent"),
            b"d8:announce11:tracker://x4:infod6:lengthi1000e4:name5:a.mkvee",
        )
        .unwrap();

        let report = run_sync(config.clone(), TaskKind::Blackhole).await.unwrap();

        assert_eq!(report.task, TaskKind::Blackhole);
        assert_eq!(report.files_copied, 1);
        assert!(!dir.path().join("local/watch/a.torrent").exists());
        assert!(!config.pid.blackhole_path.exists());
        assert!(config.local.db_file.exists());
    }

    #[tokio::test]
    async fn test_empty_blackhole_does_not_open_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::create_dir_all(&config.local.watch_path).unwrap();

        let report = run_sync(config.clone(), TaskKind::Blackhole).await.unwrap();

        assert_eq!(report.files_scanned, 0);
        assert!(!config.local.db_file.exists());
        assert!(!config.pid.blackhole_path.exists());
    }
}
