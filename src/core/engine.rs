use crate::config::AppConfig;
use crate::core::task::{SyncContext, SyncReport, SyncTask};
use crate::db::Store;
use crate::error::SyncError;
use crate::lock::LockGuard;
use std::sync::Arc;
use tracing::{debug, error, info};

/// 同步引擎：加锁、建立连接、打开数据库、运行任务、清理
pub struct SyncEngine {
    config: Arc<AppConfig>,
}

impl SyncEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行同步任务。任务已在运行时返回 `AlreadyRunning`，此时不会触碰锁文件
    pub async fn run<T: SyncTask>(&self, task: &T) -> Result<SyncReport, SyncError> {
        let kind = task.kind();

        // 协议错误在加锁前暴露
        crate::transport::check_protocol(&self.config.seedbox)?;

        let lock = LockGuard::acquire(kind, self.config.pid.path_for(kind))?;
        // 之后的任何返回路径都会释放锁
        let _lock = scopeguard::guard(lock, LockGuard::release);

        if !task.has_work(&self.config)? {
            return Ok(SyncReport::new(kind).finish());
        }

        let transport = match crate::transport::create_transport(&self.config.seedbox).await {
            Ok(t) => t,
            Err(e) => {
                error!("连接失败: {}", e);
                return Err(e);
            }
        };
        debug!("传输已建立: {}", transport.name());

        let store = match Store::open(&self.config.local.db_file).await {
            Ok(s) => s,
            Err(e) => {
                let _ = transport.close().await;
                return Err(e);
            }
        };

        let ctx = SyncContext::new(self.config.clone(), transport, store);
        let result = task.run(&ctx).await;
        ctx.shutdown().await;

        match &result {
            Ok(report) => info!("{}", report),
            Err(e) => error!("{} 任务失败: {}", kind, e),
        }
        result
    }
}
