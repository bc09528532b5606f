//! 过期锁清理
//!
//! 崩溃的会话不会主动释放锁，由这里按锁的年龄统一清理。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::services::lock_manager::sweep_stale;
use crate::store::Store;

/// 清理一次，返回释放的锁数量
pub async fn sweep_once(store: &dyn Store, config: &Config) -> AppResult<usize> {
    let released = sweep_stale(store, config.lock_expiry_moment(Utc::now())).await?;
    if released > 0 {
        info!("🧹 释放了 {} 把过期的题目锁", released);
    } else {
        debug!("没有过期的题目锁");
    }
    Ok(released)
}

/// 后台定期清理
pub fn spawn_janitor(
    store: Arc<dyn Store>,
    config: Config,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(store.as_ref(), &config).await {
                warn!("⚠️ 清理过期锁失败: {}", e);
            }
        }
    })
}
