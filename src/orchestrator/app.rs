//! 应用主结构 - 编排层
//!
//! ## 职责
//!
//! 1. **组装**：持有存储、平台客户端和各个服务
//! 2. **维护**：账号池调整、课程扫描、监视账号分配
//! 3. **并发尝试**：使用 Semaphore 限制同时进行的尝试数量
//! 4. **统计**：汇总每次尝试的结果

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::clients::{MailboxPool, PlatformClient};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::orchestrator::attempt::{AttemptController, AttemptOutcome};
use crate::orchestrator::janitor;
use crate::services::{CourseScan, DiscoveryStats, IdentityPool, PoolAction, WorkScheduler};
use crate::store::Store;
use crate::utils::logging::{log_attempt_summary, log_startup};

/// 尝试统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptStats {
    pub completed: usize,
    pub finalized: usize,
    pub no_work: usize,
    pub already_solved: usize,
    pub deferred: usize,
    pub unsolvable: usize,
    pub failed: usize,
}

impl AttemptStats {
    pub fn total(&self) -> usize {
        self.completed
            + self.no_work
            + self.already_solved
            + self.deferred
            + self.unsolvable
            + self.failed
    }

    fn record(&mut self, result: &AppResult<AttemptOutcome>) {
        match result {
            Ok(AttemptOutcome::Completed { finalized, .. }) => {
                self.completed += 1;
                if *finalized {
                    self.finalized += 1;
                }
            }
            Ok(AttemptOutcome::NoWork) => self.no_work += 1,
            Ok(AttemptOutcome::AlreadySolved) => self.already_solved += 1,
            Ok(AttemptOutcome::Deferred { .. }) => self.deferred += 1,
            Ok(AttemptOutcome::Unsolvable) => self.unsolvable += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// 一轮维护的结果
#[derive(Debug, Clone)]
pub struct MaintenanceReport {
    pub pool: PoolAction,
    pub scan: CourseScan,
    pub assigned: usize,
}

pub struct App {
    config: Config,
    store: Arc<dyn Store>,
    pool: Arc<IdentityPool>,
    scheduler: Arc<WorkScheduler>,
    controller: Arc<AttemptController>,
}

impl App {
    pub fn new(
        store: Arc<dyn Store>,
        platform: Arc<dyn PlatformClient>,
        mailboxes: MailboxPool,
        config: Config,
    ) -> Self {
        log_startup(&config);

        let pool = Arc::new(IdentityPool::new(
            Arc::clone(&store),
            Arc::clone(&platform),
            mailboxes,
            &config,
        ));
        let scheduler = Arc::new(WorkScheduler::new(
            Arc::clone(&store),
            Arc::clone(&platform),
            Arc::clone(&pool),
            &config,
        ));
        let controller = Arc::new(AttemptController::new(
            Arc::clone(&store),
            platform,
            Arc::clone(&pool),
            Arc::clone(&scheduler),
            &config,
        ));

        Self {
            config,
            store,
            pool,
            scheduler,
            controller,
        }
    }

    /// 发现新课程
    pub async fn discover(&self) -> AppResult<DiscoveryStats> {
        self.scheduler.discover_courses().await
    }

    /// 账号池调整、扫描一门课程、分配监视账号
    pub async fn run_maintenance(&self) -> AppResult<MaintenanceReport> {
        let pool = self.pool.run_once().await?;
        let scan = self.scheduler.scan_next_course().await?;
        let assigned = self.scheduler.assign_watchers().await?;
        janitor::sweep_once(self.store.as_ref(), &self.config).await?;

        Ok(MaintenanceReport {
            pool,
            scan,
            assigned,
        })
    }

    /// 并发进行 `count` 次尝试
    pub async fn run_attempts(&self, count: usize) -> AppResult<AttemptStats> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_attempts.max(1)));
        let mut handles = Vec::with_capacity(count);

        for index in 1..=count {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Other(e.to_string()))?;
            let controller = Arc::clone(&self.controller);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let result = controller.attempt().await;
                if let Err(e) = &result {
                    error!("[尝试 {}] ❌ 失败: {}", index, e);
                }
                result
            }));
        }

        let mut stats = AttemptStats::default();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(result) => stats.record(&result),
                Err(e) => {
                    error!("尝试任务异常退出: {}", e);
                    stats.failed += 1;
                }
            }
        }

        log_attempt_summary(&stats);
        info!("✓ 本轮 {} 次尝试结束", stats.total());
        Ok(stats)
    }
}
