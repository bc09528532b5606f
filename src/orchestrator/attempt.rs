//! 单次尝试控制器 - 编排层
//!
//! ## 职责
//!
//! 一次尝试从头到尾：
//!
//! 1. 生成新的会话标识（排队令牌兼题目锁持有者）
//! 2. 排队 → 选题 → 离开队列（任何路径都离开）
//! 3. 登录，确保账号已订阅课程
//! 4. 答题，并把答题中断信号映射为后续动作
//! 5. 记录成绩；原目标测试通过则确认提交，否则重置
//!
//! ## 中断信号的处理
//!
//! - `NeedsPrerequisite`：先答前置测试（不确认提交），再重试原测试一次
//! - `NotSubscribed`：订阅后重试一次
//! - `AlreadySolved`：记录后结束
//! - `TemporarilyUnavailable`：延长账号租约
//! - `Unsolvable`：标记测试不可解
//! - 其他错误：尽量重置测试后向上传递

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use tracing::{error, info, warn};

use crate::clients::PlatformClient;
use crate::config::Config;
use crate::error::{AppError, AppResult, BusinessError, ProbeError};
use crate::models::{SessionHandle, SessionId, TestUnit};
use crate::sequencer::SequencerClient;
use crate::services::{IdentityPool, LockManager, WorkScheduler, WorkSelection};
use crate::store::Store;
use crate::workflow::{PassCtx, PassOutcome, ProbePass};

/// 一次尝试的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// 答题完成
    Completed {
        test: TestUnit,
        outcome: PassOutcome,
        finalized: bool,
    },
    /// 没有可选的测试
    NoWork,
    /// 该账号已经完成过这个测试
    AlreadySolved,
    /// 账号暂时不能答题，租约已延长
    Deferred { cooldown_minutes: u32 },
    /// 测试已标记为不可解
    Unsolvable,
}

/// 一次尝试中只允许各重试一次
#[derive(Debug, Default)]
struct Retries {
    prerequisite: bool,
    subscribe: bool,
}

pub struct AttemptController {
    store: Arc<dyn Store>,
    platform: Arc<dyn PlatformClient>,
    pool: Arc<IdentityPool>,
    scheduler: Arc<WorkScheduler>,
    sequencer: SequencerClient,
    config: Config,
}

impl AttemptController {
    pub fn new(
        store: Arc<dyn Store>,
        platform: Arc<dyn PlatformClient>,
        pool: Arc<IdentityPool>,
        scheduler: Arc<WorkScheduler>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            platform,
            pool,
            scheduler,
            sequencer: SequencerClient::new(config),
            config: config.clone(),
        }
    }

    pub async fn attempt(&self) -> AppResult<AttemptOutcome> {
        let session_id = SessionId::generate();

        let admission = self.sequencer.wait_in_queue(&session_id).await;
        let selection = self.scheduler.select_work().await;
        self.sequencer.leave_queue(&session_id, admission).await;

        let Some(selection) = selection? else {
            return Ok(AttemptOutcome::NoWork);
        };

        let ctx = PassCtx::new(
            session_id.clone(),
            selection.test.id,
            selection.test.publish_id.clone(),
            selection.identity.id,
        );

        let session = self.pool.authenticate(&selection.identity).await.map_err(|e| {
            error!("{} ❌ 登录失败: {}", ctx, e);
            e
        })?;
        self.ensure_subscription(&session, &selection, &ctx).await?;

        let locks = LockManager::new(Arc::clone(&self.store), session_id, &self.config);
        let pass = ProbePass::new(
            Arc::clone(&self.store),
            Arc::clone(&self.platform),
            locks,
            &self.config,
        );

        self.run_target(&pass, &session, &selection, &ctx).await
    }

    async fn ensure_subscription(
        &self,
        session: &SessionHandle,
        selection: &WorkSelection,
        ctx: &PassCtx,
    ) -> AppResult<()> {
        let subscribed = self
            .store
            .is_subscribed(selection.identity.id, selection.course.id)
            .await?;
        if !subscribed {
            info!("{} 账号未订阅课程 {}，先订阅", ctx, selection.course);
            self.subscribe(session, selection).await?;
        }
        Ok(())
    }

    async fn subscribe(&self, session: &SessionHandle, selection: &WorkSelection) -> AppResult<()> {
        self.platform.subscribe(session, &selection.course).await?;
        self.store
            .add_subscription(selection.identity.id, selection.course.id)
            .await
    }

    async fn run_target(
        &self,
        pass: &ProbePass,
        session: &SessionHandle,
        selection: &WorkSelection,
        ctx: &PassCtx,
    ) -> AppResult<AttemptOutcome> {
        let target = &selection.test;
        let mut retries = Retries::default();

        loop {
            let err = match pass.run(session, target, ctx).await {
                Ok(outcome) => {
                    return self
                        .complete(session, selection, target, outcome, true)
                        .await;
                }
                Err(e) => e,
            };

            match err.as_probe().cloned() {
                Some(ProbeError::NeedsPrerequisite {
                    prerequisite_link, ..
                }) if !retries.prerequisite => {
                    retries.prerequisite = true;
                    self.run_prerequisite(pass, session, selection, &prerequisite_link, ctx)
                        .await?;
                    info!("{} 🔁 前置测试完成，重试 {}", ctx, target);
                }
                Some(ProbeError::NotSubscribed { .. }) if !retries.subscribe => {
                    retries.subscribe = true;
                    warn!("{} ⚠️ 账号未订阅课程 {}，订阅后重试", ctx, selection.course);
                    self.subscribe(session, selection).await?;
                }
                Some(signal) => {
                    return self
                        .handle_signal(signal, err, session, selection, target, ctx)
                        .await;
                }
                None => return Err(self.abandon(err, session, target, ctx).await),
            }
        }
    }

    /// 答前置测试；其结果记入统计，但从不确认提交
    async fn run_prerequisite(
        &self,
        pass: &ProbePass,
        session: &SessionHandle,
        selection: &WorkSelection,
        link: &str,
        ctx: &PassCtx,
    ) -> AppResult<()> {
        let prerequisite = match self.find_prerequisite(link).await {
            Ok(test) => test,
            Err(e) => return Err(self.abandon(e, session, &selection.test, ctx).await),
        };
        let prerequisite_ctx = ctx.for_test(prerequisite.id, prerequisite.publish_id.clone());
        info!("{} ↪️ 需要先通过前置测试 {}", ctx, prerequisite);

        match pass.run(session, &prerequisite, &prerequisite_ctx).await {
            Ok(outcome) => {
                self.complete(session, selection, &prerequisite, outcome, false)
                    .await?;
                Ok(())
            }
            Err(e) => Err(self.abandon(e, session, &prerequisite, &prerequisite_ctx).await),
        }
    }

    async fn find_prerequisite(&self, link: &str) -> AppResult<TestUnit> {
        let publish_id = publish_id_from_link(link)?;
        let test = self
            .store
            .test_by_publish_id(&publish_id)
            .await?
            .ok_or(BusinessError::TestNotFound { publish_id })?;
        Ok(test)
    }

    async fn handle_signal(
        &self,
        signal: ProbeError,
        err: AppError,
        session: &SessionHandle,
        selection: &WorkSelection,
        target: &TestUnit,
        ctx: &PassCtx,
    ) -> AppResult<AttemptOutcome> {
        match signal {
            ProbeError::AlreadySolved { .. } => {
                info!("{} ℹ️ {}", ctx, err);
                Ok(AttemptOutcome::AlreadySolved)
            }
            ProbeError::TemporarilyUnavailable { cooldown_minutes } => {
                let lease = chrono::Duration::minutes(
                    cooldown_minutes as i64 + self.config.reserve_buffer_minutes,
                );
                self.pool.extend_lease(selection.identity.id, lease).await?;
                warn!("{} ⚠️ {}，账号租约延长 {} 分钟", ctx, err, lease.num_minutes());
                Ok(AttemptOutcome::Deferred { cooldown_minutes })
            }
            ProbeError::Unsolvable { .. } => {
                let mut test = self.store.test(target.id).await?.unwrap_or_else(|| target.clone());
                test.unsolvable = true;
                test.watcher = None;
                self.store.save_test(&test).await?;
                warn!("{} ⚠️ 测试 {} 标记为不可解", ctx, test);
                Ok(AttemptOutcome::Unsolvable)
            }
            ProbeError::NeedsPrerequisite { .. }
            | ProbeError::NotSubscribed { .. }
            | ProbeError::MaxIterationsExceeded { .. } => {
                Err(self.abandon(err, session, target, ctx).await)
            }
        }
    }

    /// 尽量重置测试，返回原错误
    async fn abandon(
        &self,
        err: AppError,
        session: &SessionHandle,
        test: &TestUnit,
        ctx: &PassCtx,
    ) -> AppError {
        error!("{} ❌ 答题失败: {}", ctx, err);
        if let Err(reset_err) = self.platform.reset(session, test).await {
            warn!("{} ⚠️ 重置测试 {} 失败: {}", ctx, test, reset_err);
        }
        err
    }

    /// 记录成绩，确认提交或重置，租用账号
    async fn complete(
        &self,
        session: &SessionHandle,
        selection: &WorkSelection,
        test: &TestUnit,
        outcome: PassOutcome,
        is_target: bool,
    ) -> AppResult<AttemptOutcome> {
        let mut updated = self.store.test(test.id).await?.unwrap_or_else(|| test.clone());
        updated.update_stats(outcome.passed, outcome.grade, Utc::now());
        self.store.save_test(&updated).await?;

        let finalized = is_target && outcome.passed;
        if finalized {
            self.platform.finalize(session, test).await?;
            info!("📤 测试 {} 已确认提交", test);
        } else {
            self.platform.reset(session, test).await?;
            info!("🔄 测试 {} 已重置，等待下次尝试", test);
        }
        self.pool.reserve(selection.identity.id).await?;

        Ok(AttemptOutcome::Completed {
            test: updated,
            outcome,
            finalized,
        })
    }
}

/// 从链接中取出测试的发布编号
pub fn publish_id_from_link(link: &str) -> AppResult<String> {
    let pattern = Regex::new(r"\d+/\d+/test/\d+/\d+").map_err(|e| AppError::Other(e.to_string()))?;
    pattern
        .find(link)
        .map(|found| found.as_str().to_string())
        .ok_or_else(|| {
            BusinessError::UnparsableLink {
                link: link.to_string(),
            }
            .into()
        })
}
