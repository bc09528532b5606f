//! 题目锁服务 - 业务能力层
//!
//! 同一道题只允许一个会话编写候选答案。锁是建议性的：
//! 等待超过上限后调用方会绕过锁继续，由调用方重新检查是否已有正确答案。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{QuestionId, SessionId};
use crate::store::Store;

/// `acquire_or_bypass` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// 本会话刚刚加锁
    Acquired,
    /// 本会话早已持有
    AlreadyOwned,
    /// 观察到锁空闲，是否加锁由调用方决定
    Unlocked,
    /// 等待超时，未持有锁
    Bypassed,
}

/// 绑定到一个会话的锁服务
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn Store>,
    owner: SessionId,
    check_interval: Duration,
    max_wait: Duration,
    ttl: chrono::Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn Store>, owner: SessionId, config: &Config) -> Self {
        Self {
            store,
            owner,
            check_interval: config.interval_between_session_check(),
            max_wait: config.max_latency_for_session_checks(),
            ttl: chrono::Duration::minutes(config.lock_ttl_minutes),
        }
    }

    pub fn owner(&self) -> &SessionId {
        &self.owner
    }

    /// 仅在未加锁时加锁
    pub async fn try_acquire(&self, question: QuestionId) -> AppResult<bool> {
        self.store
            .try_lock_question(question, &self.owner, Utc::now())
            .await
    }

    /// 等待其他会话释放锁，超时后绕过
    pub async fn acquire_or_bypass(&self, question: QuestionId) -> AppResult<LockOutcome> {
        let deadline = Instant::now() + self.max_wait;

        loop {
            let record = self.store.question(question).await?;
            match record.and_then(|r| r.locked_by) {
                None => return Ok(LockOutcome::Unlocked),
                Some(owner) if owner == self.owner => return Ok(LockOutcome::AlreadyOwned),
                Some(owner) => {
                    if Instant::now() >= deadline {
                        warn!(
                            "⚠️ 题目 {} 被会话 {} 锁定超过 {:?}，绕过锁继续",
                            question,
                            owner.short(),
                            self.max_wait
                        );
                        return Ok(LockOutcome::Bypassed);
                    }
                    debug!("题目 {} 被会话 {} 锁定，等待中", question, owner.short());
                }
            }
            tokio::time::sleep(self.check_interval).await;
        }
    }

    /// 锁已过期时强制接管
    pub async fn take_over_expired(&self, question: QuestionId) -> AppResult<bool> {
        let now = Utc::now();
        let taken = self
            .store
            .take_over_question(question, &self.owner, now - self.ttl, now)
            .await?;
        if taken {
            warn!("⚠️ 会话 {} 接管了题目 {} 的过期锁", self.owner.short(), question);
        }
        Ok(taken)
    }

    pub async fn release(&self, question: QuestionId) -> AppResult<bool> {
        self.store.unlock_question(question, &self.owner).await
    }

    /// 释放本会话持有的所有锁
    pub async fn release_session(&self) -> AppResult<usize> {
        let released = self.store.unlock_questions_of(&self.owner).await?;
        if released > 0 {
            debug!("会话 {} 释放了 {} 把锁", self.owner.short(), released);
        }
        Ok(released)
    }
}

/// 释放所有早于 `locked_before` 加的锁
pub async fn sweep_stale(store: &dyn Store, locked_before: DateTime<Utc>) -> AppResult<usize> {
    store.unlock_questions_locked_before(locked_before).await
}
