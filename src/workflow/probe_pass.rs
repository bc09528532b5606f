//! 一次答题过程 - 流程层
//!
//! 核心职责：定义"答一次测试"的完整流程
//!
//! 流程顺序：
//! 1. 开始测试
//! 2. 逐题：识别或登记题目 → 选候选答案 → 提交
//! 3. 读取结果页，核对每道题的判定
//! 4. 释放本会话持有的所有锁（任何路径都执行）

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clients::PlatformClient;
use crate::config::Config;
use crate::error::{AppResult, BusinessError, ProbeError, StoreError};
use crate::models::{
    AnswerCandidate, CandidateStatus, CourseId, NewQuestion, QuestionForm, QuestionKind,
    QuestionRecord, SessionHandle, TestUnit,
};
use crate::services::{LockManager, LockOutcome};
use crate::store::Store;
use crate::workflow::candidates;
use crate::workflow::pass_ctx::PassCtx;
use crate::workflow::reconcile::{self, ProbedAnswer};

/// 一次答题的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    /// 提交过的题目数
    pub probed: usize,
    /// 判定为正确的题目数
    pub right: usize,
    /// 0..=100
    pub grade: u32,
    /// 平台判定是否通过
    pub passed: bool,
}

/// 答题流程
///
/// - 不选题、不登录，只负责把一个已登录的会话带过一次测试
/// - 题目锁由绑定到本会话的 `LockManager` 管理
pub struct ProbePass {
    store: Arc<dyn Store>,
    platform: Arc<dyn PlatformClient>,
    locks: LockManager,
    config: Config,
}

impl ProbePass {
    pub fn new(
        store: Arc<dyn Store>,
        platform: Arc<dyn PlatformClient>,
        locks: LockManager,
        config: &Config,
    ) -> Self {
        Self {
            store,
            platform,
            locks,
            config: config.clone(),
        }
    }

    pub async fn run(
        &self,
        session: &SessionHandle,
        test: &TestUnit,
        ctx: &PassCtx,
    ) -> AppResult<PassOutcome> {
        let result = self.probe(session, test, ctx).await;

        if let Err(e) = self.locks.release_session().await {
            warn!("{} ⚠️ 释放题目锁失败: {}", ctx, e);
        }
        result
    }

    async fn probe(
        &self,
        session: &SessionHandle,
        test: &TestUnit,
        ctx: &PassCtx,
    ) -> AppResult<PassOutcome> {
        info!("{} 📝 开始答题 {}", ctx, test);
        let mut state = self.platform.start_test(session, test).await?;

        let max_iterations = self.config.max_iterations_of_receiving_questions;
        let mut probes: Vec<ProbedAnswer> = Vec::new();
        let mut answered: HashSet<i64> = HashSet::new();
        let mut consecutive_duplicates: u32 = 0;
        let mut iterations: u32 = 0;

        loop {
            iterations += 1;
            if iterations > max_iterations {
                return Err(ProbeError::MaxIterationsExceeded {
                    test: test.publish_id.clone(),
                    iterations: max_iterations,
                }
                .into());
            }

            let Some(form) = self.platform.fetch_next_question(session, &state).await? else {
                break;
            };
            let fetched_at = Instant::now();

            if answered.contains(&form.task_id) {
                consecutive_duplicates += 1;
                let backoff =
                    self.config.latency_step_between_similar_questions() * consecutive_duplicates;
                warn!(
                    "{} ⚠️ 题目 {} 重复出现（连续 {} 次），等待 {:?}",
                    ctx, form.task_id, consecutive_duplicates, backoff
                );
                tokio::time::sleep(backoff).await;
                continue;
            }
            consecutive_duplicates = 0;

            let question = self.resolve_question(&form, test.course_id, ctx).await?;
            let candidate = self.select_candidate(&question, ctx).await?;

            let mut fields = form.hidden_fields.clone();
            fields.extend(candidates::encode(form.task_id, &question.kind, &candidate.choice)?);
            state = self.platform.submit_answer(session, &form, &fields).await?;
            self.store.touch_question(question.id, Utc::now()).await?;

            answered.insert(form.task_id);
            probes.push(ProbedAnswer {
                question,
                candidate,
            });

            self.wait_question_interval(fetched_at).await;
        }

        if probes.len() as u32 != test.questions_count {
            warn!(
                "{} ⚠️ 本次收到 {} 道题，测试声明 {} 道",
                ctx,
                probes.len(),
                test.questions_count
            );
        }

        let results = self.platform.fetch_results_page(session, test).await?;
        let report = reconcile::reconcile(
            self.store.as_ref(),
            &probes,
            &results,
            self.config.eliminate_multiple_choice,
            ctx,
        )
        .await?;
        let grade = reconcile::grade(&report, probes.len(), &results)?;

        info!(
            "{} {} 答题结束: 成绩 {}/100，正确 {}/{}",
            ctx,
            if results.passed { "✅" } else { "❌" },
            grade,
            report.right,
            probes.len()
        );

        Ok(PassOutcome {
            probed: probes.len(),
            right: report.right,
            grade,
            passed: results.passed,
        })
    }

    // ========== 题目 ==========

    /// 查找或登记题目
    ///
    /// 新题目创建时即由本会话加锁；并发登记时落败方读取胜者的记录。
    async fn resolve_question(
        &self,
        form: &QuestionForm,
        course_id: CourseId,
        ctx: &PassCtx,
    ) -> AppResult<QuestionRecord> {
        if let Some(existing) = self.store.question_by_task_id(form.task_id).await? {
            return self.claim_existing(existing, ctx).await;
        }

        let kind = QuestionKind::from_form(form)?;
        let choices = candidates::generate(form.task_id, &kind)?;
        let new_question = NewQuestion {
            task_id: form.task_id,
            course_id,
            title: form.title.clone(),
            kind,
            locked_by: Some(self.locks.owner().clone()),
        };

        match self.store.insert_question(new_question, Utc::now()).await {
            Ok(question) => {
                let created = self.store.insert_candidates(question.id, choices).await?;
                info!(
                    "{} ➕ 新题目 {}，候选答案 {} 个",
                    ctx,
                    question,
                    created.len()
                );
                Ok(question)
            }
            Err(e) if e.is_duplicate() => {
                debug!("{} 题目 {} 已被其他会话登记，读取其记录", ctx, form.task_id);
                let winner = self
                    .store
                    .question_by_task_id(form.task_id)
                    .await?
                    .ok_or(StoreError::NotFound {
                        table: "questions",
                        id: form.task_id,
                    })?;
                self.claim_existing(winner, ctx).await
            }
            Err(e) => Err(e),
        }
    }

    /// 已有题目：等待他人的锁；还没有正确答案时为编写候选答案加锁
    async fn claim_existing(
        &self,
        question: QuestionRecord,
        ctx: &PassCtx,
    ) -> AppResult<QuestionRecord> {
        let outcome = self.locks.acquire_or_bypass(question.id).await?;

        // 绕过锁之后其他会话可能已经找到了正确答案
        let has_right = self
            .store
            .candidates(question.id)
            .await?
            .iter()
            .any(|candidate| candidate.status == CandidateStatus::Right);

        if !has_right && question.kind != QuestionKind::FreeForm {
            let locked = match outcome {
                LockOutcome::Acquired | LockOutcome::AlreadyOwned => true,
                LockOutcome::Unlocked => self.locks.try_acquire(question.id).await?,
                LockOutcome::Bypassed => self.locks.take_over_expired(question.id).await?,
            };
            if !locked {
                warn!("{} ⚠️ 题目 {} 未能加锁，继续编写", ctx, question);
            }
        }

        Ok(self
            .store
            .question(question.id)
            .await?
            .unwrap_or(question))
    }

    // ========== 候选答案 ==========

    /// 优先复用正确答案，否则取第一个未知候选；都没有时重新生成
    async fn select_candidate(
        &self,
        question: &QuestionRecord,
        ctx: &PassCtx,
    ) -> AppResult<AnswerCandidate> {
        let existing = self.store.candidates(question.id).await?;

        if let Some(right) = existing
            .iter()
            .find(|candidate| candidate.status == CandidateStatus::Right)
        {
            debug!("{} 题目 {} 使用已知正确答案 {}", ctx, question, right);
            return Ok(right.clone());
        }
        if let Some(unknown) = existing
            .iter()
            .find(|candidate| candidate.status == CandidateStatus::Unknown)
        {
            debug!("{} 题目 {} 尝试候选答案 {}", ctx, question, unknown);
            return Ok(unknown.clone());
        }

        warn!(
            "{} ⚠️ 题目 {} 没有未知候选答案，删除后重新生成",
            ctx, question
        );
        self.store.delete_candidates(question.id).await?;
        let choices = candidates::generate(question.task_id, &question.kind)?;
        self.store
            .insert_candidates(question.id, choices)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                BusinessError::EmptyCandidateSpace {
                    task_id: question.task_id,
                }
                .into()
            })
    }

    /// 从取题开始计时，保证两题之间的最小间隔
    async fn wait_question_interval(&self, fetched_at: Instant) {
        let interval = self.config.interval_between_questions();
        let elapsed = fetched_at.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        }
    }
}
