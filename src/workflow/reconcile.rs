//! 结果核对
//!
//! 根据结果页的判定更新候选答案状态：
//! 错误 → wrong，正确 → right；
//! 对构成划分的题型，排除到只剩一个未知候选时直接认定它正确。

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{AnswerCandidate, CandidateStatus, QuestionRecord, ResultsPage, Verdict};
use crate::store::Store;
use crate::workflow::candidates::supports_elimination;
use crate::workflow::pass_ctx::PassCtx;

/// 本次答题中提交过的一道题
#[derive(Debug, Clone)]
pub struct ProbedAnswer {
    pub question: QuestionRecord,
    pub candidate: AnswerCandidate,
}

/// 核对统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 判定为正确的数量
    pub right: usize,
    /// 判定为错误的数量
    pub wrong: usize,
    /// 结果页中找不到的数量
    pub missing: usize,
    /// 通过排除法认定的数量
    pub inferred: usize,
}

pub async fn reconcile(
    store: &dyn Store,
    probes: &[ProbedAnswer],
    results: &ResultsPage,
    eliminate_multiple_choice: bool,
    ctx: &PassCtx,
) -> AppResult<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for probe in probes {
        let question = &probe.question;
        match results.verdict_for(question.task_id) {
            None => {
                warn!("{} ⚠️ 结果页中没有题目 {}，忽略", ctx, question);
                report.missing += 1;
            }
            Some(Verdict::Correct) => {
                report.right += 1;
                if probe.candidate.status != CandidateStatus::Right {
                    mark_right(store, &probe.candidate, ctx).await?;
                }
                info!("{} ✓ 题目 {} 的答案 {} 正确", ctx, question, probe.candidate);
            }
            Some(Verdict::Incorrect) => {
                report.wrong += 1;
                store
                    .set_candidate_status(probe.candidate.id, CandidateStatus::Wrong)
                    .await?;
                info!("{} ✗ 题目 {} 的答案 {} 错误", ctx, question, probe.candidate);

                if supports_elimination(&question.kind, eliminate_multiple_choice)
                    && eliminate(store, question, ctx).await?
                {
                    report.inferred += 1;
                }
            }
        }
    }

    Ok(report)
}

/// 只剩一个未知候选且没有正确候选时，认定它正确
async fn eliminate(store: &dyn Store, question: &QuestionRecord, ctx: &PassCtx) -> AppResult<bool> {
    let candidates = store.candidates(question.id).await?;
    if candidates
        .iter()
        .any(|candidate| candidate.status == CandidateStatus::Right)
    {
        return Ok(false);
    }

    let mut unknown = candidates
        .iter()
        .filter(|candidate| candidate.status == CandidateStatus::Unknown);
    match (unknown.next(), unknown.next()) {
        (Some(last), None) => {
            debug!("{} 题目 {} 只剩一个未知候选，按排除法认定正确", ctx, question);
            mark_right(store, last, ctx).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// 标记为正确，同题其他正确候选降为错误
pub async fn mark_right(
    store: &dyn Store,
    candidate: &AnswerCandidate,
    ctx: &PassCtx,
) -> AppResult<AnswerCandidate> {
    for sibling in store.candidates(candidate.question_id).await? {
        if sibling.id != candidate.id && sibling.status == CandidateStatus::Right {
            warn!(
                "{} ⚠️ 题目 {} 已有正确答案 {}，改为错误",
                ctx, candidate.question_id, sibling
            );
            store
                .set_candidate_status(sibling.id, CandidateStatus::Wrong)
                .await?;
        }
    }
    store
        .set_candidate_status(candidate.id, CandidateStatus::Right)
        .await
}

/// 成绩：有提交时按正确比例计算，否则读取结果页的成绩文本（0..=100）
pub fn grade(report: &ReconcileReport, probed: usize, results: &ResultsPage) -> AppResult<u32> {
    if probed > 0 {
        let ratio = report.right as f64 / probed as f64;
        return Ok((ratio * 100.0).round() as u32);
    }

    let leading = Regex::new(r"^\s*(\d+)").map_err(|e| AppError::Other(e.to_string()))?;
    leading
        .captures(&results.grade_text)
        .and_then(|captures| captures[1].parse::<u32>().ok())
        .filter(|grade| *grade <= 100)
        .ok_or_else(|| {
            AppError::unexpected_page(
                "fetch_results_page",
                format!("无法解析成绩 \"{}\"", results.grade_text),
            )
        })
}
