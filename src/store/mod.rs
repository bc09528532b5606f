//! 存储层
//!
//! 只要求两种能力：单行原子读改写，以及外部编号上的唯一约束。
//! 并发写入同一个外部编号时，落败方收到 `StoreError::Duplicate`，
//! 由调用方重新读取胜者的记录。

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{
    AnswerCandidate, CandidateChoice, CandidateId, CandidateStatus, CourseId, CourseUnit,
    IdentityId, NewCourse, NewIdentity, NewQuestion, NewTest, QuestionId, QuestionRecord,
    RetiredIdentity, SessionId, TestId, TestUnit, WorkerIdentity,
};

pub use memory::MemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    // ========== 账号 ==========

    /// 写入新账号，联系邮箱唯一
    async fn insert_identity(&self, identity: NewIdentity, now: DateTime<Utc>)
        -> AppResult<WorkerIdentity>;
    async fn identity(&self, id: IdentityId) -> AppResult<Option<WorkerIdentity>>;
    async fn identities(&self) -> AppResult<Vec<WorkerIdentity>>;
    /// 租约只前进不后退：写入 `max(当前值, until)`
    async fn extend_reservation(
        &self,
        id: IdentityId,
        until: DateTime<Utc>,
    ) -> AppResult<WorkerIdentity>;
    /// 复制到审计表、释放订阅和监视关系、删除活跃记录，一次完成
    async fn retire_identity(
        &self,
        id: IdentityId,
        retired_at: DateTime<Utc>,
        deleted_externally: bool,
    ) -> AppResult<RetiredIdentity>;
    async fn retired_identities(&self) -> AppResult<Vec<RetiredIdentity>>;

    // ========== 订阅 ==========

    async fn add_subscription(&self, identity: IdentityId, course: CourseId) -> AppResult<()>;
    async fn is_subscribed(&self, identity: IdentityId, course: CourseId) -> AppResult<bool>;
    /// 账号 → 已订阅课程数量
    async fn subscription_counts(&self) -> AppResult<Vec<(IdentityId, usize)>>;
    async fn subscribers(&self, course: CourseId) -> AppResult<Vec<IdentityId>>;

    // ========== 课程 ==========

    async fn insert_course(&self, course: NewCourse, now: DateTime<Utc>) -> AppResult<CourseUnit>;
    async fn course(&self, id: CourseId) -> AppResult<Option<CourseUnit>>;
    async fn course_by_publish_id(&self, publish_id: &str) -> AppResult<Option<CourseUnit>>;
    async fn courses(&self) -> AppResult<Vec<CourseUnit>>;
    async fn mark_course_scanned(&self, id: CourseId, at: DateTime<Utc>) -> AppResult<()>;

    // ========== 测试 ==========

    async fn insert_test(&self, test: NewTest, now: DateTime<Utc>) -> AppResult<TestUnit>;
    async fn test(&self, id: TestId) -> AppResult<Option<TestUnit>>;
    async fn test_by_publish_id(&self, publish_id: &str) -> AppResult<Option<TestUnit>>;
    async fn tests(&self) -> AppResult<Vec<TestUnit>>;
    /// 整行覆盖写回
    async fn save_test(&self, test: &TestUnit) -> AppResult<()>;
    async fn set_watcher(&self, id: TestId, watcher: Option<IdentityId>) -> AppResult<()>;

    // ========== 题目 ==========

    /// 写入新题目，题目编号唯一
    async fn insert_question(
        &self,
        question: NewQuestion,
        now: DateTime<Utc>,
    ) -> AppResult<QuestionRecord>;
    async fn question(&self, id: QuestionId) -> AppResult<Option<QuestionRecord>>;
    async fn question_by_task_id(&self, task_id: i64) -> AppResult<Option<QuestionRecord>>;
    /// 仅在未加锁时加锁
    async fn try_lock_question(
        &self,
        id: QuestionId,
        owner: &SessionId,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;
    /// 仅在锁早于 `locked_before` 时改由 `owner` 持有
    async fn take_over_question(
        &self,
        id: QuestionId,
        owner: &SessionId,
        locked_before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;
    /// 仅由持有者解锁
    async fn unlock_question(&self, id: QuestionId, owner: &SessionId) -> AppResult<bool>;
    async fn unlock_questions_of(&self, owner: &SessionId) -> AppResult<usize>;
    async fn unlock_questions_locked_before(&self, moment: DateTime<Utc>) -> AppResult<usize>;
    async fn touch_question(&self, id: QuestionId, at: DateTime<Utc>) -> AppResult<()>;

    // ========== 候选答案 ==========

    async fn insert_candidates(
        &self,
        question: QuestionId,
        choices: Vec<CandidateChoice>,
    ) -> AppResult<Vec<AnswerCandidate>>;
    /// 按创建顺序返回
    async fn candidates(&self, question: QuestionId) -> AppResult<Vec<AnswerCandidate>>;
    async fn set_candidate_status(
        &self,
        id: CandidateId,
        status: CandidateStatus,
    ) -> AppResult<AnswerCandidate>;
    async fn delete_candidates(&self, question: QuestionId) -> AppResult<usize>;
}
