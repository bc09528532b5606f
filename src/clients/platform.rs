//! 平台客户端接口
//!
//! 页面抓取和会话细节由实现方负责，这里只约定答题引擎需要的能力。
//! 平台给出的状态信号（需要前置测试、未订阅、已完成等）
//! 以 `AppError::Probe` 返回。

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{
    CourseUnit, Credentials, FormState, ListingEntry, MailMessage, MenuEntry, QuestionForm,
    ResultsPage, SessionHandle, TestUnit, WorkerIdentity,
};

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// 课程列表的第 `page` 页，空列表表示已到末尾
    async fn fetch_listing_page(&self, page: u32) -> AppResult<Vec<ListingEntry>>;

    /// 用临时邮箱注册新账号
    async fn register(&self, contact: &str, credentials: &Credentials) -> AppResult<()>;

    /// 识别并处理确认邮件，不是确认邮件时返回 false
    async fn confirm_registration(&self, message: &MailMessage) -> AppResult<bool>;

    /// 登录
    ///
    /// 账号在平台上已不存在时返回 `PlatformError::AuthenticationFailed { revoked: true, .. }`
    async fn authenticate(&self, identity: &WorkerIdentity) -> AppResult<SessionHandle>;

    /// 在平台上删除当前登录的账号
    async fn delete_identity(&self, session: &SessionHandle) -> AppResult<()>;

    async fn subscribe(&self, session: &SessionHandle, course: &CourseUnit) -> AppResult<()>;

    async fn fetch_course_menu(
        &self,
        session: &SessionHandle,
        course: &CourseUnit,
    ) -> AppResult<Vec<MenuEntry>>;

    /// 开始一次测试，返回首个表单状态
    async fn start_test(&self, session: &SessionHandle, test: &TestUnit) -> AppResult<FormState>;

    /// 下一道题，`None` 表示题目已经答完
    async fn fetch_next_question(
        &self,
        session: &SessionHandle,
        state: &FormState,
    ) -> AppResult<Option<QuestionForm>>;

    /// 提交答案字段，返回新的表单状态
    async fn submit_answer(
        &self,
        session: &SessionHandle,
        question: &QuestionForm,
        fields: &[(String, String)],
    ) -> AppResult<FormState>;

    async fn fetch_results_page(
        &self,
        session: &SessionHandle,
        test: &TestUnit,
    ) -> AppResult<ResultsPage>;

    /// 确认提交成绩
    async fn finalize(&self, session: &SessionHandle, test: &TestUnit) -> AppResult<()>;

    /// 放弃本次结果，让测试可以重新作答
    async fn reset(&self, session: &SessionHandle, test: &TestUnit) -> AppResult<()>;
}
