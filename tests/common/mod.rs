//! 测试用的平台与临时邮箱
//!
//! `FakePlatform` 按脚本出题，按预设的正确答案给出判定，
//! 并记录确认提交、重置、订阅等调用。

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use answer_prober::clients::{MailboxProvider, PlatformClient};
use answer_prober::config::Config;
use answer_prober::error::{AppResult, PlatformError, ProbeError};
use answer_prober::models::{
    CourseUnit, Credentials, FormState, ListingEntry, MailMessage, Mailbox, MenuEntry,
    NewCourse, NewIdentity, NewTest, OptionDescriptor, QuestionForm, ResultsPage, SessionHandle,
    TestUnit, Verdict, WorkerIdentity,
};
use answer_prober::store::{MemoryStore, Store};

/// 测试中不等待的配置
pub fn fast_config() -> Config {
    Config {
        interval_between_questions_secs: 0,
        latency_step_between_similar_questions_secs: 0,
        max_latency_for_out_of_sync_secs: 0,
        mailbox_poll_interval_secs: 0,
        ..Config::default()
    }
}

pub fn single_question(task_id: i64, options: u32) -> QuestionForm {
    choice_question(task_id, "single", options)
}

pub fn choice_question(task_id: i64, kind_tag: &str, options: u32) -> QuestionForm {
    QuestionForm {
        task_id,
        title: format!("Question {}", task_id),
        kind_tag: kind_tag.to_string(),
        options: (1..=options)
            .map(|number| OptionDescriptor {
                number,
                field: format!("variant_{}", number),
                text: format!("option {}", number),
            })
            .collect(),
        items: Vec::new(),
        hidden_fields: vec![("form_build_id".to_string(), format!("form-{}", task_id))],
    }
}

/// 单选题正确答案对应的提交字段
pub fn single_answer(number: u32) -> Vec<(String, String)> {
    vec![("variant".to_string(), number.to_string())]
}

#[derive(Default)]
struct ScriptedTest {
    questions: Vec<QuestionForm>,
    correct: HashMap<i64, Vec<(String, String)>>,
    start_errors: VecDeque<ProbeError>,
    grade_text: String,
    cursor: usize,
    submitted: Vec<(i64, Vec<(String, String)>)>,
}

#[derive(Default)]
struct PlatformState {
    listing: Vec<Vec<ListingEntry>>,
    menus: HashMap<String, Vec<MenuEntry>>,
    tests: HashMap<String, ScriptedTest>,
    revoked: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
    mail: Option<Arc<FakeMailbox>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册时向该邮箱服务投递确认邮件
    pub fn delivering_to(mail: Arc<FakeMailbox>) -> Self {
        Self {
            state: Mutex::default(),
            mail: Some(mail),
        }
    }

    pub fn set_listing(&self, pages: Vec<Vec<ListingEntry>>) {
        self.state.lock().unwrap().listing = pages;
    }

    pub fn set_menu(&self, course_publish_id: &str, menu: Vec<MenuEntry>) {
        self.state
            .lock()
            .unwrap()
            .menus
            .insert(course_publish_id.to_string(), menu);
    }

    /// 设置测试的题目顺序（可以重复以模拟重放）与正确答案
    pub fn script_test(
        &self,
        publish_id: &str,
        questions: Vec<QuestionForm>,
        correct: Vec<(i64, Vec<(String, String)>)>,
    ) {
        let mut state = self.state.lock().unwrap();
        let test = state.tests.entry(publish_id.to_string()).or_default();
        test.questions = questions;
        test.correct = correct.into_iter().collect();
    }

    pub fn set_grade_text(&self, publish_id: &str, grade_text: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .tests
            .entry(publish_id.to_string())
            .or_default()
            .grade_text = grade_text.to_string();
    }

    /// 下一次开始该测试时返回的信号
    pub fn fail_start_with(&self, publish_id: &str, signal: ProbeError) {
        let mut state = self.state.lock().unwrap();
        state
            .tests
            .entry(publish_id.to_string())
            .or_default()
            .start_errors
            .push_back(signal);
    }

    pub fn revoke(&self, login: &str) {
        self.state.lock().unwrap().revoked.insert(login.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn submissions(&self, publish_id: &str) -> Vec<(i64, Vec<(String, String)>)> {
        let state = self.state.lock().unwrap();
        state
            .tests
            .get(publish_id)
            .map(|test| test.submitted.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn publish_id_of(state: &FormState) -> String {
    state
        .fields
        .iter()
        .find(|(name, _)| name == "test")
        .map(|(_, value)| value.clone())
        .unwrap_or_default()
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn fetch_listing_page(&self, page: u32) -> AppResult<Vec<ListingEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state.listing.get(page as usize).cloned().unwrap_or_default())
    }

    async fn register(&self, contact: &str, _credentials: &Credentials) -> AppResult<()> {
        self.record(format!("register:{}", contact));
        if let Some(mail) = &self.mail {
            mail.deliver(
                contact,
                MailMessage {
                    id: format!("confirm-{}", contact),
                    subject: "Please confirm registration".to_string(),
                    body: "reg_confirm link".to_string(),
                },
            );
        }
        Ok(())
    }

    async fn confirm_registration(&self, message: &MailMessage) -> AppResult<bool> {
        Ok(message.subject.contains("confirm"))
    }

    async fn authenticate(&self, identity: &WorkerIdentity) -> AppResult<SessionHandle> {
        let login = &identity.credentials.login;
        if self.state.lock().unwrap().revoked.contains(login) {
            return Err(PlatformError::AuthenticationFailed {
                identity: identity.to_string(),
                revoked: true,
                reason: "profile deleted".to_string(),
            }
            .into());
        }
        Ok(SessionHandle(format!("session-{}", login)))
    }

    async fn delete_identity(&self, session: &SessionHandle) -> AppResult<()> {
        self.record(format!("delete:{}", session.0));
        Ok(())
    }

    async fn subscribe(&self, _session: &SessionHandle, course: &CourseUnit) -> AppResult<()> {
        self.record(format!("subscribe:{}", course.publish_id));
        Ok(())
    }

    async fn fetch_course_menu(
        &self,
        _session: &SessionHandle,
        course: &CourseUnit,
    ) -> AppResult<Vec<MenuEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state.menus.get(&course.publish_id).cloned().unwrap_or_default())
    }

    async fn start_test(&self, _session: &SessionHandle, test: &TestUnit) -> AppResult<FormState> {
        let mut state = self.state.lock().unwrap();
        let scripted = state.tests.entry(test.publish_id.clone()).or_default();
        if let Some(signal) = scripted.start_errors.pop_front() {
            return Err(signal.into());
        }
        scripted.cursor = 0;
        scripted.submitted.clear();
        Ok(FormState {
            fields: vec![("test".to_string(), test.publish_id.clone())],
        })
    }

    async fn fetch_next_question(
        &self,
        _session: &SessionHandle,
        form_state: &FormState,
    ) -> AppResult<Option<QuestionForm>> {
        let mut state = self.state.lock().unwrap();
        let Some(scripted) = state.tests.get_mut(&publish_id_of(form_state)) else {
            return Ok(None);
        };
        let next = scripted.questions.get(scripted.cursor).cloned();
        scripted.cursor += 1;
        Ok(next)
    }

    async fn submit_answer(
        &self,
        _session: &SessionHandle,
        question: &QuestionForm,
        fields: &[(String, String)],
    ) -> AppResult<FormState> {
        let mut state = self.state.lock().unwrap();
        let publish_id = state
            .tests
            .iter()
            .find(|(_, scripted)| scripted.questions.iter().any(|q| q.task_id == question.task_id))
            .map(|(publish_id, _)| publish_id.clone())
            .unwrap_or_default();
        let answer: Vec<(String, String)> = fields
            .iter()
            .filter(|field| !question.hidden_fields.contains(field))
            .cloned()
            .collect();
        if let Some(scripted) = state.tests.get_mut(&publish_id) {
            scripted.submitted.push((question.task_id, answer));
        }
        Ok(FormState {
            fields: vec![("test".to_string(), publish_id)],
        })
    }

    async fn fetch_results_page(
        &self,
        _session: &SessionHandle,
        test: &TestUnit,
    ) -> AppResult<ResultsPage> {
        let state = self.state.lock().unwrap();
        let Some(scripted) = state.tests.get(&test.publish_id) else {
            return Ok(ResultsPage::default());
        };

        let verdicts: Vec<(i64, Verdict)> = scripted
            .submitted
            .iter()
            .map(|(task_id, answer)| {
                let verdict = if scripted.correct.get(task_id) == Some(answer) {
                    Verdict::Correct
                } else {
                    Verdict::Incorrect
                };
                (*task_id, verdict)
            })
            .collect();
        let right = verdicts
            .iter()
            .filter(|(_, verdict)| *verdict == Verdict::Correct)
            .count();
        let passed = if verdicts.is_empty() {
            !scripted.grade_text.is_empty()
        } else {
            right * 100 / verdicts.len() >= 60
        };

        Ok(ResultsPage {
            verdicts,
            grade_text: scripted.grade_text.clone(),
            passed,
        })
    }

    async fn finalize(&self, _session: &SessionHandle, test: &TestUnit) -> AppResult<()> {
        self.record(format!("finalize:{}", test.publish_id));
        Ok(())
    }

    async fn reset(&self, _session: &SessionHandle, test: &TestUnit) -> AppResult<()> {
        self.record(format!("reset:{}", test.publish_id));
        Ok(())
    }
}

/// 临时邮箱服务
#[derive(Default)]
pub struct FakeMailbox {
    issued: AtomicUsize,
    inboxes: Mutex<HashMap<String, Vec<MailMessage>>>,
    destroyed: Mutex<Vec<String>>,
}

impl FakeMailbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliver(&self, address: &str, message: MailMessage) {
        self.inboxes
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push(message);
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailboxProvider for FakeMailbox {
    fn name(&self) -> &str {
        "fake-mail"
    }

    async fn provision(&self) -> AppResult<Mailbox> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(Mailbox {
            address: format!("user{}@fake.mail", n),
            provider: self.name().to_string(),
        })
    }

    async fn poll(&self, mailbox: &Mailbox) -> AppResult<Vec<MailMessage>> {
        let inboxes = self.inboxes.lock().unwrap();
        Ok(inboxes.get(&mailbox.address).cloned().unwrap_or_default())
    }

    async fn destroy(&self, mailbox: &Mailbox) -> AppResult<()> {
        self.destroyed.lock().unwrap().push(mailbox.address.clone());
        Ok(())
    }
}

// ========== 数据准备 ==========

pub async fn seed_identity(store: &MemoryStore, contact: &str, created_at: DateTime<Utc>) -> WorkerIdentity {
    store
        .insert_identity(
            NewIdentity {
                contact: contact.to_string(),
                credentials: Credentials {
                    login: contact.to_string(),
                    password: "password".to_string(),
                },
            },
            created_at,
        )
        .await
        .unwrap()
}

pub async fn seed_course(store: &MemoryStore, publish_id: &str) -> CourseUnit {
    store
        .insert_course(
            NewCourse {
                publish_id: publish_id.to_string(),
                title: format!("Course {}", publish_id),
            },
            Utc::now(),
        )
        .await
        .unwrap()
}

pub async fn seed_test(
    store: &MemoryStore,
    course: &CourseUnit,
    publish_id: &str,
    questions_count: u32,
) -> TestUnit {
    store
        .insert_test(
            NewTest {
                publish_id: publish_id.to_string(),
                title: format!("Test {}", publish_id),
                course_id: course.id,
                questions_count,
            },
            Utc::now(),
        )
        .await
        .unwrap()
}
