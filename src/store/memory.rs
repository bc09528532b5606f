//! 内存存储
//!
//! 所有表放在同一把锁后面，每个操作在持锁期间完成，
//! 因此单行读改写和跨表的淘汰操作都是原子的。

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::Store;
use crate::error::{AppResult, StoreError};
use crate::models::{
    AnswerCandidate, CandidateChoice, CandidateId, CandidateStatus, CourseId, CourseUnit,
    IdentityId, NewCourse, NewIdentity, NewQuestion, NewTest, QuestionId, QuestionRecord,
    RetiredIdentity, SessionId, TestId, TestUnit, WorkerIdentity,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    identities: BTreeMap<IdentityId, WorkerIdentity>,
    retired: Vec<RetiredIdentity>,
    subscriptions: BTreeSet<(IdentityId, CourseId)>,
    courses: BTreeMap<CourseId, CourseUnit>,
    tests: BTreeMap<TestId, TestUnit>,
    questions: BTreeMap<QuestionId, QuestionRecord>,
    candidates: BTreeMap<CandidateId, AnswerCandidate>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn question_mut(&mut self, id: QuestionId) -> Result<&mut QuestionRecord, StoreError> {
        self.questions
            .get_mut(&id)
            .ok_or(StoreError::NotFound { table: "questions", id })
    }
}

/// 进程内存储
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_identity(
        &self,
        identity: NewIdentity,
        now: DateTime<Utc>,
    ) -> AppResult<WorkerIdentity> {
        let mut tables = self.tables.lock().await;
        if tables
            .identities
            .values()
            .any(|existing| existing.contact == identity.contact)
        {
            return Err(StoreError::Duplicate {
                table: "identities",
                key: identity.contact,
            }
            .into());
        }
        let id = tables.allocate_id();
        let record = WorkerIdentity {
            id,
            contact: identity.contact,
            credentials: identity.credentials,
            created_at: now,
            reserved_until: DateTime::<Utc>::MIN_UTC,
        };
        tables.identities.insert(id, record.clone());
        Ok(record)
    }

    async fn identity(&self, id: IdentityId) -> AppResult<Option<WorkerIdentity>> {
        Ok(self.tables.lock().await.identities.get(&id).cloned())
    }

    async fn identities(&self) -> AppResult<Vec<WorkerIdentity>> {
        Ok(self.tables.lock().await.identities.values().cloned().collect())
    }

    async fn extend_reservation(
        &self,
        id: IdentityId,
        until: DateTime<Utc>,
    ) -> AppResult<WorkerIdentity> {
        let mut tables = self.tables.lock().await;
        let identity = tables
            .identities
            .get_mut(&id)
            .ok_or(StoreError::NotFound { table: "identities", id })?;
        if until > identity.reserved_until {
            identity.reserved_until = until;
        }
        Ok(identity.clone())
    }

    async fn retire_identity(
        &self,
        id: IdentityId,
        retired_at: DateTime<Utc>,
        deleted_externally: bool,
    ) -> AppResult<RetiredIdentity> {
        let mut tables = self.tables.lock().await;
        let identity = tables
            .identities
            .remove(&id)
            .ok_or(StoreError::NotFound { table: "identities", id })?;

        tables.subscriptions.retain(|(owner, _)| *owner != id);
        for test in tables.tests.values_mut() {
            if test.watcher == Some(id) {
                test.watcher = None;
            }
        }

        let retired = RetiredIdentity::from_identity(&identity, retired_at, deleted_externally);
        tables.retired.push(retired.clone());
        debug!("账号 {} 已移入淘汰表", identity);
        Ok(retired)
    }

    async fn retired_identities(&self) -> AppResult<Vec<RetiredIdentity>> {
        Ok(self.tables.lock().await.retired.clone())
    }

    async fn add_subscription(&self, identity: IdentityId, course: CourseId) -> AppResult<()> {
        self.tables.lock().await.subscriptions.insert((identity, course));
        Ok(())
    }

    async fn is_subscribed(&self, identity: IdentityId, course: CourseId) -> AppResult<bool> {
        Ok(self
            .tables
            .lock()
            .await
            .subscriptions
            .contains(&(identity, course)))
    }

    async fn subscription_counts(&self) -> AppResult<Vec<(IdentityId, usize)>> {
        let tables = self.tables.lock().await;
        let counts = tables
            .identities
            .keys()
            .map(|id| {
                let count = tables
                    .subscriptions
                    .iter()
                    .filter(|(owner, _)| owner == id)
                    .count();
                (*id, count)
            })
            .collect();
        Ok(counts)
    }

    async fn subscribers(&self, course: CourseId) -> AppResult<Vec<IdentityId>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|(_, subscribed)| *subscribed == course)
            .map(|(identity, _)| *identity)
            .collect())
    }

    async fn insert_course(&self, course: NewCourse, now: DateTime<Utc>) -> AppResult<CourseUnit> {
        let mut tables = self.tables.lock().await;
        if tables
            .courses
            .values()
            .any(|existing| existing.publish_id == course.publish_id)
        {
            return Err(StoreError::Duplicate {
                table: "courses",
                key: course.publish_id,
            }
            .into());
        }
        let id = tables.allocate_id();
        let record = CourseUnit {
            id,
            publish_id: course.publish_id,
            title: course.title,
            last_scan_at: DateTime::<Utc>::MIN_UTC,
            created_at: now,
        };
        tables.courses.insert(id, record.clone());
        Ok(record)
    }

    async fn course(&self, id: CourseId) -> AppResult<Option<CourseUnit>> {
        Ok(self.tables.lock().await.courses.get(&id).cloned())
    }

    async fn course_by_publish_id(&self, publish_id: &str) -> AppResult<Option<CourseUnit>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .courses
            .values()
            .find(|course| course.publish_id == publish_id)
            .cloned())
    }

    async fn courses(&self) -> AppResult<Vec<CourseUnit>> {
        Ok(self.tables.lock().await.courses.values().cloned().collect())
    }

    async fn mark_course_scanned(&self, id: CourseId, at: DateTime<Utc>) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let course = tables
            .courses
            .get_mut(&id)
            .ok_or(StoreError::NotFound { table: "courses", id })?;
        course.last_scan_at = at;
        Ok(())
    }

    async fn insert_test(&self, test: NewTest, now: DateTime<Utc>) -> AppResult<TestUnit> {
        let mut tables = self.tables.lock().await;
        if tables
            .tests
            .values()
            .any(|existing| existing.publish_id == test.publish_id)
        {
            return Err(StoreError::Duplicate {
                table: "tests",
                key: test.publish_id,
            }
            .into());
        }
        let id = tables.allocate_id();
        let record = TestUnit {
            id,
            publish_id: test.publish_id,
            title: test.title,
            course_id: test.course_id,
            watcher: None,
            passed_count: 0,
            not_passed_count: 0,
            average_rating: 0,
            last_rating: 0,
            max_rating: 0,
            unsolvable: false,
            questions_count: test.questions_count,
            last_scan_at: DateTime::<Utc>::MIN_UTC,
            created_at: now,
        };
        tables.tests.insert(id, record.clone());
        Ok(record)
    }

    async fn test(&self, id: TestId) -> AppResult<Option<TestUnit>> {
        Ok(self.tables.lock().await.tests.get(&id).cloned())
    }

    async fn test_by_publish_id(&self, publish_id: &str) -> AppResult<Option<TestUnit>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tests
            .values()
            .find(|test| test.publish_id == publish_id)
            .cloned())
    }

    async fn tests(&self) -> AppResult<Vec<TestUnit>> {
        Ok(self.tables.lock().await.tests.values().cloned().collect())
    }

    async fn save_test(&self, test: &TestUnit) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let slot = tables
            .tests
            .get_mut(&test.id)
            .ok_or(StoreError::NotFound { table: "tests", id: test.id })?;
        *slot = test.clone();
        Ok(())
    }

    async fn set_watcher(&self, id: TestId, watcher: Option<IdentityId>) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let test = tables
            .tests
            .get_mut(&id)
            .ok_or(StoreError::NotFound { table: "tests", id })?;
        test.watcher = watcher;
        Ok(())
    }

    async fn insert_question(
        &self,
        question: NewQuestion,
        now: DateTime<Utc>,
    ) -> AppResult<QuestionRecord> {
        let mut tables = self.tables.lock().await;
        if tables
            .questions
            .values()
            .any(|existing| existing.task_id == question.task_id)
        {
            return Err(StoreError::Duplicate {
                table: "questions",
                key: question.task_id.to_string(),
            }
            .into());
        }
        let id = tables.allocate_id();
        let locked_at = question.locked_by.as_ref().map(|_| now);
        let record = QuestionRecord {
            id,
            task_id: question.task_id,
            course_id: question.course_id,
            title: question.title,
            kind: question.kind,
            locked_by: question.locked_by,
            locked_at,
            last_update_at: now,
            created_at: now,
        };
        tables.questions.insert(id, record.clone());
        Ok(record)
    }

    async fn question(&self, id: QuestionId) -> AppResult<Option<QuestionRecord>> {
        Ok(self.tables.lock().await.questions.get(&id).cloned())
    }

    async fn question_by_task_id(&self, task_id: i64) -> AppResult<Option<QuestionRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .questions
            .values()
            .find(|question| question.task_id == task_id)
            .cloned())
    }

    async fn try_lock_question(
        &self,
        id: QuestionId,
        owner: &SessionId,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let question = tables.question_mut(id)?;
        if question.locked_by.is_some() {
            return Ok(false);
        }
        question.locked_by = Some(owner.clone());
        question.locked_at = Some(at);
        Ok(true)
    }

    async fn take_over_question(
        &self,
        id: QuestionId,
        owner: &SessionId,
        locked_before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let question = tables.question_mut(id)?;
        let expired = match question.locked_at {
            Some(locked_at) => locked_at < locked_before,
            None => true,
        };
        if !expired {
            return Ok(false);
        }
        question.locked_by = Some(owner.clone());
        question.locked_at = Some(at);
        Ok(true)
    }

    async fn unlock_question(&self, id: QuestionId, owner: &SessionId) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let question = tables.question_mut(id)?;
        if question.locked_by.as_ref() != Some(owner) {
            return Ok(false);
        }
        question.locked_by = None;
        question.locked_at = None;
        Ok(true)
    }

    async fn unlock_questions_of(&self, owner: &SessionId) -> AppResult<usize> {
        let mut tables = self.tables.lock().await;
        let mut unlocked = 0;
        for question in tables.questions.values_mut() {
            if question.locked_by.as_ref() == Some(owner) {
                question.locked_by = None;
                question.locked_at = None;
                unlocked += 1;
            }
        }
        Ok(unlocked)
    }

    async fn unlock_questions_locked_before(&self, moment: DateTime<Utc>) -> AppResult<usize> {
        let mut tables = self.tables.lock().await;
        let mut unlocked = 0;
        for question in tables.questions.values_mut() {
            if matches!(question.locked_at, Some(locked_at) if locked_at < moment) {
                question.locked_by = None;
                question.locked_at = None;
                unlocked += 1;
            }
        }
        Ok(unlocked)
    }

    async fn touch_question(&self, id: QuestionId, at: DateTime<Utc>) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.question_mut(id)?.last_update_at = at;
        Ok(())
    }

    async fn insert_candidates(
        &self,
        question: QuestionId,
        choices: Vec<CandidateChoice>,
    ) -> AppResult<Vec<AnswerCandidate>> {
        let mut tables = self.tables.lock().await;
        if !tables.questions.contains_key(&question) {
            return Err(StoreError::NotFound { table: "questions", id: question }.into());
        }
        let mut inserted = Vec::with_capacity(choices.len());
        for choice in choices {
            let id = tables.allocate_id();
            let candidate = AnswerCandidate {
                id,
                question_id: question,
                choice,
                status: CandidateStatus::Unknown,
            };
            tables.candidates.insert(id, candidate.clone());
            inserted.push(candidate);
        }
        Ok(inserted)
    }

    async fn candidates(&self, question: QuestionId) -> AppResult<Vec<AnswerCandidate>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .candidates
            .values()
            .filter(|candidate| candidate.question_id == question)
            .cloned()
            .collect())
    }

    async fn set_candidate_status(
        &self,
        id: CandidateId,
        status: CandidateStatus,
    ) -> AppResult<AnswerCandidate> {
        let mut tables = self.tables.lock().await;
        let candidate = tables
            .candidates
            .get_mut(&id)
            .ok_or(StoreError::NotFound { table: "candidates", id })?;
        candidate.status = status;
        Ok(candidate.clone())
    }

    async fn delete_candidates(&self, question: QuestionId) -> AppResult<usize> {
        let mut tables = self.tables.lock().await;
        let before = tables.candidates.len();
        tables
            .candidates
            .retain(|_, candidate| candidate.question_id != question);
        Ok(before - tables.candidates.len())
    }
}
