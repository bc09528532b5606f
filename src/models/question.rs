use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::course::CourseId;
use super::platform::QuestionForm;
use super::session::SessionId;
use crate::error::BusinessError;

pub type QuestionId = i64;
pub type CandidateId = i64;

/// 选项描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    /// 平台上的选项编号
    pub number: u32,
    /// 表单字段名
    pub field: String,
    pub text: String,
}

/// 连线题的左侧条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationItem {
    /// 表单字段名
    pub field: String,
    pub text: String,
    /// 可以匹配的右侧选项
    pub options: Vec<OptionDescriptor>,
}

/// 题型及其选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    /// 单选
    Single(Vec<OptionDescriptor>),
    /// 多选
    Multiple(Vec<OptionDescriptor>),
    /// 连线
    Correlation(Vec<CorrelationItem>),
    /// 填空（无法枚举）
    FreeForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KindTag {
    Single,
    Multiple,
    Correlation,
    FreeForm,
}

/// 平台题型标签
static KIND_TAGS: phf::Map<&'static str, KindTag> = phf::phf_map! {
    "single" => KindTag::Single,
    "multiple" => KindTag::Multiple,
    "correlation" => KindTag::Correlation,
    "matching" => KindTag::Correlation,
    "free" => KindTag::FreeForm,
    "template" => KindTag::FreeForm,
};

impl QuestionKind {
    /// 根据题目表单识别题型
    pub fn from_form(form: &QuestionForm) -> Result<Self, BusinessError> {
        let tag = form.kind_tag.trim().to_lowercase();
        let kind = KIND_TAGS
            .get(tag.as_str())
            .ok_or_else(|| BusinessError::UnknownQuestionKind {
                tag: form.kind_tag.clone(),
            })?;

        let mut options = form.options.clone();
        options.sort_by_key(|option| option.number);

        Ok(match kind {
            KindTag::Single => QuestionKind::Single(options),
            KindTag::Multiple => QuestionKind::Multiple(options),
            KindTag::Correlation => QuestionKind::Correlation(form.items.clone()),
            KindTag::FreeForm => QuestionKind::FreeForm,
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            QuestionKind::Single(_) => "single",
            QuestionKind::Multiple(_) => "multiple",
            QuestionKind::Correlation(_) => "correlation",
            QuestionKind::FreeForm => "free",
        }
    }
}

/// 题目记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: QuestionId,
    /// 平台题目编号（唯一）
    pub task_id: i64,
    pub course_id: CourseId,
    pub title: String,
    pub kind: QuestionKind,
    pub locked_by: Option<SessionId>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_update_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for QuestionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}][{}][{}] {}",
            self.id,
            self.task_id,
            self.kind.tag(),
            crate::utils::logging::truncate_text(&self.title, 60)
        )
    }
}

/// 待写入的新题目
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub task_id: i64,
    pub course_id: CourseId,
    pub title: String,
    pub kind: QuestionKind,
    /// 创建即加锁的会话
    pub locked_by: Option<SessionId>,
}

/// 候选答案的内容
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateChoice {
    /// 选中的选项编号（单选/多选）
    Options(Vec<u32>),
    /// 每个连线条目对应的选项编号，按条目顺序
    Assignment(Vec<u32>),
    /// 填空文本
    Text(String),
}

/// 候选答案状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateStatus {
    Unknown,
    Right,
    Wrong,
}

/// 候选答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCandidate {
    pub id: CandidateId,
    pub question_id: QuestionId,
    pub choice: CandidateChoice,
    pub status: CandidateStatus,
}

impl std::fmt::Display for AnswerCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.choice {
            CandidateChoice::Options(numbers) | CandidateChoice::Assignment(numbers) => {
                let joined: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
                write!(f, "[{}] {}", self.id, joined.join(", "))
            }
            CandidateChoice::Text(text) => write!(f, "[{}] \"{}\"", self.id, text),
        }
    }
}
