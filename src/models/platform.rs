//! 与平台客户端、临时邮箱交换的数据结构

use serde::{Deserialize, Serialize};

use super::question::{CorrelationItem, OptionDescriptor};

/// 平台登录后的会话句柄（由平台客户端解释）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub String);

/// 课程列表页中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub publish_id: String,
    pub title: String,
    /// 付费等不可用的课程为 false
    pub available: bool,
}

/// 课程菜单中的一个测试
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub publish_id: String,
    pub title: String,
    pub questions_count: u32,
}

/// 提交表单时携带的字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormState {
    pub fields: Vec<(String, String)>,
}

/// 平台返回的一道题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionForm {
    pub task_id: i64,
    pub title: String,
    /// 平台题型标签
    pub kind_tag: String,
    /// 单选/多选的选项
    #[serde(default)]
    pub options: Vec<OptionDescriptor>,
    /// 连线题条目
    #[serde(default)]
    pub items: Vec<CorrelationItem>,
    /// 表单中的隐藏字段，原样回传
    #[serde(default)]
    pub hidden_fields: Vec<(String, String)>,
}

/// 结果页中的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Correct,
    Incorrect,
}

/// 测试结果页
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsPage {
    /// 题目编号 → 判定
    pub verdicts: Vec<(i64, Verdict)>,
    /// 成绩文本，例如 "75 из 100"
    pub grade_text: String,
    pub passed: bool,
}

impl ResultsPage {
    pub fn verdict_for(&self, task_id: i64) -> Option<Verdict> {
        self.verdicts
            .iter()
            .find(|(id, _)| *id == task_id)
            .map(|(_, verdict)| *verdict)
    }
}

/// 临时邮箱
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub address: String,
    /// 提供该邮箱的服务名
    pub provider: String,
}

/// 邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub body: String,
}
