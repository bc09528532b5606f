use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::IdentityId;

pub type CourseId = i64;
pub type TestId = i64;

/// 课程
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseUnit {
    pub id: CourseId,
    /// 平台发布编号（唯一）
    pub publish_id: String,
    pub title: String,
    pub last_scan_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for CourseUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}][{}] {}", self.id, self.publish_id, self.title)
    }
}

/// 待写入的新课程
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub publish_id: String,
    pub title: String,
}

/// 测试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestUnit {
    pub id: TestId,
    /// 平台发布编号（唯一）
    pub publish_id: String,
    pub title: String,
    pub course_id: CourseId,
    /// 负责持续答题的账号
    pub watcher: Option<IdentityId>,
    pub passed_count: u32,
    pub not_passed_count: u32,
    pub average_rating: u32,
    pub last_rating: u32,
    pub max_rating: u32,
    pub unsolvable: bool,
    /// 平台声明的题目数量
    pub questions_count: u32,
    pub last_scan_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TestUnit {
    pub fn total_passes(&self) -> u32 {
        self.passed_count + self.not_passed_count
    }

    /// 调度分数，越小越优先
    pub fn passing_score(&self) -> u64 {
        5 * self.average_rating as u64
            + 5 * self.last_rating as u64
            + 5 * self.max_rating as u64
            + 3 * self.passed_count as u64
            + self.not_passed_count as u64
    }

    /// 记录一次答题结果
    pub fn update_stats(&mut self, passed: bool, grade: u32, now: DateTime<Utc>) {
        if self.average_rating > 0 {
            let total = self.total_passes();
            self.average_rating = (self.average_rating * total + grade) / (total + 1);
        } else {
            self.average_rating = grade;
        }
        self.max_rating = self.max_rating.max(grade);
        self.last_rating = grade;
        if passed {
            self.passed_count += 1;
        } else {
            self.not_passed_count += 1;
        }
        self.last_scan_at = now;
    }
}

impl std::fmt::Display for TestUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}][{}] {}", self.id, self.publish_id, self.title)
    }
}

/// 待写入的新测试
#[derive(Debug, Clone)]
pub struct NewTest {
    pub publish_id: String,
    pub title: String,
    pub course_id: CourseId,
    pub questions_count: u32,
}
