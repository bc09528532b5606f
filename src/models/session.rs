//! 会话标识
//!
//! 每次答题尝试生成一个会话标识，同时作为排队令牌和题目锁的持有者

use std::fmt::Display;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// 令牌的固定长度（十六进制字符）
pub const SESSION_ID_LEN: usize = 64;

/// 会话标识（64 位十六进制字符串）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// 生成新的随机会话标识
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_LEN / 2];
        rand::thread_rng().fill_bytes(&mut bytes);
        let hex = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self(hex)
    }

    /// 从已有字符串构造，长度不符时返回 None
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() == SESSION_ID_LEN && value.is_ascii() {
            Some(Self(value.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// 日志中使用的短标识
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
