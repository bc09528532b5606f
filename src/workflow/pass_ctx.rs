//! 答题上下文
//!
//! 封装"哪个会话用哪个账号在答哪个测试"这一信息

use std::fmt::Display;

use crate::models::{IdentityId, SessionId, TestId};

/// 答题上下文
///
/// 只用于日志前缀
#[derive(Debug, Clone)]
pub struct PassCtx {
    /// 本次尝试的会话标识
    pub session: SessionId,

    pub test_id: TestId,

    /// 测试的平台发布编号
    pub publish_id: String,

    pub identity_id: IdentityId,
}

impl PassCtx {
    pub fn new(
        session: SessionId,
        test_id: TestId,
        publish_id: String,
        identity_id: IdentityId,
    ) -> Self {
        Self {
            session,
            test_id,
            publish_id,
            identity_id,
        }
    }

    /// 同一会话转去答另一个测试（前置测试）
    pub fn for_test(&self, test_id: TestId, publish_id: String) -> Self {
        Self {
            test_id,
            publish_id,
            ..self.clone()
        }
    }
}

impl Display for PassCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[会话 {} 测试 #{} 账号 #{}]",
            self.session.short(),
            self.test_id,
            self.identity_id
        )
    }
}
