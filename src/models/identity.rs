use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type IdentityId = i64;

/// 登录凭据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// 可租用的工作账号
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub id: IdentityId,
    /// 联系邮箱
    pub contact: String,
    pub credentials: Credentials,
    pub created_at: DateTime<Utc>,
    /// 租约标记：早于 `now - 冷却时间` 才能再次被选中
    pub reserved_until: DateTime<Utc>,
}

impl WorkerIdentity {
    /// 租约是否已经结束
    pub fn is_available(&self, reserve_out_moment: DateTime<Utc>) -> bool {
        self.reserved_until < reserve_out_moment
    }

    /// 是否已经老化
    pub fn is_aged(&self, aging_moment: DateTime<Utc>) -> bool {
        self.created_at < aging_moment
    }
}

impl std::fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] <{}>", self.id, self.contact)
    }
}

/// 待写入的新账号
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub contact: String,
    pub credentials: Credentials,
}

/// 已淘汰账号的审计记录
///
/// 由活跃账号复制而来，活跃记录随后被删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetiredIdentity {
    pub id: IdentityId,
    pub contact: String,
    pub credentials: Credentials,
    pub created_at: DateTime<Utc>,
    pub reserved_until: DateTime<Utc>,
    pub retired_at: DateTime<Utc>,
    /// 是否同时在平台上删除
    pub deleted_externally: bool,
}

impl RetiredIdentity {
    pub fn from_identity(
        identity: &WorkerIdentity,
        retired_at: DateTime<Utc>,
        deleted_externally: bool,
    ) -> Self {
        Self {
            id: identity.id,
            contact: identity.contact.clone(),
            credentials: identity.credentials.clone(),
            created_at: identity.created_at,
            reserved_until: identity.reserved_until,
            retired_at,
            deleted_externally,
        }
    }
}
