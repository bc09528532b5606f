use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 存储层错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 平台客户端错误
    #[error("平台错误: {0}")]
    Platform(#[from] PlatformError),
    /// 排队服务错误
    #[error("排队服务错误: {0}")]
    Sequencer(#[from] SequencerError),
    /// 账号池错误
    #[error("账号池错误: {0}")]
    Identity(#[from] IdentityError),
    /// 答题过程中平台给出的状态信号
    #[error("答题中断: {0}")]
    Probe(#[from] ProbeError),
    /// 业务逻辑错误
    #[error("业务错误: {0}")]
    Business(#[from] BusinessError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 唯一键冲突（并发写入时由调用方重新读取胜者的记录）
    #[error("唯一键冲突 ({table}): {key}")]
    Duplicate { table: &'static str, key: String },
    /// 记录不存在
    #[error("记录不存在 ({table}): {id}")]
    NotFound { table: &'static str, id: i64 },
}

/// 平台客户端错误
#[derive(Debug, Error)]
pub enum PlatformError {
    /// 网络请求失败
    #[error("平台请求失败 ({operation}): {message}")]
    Transport { operation: String, message: String },
    /// 页面内容与预期不符
    #[error("平台页面无法识别 ({operation}): {detail}")]
    UnexpectedPage { operation: String, detail: String },
    /// 登录失败
    ///
    /// `revoked` 表示平台明确告知账号不存在或已被删除
    #[error("账号 {identity} 登录失败 (revoked={revoked}): {reason}")]
    AuthenticationFailed {
        identity: String,
        revoked: bool,
        reason: String,
    },
}

/// 排队服务错误
#[derive(Debug, Error)]
pub enum SequencerError {
    /// 无法连接排队服务
    #[error("无法连接排队服务 {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// 请求超时
    #[error("排队服务 {addr} 响应超时")]
    Timeout { addr: String },
    /// 请求帧格式错误
    #[error("请求帧格式错误: {reason}")]
    Malformed { reason: String },
    /// DEL 的令牌不在队列中
    #[error("令牌不在队列中")]
    NotQueued,
    /// DEL 的令牌不是队首
    #[error("令牌不是队首 (位置: {pos})")]
    NotHead { pos: usize },
    /// 响应无法解析
    #[error("排队服务响应无法解析: {reply}")]
    BadReply { reply: String },
    /// 监听地址绑定失败
    #[error("无法监听 {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// 账号池错误
#[derive(Debug, Error)]
pub enum IdentityError {
    /// 所有临时邮箱服务都不可用
    #[error("临时邮箱服务不可用: {reason}")]
    MailboxUnavailable { reason: String },
    /// 等待确认邮件超时
    #[error("等待 {contact} 的确认邮件超时 ({waited_secs} 秒)")]
    ConfirmationTimeout { contact: String, waited_secs: u64 },
}

/// 答题过程中的失败分类
///
/// 由 `AttemptController` 穷举匹配并决定后续动作
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// 需要先通过另一个测试
    #[error("测试 {test} 需要先通过 {prerequisite_link}")]
    NeedsPrerequisite {
        test: String,
        prerequisite_link: String,
    },
    /// 账号未订阅课程
    #[error("账号未订阅测试 {test} 所在的课程")]
    NotSubscribed { test: String },
    /// 测试已被该账号完成
    #[error("测试 {test} 已完成")]
    AlreadySolved { test: String },
    /// 账号暂时不能答题
    #[error("账号暂时不能答题，约 {cooldown_minutes} 分钟后可用")]
    TemporarilyUnavailable { cooldown_minutes: u32 },
    /// 测试无法通过
    #[error("测试 {test} 无法求解")]
    Unsolvable { test: String },
    /// 获取题目的次数超过上限
    #[error("测试 {test} 已达到最大迭代次数 {iterations}")]
    MaxIterationsExceeded { test: String, iterations: u32 },
}

/// 业务逻辑错误
#[derive(Debug, Error)]
pub enum BusinessError {
    /// 无法识别的题型
    #[error("无法识别的题型: {tag}")]
    UnknownQuestionKind { tag: String },
    /// 候选答案与题型不匹配
    #[error("题目 {task_id} 的候选答案与题型不匹配")]
    CandidateMismatch { task_id: i64 },
    /// 候选答案空间过大
    #[error("题目 {task_id} 的候选答案数量过大 ({size})")]
    CandidateSpaceTooLarge { task_id: i64, size: u128 },
    /// 题目没有任何选项
    #[error("题目 {task_id} 没有可用的选项")]
    EmptyCandidateSpace { task_id: i64 },
    /// 测试不存在
    #[error("测试不存在: {publish_id}")]
    TestNotFound { publish_id: String },
    /// 无法从链接中解析出测试编号
    #[error("无法从链接中解析测试编号: {link}")]
    UnparsableLink { link: String },
    /// 没有可用账号
    #[error("没有可用账号")]
    NoIdentityAvailable,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件 {path} 失败: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML 解析失败 ({path}): {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建平台请求失败错误
    pub fn platform_transport(operation: impl Into<String>, message: impl ToString) -> Self {
        AppError::Platform(PlatformError::Transport {
            operation: operation.into(),
            message: message.to_string(),
        })
    }

    /// 创建页面无法识别错误
    pub fn unexpected_page(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::Platform(PlatformError::UnexpectedPage {
            operation: operation.into(),
            detail: detail.into(),
        })
    }

    /// 取出答题信号（如果是）
    pub fn as_probe(&self) -> Option<&ProbeError> {
        match self {
            AppError::Probe(signal) => Some(signal),
            _ => None,
        }
    }

    /// 是否是唯一键冲突
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppError::Store(StoreError::Duplicate { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_signal_is_exposed() {
        let err: AppError = ProbeError::TemporarilyUnavailable {
            cooldown_minutes: 12,
        }
        .into();

        assert_eq!(
            err.as_probe(),
            Some(&ProbeError::TemporarilyUnavailable {
                cooldown_minutes: 12
            })
        );
        assert!(!err.is_duplicate());
    }

    #[test]
    fn test_duplicate_detection() {
        let err: AppError = StoreError::Duplicate {
            table: "questions",
            key: "42".to_string(),
        }
        .into();

        assert!(err.is_duplicate());
        assert!(err.as_probe().is_none());
        assert!(err.to_string().contains("questions"));
    }
}
