use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 排队服务默认端口
pub const DEFAULT_SEQUENCER_PORT: u16 = 26960;

/// 程序配置
///
/// 加载顺序：默认值 → `PROBER_CONFIG` 指向的 TOML 文件 → 环境变量
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 账号池 ---
    /// 目标账号数量
    pub accounts_count: usize,
    /// 账号使用后的冷却时间（分钟）
    pub account_reserve_timeout_minutes: i64,
    /// 账号最长寿命（分钟），超过后被淘汰
    pub max_account_age_minutes: i64,
    /// 暂时不能答题时额外追加的冷却（分钟）
    pub reserve_buffer_minutes: i64,
    /// 淘汰账号时是否同时在平台上删除
    pub delete_retired_on_platform: bool,
    /// 等待确认邮件的上限（秒）
    pub mailbox_wait_secs: u64,
    /// 轮询邮箱的间隔（秒）
    pub mailbox_poll_interval_secs: u64,

    // --- 扫描 ---
    /// 课程重新扫描的间隔（分钟）
    pub course_scan_interval_minutes: i64,
    /// 测试扫描窗口（秒）
    pub test_scan_interval_secs: i64,

    // --- 答题 ---
    /// 两道题之间的最小间隔（秒）
    pub interval_between_questions_secs: u64,
    /// 重复题目每次额外等待的步长（秒）
    pub latency_step_between_similar_questions_secs: u64,
    /// 单次答题获取题目的最大次数
    pub max_iterations_of_receiving_questions: u32,
    /// 多选题是否也使用排除法推断正确答案
    pub eliminate_multiple_choice: bool,

    // --- 锁 ---
    /// 检查题目锁的间隔（秒）
    pub interval_between_session_check_secs: u64,
    /// 等待题目锁的上限（秒），超过后强行继续
    pub max_latency_for_session_checks_secs: u64,
    /// 锁的存活上限（分钟），超过后可被接管或清理
    pub lock_ttl_minutes: i64,

    // --- 排队服务 ---
    /// 排队服务地址（host[:port]），未配置时使用随机休眠错峰
    pub sequencer_host: Option<String>,
    /// 排队服务监听地址
    pub sequencer_listen: String,
    /// 轮询排队服务的间隔（秒）
    pub sequencer_poll_interval_secs: u64,
    /// 单次连接的读写超时（秒）
    pub sequencer_frame_timeout_secs: u64,
    /// 未配置排队服务时随机休眠的上限（秒）
    pub max_latency_for_out_of_sync_secs: u64,

    // --- 运行 ---
    /// 同时进行的答题尝试数量
    pub max_concurrent_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accounts_count: 300,
            account_reserve_timeout_minutes: 15,
            max_account_age_minutes: 60 * 24 * 1000,
            reserve_buffer_minutes: 2,
            delete_retired_on_platform: true,
            mailbox_wait_secs: 300,
            mailbox_poll_interval_secs: 1,
            course_scan_interval_minutes: 60 * 24 * 15,
            test_scan_interval_secs: 900,
            interval_between_questions_secs: 7,
            latency_step_between_similar_questions_secs: 5,
            max_iterations_of_receiving_questions: 300,
            eliminate_multiple_choice: false,
            interval_between_session_check_secs: 5,
            max_latency_for_session_checks_secs: 300,
            lock_ttl_minutes: 60,
            sequencer_host: None,
            sequencer_listen: format!("0.0.0.0:{}", DEFAULT_SEQUENCER_PORT),
            sequencer_poll_interval_secs: 2,
            sequencer_frame_timeout_secs: 5,
            max_latency_for_out_of_sync_secs: 30,
            max_concurrent_attempts: 1,
        }
    }
}

impl Config {
    /// 按 默认值 → TOML 文件 → 环境变量 的顺序加载
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("PROBER_CONFIG") {
            Ok(path) => Self::from_toml_file(&path)?,
            Err(_) => Self::default(),
        };
        base.with_env_overrides()
    }

    /// 只使用默认值和环境变量
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，缺失的键使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    fn from_toml_str(content: &str, origin: &str) -> AppResult<Self> {
        let config = toml::from_str(content).map_err(|source| ConfigError::TomlParse {
            path: origin.to_string(),
            source,
        })?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> AppResult<Self> {
        override_from_env(&mut self.accounts_count, "ACCOUNTS_COUNT")?;
        override_from_env(&mut self.account_reserve_timeout_minutes, "ACCOUNT_RESERVE_TIMEOUT")?;
        override_from_env(&mut self.max_account_age_minutes, "MAX_ACCOUNT_AGE")?;
        override_from_env(&mut self.reserve_buffer_minutes, "RESERVE_BUFFER")?;
        override_from_env(&mut self.delete_retired_on_platform, "DELETE_RETIRED_ON_PLATFORM")?;
        override_from_env(&mut self.mailbox_wait_secs, "MAILBOX_WAIT")?;
        override_from_env(&mut self.course_scan_interval_minutes, "COURSE_SCAN_INTERVAL")?;
        override_from_env(&mut self.test_scan_interval_secs, "TEST_SCAN_INTERVAL")?;
        override_from_env(&mut self.interval_between_questions_secs, "INTERVAL_BETWEEN_QUESTIONS")?;
        override_from_env(
            &mut self.latency_step_between_similar_questions_secs,
            "LATENCY_STEP_INCREASE_BETWEEN_SIMILAR_QUESTIONS",
        )?;
        override_from_env(
            &mut self.max_iterations_of_receiving_questions,
            "MAX_ITERATIONS_OF_RECEIVING_QUESTIONS",
        )?;
        override_from_env(&mut self.eliminate_multiple_choice, "ELIMINATE_MULTIPLE_CHOICE")?;
        override_from_env(
            &mut self.interval_between_session_check_secs,
            "INTERVAL_BETWEEN_SESSION_CHECK",
        )?;
        override_from_env(
            &mut self.max_latency_for_session_checks_secs,
            "MAX_LATENCY_FOR_SESSION_CHECKS",
        )?;
        override_from_env(&mut self.lock_ttl_minutes, "LOCK_TTL")?;
        override_from_env(&mut self.sequencer_listen, "SEQUENCER_LISTEN")?;
        override_from_env(&mut self.sequencer_poll_interval_secs, "SEQUENCER_POLL_INTERVAL")?;
        override_from_env(
            &mut self.max_latency_for_out_of_sync_secs,
            "MAX_LATENCY_FOR_OUT_OF_SYNC",
        )?;
        override_from_env(&mut self.max_concurrent_attempts, "MAX_CONCURRENT_ATTEMPTS")?;
        if let Ok(host) = std::env::var("TEST_SOLVER_SESSION_QUEUE_HOST") {
            self.sequencer_host = Some(host).filter(|h| !h.trim().is_empty());
        }
        Ok(self)
    }

    // ========== 时间点 ==========

    /// 早于该时间创建的账号视为老化
    pub fn account_aging_moment(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::minutes(self.max_account_age_minutes)
    }

    /// 租约早于该时间结束的账号可以被重新选择
    pub fn account_reserve_out_moment(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::minutes(self.account_reserve_timeout_minutes)
    }

    /// 早于该时间扫描过的课程可以重新扫描
    pub fn course_scan_timeout_moment(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::minutes(self.course_scan_interval_minutes)
    }

    /// 测试扫描窗口的起点
    pub fn test_scan_timeout_moment(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::seconds(self.test_scan_interval_secs)
    }

    /// 早于该时间加的锁视为过期
    pub fn lock_expiry_moment(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::minutes(self.lock_ttl_minutes)
    }

    // ========== 时长 ==========

    pub fn interval_between_questions(&self) -> Duration {
        Duration::from_secs(self.interval_between_questions_secs)
    }

    pub fn latency_step_between_similar_questions(&self) -> Duration {
        Duration::from_secs(self.latency_step_between_similar_questions_secs)
    }

    pub fn interval_between_session_check(&self) -> Duration {
        Duration::from_secs(self.interval_between_session_check_secs)
    }

    pub fn max_latency_for_session_checks(&self) -> Duration {
        Duration::from_secs(self.max_latency_for_session_checks_secs)
    }

    pub fn sequencer_poll_interval(&self) -> Duration {
        Duration::from_secs(self.sequencer_poll_interval_secs)
    }

    pub fn sequencer_frame_timeout(&self) -> Duration {
        Duration::from_secs(self.sequencer_frame_timeout_secs)
    }

    pub fn max_latency_for_out_of_sync(&self) -> Duration {
        Duration::from_secs(self.max_latency_for_out_of_sync_secs)
    }

    pub fn mailbox_wait(&self) -> Duration {
        Duration::from_secs(self.mailbox_wait_secs)
    }

    pub fn mailbox_poll_interval(&self) -> Duration {
        Duration::from_secs(self.mailbox_poll_interval_secs)
    }
}

/// 解析 `host[:port]`，缺省端口为 `default_port`
pub fn host_and_port(value: &str, default_port: u16) -> (String, u16) {
    match value.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (value.to_string(), default_port),
        },
        None => (value.to_string(), default_port),
    }
}

fn override_from_env<T>(field: &mut T, var_name: &str) -> AppResult<()>
where
    T: std::str::FromStr,
{
    if let Ok(value) = std::env::var(var_name) {
        *field = value.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: value.clone(),
            expected_type: std::any::type_name::<T>().to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = Config::default();
        assert_eq!(config.accounts_count, 300);
        assert_eq!(config.interval_between_questions(), Duration::from_secs(7));
        assert_eq!(config.max_iterations_of_receiving_questions, 300);
        assert!(config.sequencer_host.is_none());
        assert!(!config.eliminate_multiple_choice);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            accounts_count = 12
            sequencer_host = "queue.local:4000"
            eliminate_multiple_choice = true
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.accounts_count, 12);
        assert_eq!(config.sequencer_host.as_deref(), Some("queue.local:4000"));
        assert!(config.eliminate_multiple_choice);
        assert_eq!(config.lock_ttl_minutes, 60);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = Config::from_toml_str("accounts_count = \"many\"", "inline").unwrap_err();
        assert!(err.to_string().contains("inline"));
    }

    #[test]
    fn test_host_and_port() {
        assert_eq!(
            host_and_port("queue.local", DEFAULT_SEQUENCER_PORT),
            ("queue.local".to_string(), 26960)
        );
        assert_eq!(
            host_and_port("10.0.0.3:4000", DEFAULT_SEQUENCER_PORT),
            ("10.0.0.3".to_string(), 4000)
        );
    }

    #[test]
    fn test_moments() {
        let config = Config::default();
        let now = Utc::now();
        assert_eq!(
            now - config.account_reserve_out_moment(now),
            chrono::Duration::minutes(15)
        );
        assert!(config.account_aging_moment(now) < config.course_scan_timeout_moment(now));
    }
}
