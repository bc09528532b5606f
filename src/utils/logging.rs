//! 日志工具模块
//!
//! 提供日志初始化和格式化输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::AttemptStats;

/// 初始化日志
///
/// 默认级别为 info，可以用 `RUST_LOG` 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化（例如测试中）时忽略错误
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 答案探测模式");
    info!("📊 最大并发尝试数: {}", config.max_concurrent_attempts);
    info!("👥 目标账号数量: {}", config.accounts_count);
    match &config.sequencer_host {
        Some(host) => info!("🚦 排队服务: {}", host),
        None => info!("🚦 未配置排队服务，使用随机错峰"),
    }
    info!("{}", "=".repeat(60));
}

/// 打印一轮尝试的统计
pub fn log_attempt_summary(stats: &AttemptStats) {
    info!("\n{}", "─".repeat(60));
    info!("📊 尝试统计");
    info!("✅ 完成: {}（确认提交 {}）", stats.completed, stats.finalized);
    info!("💤 无可选测试: {}", stats.no_work);
    info!("ℹ️ 已完成过: {}", stats.already_solved);
    info!("⏳ 延后: {}", stats.deferred);
    info!("🚫 不可解: {}", stats.unsolvable);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("一二三四五", 3), "一二三...");
    }
}
