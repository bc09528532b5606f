//! 临时邮箱
//!
//! 注册账号时需要一个能收到确认邮件的地址。
//! 多个服务商随机轮换，某个服务商失败时换下一个。

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::error::{AppResult, IdentityError};
use crate::models::{MailMessage, Mailbox};

/// 临时邮箱服务商
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn provision(&self) -> AppResult<Mailbox>;

    /// 收件箱中的全部邮件
    async fn poll(&self, mailbox: &Mailbox) -> AppResult<Vec<MailMessage>>;

    async fn destroy(&self, mailbox: &Mailbox) -> AppResult<()>;
}

/// 服务商池
#[derive(Clone)]
pub struct MailboxPool {
    providers: Vec<Arc<dyn MailboxProvider>>,
}

impl MailboxPool {
    pub fn new(providers: Vec<Arc<dyn MailboxProvider>>) -> Self {
        Self { providers }
    }

    /// 按随机顺序尝试服务商，直到拿到一个 `accept` 接受的邮箱
    ///
    /// 被拒绝的邮箱会立即销毁
    pub async fn provision<F>(&self, mut accept: F) -> AppResult<Mailbox>
    where
        F: FnMut(&Mailbox) -> bool,
    {
        let mut order: Vec<&Arc<dyn MailboxProvider>> = self.providers.iter().collect();
        order.shuffle(&mut rand::thread_rng());

        let mut last_reason = String::from("没有配置服务商");
        for provider in order {
            match provider.provision().await {
                Ok(mailbox) if accept(&mailbox) => {
                    debug!("📬 {} 提供邮箱 {}", provider.name(), mailbox.address);
                    return Ok(mailbox);
                }
                Ok(mailbox) => {
                    debug!("邮箱 {} 已被使用过，换下一个服务商", mailbox.address);
                    last_reason = format!("{} 返回了已使用的地址", provider.name());
                    self.destroy(&mailbox).await;
                }
                Err(e) => {
                    warn!("⚠️ 邮箱服务商 {} 不可用: {}", provider.name(), e);
                    last_reason = e.to_string();
                }
            }
        }

        Err(IdentityError::MailboxUnavailable { reason: last_reason }.into())
    }

    pub async fn poll(&self, mailbox: &Mailbox) -> AppResult<Vec<MailMessage>> {
        match self.provider_of(mailbox) {
            Some(provider) => provider.poll(mailbox).await,
            None => Err(IdentityError::MailboxUnavailable {
                reason: format!("未知服务商 {}", mailbox.provider),
            }
            .into()),
        }
    }

    /// 销毁邮箱，失败只记日志
    pub async fn destroy(&self, mailbox: &Mailbox) {
        if let Some(provider) = self.provider_of(mailbox) {
            if let Err(e) = provider.destroy(mailbox).await {
                warn!("⚠️ 销毁邮箱 {} 失败: {}", mailbox.address, e);
            }
        }
    }

    fn provider_of(&self, mailbox: &Mailbox) -> Option<&Arc<dyn MailboxProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.name() == mailbox.provider)
    }
}
