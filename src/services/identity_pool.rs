//! 账号池服务 - 业务能力层
//!
//! ## 职责
//!
//! - 维持新鲜账号数量：不足时注册，超出或老化时淘汰
//! - 账号租约：`reserve` / `extend_lease`，只前进不后退
//! - 登录：平台明确告知账号已不存在时，账号只从数据库淘汰
//!
//! 每次 `run_once` 只做一个决定。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clients::{MailboxPool, PlatformClient};
use crate::config::Config;
use crate::error::{AppError, AppResult, IdentityError, PlatformError};
use crate::models::{
    Credentials, IdentityId, Mailbox, NewIdentity, RetiredIdentity, SessionHandle, WorkerIdentity,
};
use crate::store::Store;

const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 24;

/// `run_once` 做出的决定
#[derive(Debug, Clone, PartialEq)]
pub enum PoolAction {
    Registered(WorkerIdentity),
    /// 淘汰了一个老化账号
    RetiredAged(RetiredIdentity),
    /// 新鲜账号超出目标数量，淘汰了一个
    RetiredSurplus(RetiredIdentity),
    /// 数量合适，无事可做
    Balanced,
}

pub struct IdentityPool {
    store: Arc<dyn Store>,
    platform: Arc<dyn PlatformClient>,
    mailboxes: MailboxPool,
    config: Config,
}

impl IdentityPool {
    pub fn new(
        store: Arc<dyn Store>,
        platform: Arc<dyn PlatformClient>,
        mailboxes: MailboxPool,
        config: &Config,
    ) -> Self {
        Self {
            store,
            platform,
            mailboxes,
            config: config.clone(),
        }
    }

    /// 按优先级做一次调整
    pub async fn run_once(&self) -> AppResult<PoolAction> {
        let now = Utc::now();
        let aging_moment = self.config.account_aging_moment(now);
        let reserve_out_moment = self.config.account_reserve_out_moment(now);

        let mut identities = self.store.identities().await?;
        identities.sort_by_key(|identity| (identity.created_at, identity.id));

        let fresh_count = identities
            .iter()
            .filter(|identity| !identity.is_aged(aging_moment))
            .count();
        let target = self.config.accounts_count;

        if fresh_count < target {
            info!("📝 新鲜账号不足 ({} → {})，注册新账号", fresh_count, target);
            return Ok(PoolAction::Registered(self.register().await?));
        }

        let oldest_aged = identities
            .iter()
            .find(|identity| identity.is_aged(aging_moment) && identity.is_available(reserve_out_moment));
        if let Some(identity) = oldest_aged {
            info!("🗑️ 账号 {} 已老化，淘汰", identity);
            let retired = self
                .retire(identity, self.config.delete_retired_on_platform)
                .await?;
            return Ok(PoolAction::RetiredAged(retired));
        }

        if fresh_count > target {
            let surplus = identities
                .iter()
                .find(|identity| identity.is_available(reserve_out_moment));
            match surplus {
                Some(identity) => {
                    info!("🗑️ 新鲜账号过多 ({} ← {})，淘汰 {}", target, fresh_count, identity);
                    let retired = self
                        .retire(identity, self.config.delete_retired_on_platform)
                        .await?;
                    return Ok(PoolAction::RetiredSurplus(retired));
                }
                None => debug!("新鲜账号过多，但全部处于租约中"),
            }
        }

        debug!("账号数量合适 ({})，无需调整", target);
        Ok(PoolAction::Balanced)
    }

    /// 注册一个新账号，确认成功后才写入
    pub async fn register(&self) -> AppResult<WorkerIdentity> {
        let mut known: HashSet<String> = self
            .store
            .identities()
            .await?
            .into_iter()
            .map(|identity| identity.contact)
            .collect();
        known.extend(
            self.store
                .retired_identities()
                .await?
                .into_iter()
                .map(|retired| retired.contact),
        );

        let mailbox = self
            .mailboxes
            .provision(|mailbox| !known.contains(&mailbox.address))
            .await?;

        let result = self.register_with(&mailbox).await;
        self.mailboxes.destroy(&mailbox).await;
        result
    }

    async fn register_with(&self, mailbox: &Mailbox) -> AppResult<WorkerIdentity> {
        // 注册前已有的邮件不算确认邮件
        let seen: HashSet<String> = self
            .mailboxes
            .poll(mailbox)
            .await?
            .into_iter()
            .map(|message| message.id)
            .collect();

        let credentials = Credentials {
            login: mailbox.address.clone(),
            password: random_password(),
        };
        self.platform.register(&mailbox.address, &credentials).await?;
        debug!("已提交注册 <{}>，等待确认邮件", mailbox.address);

        self.await_confirmation(mailbox, seen).await?;

        let identity = self
            .store
            .insert_identity(
                NewIdentity {
                    contact: mailbox.address.clone(),
                    credentials,
                },
                Utc::now(),
            )
            .await?;
        info!("✓ 账号 {} 注册成功", identity);
        Ok(identity)
    }

    async fn await_confirmation(&self, mailbox: &Mailbox, mut seen: HashSet<String>) -> AppResult<()> {
        let wait = self.config.mailbox_wait();
        let deadline = Instant::now() + wait;

        loop {
            tokio::time::sleep(self.config.mailbox_poll_interval()).await;

            for message in self.mailboxes.poll(mailbox).await? {
                if !seen.insert(message.id.clone()) {
                    continue;
                }
                if self.platform.confirm_registration(&message).await? {
                    debug!("确认邮件 \"{}\" 已处理", message.subject);
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(IdentityError::ConfirmationTimeout {
                    contact: mailbox.address.clone(),
                    waited_secs: wait.as_secs(),
                }
                .into());
            }
        }
    }

    /// 淘汰账号
    ///
    /// `delete_externally` 为 true 时先在平台上删除。
    /// 平台上已不存在的账号只从数据库中淘汰。
    pub async fn retire(
        &self,
        identity: &WorkerIdentity,
        delete_externally: bool,
    ) -> AppResult<RetiredIdentity> {
        let deleted_externally = if delete_externally {
            match self.delete_on_platform(identity).await {
                Ok(()) => true,
                Err(e) if is_revoked(&e) => {
                    warn!("⚠️ 账号 {} 在平台上已不存在，仅从数据库淘汰", identity);
                    false
                }
                Err(e) => return Err(e),
            }
        } else {
            false
        };

        let retired = self
            .store
            .retire_identity(identity.id, Utc::now(), deleted_externally)
            .await?;
        info!(
            "✓ 账号 {} 已淘汰{}",
            identity,
            if deleted_externally { "" } else { "（仅数据库）" }
        );
        Ok(retired)
    }

    async fn delete_on_platform(&self, identity: &WorkerIdentity) -> AppResult<()> {
        let session = self.platform.authenticate(identity).await?;
        self.platform.delete_identity(&session).await
    }

    /// 登录；凭据已失效的账号会被淘汰，错误继续向上传递
    pub async fn authenticate(&self, identity: &WorkerIdentity) -> AppResult<SessionHandle> {
        match self.platform.authenticate(identity).await {
            Ok(session) => Ok(session),
            Err(e) if is_revoked(&e) => {
                warn!("⚠️ 账号 {} 凭据已失效: {}", identity, e);
                self.store
                    .retire_identity(identity.id, Utc::now(), false)
                    .await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// 租约标记为现在
    pub async fn reserve(&self, id: IdentityId) -> AppResult<WorkerIdentity> {
        self.store.extend_reservation(id, Utc::now()).await
    }

    /// 租约延长到 `now + duration`
    pub async fn extend_lease(
        &self,
        id: IdentityId,
        duration: chrono::Duration,
    ) -> AppResult<WorkerIdentity> {
        self.store.extend_reservation(id, Utc::now() + duration).await
    }

    /// 租约已结束的账号，最早可用的在前
    pub async fn available(&self) -> AppResult<Vec<WorkerIdentity>> {
        let reserve_out_moment = self.config.account_reserve_out_moment(Utc::now());
        let mut identities: Vec<WorkerIdentity> = self
            .store
            .identities()
            .await?
            .into_iter()
            .filter(|identity| identity.is_available(reserve_out_moment))
            .collect();
        identities.sort_by_key(|identity| (identity.reserved_until, identity.id));
        Ok(identities)
    }
}

fn is_revoked(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Platform(PlatformError::AuthenticationFailed { revoked: true, .. })
    )
}

/// 8 到 24 位的字母数字密码
fn random_password() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN);
    (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_password_shape() {
        for _ in 0..100 {
            let password = random_password();
            assert!((PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password.len()));
            assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_revoked_detection() {
        let revoked: AppError = PlatformError::AuthenticationFailed {
            identity: "a".to_string(),
            revoked: true,
            reason: "profile deleted".to_string(),
        }
        .into();
        let transient = AppError::platform_transport("authenticate", "timeout");

        assert!(is_revoked(&revoked));
        assert!(!is_revoked(&transient));
    }
}
