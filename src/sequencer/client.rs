//! 排队服务客户端
//!
//! 服务不可用时降级为无序模式：随机休眠一段时间错开并发，然后直接放行。

use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use super::protocol::{Reply, Request};
use crate::config::{host_and_port, Config, DEFAULT_SEQUENCER_PORT};
use crate::error::SequencerError;
use crate::models::SessionId;

/// 准入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// 已在队首，离开时需要发送 DEL
    Ordered,
    /// 未经排队服务放行
    Unordered,
}

#[derive(Debug, Clone)]
pub struct SequencerClient {
    endpoint: Option<(String, u16)>,
    poll_interval: Duration,
    frame_timeout: Duration,
    max_desync: Duration,
}

impl SequencerClient {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config
                .sequencer_host
                .as_deref()
                .map(|host| host_and_port(host, DEFAULT_SEQUENCER_PORT)),
            poll_interval: config.sequencer_poll_interval(),
            frame_timeout: config.sequencer_frame_timeout(),
            max_desync: config.max_latency_for_out_of_sync(),
        }
    }

    /// 等到轮到 `session`
    pub async fn wait_in_queue(&self, session: &SessionId) -> Admission {
        if self.endpoint.is_none() {
            self.desync_sleep(session).await;
            return Admission::Unordered;
        }

        if let Err(e) = self.send(&Request::Health).await {
            warn!("⚠️ 排队服务不可用，降级为无序模式: {}", e);
            return Admission::Unordered;
        }

        let request = Request::Check(session.clone());
        loop {
            match self.send(&request).await {
                Ok(Reply::Check(reply)) if reply.allow => {
                    info!("🚦 会话 {} 获得准入", session.short());
                    return Admission::Ordered;
                }
                Ok(Reply::Check(reply)) => {
                    debug!("会话 {} 排在第 {} 位", session.short(), reply.pos);
                }
                Ok(Reply::Ack) => {
                    warn!("⚠️ CHK 收到意外响应 true，继续等待");
                }
                Err(e) => {
                    warn!("⚠️ 排队期间与排队服务失去连接，降级为无序模式: {}", e);
                    return Admission::Unordered;
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 离开队列，失败只记录错误
    pub async fn leave_queue(&self, session: &SessionId, admission: Admission) {
        if admission != Admission::Ordered {
            return;
        }

        match self.send(&Request::Leave(session.clone())).await {
            Ok(Reply::Ack) => debug!("会话 {} 已离开队列", session.short()),
            Ok(other) => error!("❌ 会话 {} 离开队列收到意外响应 {:?}", session.short(), other),
            Err(e) => error!("❌ 会话 {} 离开队列失败: {}", session.short(), e),
        }
    }

    async fn desync_sleep(&self, session: &SessionId) {
        let factor: f64 = rand::thread_rng().gen();
        let pause = self.max_desync.mul_f64(factor);
        debug!("未配置排队服务，会话 {} 休眠 {:?}", session.short(), pause);
        tokio::time::sleep(pause).await;
    }

    async fn send(&self, request: &Request) -> Result<Reply, SequencerError> {
        let (host, port) = self
            .endpoint
            .as_ref()
            .ok_or_else(|| SequencerError::Malformed {
                reason: "未配置排队服务".to_string(),
            })?;
        let addr = format!("{}:{}", host, port);

        let exchange = async {
            let mut stream = TcpStream::connect(&addr).await?;
            stream.write_all(&request.encode()).await?;
            stream.shutdown().await?;
            let mut raw = Vec::new();
            stream.read_to_end(&mut raw).await?;
            Ok::<_, std::io::Error>(raw)
        };

        let raw = tokio::time::timeout(self.frame_timeout, exchange)
            .await
            .map_err(|_| SequencerError::Timeout { addr: addr.clone() })?
            .map_err(|source| SequencerError::Unreachable {
                addr: addr.clone(),
                source,
            })?;

        Reply::parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_without_sequencer_is_unordered() {
        let config = Config {
            max_latency_for_out_of_sync_secs: 1,
            ..Config::default()
        };
        let client = SequencerClient::new(&config);

        let admission = client.wait_in_queue(&SessionId::generate()).await;

        assert_eq!(admission, Admission::Unordered);
    }

    #[tokio::test]
    async fn test_unreachable_sequencer_degrades() {
        let config = Config {
            sequencer_host: Some("127.0.0.1:1".to_string()),
            sequencer_frame_timeout_secs: 1,
            ..Config::default()
        };
        let client = SequencerClient::new(&config);
        let session = SessionId::generate();

        let admission = client.wait_in_queue(&session).await;
        assert_eq!(admission, Admission::Unordered);

        // 无序模式下离开队列不会发请求
        client.leave_queue(&session, admission).await;
    }
}
