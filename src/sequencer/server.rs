//! 排队服务端
//!
//! 每个连接只处理一帧。违反协议的请求（格式错误、非队首 DEL、
//! 未入队 DEL）直接断开连接，不回复，也不改动队列。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::protocol::{is_health_check, Reply, Request, FRAME_LEN};
use super::queue::AdmissionQueue;
use crate::error::{AppResult, SequencerError};

pub struct SequencerServer {
    listener: TcpListener,
    queue: Arc<Mutex<AdmissionQueue>>,
    frame_timeout: Duration,
}

impl SequencerServer {
    pub async fn bind(addr: &str, frame_timeout: Duration) -> AppResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SequencerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            queue: Arc::new(Mutex::new(AdmissionQueue::new())),
            frame_timeout,
        })
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| crate::error::AppError::Other(e.to_string()))
    }

    /// 接受连接直到进程退出
    pub async fn serve(self) -> AppResult<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("🚦 排队服务已启动，监听 {}", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let queue = Arc::clone(&self.queue);
                    let frame_timeout = self.frame_timeout;
                    tokio::spawn(async move {
                        let peer = peer.to_string();
                        if let Err(e) = handle_connection(stream, &queue, frame_timeout, &peer).await
                        {
                            warn!("⚠️ [{}] 连接已断开: {}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("⚠️ 接受连接失败: {}", e),
            }
        }
    }
}

/// 处理一个连接上的一帧
pub async fn handle_connection<S>(
    mut stream: S,
    queue: &Mutex<AdmissionQueue>,
    frame_timeout: Duration,
    peer: &str,
) -> Result<(), SequencerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let raw = tokio::time::timeout(frame_timeout, read_frame(&mut stream))
        .await
        .map_err(|_| SequencerError::Timeout {
            addr: peer.to_string(),
        })?
        .map_err(|source| SequencerError::Unreachable {
            addr: peer.to_string(),
            source,
        })?;

    let request = Request::parse(&raw)?;
    let reply = match &request {
        Request::Health => {
            debug!("[{}] 健康检查", peer);
            Reply::Ack
        }
        Request::Check(token) => {
            let reply = queue.lock().await.check(token);
            debug!("[{}] CHK {} → {:?}", peer, token.short(), reply);
            Reply::Check(reply)
        }
        Request::Leave(token) => {
            queue.lock().await.leave(token)?;
            info!("[{}] ✓ 令牌 {} 离开队列", peer, token.short());
            Reply::Ack
        }
    };

    let write = async {
        stream.write_all(&reply.encode()).await?;
        stream.shutdown().await
    };
    write.await.map_err(|source| SequencerError::Unreachable {
        addr: peer.to_string(),
        source,
    })
}

/// 读到 68 字节、换行、完整的健康检查帧或连接关闭为止
async fn read_frame<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut frame = Vec::with_capacity(FRAME_LEN);
    let mut chunk = [0u8; FRAME_LEN];
    while frame.len() < FRAME_LEN {
        let n = stream.read(&mut chunk[..FRAME_LEN - frame.len()]).await?;
        if n == 0 {
            break;
        }
        frame.extend_from_slice(&chunk[..n]);
        if frame.contains(&b'\n') || is_health_check(&frame) {
            break;
        }
    }
    Ok(frame)
}
