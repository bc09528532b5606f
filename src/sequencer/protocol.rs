//! 排队服务的线路格式
//!
//! 请求：`CHK:` 或 `DEL:` 加 64 字节令牌，共 68 字节；
//! 健康检查为 `healthz` 或空帧。
//! 响应：`CHK` 返回 JSON `{"new":bool,"allow":bool,"pos":int}`，
//! 其余成功响应为 `true`。

use serde::{Deserialize, Serialize};

use crate::error::SequencerError;
use crate::models::session::{SessionId, SESSION_ID_LEN};

const OP_LEN: usize = 4;
const CHECK_OP: &[u8] = b"CHK:";
const LEAVE_OP: &[u8] = b"DEL:";

/// 请求帧长度
pub const FRAME_LEN: usize = OP_LEN + SESSION_ID_LEN;

/// 健康检查帧
pub const HEALTH_CHECK: &[u8] = b"healthz";

/// 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Health,
    /// 入队（若未入队）并查询位置
    Check(SessionId),
    /// 队首离开队列
    Leave(SessionId),
}

impl Request {
    /// 解析一帧，首尾空白会被去掉
    pub fn parse(raw: &[u8]) -> Result<Self, SequencerError> {
        let frame = trim_whitespace(raw);
        if frame.is_empty() || frame == HEALTH_CHECK {
            return Ok(Request::Health);
        }
        if frame.len() != FRAME_LEN {
            return Err(SequencerError::Malformed {
                reason: format!("帧长度 {} 不等于 {}", frame.len(), FRAME_LEN),
            });
        }

        let (op, token) = frame.split_at(OP_LEN);
        let token = std::str::from_utf8(token)
            .ok()
            .and_then(SessionId::parse)
            .ok_or_else(|| SequencerError::Malformed {
                reason: "令牌不是 ASCII".to_string(),
            })?;

        match op {
            CHECK_OP => Ok(Request::Check(token)),
            LEAVE_OP => Ok(Request::Leave(token)),
            _ => Err(SequencerError::Malformed {
                reason: format!("未知操作 {}", String::from_utf8_lossy(op)),
            }),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Request::Health => HEALTH_CHECK.to_vec(),
            Request::Check(token) => [CHECK_OP, token.as_bytes()].concat(),
            Request::Leave(token) => [LEAVE_OP, token.as_bytes()].concat(),
        }
    }
}

/// 去掉首尾空白后是否是健康检查帧
pub(crate) fn is_health_check(raw: &[u8]) -> bool {
    trim_whitespace(raw) == HEALTH_CHECK
}

fn trim_whitespace(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &raw[start..end]
}

/// `CHK` 的响应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReply {
    /// 本次请求是否新入队
    pub new: bool,
    /// 是否排在队首
    pub allow: bool,
    /// 队列中的位置，队首为 0
    pub pos: usize,
}

/// 响应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `true`
    Ack,
    Check(CheckReply),
}

impl Reply {
    pub fn encode(&self) -> Vec<u8> {
        let json = match self {
            Reply::Ack => serde_json::Value::Bool(true),
            Reply::Check(reply) => serde_json::json!(reply),
        };
        json.to_string().into_bytes()
    }

    pub fn parse(raw: &[u8]) -> Result<Self, SequencerError> {
        let bad_reply = || SequencerError::BadReply {
            reply: String::from_utf8_lossy(raw).to_string(),
        };
        let value: serde_json::Value = serde_json::from_slice(raw).map_err(|_| bad_reply())?;
        match value {
            serde_json::Value::Bool(true) => Ok(Reply::Ack),
            serde_json::Value::Object(_) => serde_json::from_value(value)
                .map(Reply::Check)
                .map_err(|_| bad_reply()),
            _ => Err(bad_reply()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(c: char) -> SessionId {
        SessionId::parse(&c.to_string().repeat(SESSION_ID_LEN)).unwrap()
    }

    #[test]
    fn test_parse_requests() {
        let a = token('a');
        assert_eq!(Request::parse(b"").unwrap(), Request::Health);
        assert_eq!(Request::parse(b"healthz\n").unwrap(), Request::Health);
        assert_eq!(
            Request::parse(&Request::Check(a.clone()).encode()).unwrap(),
            Request::Check(a.clone())
        );

        let mut framed = Request::Leave(a.clone()).encode();
        framed.push(b'\n');
        assert_eq!(Request::parse(&framed).unwrap(), Request::Leave(a));
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(matches!(
            Request::parse(b"CHK:short"),
            Err(SequencerError::Malformed { .. })
        ));

        let bad_op = [b"PUT:".as_slice(), token('b').as_bytes()].concat();
        assert!(matches!(
            Request::parse(&bad_op),
            Err(SequencerError::Malformed { .. })
        ));
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = Reply::Check(CheckReply {
            new: true,
            allow: false,
            pos: 1,
        });
        assert_eq!(
            String::from_utf8(reply.encode()).unwrap(),
            r#"{"allow":false,"new":true,"pos":1}"#
        );
        assert_eq!(Reply::Ack.encode(), b"true");
        assert_eq!(Reply::parse(b"true").unwrap(), Reply::Ack);
        assert_eq!(
            Reply::parse(br#"{"new":false,"allow":true,"pos":0}"#).unwrap(),
            Reply::Check(CheckReply {
                new: false,
                allow: true,
                pos: 0
            })
        );
        assert!(Reply::parse(b"false").is_err());
    }
}
