//! 先进先出的准入队列
//!
//! 只有队首令牌能通过，通过的令牌必须主动 `leave` 后下一个才会放行。

use std::collections::VecDeque;

use super::protocol::CheckReply;
use crate::error::SequencerError;
use crate::models::SessionId;

#[derive(Debug, Default)]
pub struct AdmissionQueue {
    tokens: VecDeque<SessionId>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未见过的令牌追加到队尾，并返回其位置
    pub fn check(&mut self, token: &SessionId) -> CheckReply {
        let new = match self.position(token) {
            Some(_) => false,
            None => {
                self.tokens.push_back(token.clone());
                true
            }
        };

        let pos = self.position(token).unwrap_or(self.tokens.len() - 1);
        CheckReply {
            new,
            allow: pos == 0,
            pos,
        }
    }

    /// 只有队首令牌可以离开
    pub fn leave(&mut self, token: &SessionId) -> Result<(), SequencerError> {
        match self.position(token) {
            Some(0) => {
                self.tokens.pop_front();
                Ok(())
            }
            Some(pos) => Err(SequencerError::NotHead { pos }),
            None => Err(SequencerError::NotQueued),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn position(&self, token: &SessionId) -> Option<usize> {
        self.tokens.iter().position(|queued| queued == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sessions_take_turns() {
        let mut queue = AdmissionQueue::new();
        let a = SessionId::generate();
        let b = SessionId::generate();

        assert_eq!(queue.check(&a), CheckReply { new: true, allow: true, pos: 0 });
        assert_eq!(queue.check(&b), CheckReply { new: true, allow: false, pos: 1 });
        assert_eq!(queue.check(&b), CheckReply { new: false, allow: false, pos: 1 });

        // b 不是队首，离开被拒绝且队列不变
        assert!(matches!(queue.leave(&b), Err(SequencerError::NotHead { pos: 1 })));
        assert_eq!(queue.len(), 2);

        queue.leave(&a).unwrap();
        assert_eq!(queue.check(&b), CheckReply { new: false, allow: true, pos: 0 });

        queue.leave(&b).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unknown_token_cannot_leave() {
        let mut queue = AdmissionQueue::new();
        queue.check(&SessionId::generate());

        assert!(matches!(
            queue.leave(&SessionId::generate()),
            Err(SequencerError::NotQueued)
        ));
        assert_eq!(queue.len(), 1);
    }
}
