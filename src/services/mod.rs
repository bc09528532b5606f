//! 业务能力层（Services）
//!
//! 每个服务描述"我能做什么"，不关心调用顺序：
//!
//! - `identity_pool` - 账号的注册、租用、淘汰
//! - `lock_manager` - 题目的建议锁
//! - `scheduler` - 课程发现、测试登记、监视账号分配和选题

pub mod identity_pool;
pub mod lock_manager;
pub mod scheduler;

pub use identity_pool::{IdentityPool, PoolAction};
pub use lock_manager::{LockManager, LockOutcome};
pub use scheduler::{CourseScan, DiscoveryStats, WorkScheduler, WorkSelection};
