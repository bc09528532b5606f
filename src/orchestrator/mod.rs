//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用主结构
//! - 组装存储、平台客户端和服务
//! - 维护任务与并发尝试
//!
//! ### `attempt` - 单次尝试控制器
//! - 排队、选题、登录、答题、确认或重置
//! - 答题中断信号到后续动作的映射
//!
//! ### `janitor` - 过期锁清理
//!
//! ## 层次关系
//!
//! ```text
//! app (并发尝试 + 维护)
//!     ↓
//! attempt (一次尝试)
//!     ↓
//! workflow::ProbePass (一次答题)
//!     ↓
//! services (能力层：identity_pool / lock_manager / scheduler)
//!     ↓
//! store / clients / sequencer
//! ```

pub mod app;
pub mod attempt;
pub mod janitor;

pub use app::{App, AttemptStats, MaintenanceReport};
pub use attempt::{AttemptController, AttemptOutcome};
