//! # Answer Prober
//!
//! 在外部测验平台上批量探测正确答案的协调引擎
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础层
//! - `store/` - 存储接口与内存实现，唯一约束是并发安全的基础
//! - `clients/` - 平台客户端与临时邮箱接口
//! - `sequencer/` - 全局先进先出的准入排队服务及其客户端
//!
//! ### ② 业务能力层（Services）
//! - `IdentityPool` - 账号注册、租用、淘汰
//! - `LockManager` - 题目建议锁
//! - `WorkScheduler` - 课程发现、监视账号分配、选题
//!
//! ### ③ 流程层（Workflow）
//! - `ProbePass` - 一次答题：取题 → 选候选答案 → 提交 → 核对
//! - `candidates` - 候选答案空间
//!
//! ### ④ 编排层（Orchestration）
//! - `AttemptController` - 一次尝试及其失败处理
//! - `App` - 并发尝试与维护任务
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod sequencer;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{App, AttemptController, AttemptOutcome, AttemptStats};
pub use sequencer::{Admission, SequencerClient, SequencerServer};
pub use store::{MemoryStore, Store};
pub use workflow::{PassCtx, PassOutcome, ProbePass};
