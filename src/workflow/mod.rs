//! 流程层（Workflow）
//!
//! - `candidates` - 候选答案空间的生成和编码
//! - `probe_pass` - 一次答题的完整流程
//! - `reconcile` - 根据结果页更新候选答案
//! - `pass_ctx` - 日志上下文

pub mod candidates;
pub mod pass_ctx;
pub mod probe_pass;
pub mod reconcile;

pub use pass_ctx::PassCtx;
pub use probe_pass::{PassOutcome, ProbePass};
pub use reconcile::{ProbedAnswer, ReconcileReport};
