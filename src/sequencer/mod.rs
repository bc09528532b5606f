//! 准入排队
//!
//! 独立进程维护一个全局先进先出队列，答题进程在选题前排队，
//! 保证同一时刻只有一个进程在选题。

pub mod client;
pub mod protocol;
pub mod queue;
pub mod server;

pub use client::{Admission, SequencerClient};
pub use queue::AdmissionQueue;
pub use server::SequencerServer;
