//! run 执行：启动与轮询

pub mod poller;

pub use poller::{poll_until_complete, start_turn, Backoff, PollPolicy};
