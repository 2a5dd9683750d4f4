//! Bounded worker pool with blocking fan-out and fan-in.

mod manager;
mod task;
mod worker;

pub use manager::*;
pub use task::{PoolTask, TaskFuture};
