//! Concurrent chunk dispatch.

pub mod call;
pub mod pool;

pub use call::{ChunkCall, ChunkDisposition, ChunkOutcome, RetryPolicy};
pub use pool::WorkerPool;
