//! Backend-specific queue implementations.

pub mod memory;
pub mod sqs;

pub use memory::MemoryMessageQueue;
pub use sqs::SqsMessageQueue;
