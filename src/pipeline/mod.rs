//! The resumable annotation pipeline: source cursor → batcher → LLM
//! dispatch → ordered sink → durable writer, checkpointed per batch.

pub mod batcher;
pub mod checkpoint;
pub mod client;
pub mod cursor;
pub mod prompt;
pub mod recover;
pub mod runner;
pub mod sink;
pub mod types;
pub mod writer;
