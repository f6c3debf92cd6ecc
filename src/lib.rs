//! ci-shard: one parallel CI worker that shards, checks and tests with fail-fast semantics.

pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod exec;
pub mod logs;
pub mod orchestrator;
pub mod report;
pub mod shard;
pub mod worker;
