//! Unit tests for the lifecycle orchestrator, split by operation.

mod fixtures;
mod provision;
