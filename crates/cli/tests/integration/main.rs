//! CLI integration tests for artifactor.

mod common;
mod plan_tests;
mod run_tests;
