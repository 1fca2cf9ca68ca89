//! End-to-end tests for stagehand-lib.

mod common;

mod build_tests;
mod manifest_tests;
