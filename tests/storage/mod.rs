//! Shared storage contract tests.
//!
//! Each storage implementation imports these test functions and runs them.

pub mod compensation_store_tests;
pub mod offset_store_tests;
pub mod table_store_tests;
