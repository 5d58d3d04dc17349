//! Tests for the loop engine
//!
//! Organized by loop kind and feature area; scripts run through a `Session`
//! with captured output.

pub mod helpers;

mod cancel_tests;
mod count_tests;
mod error_tests;
mod index_tests;
mod progressive_tests;
mod reentry_tests;
mod while_for_tests;
