//! Shared test utilities for voterroll integration tests.
//!
//! This module provides:
//! - `TestHarness` with a temp directory, a file-backed database and a
//!   scripted extractor standing in for the OCR worker
//! - Builders for intake requests and extracted voters

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{Scripted, ScriptedExtractor, TestHarness};
