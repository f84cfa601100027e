//! # Sanduq Support
//!
//! Shared utilities for the Sanduq DI runtime.
//!
//! This crate provides:
//! - Text rendering for error messages
//! - Tracing subscriber bootstrap

pub mod logging;
pub mod rendering;
