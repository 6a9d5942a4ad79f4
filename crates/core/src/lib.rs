//! Core domain types and shared logic for the evidence custody service.
//!
//! This crate defines what every other crate agrees on:
//! - The caller-facing error taxonomy
//! - Content hashing of evidence bytes
//! - Case and evidence name rules
//! - Password hashing
//! - Application configuration

pub mod config;
pub mod error;
pub mod hash;
pub mod names;
pub mod password;

pub use error::{BoxError, Error, ErrorKind, Inconsistency, Result};
pub use hash::{ContentHash, ContentHasher};
pub use names::{validate_case_name, validate_evidence_name};
