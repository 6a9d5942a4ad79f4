//! Shared helpers for storage integration tests.

#![allow(dead_code)]

pub mod fixtures;
