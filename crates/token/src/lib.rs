//! Signed, time-bounded bearer tokens.
//!
//! This crate provides:
//! - Ed25519 key generation and parsing
//! - The [`TokenMaker`] capability and its Ed25519 implementation
//!
//! Verification never reveals why a token was rejected.

pub mod error;
pub mod key;
pub mod maker;

pub use error::{TokenError, TokenResult};
pub use key::{PublicKey, SecretKey};
pub use maker::{Ed25519TokenMaker, Payload, TokenMaker};
