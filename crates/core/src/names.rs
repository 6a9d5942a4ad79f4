//! Validation of case and evidence names.
//!
//! Both names become path segments of a blob key, so they are restricted to a
//! charset that can never escape its container.

use crate::{Error, Result};

/// Maximum length of a case or evidence name in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Validate a case name.
pub fn validate_case_name(name: &str) -> Result<()> {
    validate_name("case name", name)
}

/// Validate an evidence name.
pub fn validate_evidence_name(name: &str) -> Result<()> {
    validate_name("evidence name", name)
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid(format!("{what} must not be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid(format!(
            "{what} must not exceed {MAX_NAME_LEN} bytes"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::invalid(format!(
            "{what} contains invalid character {bad:?}"
        )));
    }
    if name.starts_with('.') || name.contains("..") {
        return Err(Error::invalid(format!(
            "{what} must not start with '.' or contain '..'"
        )));
    }
    Ok(())
}
