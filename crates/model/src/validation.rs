//! Deterministic, pure validation functions over request data — no
//! reflection, no I/O.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::ContextBody;

const TITLE_MAX_LEN: usize = 50;
const DESCRIPTION_MAX_LEN: usize = 500;
const RAW_ENTRY_MAX_LEN: usize = 9000;
const USER_ID_MAX_LEN: usize = 20;

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").unwrap());
static USER_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,20}$").unwrap());
static USER_ID_COLLAPSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());
static RUN_UNDERSCORE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title must match ^[A-Za-z0-9-]+$ and be 1..{TITLE_MAX_LEN} chars, got {0:?}")]
    InvalidTitle(String),
    #[error("description must be at most {DESCRIPTION_MAX_LEN} chars, got {0} chars")]
    DescriptionTooLong(usize),
    #[error("raw entry must be non-empty and at most {RAW_ENTRY_MAX_LEN} chars, got {0} chars")]
    InvalidRawEntry(usize),
    #[error("summary must be non-empty")]
    EmptySummary,
    #[error("context body must be a JSON object")]
    ContextNotAnObject,
    #[error("context value for key {0:?} must be a non-empty string")]
    ContextValueNotNonEmptyString(String),
    #[error("user id must match ^[a-z0-9_]{{1,{USER_ID_MAX_LEN}}}$, got {0:?}")]
    InvalidUserId(String),
}

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.is_empty() || title.len() > TITLE_MAX_LEN || !TITLE_RE.is_match(title) {
        return Err(ValidationError::InvalidTitle(title.to_string()));
    }
    Ok(())
}

pub fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
    match description {
        None => Ok(()),
        Some(d) if d.chars().count() <= DESCRIPTION_MAX_LEN => Ok(()),
        Some(d) => Err(ValidationError::DescriptionTooLong(d.chars().count())),
    }
}

pub fn validate_raw_entry(raw: &str) -> Result<(), ValidationError> {
    let len = raw.chars().count();
    if raw.is_empty() || len > RAW_ENTRY_MAX_LEN {
        return Err(ValidationError::InvalidRawEntry(len));
    }
    Ok(())
}

pub fn validate_summary(summary: &str) -> Result<(), ValidationError> {
    if summary.is_empty() {
        return Err(ValidationError::EmptySummary);
    }
    Ok(())
}

/// Every top-level value in a context body must be a non-empty string.
pub fn validate_context_body(body: &ContextBody) -> Result<(), ValidationError> {
    for (key, value) in body {
        match value.as_str() {
            Some(s) if !s.is_empty() => {}
            _ => return Err(ValidationError::ContextValueNotNonEmptyString(key.clone())),
        }
    }
    Ok(())
}

pub fn validate_user_id(user_id: &str) -> Result<(), ValidationError> {
    if USER_ID_RE.is_match(user_id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUserId(user_id.to_string()))
    }
}

/// Derive a `userId` from an email when the caller omitted one: take the
/// local part (before the first `@`), collapse every run of
/// non-`[a-z0-9_]` characters to a single `_`, trim leading/trailing `_`,
/// and fall back to `user_<12-hex>` if nothing usable remains.
pub fn derive_user_id(email: &str) -> String {
    let local_part = email.split('@').next().unwrap_or("");
    let lowered = local_part.to_lowercase();
    let collapsed = USER_ID_COLLAPSE_RE.replace_all(&lowered, "_");
    let deduped = RUN_UNDERSCORE_RE.replace_all(&collapsed, "_");
    let trimmed = deduped.trim_matches('_');
    let truncated: String = trimmed.chars().take(USER_ID_MAX_LEN).collect();

    if truncated.is_empty() {
        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(12)
            .collect();
        format!("user_{suffix}")
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn title_accepts_alnum_and_hyphen() {
        assert!(validate_title("My-Vault-1").is_ok());
    }

    #[test]
    fn title_rejects_empty_and_oversized() {
        assert!(validate_title("").is_err());
        let long = "a".repeat(51);
        assert!(validate_title(&long).is_err());
    }

    #[test]
    fn title_rejects_disallowed_chars() {
        assert!(validate_title("has space").is_err());
        assert!(validate_title("has_underscore").is_err());
    }

    #[test]
    fn description_allows_none_and_caps_length() {
        assert!(validate_description(None).is_ok());
        assert!(validate_description(Some(&"a".repeat(500))).is_ok());
        assert!(validate_description(Some(&"a".repeat(501))).is_err());
    }

    #[test]
    fn raw_entry_rejects_empty_and_oversized() {
        assert!(validate_raw_entry("").is_err());
        assert!(validate_raw_entry("hello").is_ok());
        assert!(validate_raw_entry(&"a".repeat(9001)).is_err());
        assert!(validate_raw_entry(&"a".repeat(9000)).is_ok());
    }

    #[test]
    fn summary_rejects_empty() {
        assert!(validate_summary("").is_err());
        assert!(validate_summary("ok").is_ok());
    }

    #[test]
    fn context_body_requires_nonempty_string_values() {
        let mut body = ContextBody::new();
        body.insert("activeContext".to_string(), json!("ctx-1"));
        assert!(validate_context_body(&body).is_ok());

        let mut bad = ContextBody::new();
        bad.insert("activeContext".to_string(), json!(""));
        assert!(validate_context_body(&bad).is_err());

        let mut bad_type = ContextBody::new();
        bad_type.insert("count".to_string(), json!(3));
        assert!(validate_context_body(&bad_type).is_err());
    }

    #[test]
    fn user_id_derivation_collapses_and_trims() {
        assert_eq!(derive_user_id("Jane.Doe+test@x.com"), "jane_doe_test");
    }

    #[test]
    fn user_id_derivation_falls_back_when_nothing_usable_remains() {
        let derived = derive_user_id("___");
        assert!(derived.starts_with("user_"));
        assert_eq!(derived.len(), "user_".len() + 12);
    }

    #[test]
    fn user_id_validation_matches_pattern() {
        assert!(validate_user_id("jane_doe").is_ok());
        assert!(validate_user_id("Jane").is_err());
        assert!(validate_user_id(&"a".repeat(21)).is_err());
    }
}
