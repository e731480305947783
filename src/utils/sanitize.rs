//! Comment input validation.
//!
//! Ingestion promises validated comments, but ids flow into logs, reports
//! and the result map, so they are checked once at the session boundary.

use std::collections::HashSet;

use crate::models::Comment;
use crate::OpinaError;

/// Maximum id length accepted from ingestion.
const MAX_ID_LEN: usize = 128;

/// Allowed characters in a comment id: alphanumeric plus `_ - . : /`.
fn is_valid_id_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '/')
}

/// Validate a single comment id.
pub fn validate_comment_id(id: &str) -> Result<&str, OpinaError> {
    if id.is_empty() {
        return Err(OpinaError::Validation("Comment id must not be empty".into()));
    }
    if id.chars().count() > MAX_ID_LEN {
        return Err(OpinaError::Validation(format!(
            "Comment id '{}...' exceeds {} characters",
            id.chars().take(16).collect::<String>(),
            MAX_ID_LEN
        )));
    }
    if !id.chars().all(is_valid_id_char) {
        return Err(OpinaError::Validation(format!(
            "Invalid comment id '{}': only alphanumerics and _ - . : / are allowed",
            id
        )));
    }
    Ok(id)
}

/// Validate a batch: every id well-formed and unique.
///
/// Text is not checked here. Empty or odd text is passed
/// through the duplicate detector untouched.
pub fn validate_comments(comments: &[Comment]) -> Result<(), OpinaError> {
    let mut seen = HashSet::with_capacity(comments.len());
    for comment in comments {
        validate_comment_id(&comment.id)?;
        if !seen.insert(comment.id.as_str()) {
            return Err(OpinaError::Validation(format!(
                "Duplicate comment id '{}'",
                comment.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(validate_comment_id("c-1").is_ok());
        assert!(validate_comment_id("encuesta_2024.07:42").is_ok());
        assert!(validate_comment_id("sucursal/asuncion/17").is_ok());
        assert!(validate_comment_id("ñandutí-3").is_ok());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(validate_comment_id("").is_err());
        assert!(validate_comment_id("a b").is_err());
        assert!(validate_comment_id("id;DROP").is_err());
        assert!(validate_comment_id("line\nbreak").is_err());
        assert!(validate_comment_id(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let comments = vec![Comment::new("a", "uno"), Comment::new("a", "dos")];
        let err = validate_comments(&comments).unwrap_err();
        assert!(err.to_string().contains("Duplicate comment id 'a'"));
    }

    #[test]
    fn test_empty_text_is_not_a_validation_error() {
        let comments = vec![Comment::new("a", ""), Comment::new("b", "   ")];
        assert!(validate_comments(&comments).is_ok());
    }

    // -- Property-based tests --

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_well_formed_ids_always_pass(id in "[a-zA-Z0-9][a-zA-Z0-9_.:/-]{0,40}") {
                prop_assert!(validate_comment_id(&id).is_ok(), "Should accept: {}", id);
            }

            #[test]
            fn prop_whitespace_never_passes(prefix in "[a-z]{1,8}", suffix in "[a-z]{1,8}") {
                let id = format!("{} {}", prefix, suffix);
                prop_assert!(validate_comment_id(&id).is_err());
            }
        }
    }
}
