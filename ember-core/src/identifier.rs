//! Identifier syntax validation
//!
//! Ember+ node identifiers follow the usual programming-language rules: a
//! leading letter or underscore, then letters, digits and underscores. The
//! check is exposed here so that validation hooks in the decode layers and
//! domain schemas share a single definition.

use crate::error::{EmberError, EmberResult};
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

/// Check whether a string is a well-formed identifier.
pub fn is_valid_identifier(s: &str) -> bool {
    IDENTIFIER_RE.is_match(s)
}

/// Validate an identifier, returning a descriptive error on failure.
pub fn validate_identifier(s: &str) -> EmberResult<()> {
    if is_valid_identifier(s) {
        Ok(())
    } else {
        Err(EmberError::Validation(format!(
            "malformed identifier: {:?}",
            s
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("gain"));
        assert!(is_valid_identifier("_input1"));
        assert!(is_valid_identifier("Channel_04"));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1channel"));
        assert!(!is_valid_identifier("with space"));
        assert!(!is_valid_identifier("dash-ed"));
    }

    #[test]
    fn test_validate_error() {
        assert!(validate_identifier("ok").is_ok());
        assert!(matches!(
            validate_identifier("not ok"),
            Err(EmberError::Validation(_))
        ));
    }
}
