//! Glob-to-regex translation for rule patterns.
//!
//! Rule documents use `*` as "one or more of anything"; everything else is
//! literal. Matching is case-insensitive and anchored.

use regex::{Regex, RegexBuilder};

use crate::audit::errors::AuditError;

pub fn glob_to_regex(pattern: &str) -> Result<Regex, AuditError> {
    build_glob(pattern, ".+")
}

/// Like [`glob_to_regex`], but `*` matches zero or more characters, so a
/// bare `*` pattern matches anything including the empty string.
pub fn glob_to_regex_any(pattern: &str) -> Result<Regex, AuditError> {
    build_glob(pattern, ".*")
}

fn build_glob(pattern: &str, star: &str) -> Result<Regex, AuditError> {
    let escaped = regex::escape(pattern).replace(r"\*", star);
    RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
        .map_err(|e| AuditError::RuleParse(format!("invalid pattern `{pattern}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_one_or_more() {
        let re = glob_to_regex("user:*@company.com").unwrap();
        assert!(re.is_match("user:abc@company.com"));
        assert!(!re.is_match("user:@company.com"));
        assert!(!re.is_match("user:abc@goggle.com"));
    }

    #[test]
    fn test_literal_characters_are_escaped() {
        let re = glob_to_regex("roles/storage.admin").unwrap();
        assert!(re.is_match("roles/storage.admin"));
        assert!(!re.is_match("roles/storageXadmin"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let re = glob_to_regex("user:Alice@Company.com").unwrap();
        assert!(re.is_match("user:alice@company.com"));
    }

    #[test]
    fn test_match_is_anchored() {
        let re = glob_to_regex("roles/owner").unwrap();
        assert!(!re.is_match("roles/ownerly"));
        assert!(!re.is_match("xroles/owner"));
    }
}
