//! Version status state machine.
//!
//! draft → review → approved, with review → draft as the only way back.
//! Approved is terminal. Approval is admin-only; the other transitions
//! need editor or above.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::RegistryError;
use crate::types::{UserRole, VersionStatus};

pub fn is_valid_transition(from: VersionStatus, to: VersionStatus) -> bool {
    use VersionStatus::*;
    matches!(
        (from, to),
        (Draft, Review) | (Review, Draft) | (Review, Approved)
    )
}

/// Minimum role allowed to perform a given transition target.
pub fn required_role(to: VersionStatus) -> UserRole {
    match to {
        VersionStatus::Approved => UserRole::Admin,
        _ => UserRole::Editor,
    }
}

fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]{1,50}$").expect("label regex"))
}

/// Version labels: 1–50 chars of alphanumerics, dots, dashes, underscores.
pub fn validate_label(label: &str) -> Result<(), RegistryError> {
    if label_regex().is_match(label) {
        Ok(())
    } else {
        Err(RegistryError::Validation(
            "version label must be 1-50 characters of alphanumerics, dots, dashes and underscores"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VersionStatus::*;

    #[test]
    fn allowed_transitions() {
        assert!(is_valid_transition(Draft, Review));
        assert!(is_valid_transition(Review, Draft));
        assert!(is_valid_transition(Review, Approved));
    }

    #[test]
    fn approved_is_terminal() {
        assert!(!is_valid_transition(Approved, Draft));
        assert!(!is_valid_transition(Approved, Review));
        assert!(!is_valid_transition(Approved, Approved));
    }

    #[test]
    fn no_skipping_review() {
        assert!(!is_valid_transition(Draft, Approved));
        assert!(!is_valid_transition(Draft, Draft));
        assert!(!is_valid_transition(Review, Review));
    }

    #[test]
    fn approval_requires_admin() {
        assert_eq!(required_role(Approved), UserRole::Admin);
        assert_eq!(required_role(Review), UserRole::Editor);
        assert_eq!(required_role(Draft), UserRole::Editor);
    }

    #[test]
    fn label_rules() {
        assert!(validate_label("v1.0").is_ok());
        assert!(validate_label("release_2024-06").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label("a".repeat(51).as_str()).is_err());
        assert!(validate_label("v1 0").is_err());
        assert!(validate_label("v1/0").is_err());
    }
}
