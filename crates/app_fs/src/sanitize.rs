//! New-name validation and sibling collision matching for renames

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use thiserror::Error;

/// Why a proposed file name was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidName {
    #[error("name is empty")]
    Empty,
    #[error("name contains a path separator")]
    PathSeparator,
    #[error("name is a relative path component")]
    Reserved,
    #[error("name contains control characters")]
    ControlCharacter,
}

/// How sibling names are compared when checking for collisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CasePolicy {
    #[serde(rename = "sensitive")]
    Sensitive,
    /// `Photo.PNG` collides with `photo.png`
    #[default]
    #[serde(rename = "insensitive")]
    Insensitive,
}

/// Validate a bare file name typed by the user.
///
/// Only structural problems are rejected; whether the name collides with an
/// existing file is a separate check.
pub fn validate_new_name(name: &str) -> Result<(), InvalidName> {
    if name.trim().is_empty() {
        return Err(InvalidName::Empty);
    }
    if name.contains('/') || name.contains('\\') || name.contains(std::path::MAIN_SEPARATOR) {
        return Err(InvalidName::PathSeparator);
    }
    if name == "." || name == ".." {
        return Err(InvalidName::Reserved);
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(InvalidName::ControlCharacter);
    }
    Ok(())
}

/// Compare two file names under `policy`
pub fn names_match(a: &str, b: &str, policy: CasePolicy) -> bool {
    match policy {
        CasePolicy::Sensitive => a == b,
        CasePolicy::Insensitive => a == b || a.to_lowercase() == b.to_lowercase(),
    }
}

/// Find an existing sibling that `new_name` would collide with.
///
/// `current_name` is the file being renamed; it never collides with itself,
/// which allows changing only the case of a name.
pub fn find_collision(
    siblings: &[OsString],
    current_name: &str,
    new_name: &str,
    policy: CasePolicy,
) -> Option<String> {
    siblings
        .iter()
        .map(|s| s.to_string_lossy())
        .filter(|s| s.as_ref() != current_name)
        .find(|s| names_match(s, new_name, policy))
        .map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects() {
        assert_eq!(validate_new_name(""), Err(InvalidName::Empty));
        assert_eq!(validate_new_name("   "), Err(InvalidName::Empty));
        assert_eq!(validate_new_name("a/b.png"), Err(InvalidName::PathSeparator));
        assert_eq!(validate_new_name("a\\b.png"), Err(InvalidName::PathSeparator));
        assert_eq!(validate_new_name(".."), Err(InvalidName::Reserved));
        assert_eq!(validate_new_name("a\nb.png"), Err(InvalidName::ControlCharacter));
    }

    #[test]
    fn test_validate_accepts() {
        assert!(validate_new_name("holiday 2024.png").is_ok());
        assert!(validate_new_name("写真.jpg").is_ok());
        assert!(validate_new_name(".dotfile").is_ok());
    }

    #[test]
    fn test_collision_policies() {
        let siblings: Vec<OsString> = vec!["a.png".into(), "B.png".into()];

        assert_eq!(
            find_collision(&siblings, "a.png", "b.png", CasePolicy::Insensitive),
            Some("B.png".to_string())
        );
        assert_eq!(find_collision(&siblings, "a.png", "b.png", CasePolicy::Sensitive), None);
        assert_eq!(
            find_collision(&siblings, "a.png", "B.png", CasePolicy::Sensitive),
            Some("B.png".to_string())
        );
    }

    #[test]
    fn test_case_only_rename_is_not_a_collision() {
        let siblings: Vec<OsString> = vec!["a.png".into()];
        assert_eq!(find_collision(&siblings, "a.png", "A.png", CasePolicy::Insensitive), None);
    }
}
