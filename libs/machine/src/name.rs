//! Machine name validation.

use crate::MachineError;

/// Longest accepted machine name; macOS socket paths are short.
pub const MAX_MACHINE_NAME_LEN: usize = 30;

/// Validate a machine name: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`, at most
/// [`MAX_MACHINE_NAME_LEN`] characters.
pub fn validate_machine_name(name: &str) -> Result<(), MachineError> {
    let invalid = |reason: String| MachineError::InvalidMachineName {
        name: name.to_string(),
        reason,
    };

    if name.len() > MAX_MACHINE_NAME_LEN {
        return Err(invalid(format!(
            "must be {MAX_MACHINE_NAME_LEN} characters or less"
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("name cannot be empty".to_string())),
        Some(c) if !c.is_ascii_alphanumeric() => {
            return Err(invalid(
                "must start with an alphanumeric character".to_string(),
            ));
        }
        Some(_) => {}
    }

    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))) {
        return Err(invalid(format!("character {c:?} is not allowed")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_names() {
        for name in ["vmprep", "dev-1", "a", "Fedora_41.x86"] {
            assert!(validate_machine_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "-dev", ".hidden", "has space", "slash/name", "ü"] {
            assert!(validate_machine_name(name).is_err(), "{name}");
        }
    }

    #[test]
    fn test_name_too_long() {
        let name = "a".repeat(MAX_MACHINE_NAME_LEN + 1);
        let err = validate_machine_name(&name).unwrap_err();
        assert!(err.to_string().contains("30 characters"));
        assert!(validate_machine_name(&name[..MAX_MACHINE_NAME_LEN]).is_ok());
    }

    proptest! {
        #[test]
        fn prop_accepts_pattern(name in "[a-zA-Z0-9][a-zA-Z0-9_.-]{0,29}") {
            prop_assert!(validate_machine_name(&name).is_ok());
        }

        #[test]
        fn prop_rejects_path_separators(prefix in "[a-z]{1,10}", suffix in "[a-z]{0,10}") {
            let name = format!("{prefix}/{suffix}");
            prop_assert!(validate_machine_name(&name).is_err());
        }
    }
}
