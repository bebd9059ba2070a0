//! Input validation utilities for the compute ledger

use crate::state::MAX_MODEL_NAME_LEN;

/// Validates that a string contains only printable ASCII characters.
///
/// # Examples
/// ```
/// use compute_ledger::utils::validation::validate_string_input;
///
/// assert!(validate_string_input("llama-3 70b"));
/// assert!(!validate_string_input("llama\n3"));
/// ```
pub fn validate_string_input(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_graphic() || c == ' ')
}

/// A model name is 1..=32 bytes of printable ASCII without leading or
/// trailing spaces, so it can be used verbatim as a PDA seed.
pub fn validate_model_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_MODEL_NAME_LEN
        && validate_string_input(name)
        && name.trim() == name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_strings() {
        assert!(validate_string_input("hello world"));
        assert!(validate_string_input("mistral-7b-instruct/v0.2"));
        assert!(validate_string_input(""));
    }

    #[test]
    fn test_invalid_control_chars() {
        assert!(!validate_string_input("hello\x00world"));
        assert!(!validate_string_input("hello\nworld"));
        assert!(!validate_string_input("hello\tworld"));
        assert!(!validate_string_input("\x1b[31mred\x1b[0m"));
    }

    #[test]
    fn test_invalid_non_ascii() {
        assert!(!validate_string_input("café"));
        assert!(!validate_string_input("模型"));
    }

    #[test]
    fn test_model_name_bounds() {
        assert!(validate_model_name("a"));
        assert!(validate_model_name(&"x".repeat(MAX_MODEL_NAME_LEN)));
        assert!(!validate_model_name(""));
        assert!(!validate_model_name(&"x".repeat(MAX_MODEL_NAME_LEN + 1)));
    }

    #[test]
    fn test_model_name_rejects_padding() {
        assert!(validate_model_name("gpt neo"));
        assert!(!validate_model_name(" gpt"));
        assert!(!validate_model_name("gpt "));
    }
}
