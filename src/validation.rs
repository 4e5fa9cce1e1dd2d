//! Input validation for values the bot forwards to the server or persists.

use crate::transport::TT_STRLEN;

/// Validation errors; the message is shown to the user as-is.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} too long.")]
    TooLong { field: &'static str },

    #[error("{field} contains control characters")]
    ControlCharacters { field: &'static str },

    #[error("Filter words must be a single word")]
    NotSingleWord,
}

fn check_text(value: &str, field: &'static str, allow_empty: bool) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() && !allow_empty {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() >= TT_STRLEN {
        return Err(ValidationError::TooLong { field });
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters { field });
    }
    Ok(trimmed.to_string())
}

/// Nickname for `cn`: non-empty, below the protocol string limit.
pub fn validate_nickname(nickname: &str) -> Result<String, ValidationError> {
    check_text(nickname, "Nickname", false)
}

/// Status text for `cs`. Empty clears the status.
pub fn validate_status(status: &str) -> Result<String, ValidationError> {
    check_text(status, "Status", true)
}

/// Channel path in the server's `/a/b/` form. Missing slashes are added.
pub fn validate_channel_path(path: &str) -> Result<String, ValidationError> {
    let mut normalized = check_text(path, "Channel path", false)?;
    if !normalized.starts_with('/') {
        normalized.insert(0, '/');
    }
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Filter words are matched case-insensitively as whole words.
pub fn sanitize_filter_word(word: &str) -> Result<String, ValidationError> {
    let trimmed = word.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field: "Filter word" });
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ValidationError::NotSingleWord);
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters { field: "Filter word" });
    }
    Ok(trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_rules() {
        assert_eq!(validate_nickname("  Bob ").unwrap(), "Bob");
        assert_eq!(
            validate_nickname("   "),
            Err(ValidationError::Empty { field: "Nickname" })
        );
        assert_eq!(
            validate_nickname(&"n".repeat(TT_STRLEN)),
            Err(ValidationError::TooLong { field: "Nickname" })
        );
        assert!(validate_nickname("bad\u{7}name").is_err());
    }

    #[test]
    fn status_may_be_cleared() {
        assert_eq!(validate_status("").unwrap(), "");
        assert_eq!(
            validate_status(&"s".repeat(600)).unwrap_err().to_string(),
            "Status too long."
        );
    }

    #[test]
    fn channel_paths_are_normalized() {
        assert_eq!(validate_channel_path("lobby").unwrap(), "/lobby/");
        assert_eq!(validate_channel_path("/a/b").unwrap(), "/a/b/");
        assert_eq!(validate_channel_path("/").unwrap(), "/");
        assert!(validate_channel_path("").is_err());
    }

    #[test]
    fn filter_words_are_single_lowercase_tokens() {
        assert_eq!(sanitize_filter_word(" BadWord ").unwrap(), "badword");
        assert_eq!(sanitize_filter_word("two words"), Err(ValidationError::NotSingleWord));
        assert!(sanitize_filter_word(" ").is_err());
    }
}
