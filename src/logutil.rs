//! Logging helpers shared by the session worker, the dispatcher and the console.
//!
//! Chat text is user controlled; anything that ends up in a log line goes
//! through [`escape_log`] first so a multi-line message cannot forge log
//! records.

/// Log a security-relevant event on the dedicated `security` target.
///
/// The binary routes this target to `logging.security_file` when configured.
#[macro_export]
macro_rules! sec_log {
    ($($arg:tt)*) => {
        log::warn!(target: "security", $($arg)*);
    };
}

/// Longest preview of a chat message written to the log.
pub const MAX_PREVIEW: usize = 200;

/// Escape a string for single-line logging.
///
/// Backslash, `\n`, `\r` and `\t` become their escaped forms, other control
/// characters are written as `\xNN`. Output is capped at [`MAX_PREVIEW`]
/// characters with a trailing ellipsis.
pub fn escape_log(s: &str) -> String {
    escape_log_with_limit(s, MAX_PREVIEW)
}

pub fn escape_log_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Render a duration in seconds the way chat replies show it: `1d 2h 3m 4s`.
///
/// Zero-valued leading units are omitted; a negative input renders as `N/A`.
pub fn format_elapsed(seconds: i64) -> String {
    if seconds < 0 {
        return "N/A".to_string();
    }
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 || !parts.is_empty() {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 || !parts.is_empty() {
        parts.push(format!("{}m", minutes));
    }
    parts.push(format!("{}s", secs));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_truncates() {
        assert_eq!(escape_log("Line1\nLine2\r\tEnd"), "Line1\\nLine2\\r\\tEnd");
        let long = "x".repeat(10);
        assert_eq!(escape_log_with_limit(&long, 4), "xxxx…");
    }

    #[test]
    fn elapsed_skips_leading_zero_units() {
        assert_eq!(format_elapsed(5), "5s");
        assert_eq!(format_elapsed(3_600), "1h 0m 0s");
        assert_eq!(format_elapsed(90_061), "1d 1h 1m 1s");
        assert_eq!(format_elapsed(-1), "N/A");
    }
}
