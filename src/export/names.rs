//! Session name normalization

use chrono::Utc;

/// Turn a user supplied name into a safe archive base name.
///
/// Whitespace runs become `_` and anything other than alphanumerics, `_`
/// and `-` is dropped. An empty result falls back to `session_<epoch-ms>`.
pub fn normalize_session_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut in_whitespace = false;

    for c in raw.trim().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                name.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_alphanumeric() || c == '_' || c == '-' {
            name.push(c);
        }
    }

    if name.is_empty() {
        format!("session_{}", Utc::now().timestamp_millis())
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_session_name() {
        assert_eq!(normalize_session_name("  my run!! "), "my_run");
        assert_eq!(normalize_session_name("crux\t \tattempt-2"), "crux_attempt-2");
        assert_eq!(normalize_session_name("moon_board"), "moon_board");
        assert_eq!(normalize_session_name("課題 1"), "課題_1");
    }

    #[test]
    fn test_empty_name_falls_back() {
        for raw in ["", "   ", "!!?"] {
            let name = normalize_session_name(raw);
            let suffix = name.strip_prefix("session_").expect("fallback prefix");
            assert!(suffix.parse::<i64>().is_ok());
        }
    }
}
