//! SQL utility functions

/// Escape SQL LIKE metacharacters (%, _, \) in user input
///
/// Patterns built from the result must be matched with `ESCAPE '\'`.
///
/// # Example
///
/// ```
/// use cardex_server::utils::sql::escape_like_pattern;
///
/// let user_input = "100% match_test";
/// let pattern = format!("%{}%", escape_like_pattern(user_input));
/// assert_eq!(pattern, "%100\\% match\\_test%");
/// ```
pub fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Where a literal fragment must appear inside the matched text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAnchor {
    /// Anywhere (`%value%`)
    Contains,
    /// At the start (`value%`)
    Prefix,
    /// At the end (`%value`)
    Suffix,
}

/// Build an escaped LIKE pattern that matches `value` literally
pub fn literal_like_pattern(value: &str, anchor: LikeAnchor) -> String {
    let escaped = escape_like_pattern(value);
    match anchor {
        LikeAnchor::Contains => format!("%{}%", escaped),
        LikeAnchor::Prefix => format!("{}%", escaped),
        LikeAnchor::Suffix => format!("%{}", escaped),
    }
}

/// Count `?` parameter markers in a raw SQL fragment
pub fn count_placeholders(sql: &str) -> usize {
    sql.matches('?').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_pattern_no_special_chars() {
        assert_eq!(escape_like_pattern("Naruto"), "Naruto");
    }

    #[test]
    fn test_escape_like_pattern_percent_and_underscore() {
        assert_eq!(escape_like_pattern("100%_rank"), "100\\%\\_rank");
    }

    #[test]
    fn test_escape_like_pattern_backslash() {
        assert_eq!(escape_like_pattern("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_escape_like_pattern_empty() {
        assert_eq!(escape_like_pattern(""), "");
    }

    #[test]
    fn test_literal_like_pattern_anchors() {
        assert_eq!(
            literal_like_pattern("Naruto", LikeAnchor::Contains),
            "%Naruto%"
        );
        assert_eq!(literal_like_pattern("Nar", LikeAnchor::Prefix), "Nar%");
        assert_eq!(literal_like_pattern("uto", LikeAnchor::Suffix), "%uto");
        assert_eq!(
            literal_like_pattern("50%", LikeAnchor::Contains),
            "%50\\%%"
        );
    }

    #[test]
    fn test_count_placeholders() {
        assert_eq!(count_placeholders("t0.count > ?"), 1);
        assert_eq!(count_placeholders("t0.a BETWEEN ? AND ?"), 2);
        assert_eq!(count_placeholders("1=1"), 0);
    }
}
