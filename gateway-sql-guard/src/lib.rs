//! Read-only admission checks for the `execute_sql` tool (C2).
//!
//! Two independent boundaries: [`check_read_only`] gates whole statements,
//! [`sanitize_identifier`] gates individual identifiers (table/column/schema
//! names) that drivers cannot bind as parameters. Values always flow through
//! bound parameters at the adapter layer; these checks never touch values.

const BLOCKED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlGuardError {
    Empty,
    NotReadOnly,
    MultipleStatements,
    CommentSmuggling,
    BlockedKeyword(String),
    InvalidIdentifier(String),
}

impl std::fmt::Display for SqlGuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlGuardError::Empty => write!(f, "SQL statement must not be empty"),
            SqlGuardError::NotReadOnly => {
                write!(f, "Only SELECT or WITH statements are allowed")
            }
            SqlGuardError::MultipleStatements => write!(f, "Multiple statements not allowed"),
            SqlGuardError::CommentSmuggling => write!(f, "SQL comments are not allowed"),
            SqlGuardError::BlockedKeyword(kw) => write!(f, "Blocked keyword: {kw}"),
            SqlGuardError::InvalidIdentifier(name) => write!(f, "Invalid identifier: '{name}'"),
        }
    }
}

impl std::error::Error for SqlGuardError {}

/// Accepts only statements whose first token is `SELECT`/`WITH`, with no
/// `;`, no `--`/`/*` comments, and no mutating keyword appearing as a whole
/// word anywhere in the statement.
pub fn check_read_only(sql: &str) -> Result<(), SqlGuardError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(SqlGuardError::Empty);
    }

    if trimmed.contains(';') {
        return Err(SqlGuardError::MultipleStatements);
    }
    if trimmed.contains("--") || trimmed.contains("/*") {
        return Err(SqlGuardError::CommentSmuggling);
    }

    let first_word: String = trimmed
        .chars()
        .take_while(|c| c.is_alphanumeric())
        .collect();
    let first_word = first_word.to_ascii_uppercase();
    if first_word != "SELECT" && first_word != "WITH" {
        return Err(SqlGuardError::NotReadOnly);
    }

    for keyword in BLOCKED_KEYWORDS {
        if contains_whole_word(trimmed, keyword) {
            return Err(SqlGuardError::BlockedKeyword((*keyword).to_string()));
        }
    }

    Ok(())
}

fn contains_whole_word(haystack: &str, word: &str) -> bool {
    let haystack_upper = haystack.to_ascii_uppercase();
    let word_len = word.len();
    let mut start = 0;
    while let Some(pos) = haystack_upper[start..].find(word) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack_upper.as_bytes()[abs - 1].is_ascii_alphanumeric()
                && haystack_upper.as_bytes()[abs - 1] != b'_';
        let after = abs + word_len;
        let after_ok = after >= haystack_upper.len()
            || !haystack_upper.as_bytes()[after].is_ascii_alphanumeric()
                && haystack_upper.as_bytes()[after] != b'_';
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
    }
    false
}

/// Accepts only `[A-Za-z0-9_.]{1,128}`. The dot allows `schema.table`.
/// Callers apply the dialect's native identifier quoting *after* this
/// check succeeds, never instead of it.
pub fn sanitize_identifier(name: &str) -> Result<&str, SqlGuardError> {
    if name.is_empty() || name.len() > 128 {
        return Err(SqlGuardError::InvalidIdentifier(name.to_string()));
    }
    if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        Ok(name)
    } else {
        Err(SqlGuardError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_select_and_with() {
        assert!(check_read_only("SELECT * FROM users").is_ok());
        assert!(check_read_only("  select id from t  ").is_ok());
        assert!(check_read_only("WITH x AS (SELECT 1) SELECT * FROM x").is_ok());
    }

    #[test]
    fn rejects_non_select_leading_token() {
        assert_eq!(
            check_read_only("UPDATE users SET x = 1"),
            Err(SqlGuardError::NotReadOnly)
        );
    }

    #[test]
    fn rejects_empty_and_whitespace_only() {
        assert_eq!(check_read_only(""), Err(SqlGuardError::Empty));
        assert_eq!(check_read_only("   "), Err(SqlGuardError::Empty));
    }

    #[test]
    fn rejects_multiple_statements() {
        assert_eq!(
            check_read_only("SELECT 1; DROP TABLE users"),
            Err(SqlGuardError::MultipleStatements)
        );
    }

    #[test]
    fn rejects_comment_smuggling() {
        assert_eq!(
            check_read_only("SELECT 1 -- DROP TABLE users"),
            Err(SqlGuardError::CommentSmuggling)
        );
        assert_eq!(
            check_read_only("SELECT 1 /* sneaky */"),
            Err(SqlGuardError::CommentSmuggling)
        );
    }

    #[test]
    fn rejects_blocked_keywords_anywhere() {
        assert_eq!(
            check_read_only("SELECT * FROM (DELETE FROM users RETURNING *) t"),
            Err(SqlGuardError::BlockedKeyword("DELETE".to_string()))
        );
    }

    #[test]
    fn does_not_false_positive_on_substrings() {
        // "created_at" contains "CREATE" only as a substring, not a whole word.
        assert!(check_read_only("SELECT created_at FROM events").is_ok());
        // "deleted" contains "DELETE" only as a substring.
        assert!(check_read_only("SELECT deleted FROM events").is_ok());
    }

    #[test]
    fn sanitize_identifier_accepts_schema_qualified_names() {
        assert_eq!(sanitize_identifier("public.users").unwrap(), "public.users");
        assert_eq!(sanitize_identifier("col_1").unwrap(), "col_1");
    }

    #[test]
    fn sanitize_identifier_rejects_deviations() {
        assert!(matches!(
            sanitize_identifier(""),
            Err(SqlGuardError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            sanitize_identifier("users; DROP TABLE x"),
            Err(SqlGuardError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            sanitize_identifier("users\""),
            Err(SqlGuardError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            sanitize_identifier(&"a".repeat(129)),
            Err(SqlGuardError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn invalid_identifier_message_names_the_identifier_not_read_only() {
        let err = sanitize_identifier("users; DROP TABLE x").unwrap_err();
        assert_eq!(err.to_string(), "Invalid identifier: 'users; DROP TABLE x'");
    }
}
