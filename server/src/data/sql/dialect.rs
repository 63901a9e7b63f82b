//! SQL dialect trait for multi-database support
//!
//! This trait defines the interface for generating database-specific SQL syntax.

/// SQL dialect trait for generating database-specific SQL
///
/// Different databases have different syntax for:
/// - Parameter placeholders (? vs $1)
/// - Case-insensitive pattern matching
/// - NULL ordering
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Generate a parameter placeholder for the given index (1-based)
    ///
    /// - SQLite: Always returns "?"
    /// - PostgreSQL: Returns "$1", "$2", etc.
    fn placeholder(&self, index: usize) -> String;

    /// Generate a LIKE test of `col` against a bound pattern
    ///
    /// - SQLite: `LOWER(col) LIKE LOWER(?)` when case-insensitive
    /// - PostgreSQL: `col ILIKE $1`
    fn like(&self, col: &str, placeholder: &str, case_insensitive: bool, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        if case_insensitive {
            format!("LOWER({}) {}LIKE LOWER({})", col, not, placeholder)
        } else {
            format!("{} {}LIKE {}", col, not, placeholder)
        }
    }

    /// Generate LIMIT/OFFSET clause
    ///
    /// Most databases use `LIMIT x OFFSET y`, but syntax may vary.
    fn limit_offset(&self, limit: u32, offset: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    /// Generate ORDER BY clause with NULL handling
    ///
    /// - PostgreSQL: `col DESC NULLS LAST`
    /// - SQLite: Doesn't support NULLS FIRST/LAST
    fn order_by_with_nulls(&self, col: &str, desc: bool, nulls_last: bool) -> String;
}
