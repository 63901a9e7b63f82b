//! PostgreSQL SQL dialect implementation

use super::SqlDialect;

/// PostgreSQL SQL dialect
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn like(&self, col: &str, placeholder: &str, case_insensitive: bool, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        let op = if case_insensitive { "ILIKE" } else { "LIKE" };
        format!("{} {}{} {}", col, not, op, placeholder)
    }

    fn order_by_with_nulls(&self, col: &str, desc: bool, nulls_last: bool) -> String {
        let dir = if desc { "DESC" } else { "ASC" };
        let nulls = if nulls_last {
            "NULLS LAST"
        } else {
            "NULLS FIRST"
        };
        format!("{} {} {}", col, dir, nulls)
    }
}
