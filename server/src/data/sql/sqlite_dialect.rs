//! SQLite SQL dialect implementation

use super::SqlDialect;

/// SQLite SQL dialect
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn order_by_with_nulls(&self, col: &str, desc: bool, nulls_last: bool) -> String {
        // SQLite doesn't support NULLS FIRST/LAST, emulate with CASE
        let dir = if desc { "DESC" } else { "ASC" };
        let (null_rank, value_rank) = if nulls_last { (1, 0) } else { (0, 1) };
        format!(
            "CASE WHEN {} IS NULL THEN {} ELSE {} END, {} {}",
            col, null_rank, value_rank, col, dir
        )
    }
}
