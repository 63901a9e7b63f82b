//! SQL abstraction layer for multi-database support
//!
//! Compiled filters are rendered through a [`SqlDialect`] so the same
//! condition tree produces valid SQL for SQLite and PostgreSQL.

mod dialect;
mod postgres_dialect;
mod sqlite_dialect;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use dialect::SqlDialect;
pub use postgres_dialect::PostgresDialect;
pub use sqlite_dialect::SqliteDialect;

/// Database backend identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Postgres,
}

impl Backend {
    /// Get the SQL dialect for this backend
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Backend::Sqlite => &SqliteDialect,
            Backend::Postgres => &PostgresDialect,
        }
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_serde() {
        let backend: Backend = serde_json::from_str(r#""postgres""#).unwrap();
        assert_eq!(backend, Backend::Postgres);
        assert_eq!(Backend::default(), Backend::Sqlite);
    }

    #[test]
    fn test_backend_dialect_matches_name() {
        for backend in [Backend::Sqlite, Backend::Postgres] {
            assert_eq!(backend.dialect().name(), backend.name());
            assert_eq!(backend.to_string(), backend.name());
        }
    }
}
