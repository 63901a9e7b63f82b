//! Schema-less row decoding

use serde::Serialize;
use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, FromRow, Row, TypeInfo, ValueRef};

/// A row decoded by storage class into a JSON object, keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JsonRow(pub Map<String, Value>);

impl JsonRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for JsonRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mut map = Map::with_capacity(row.columns().len());
        for column in row.columns() {
            let index = column.ordinal();
            let raw = row.try_get_raw(index)?;
            let storage = raw.type_info().name().to_string();
            let value = if raw.is_null() {
                Value::Null
            } else {
                match storage.as_str() {
                    "INTEGER" => Value::from(row.try_get::<i64, _>(index)?),
                    "REAL" => Number::from_f64(row.try_get::<f64, _>(index)?)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    "TEXT" => Value::String(row.try_get::<String, _>(index)?),
                    other => {
                        return Err(sqlx::Error::ColumnDecode {
                            index: column.name().to_string(),
                            source: format!("unsupported storage class {}", other).into(),
                        });
                    }
                }
            };
            map.insert(column.name().to_string(), value);
        }
        Ok(Self(map))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    #[tokio::test]
    async fn test_decodes_storage_classes() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let row: JsonRow = sqlx::query_as("SELECT 1 AS id, 2.5 AS score, 'S' AS rank, NULL AS image")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(
            row.into_value(),
            json!({"id": 1, "score": 2.5, "rank": "S", "image": null})
        );
    }

    #[tokio::test]
    async fn test_rejects_blob() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let result: Result<JsonRow, _> = sqlx::query_as("SELECT x'00ff' AS data")
            .fetch_one(&pool)
            .await;
        assert!(matches!(result, Err(sqlx::Error::ColumnDecode { .. })));
    }
}
