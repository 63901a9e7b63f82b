//! Pagination, ordering and search result types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::core::constants::{DEFAULT_PAGE, DEFAULT_PER_PAGE, MAX_PER_PAGE};
use crate::data::filters::{FilterError, FilterNode};

/// Validator function for page parameter
pub fn validate_page(page: u32) -> Result<(), ValidationError> {
    if page < 1 {
        return Err(ValidationError::new("page_min").with_message("Page must be >= 1".into()));
    }
    Ok(())
}

/// Validator function for per_page parameter
pub fn validate_per_page(per_page: u32) -> Result<(), ValidationError> {
    if per_page == 0 || per_page > MAX_PER_PAGE {
        return Err(ValidationError::new("per_page_range")
            .with_message(format!("Per page must be between 1 and {}", MAX_PER_PAGE).into()));
    }
    Ok(())
}

pub fn default_page() -> u32 {
    DEFAULT_PAGE
}

pub fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn format_validation_errors(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: validation failed", field))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn is_desc(&self) -> bool {
        matches!(self, OrderDirection::Desc)
    }
}

/// Ordering on one field of the root entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parse `field`, `field:asc` or `field:desc` (direction defaults to desc)
    pub fn parse(s: &str) -> Result<Self, FilterError> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [field] if !field.is_empty() => Ok(Self::desc(*field)),
            [field, "asc"] if !field.is_empty() => Ok(Self::asc(*field)),
            [field, "desc"] if !field.is_empty() => Ok(Self::desc(*field)),
            _ => Err(FilterError::InvalidPagination(format!(
                "Invalid order_by '{}'. Use 'field' or 'field:asc' or 'field:desc'",
                s
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for OrderBy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Full {
                field: String,
                #[serde(default)]
                direction: OrderDirection,
            },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => OrderBy::parse(&s).map_err(serde::de::Error::custom),
            Repr::Full { field, direction } => Ok(OrderBy { field, direction }),
        }
    }
}

/// Filter as received from a caller
#[derive(Debug, Clone, PartialEq)]
pub enum FilterInput {
    /// Raw JSON, parsed and validated on use
    Untyped(Value),
    /// Already built tree
    Typed(FilterNode),
}

impl<'de> Deserialize<'de> for FilterInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(FilterInput::Untyped)
    }
}

impl From<Value> for FilterInput {
    fn from(value: Value) -> Self {
        FilterInput::Untyped(value)
    }
}

impl From<FilterNode> for FilterInput {
    fn from(node: FilterNode) -> Self {
        FilterInput::Typed(node)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    #[validate(custom(function = "validate_page"))]
    pub page: u32,

    #[serde(default = "default_per_page")]
    #[validate(custom(function = "validate_per_page"))]
    pub per_page: u32,

    #[serde(default)]
    pub order_by: Vec<OrderBy>,

    #[serde(default)]
    pub filter: Option<FilterInput>,
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
            order_by: Vec::new(),
            filter: None,
        }
    }
}

impl PaginationQuery {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<FilterInput>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Validate page bounds, reporting failures as `InvalidPagination`
    pub fn check(&self) -> Result<(), FilterError> {
        self.validate()
            .map_err(|e| FilterError::InvalidPagination(format_validation_errors(&e)))
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// One page of results with derived navigation fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginationResult<T> {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub items: Vec<T>,
    pub total_pages: u32,
    pub has_next: bool,
}

impl<T> PaginationResult<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(u64::from(per_page.max(1)));
        Self {
            total,
            page,
            per_page,
            items,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            has_next: u64::from(page) < total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_validate_page() {
        assert!(validate_page(0).is_err());
        assert!(validate_page(1).is_ok());
        assert!(validate_page(10_000).is_ok());
    }

    #[test]
    fn test_validate_per_page() {
        assert!(validate_per_page(0).is_err());
        assert!(validate_per_page(1).is_ok());
        assert!(validate_per_page(MAX_PER_PAGE).is_ok());
        assert!(validate_per_page(MAX_PER_PAGE + 1).is_err());
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(OrderBy::parse("name").unwrap(), OrderBy::desc("name"));
        assert_eq!(OrderBy::parse("name:asc").unwrap(), OrderBy::asc("name"));
        assert_eq!(OrderBy::parse("name:desc").unwrap(), OrderBy::desc("name"));
        assert!(OrderBy::parse("name:up").is_err());
        assert!(OrderBy::parse(":asc").is_err());
        assert!(OrderBy::parse("a:b:c").is_err());
    }

    #[test]
    fn test_query_deserialize_defaults() {
        let query: PaginationQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query, PaginationQuery::default());
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, 10);
        assert!(query.check().is_ok());
    }

    #[test]
    fn test_query_deserialize_full() {
        let query: PaginationQuery = serde_json::from_value(json!({
            "page": 3,
            "per_page": 25,
            "order_by": ["name:asc", {"field": "created_at"}],
            "filter": {"rank": {"eq": "S"}}
        }))
        .unwrap();
        assert_eq!(
            query.order_by,
            vec![OrderBy::asc("name"), OrderBy::desc("created_at")]
        );
        assert_eq!(
            query.filter,
            Some(FilterInput::Untyped(json!({"rank": {"eq": "S"}})))
        );
        assert_eq!(query.offset(), 50);
    }

    #[test]
    fn test_query_check() {
        let err = PaginationQuery::new(0, 10).check().unwrap_err();
        assert!(matches!(err, FilterError::InvalidPagination(msg) if msg.contains("Page must be >= 1")));
        assert!(PaginationQuery::new(1, 0).check().is_err());
        assert!(PaginationQuery::new(1, MAX_PER_PAGE + 1).check().is_err());
    }

    #[test]
    fn test_result_second_page_of_three() {
        let result = PaginationResult::new(vec![0u8; 10], 2, 10, 25);
        assert_eq!(result.total_pages, 3);
        assert!(result.has_next);
    }

    #[test]
    fn test_result_math_holds() {
        for total in [0u64, 1, 9, 10, 11, 99, 100, 101] {
            for per_page in [1u32, 3, 10, 50] {
                for page in [1u32, 2, 5, 40] {
                    let result = PaginationResult::<u8>::new(vec![], page, per_page, total);
                    let expected = total.div_ceil(u64::from(per_page));
                    assert_eq!(u64::from(result.total_pages), expected);
                    assert_eq!(result.has_next, u64::from(page) < expected);
                }
            }
        }
    }

    #[test]
    fn test_result_empty() {
        let result = PaginationResult::<u8>::new(vec![], 1, 10, 0);
        assert_eq!(result.total_pages, 0);
        assert!(!result.has_next);
    }

    #[test]
    fn test_result_serializes_derived_fields() {
        let result = PaginationResult::new(vec!["a"], 1, 1, 2);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "total": 2,
                "page": 1,
                "per_page": 1,
                "items": ["a"],
                "total_pages": 2,
                "has_next": true
            })
        );
    }
}
