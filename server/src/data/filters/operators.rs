//! Field operators and operand values
//!
//! Pure value-level definitions: which comparisons exist, what operands
//! they take and which field kinds they apply to.

use std::fmt;

use serde_json::Value;

use crate::core::constants::MAX_RELATIVE_DAYS;
use crate::utils::time::parse_datetime;

use super::condition::SqlValue;
use super::error::FilterError;

/// Declared type of a queryable field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
    /// Stored by variant name, matched case-sensitively
    Enum(Vec<String>),
}

impl ValueKind {
    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(variants.into_iter().map(Into::into).collect())
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Uuid => "uuid",
            ValueKind::DateTime => "datetime",
            ValueKind::Enum(_) => "enum",
        }
    }

    /// Human description of an acceptable operand
    pub fn expected(&self) -> String {
        match self {
            ValueKind::Text => "text".to_string(),
            ValueKind::Integer => "an integer".to_string(),
            ValueKind::Float => "a number".to_string(),
            ValueKind::Boolean => "true or false".to_string(),
            ValueKind::Uuid => "a UUID".to_string(),
            ValueKind::DateTime => "an ISO 8601 date or timestamp".to_string(),
            ValueKind::Enum(variants) => format!("one of {}", variants.join(", ")),
        }
    }

    /// Convert an operand into a bindable value of this kind
    pub fn coerce(&self, value: &FilterValue) -> Option<SqlValue> {
        match (self, value) {
            (ValueKind::Text, FilterValue::Text(s)) => Some(SqlValue::Text(s.clone())),
            (ValueKind::Integer, FilterValue::Integer(i)) => Some(SqlValue::Integer(*i)),
            (ValueKind::Float, FilterValue::Integer(i)) => Some(SqlValue::Float(*i as f64)),
            (ValueKind::Float, FilterValue::Float(f)) => Some(SqlValue::Float(*f)),
            (ValueKind::Boolean, FilterValue::Bool(b)) => Some(SqlValue::Bool(*b)),
            (ValueKind::Uuid, FilterValue::Text(s)) => uuid::Uuid::parse_str(s)
                .ok()
                .map(|id| SqlValue::Text(id.to_string())),
            (ValueKind::DateTime, FilterValue::Text(s)) => {
                parse_datetime(s).map(SqlValue::Timestamp)
            }
            (ValueKind::Enum(variants), FilterValue::Text(s)) if variants.contains(s) => {
                Some(SqlValue::Text(s.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Weakly typed operand value, validated against a [`ValueKind`] later
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Objects have no operand representation
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            Value::Object(_) => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Operand attached to a field condition
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Single(FilterValue),
    Pair(FilterValue, FilterValue),
    List(Vec<FilterValue>),
}

/// How many operands an operator takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    Nothing,
    Single,
    Pair,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Before,
    After,
    Between,
    Like,
    ILike,
    NotLike,
    Contains,
    IContains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    IsNull,
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
    LastNDays,
    OlderThanDays,
}

impl FieldOperator {
    pub const ALL: &'static [FieldOperator] = &[
        FieldOperator::Eq,
        FieldOperator::Ne,
        FieldOperator::Gt,
        FieldOperator::Gte,
        FieldOperator::Lt,
        FieldOperator::Lte,
        FieldOperator::Before,
        FieldOperator::After,
        FieldOperator::Between,
        FieldOperator::Like,
        FieldOperator::ILike,
        FieldOperator::NotLike,
        FieldOperator::Contains,
        FieldOperator::IContains,
        FieldOperator::NotContains,
        FieldOperator::StartsWith,
        FieldOperator::EndsWith,
        FieldOperator::In,
        FieldOperator::NotIn,
        FieldOperator::IsNull,
        FieldOperator::Today,
        FieldOperator::Yesterday,
        FieldOperator::ThisWeek,
        FieldOperator::LastWeek,
        FieldOperator::ThisMonth,
        FieldOperator::LastMonth,
        FieldOperator::ThisYear,
        FieldOperator::LastYear,
        FieldOperator::LastNDays,
        FieldOperator::OlderThanDays,
    ];

    /// Look up an operator by its wire name (`in_` is accepted for `in`)
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "in_" {
            return Some(FieldOperator::In);
        }
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldOperator::Eq => "eq",
            FieldOperator::Ne => "ne",
            FieldOperator::Gt => "gt",
            FieldOperator::Gte => "gte",
            FieldOperator::Lt => "lt",
            FieldOperator::Lte => "lte",
            FieldOperator::Before => "before",
            FieldOperator::After => "after",
            FieldOperator::Between => "between",
            FieldOperator::Like => "like",
            FieldOperator::ILike => "ilike",
            FieldOperator::NotLike => "not_like",
            FieldOperator::Contains => "contains",
            FieldOperator::IContains => "icontains",
            FieldOperator::NotContains => "not_contains",
            FieldOperator::StartsWith => "startswith",
            FieldOperator::EndsWith => "endswith",
            FieldOperator::In => "in",
            FieldOperator::NotIn => "not_in",
            FieldOperator::IsNull => "is_null",
            FieldOperator::Today => "today",
            FieldOperator::Yesterday => "yesterday",
            FieldOperator::ThisWeek => "this_week",
            FieldOperator::LastWeek => "last_week",
            FieldOperator::ThisMonth => "this_month",
            FieldOperator::LastMonth => "last_month",
            FieldOperator::ThisYear => "this_year",
            FieldOperator::LastYear => "last_year",
            FieldOperator::LastNDays => "last_n_days",
            FieldOperator::OlderThanDays => "older_than_days",
        }
    }

    pub fn shape(&self) -> OperandShape {
        match self {
            FieldOperator::Between => OperandShape::Pair,
            FieldOperator::In | FieldOperator::NotIn => OperandShape::List,
            FieldOperator::Today
            | FieldOperator::Yesterday
            | FieldOperator::ThisWeek
            | FieldOperator::LastWeek
            | FieldOperator::ThisMonth
            | FieldOperator::LastMonth
            | FieldOperator::ThisYear
            | FieldOperator::LastYear => OperandShape::Nothing,
            _ => OperandShape::Single,
        }
    }

    pub fn is_relative_date(&self) -> bool {
        matches!(
            self,
            FieldOperator::Today
                | FieldOperator::Yesterday
                | FieldOperator::ThisWeek
                | FieldOperator::LastWeek
                | FieldOperator::ThisMonth
                | FieldOperator::LastMonth
                | FieldOperator::ThisYear
                | FieldOperator::LastYear
                | FieldOperator::LastNDays
                | FieldOperator::OlderThanDays
        )
    }

    /// Operators whose operand is a text pattern
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            FieldOperator::Like
                | FieldOperator::ILike
                | FieldOperator::NotLike
                | FieldOperator::Contains
                | FieldOperator::IContains
                | FieldOperator::NotContains
                | FieldOperator::StartsWith
                | FieldOperator::EndsWith
        )
    }

    pub fn supports(&self, kind: &ValueKind) -> bool {
        use FieldOperator as Op;
        match kind {
            ValueKind::Text => {
                self.is_pattern() || matches!(self, Op::Eq | Op::Ne | Op::In | Op::NotIn | Op::IsNull)
            }
            ValueKind::Integer | ValueKind::Float => matches!(
                self,
                Op::Eq
                    | Op::Ne
                    | Op::Gt
                    | Op::Gte
                    | Op::Lt
                    | Op::Lte
                    | Op::Between
                    | Op::In
                    | Op::NotIn
                    | Op::IsNull
            ),
            ValueKind::Boolean => matches!(self, Op::Eq | Op::Ne | Op::IsNull),
            ValueKind::Uuid | ValueKind::Enum(_) => {
                matches!(self, Op::Eq | Op::Ne | Op::In | Op::NotIn | Op::IsNull)
            }
            ValueKind::DateTime => {
                self.is_relative_date()
                    || matches!(
                        self,
                        Op::Eq
                            | Op::Ne
                            | Op::Gt
                            | Op::Gte
                            | Op::Lt
                            | Op::Lte
                            | Op::Before
                            | Op::After
                            | Op::Between
                            | Op::In
                            | Op::NotIn
                            | Op::IsNull
                    )
            }
        }
    }

    /// Shape a raw JSON operand according to this operator's arity
    pub fn operand_from_json(&self, field: &str, value: &Value) -> Result<Operand, FilterError> {
        match self.shape() {
            OperandShape::Nothing => match value {
                Value::Bool(true) | Value::Null => Ok(Operand::None),
                _ => Err(FilterError::value_mismatch(field, self.name(), "true")),
            },
            OperandShape::Single => match value {
                Value::Array(_) | Value::Object(_) => Err(FilterError::value_mismatch(
                    field,
                    self.name(),
                    "a single value",
                )),
                _ => self.scalar(field, value).map(Operand::Single),
            },
            OperandShape::Pair => match value.as_array().map(Vec::as_slice) {
                Some([low, high]) => Ok(Operand::Pair(
                    self.scalar(field, low)?,
                    self.scalar(field, high)?,
                )),
                _ => Err(FilterError::value_mismatch(
                    field,
                    self.name(),
                    "a list of two values",
                )),
            },
            OperandShape::List => match value.as_array() {
                Some(items) => items
                    .iter()
                    .map(|item| self.scalar(field, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Operand::List),
                None => Err(FilterError::value_mismatch(
                    field,
                    self.name(),
                    "a list of values",
                )),
            },
        }
    }

    fn scalar(&self, field: &str, value: &Value) -> Result<FilterValue, FilterError> {
        match FilterValue::from_json(value) {
            Some(FilterValue::Null) | Some(FilterValue::List(_)) | None => Err(
                FilterError::value_mismatch(field, self.name(), "a non-null scalar value"),
            ),
            Some(scalar) => Ok(scalar),
        }
    }

    /// Validate operand shape and value kind against the target field
    pub fn check_operand(
        &self,
        field: &str,
        kind: &ValueKind,
        operand: &Operand,
    ) -> Result<(), FilterError> {
        use FieldOperator as Op;
        let shape = self.shape();
        let (valid, expected) = match (self, operand) {
            (Op::IsNull, Operand::Single(value)) => {
                (matches!(value, FilterValue::Bool(_)), "true or false".to_string())
            }
            (Op::LastNDays | Op::OlderThanDays, Operand::Single(value)) => (
                matches!(value, FilterValue::Integer(n) if (0..=MAX_RELATIVE_DAYS).contains(n)),
                format!("a number of days between 0 and {}", MAX_RELATIVE_DAYS),
            ),
            (op, Operand::Single(value)) if op.is_pattern() => {
                (matches!(value, FilterValue::Text(_)), "text".to_string())
            }
            (_, Operand::None) => (shape == OperandShape::Nothing, "true".to_string()),
            (_, Operand::Single(value)) => (
                shape == OperandShape::Single && kind.coerce(value).is_some(),
                kind.expected(),
            ),
            (_, Operand::Pair(low, high)) => (
                shape == OperandShape::Pair
                    && kind.coerce(low).is_some()
                    && kind.coerce(high).is_some(),
                format!("a pair of {}", kind.expected()),
            ),
            (_, Operand::List(items)) => (
                shape == OperandShape::List && items.iter().all(|v| kind.coerce(v).is_some()),
                format!("a list of {}", kind.expected()),
            ),
        };
        if valid {
            Ok(())
        } else {
            Err(FilterError::value_mismatch(field, self.name(), expected))
        }
    }
}

impl fmt::Display for FieldOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
