//! Native condition tree
//!
//! The resolver produces a [`Condition`] which the query-execution side
//! renders through a [`SqlDialect`]. Values never appear in the SQL text;
//! they are collected into [`SqlParams`] in placeholder order.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::sql::SqlDialect;

/// A bound parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// Collects SQL parameters during rendering (maintains insertion order)
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SqlParams {
    pub values: Vec<SqlValue>,
}

impl SqlParams {
    /// Append a value and return the placeholder that refers to it
    pub fn bind(&mut self, dialect: &dyn SqlDialect, value: SqlValue) -> String {
        self.values.push(value);
        dialect.placeholder(self.values.len())
    }
}

/// A column qualified by the alias of the row source it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// Boolean condition over aliased columns
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    True,
    False,
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: SqlValue,
    },
    ColumnEq {
        left: ColumnRef,
        right: ColumnRef,
    },
    /// Inclusive on both ends
    Between {
        column: ColumnRef,
        low: SqlValue,
        high: SqlValue,
    },
    Like {
        column: ColumnRef,
        pattern: String,
        case_insensitive: bool,
        /// Pattern was built with `escape_like_pattern` and needs `ESCAPE '\'`
        escaped: bool,
        negated: bool,
    },
    InList {
        column: ColumnRef,
        values: Vec<SqlValue>,
        negated: bool,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// False or NULL. Used so that `All` counts rows with unknown results as violations.
    IsNotTrue(Box<Condition>),
    Exists {
        subquery: Box<Subquery>,
        negated: bool,
    },
    /// `(SELECT COUNT(*) ...) op value`
    RelatedCount {
        subquery: Box<Subquery>,
        op: CompareOp,
        value: i64,
    },
    /// Pre-rendered SQL where every `?` is a parameter marker
    Raw { sql: String, params: Vec<SqlValue> },
}

/// A correlated subquery over one collection relation
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub table: String,
    pub alias: String,
    /// Single-valued relations joined inside the subquery
    pub joins: Vec<JoinClause>,
    /// Links the subquery row to the outer row
    pub correlation: Condition,
    pub filter: Condition,
}

/// `LEFT JOIN table alias ON condition`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub alias: String,
    pub on: Condition,
}

impl JoinClause {
    pub fn to_sql(&self, dialect: &dyn SqlDialect, params: &mut SqlParams) -> String {
        format!(
            "LEFT JOIN {} {} ON {}",
            self.table,
            self.alias,
            self.on.to_sql(dialect, params)
        )
    }
}

impl Subquery {
    fn to_sql(&self, projection: &str, dialect: &dyn SqlDialect, params: &mut SqlParams) -> String {
        let mut sql = format!("SELECT {} FROM {} {}", projection, self.table, self.alias);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql(dialect, params));
        }
        let correlation = self.correlation.to_sql(dialect, params);
        if self.filter == Condition::True {
            format!("{} WHERE {}", sql, correlation)
        } else {
            let filter = self.filter.to_sql(dialect, params);
            format!("{} WHERE {} AND {}", sql, correlation, filter)
        }
    }
}

impl Condition {
    /// Conjunction that collapses the trivial cases (empty is `True`)
    pub fn all(mut parts: Vec<Condition>) -> Condition {
        match parts.len() {
            0 => Condition::True,
            1 => parts.swap_remove(0),
            _ => Condition::And(parts),
        }
    }

    /// Disjunction that collapses the trivial cases (empty is `False`)
    pub fn any(mut parts: Vec<Condition>) -> Condition {
        match parts.len() {
            0 => Condition::False,
            1 => parts.swap_remove(0),
            _ => Condition::Or(parts),
        }
    }

    /// Render to SQL, appending bound values to `params`
    pub fn to_sql(&self, dialect: &dyn SqlDialect, params: &mut SqlParams) -> String {
        match self {
            Self::True => "1=1".to_string(),
            Self::False => "1=0".to_string(),
            Self::Compare { column, op, value } => {
                let ph = params.bind(dialect, value.clone());
                format!("{} {} {}", column, op.as_sql(), ph)
            }
            Self::ColumnEq { left, right } => format!("{} = {}", left, right),
            Self::Between { column, low, high } => {
                let low = params.bind(dialect, low.clone());
                let high = params.bind(dialect, high.clone());
                format!("{} BETWEEN {} AND {}", column, low, high)
            }
            Self::Like {
                column,
                pattern,
                case_insensitive,
                escaped,
                negated,
            } => {
                let ph = params.bind(dialect, SqlValue::Text(pattern.clone()));
                let sql = dialect.like(&column.to_string(), &ph, *case_insensitive, *negated);
                if *escaped {
                    format!("{} ESCAPE '\\'", sql)
                } else {
                    sql
                }
            }
            Self::InList {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    let identity = if *negated { "1=1" } else { "1=0" };
                    return identity.to_string();
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| params.bind(dialect, v.clone()))
                    .collect();
                let not = if *negated { "NOT " } else { "" };
                format!("{} {}IN ({})", column, not, placeholders.join(", "))
            }
            Self::IsNull { column, negated } => {
                let not = if *negated { "NOT " } else { "" };
                format!("{} IS {}NULL", column, not)
            }
            Self::And(children) => render_joined(children, " AND ", "1=1", dialect, params),
            Self::Or(children) => render_joined(children, " OR ", "1=0", dialect, params),
            Self::Not(child) => format!("NOT ({})", child.to_sql(dialect, params)),
            Self::IsNotTrue(child) => format!("({}) IS NOT TRUE", child.to_sql(dialect, params)),
            Self::Exists { subquery, negated } => {
                let not = if *negated { "NOT " } else { "" };
                format!("{}EXISTS ({})", not, subquery.to_sql("1", dialect, params))
            }
            Self::RelatedCount {
                subquery,
                op,
                value,
            } => {
                let sub = subquery.to_sql("COUNT(*)", dialect, params);
                let ph = params.bind(dialect, SqlValue::Integer(*value));
                format!("({}) {} {}", sub, op.as_sql(), ph)
            }
            Self::Raw { sql, params: raw } => {
                let mut values = raw.iter();
                let mut out = String::with_capacity(sql.len());
                for ch in sql.chars() {
                    if ch == '?'
                        && let Some(value) = values.next()
                    {
                        out.push_str(&params.bind(dialect, value.clone()));
                        continue;
                    }
                    out.push(ch);
                }
                format!("({})", out)
            }
        }
    }
}

fn render_joined(
    children: &[Condition],
    separator: &str,
    identity: &str,
    dialect: &dyn SqlDialect,
    params: &mut SqlParams,
) -> String {
    match children {
        [] => identity.to_string(),
        [only] => only.to_sql(dialect, params),
        _ => {
            let parts: Vec<String> = children
                .iter()
                .map(|c| c.to_sql(dialect, params))
                .collect();
            format!("({})", parts.join(separator))
        }
    }
}
