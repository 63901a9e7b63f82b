//! Condition resolver
//!
//! Translates a parsed [`FilterNode`] into a native [`Condition`] bound to
//! the aliases of a [`JoinPlan`]. Any failure aborts the whole resolution.
//!
//! Collection semantics follow set logic: with zero related rows `all` and
//! `none` hold while `any` does not.

use chrono::{DateTime, Utc};

use crate::utils::sql::{LikeAnchor, count_placeholders, literal_like_pattern};
use crate::utils::time::{
    days_after, days_before, shift_months, start_of_day, start_of_month, start_of_week,
    start_of_year,
};

use super::ast::{
    ALIAS_TOKEN, ArrayCondition, ArrayPredicate, EntityFilter, FieldCondition, FilterNode,
    Quantifier, RawCondition,
};
use super::condition::{ColumnRef, CompareOp, Condition, SqlValue, Subquery};
use super::error::FilterError;
use super::operators::{FieldOperator, FilterValue, Operand};
use super::planner::{JoinPlan, PlannedJoin};
use super::registry::{Cardinality, MetadataRegistry};

/// Inputs that are not part of the filter itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveContext {
    now: DateTime<Utc>,
}

impl ResolveContext {
    /// Resolve relative dates against a fixed instant
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

#[derive(Debug, Clone)]
struct Scope {
    entity: String,
    path: Option<String>,
    alias: String,
}

pub struct ConditionResolver<'a> {
    registry: &'a MetadataRegistry,
    plan: &'a JoinPlan,
    ctx: ResolveContext,
}

impl<'a> ConditionResolver<'a> {
    pub fn new(registry: &'a MetadataRegistry, plan: &'a JoinPlan, ctx: ResolveContext) -> Self {
        Self {
            registry,
            plan,
            ctx,
        }
    }

    pub fn resolve(&self, node: &FilterNode) -> Result<Condition, FilterError> {
        let root = Scope {
            entity: self.plan.root_entity.clone(),
            path: None,
            alias: self.plan.root_alias.clone(),
        };
        self.resolve_node(node, &root)
    }

    fn resolve_node(&self, node: &FilterNode, scope: &Scope) -> Result<Condition, FilterError> {
        match node {
            FilterNode::Field(condition) => self.resolve_field(condition, scope),
            FilterNode::And(children) => Ok(Condition::all(self.resolve_all(children, scope)?)),
            FilterNode::Or(children) => Ok(Condition::any(self.resolve_all(children, scope)?)),
            FilterNode::Not(child) => Ok(Condition::Not(Box::new(
                self.resolve_node(child, scope)?,
            ))),
            FilterNode::Entity(filter) => self.resolve_entity(filter, scope),
            FilterNode::Array(condition) => self.resolve_array(condition, scope),
            FilterNode::Raw(raw) => resolve_raw(raw, scope),
        }
    }

    fn resolve_all(&self, nodes: &[FilterNode], scope: &Scope) -> Result<Vec<Condition>, FilterError> {
        nodes
            .iter()
            .map(|node| self.resolve_node(node, scope))
            .collect()
    }

    fn resolve_entity(&self, filter: &EntityFilter, scope: &Scope) -> Result<Condition, FilterError> {
        if filter.entity_code != scope.entity {
            return Err(FilterError::ConditionResolution(format!(
                "filter for '{}' used where '{}' is expected",
                filter.entity_code, scope.entity
            )));
        }

        let mut parts = Vec::new();
        for condition in &filter.field_conditions {
            parts.push(self.resolve_field(condition, scope)?);
        }
        for nested in &filter.nested {
            let (join, child) = self.child_scope(&nested.relation_name, scope)?;
            let inner = self.resolve_node(&nested.filter, &child)?;
            parts.push(match join.cardinality {
                Cardinality::One => inner,
                Cardinality::Many => Condition::Exists {
                    subquery: Box::new(self.subquery(join, inner)),
                    negated: false,
                },
            });
        }
        for array in &filter.arrays {
            parts.push(self.resolve_array(array, scope)?);
        }
        parts.extend(self.resolve_all(&filter.and, scope)?);
        if !filter.or.is_empty() {
            parts.push(Condition::any(self.resolve_all(&filter.or, scope)?));
        }
        if let Some(not) = &filter.not {
            parts.push(Condition::Not(Box::new(self.resolve_node(not, scope)?)));
        }
        Ok(Condition::all(parts))
    }

    fn resolve_array(&self, array: &ArrayCondition, scope: &Scope) -> Result<Condition, FilterError> {
        let (join, child) = self.child_scope(&array.relation_name, scope)?;
        if join.cardinality != Cardinality::Many {
            return Err(FilterError::ConditionResolution(format!(
                "'{}' is not a collection relation",
                join.path
            )));
        }

        match &array.predicate {
            ArrayPredicate::Quantified { mode, filter } => {
                let inner = self.resolve_node(filter, &child)?;
                let (filter, negated) = match mode {
                    Quantifier::Any => (inner, false),
                    Quantifier::All => (Condition::IsNotTrue(Box::new(inner)), true),
                    Quantifier::None => (inner, true),
                };
                Ok(Condition::Exists {
                    subquery: Box::new(self.subquery(join, filter)),
                    negated,
                })
            }
            ArrayPredicate::Size { op, value } => {
                let value = i64::try_from(*value).map_err(|_| {
                    FilterError::ConditionResolution(format!(
                        "size {} on '{}' is out of range",
                        value, join.path
                    ))
                })?;
                Ok(Condition::RelatedCount {
                    subquery: Box::new(self.subquery(join, Condition::True)),
                    op: op.compare_op(),
                    value,
                })
            }
        }
    }

    /// Planned join for `relation` below `scope`, and the scope of its target
    fn child_scope(&self, relation: &str, scope: &Scope) -> Result<(&'a PlannedJoin, Scope), FilterError> {
        let path = match &scope.path {
            Some(parent) => format!("{}.{}", parent, relation),
            None => relation.to_string(),
        };
        let join = self.plan.get(&path).ok_or_else(|| {
            FilterError::ConditionResolution(format!("no join alias planned for '{}'", path))
        })?;
        let child = Scope {
            entity: join.target_entity.clone(),
            path: Some(path),
            alias: join.alias.clone(),
        };
        Ok((join, child))
    }

    fn subquery(&self, join: &PlannedJoin, filter: Condition) -> Subquery {
        Subquery {
            table: join.table.clone(),
            alias: join.alias.clone(),
            joins: self
                .plan
                .correlated_joins(&join.path)
                .map(PlannedJoin::join_clause)
                .collect(),
            correlation: join.predicate.bind(&join.parent_alias, &join.alias),
            filter,
        }
    }

    fn resolve_field(&self, condition: &FieldCondition, scope: &Scope) -> Result<Condition, FilterError> {
        use FieldOperator as Op;

        let field = self
            .registry
            .lookup_field(&scope.entity, &condition.field_name)
            .map_err(|e| FilterError::ConditionResolution(e.to_string()))?;
        let kind = &field.value_kind;
        let operator = condition.operator;
        if !operator.supports(kind) {
            return Err(FilterError::ConditionResolution(format!(
                "operator '{}' is not supported for '{}' ({})",
                operator, condition.field_name, kind
            )));
        }
        let column = ColumnRef::new(&scope.alias, &field.column);
        let mismatch = || {
            FilterError::ConditionResolution(format!(
                "invalid operand for '{}' with operator '{}'",
                condition.field_name, operator
            ))
        };
        let coerce = |value: &FilterValue| kind.coerce(value).ok_or_else(mismatch);

        match (operator, &condition.operand) {
            (Op::IsNull, Operand::Single(FilterValue::Bool(is_null))) => Ok(Condition::IsNull {
                column,
                negated: !is_null,
            }),
            (Op::LastNDays | Op::OlderThanDays, Operand::Single(FilterValue::Integer(days))) => {
                self.relative_date(operator, Some(*days), column)
            }
            (op, Operand::None) if op.is_relative_date() => self.relative_date(op, None, column),
            (Op::Like | Op::ILike | Op::NotLike, Operand::Single(FilterValue::Text(pattern))) => {
                Ok(Condition::Like {
                    column,
                    pattern: pattern.clone(),
                    case_insensitive: operator == Op::ILike,
                    escaped: false,
                    negated: operator == Op::NotLike,
                })
            }
            (
                Op::Contains | Op::IContains | Op::NotContains | Op::StartsWith | Op::EndsWith,
                Operand::Single(FilterValue::Text(text)),
            ) => {
                let anchor = match operator {
                    Op::StartsWith => LikeAnchor::Prefix,
                    Op::EndsWith => LikeAnchor::Suffix,
                    _ => LikeAnchor::Contains,
                };
                Ok(Condition::Like {
                    column,
                    pattern: literal_like_pattern(text, anchor),
                    case_insensitive: operator == Op::IContains,
                    escaped: true,
                    negated: operator == Op::NotContains,
                })
            }
            (Op::Between, Operand::Pair(low, high)) => Ok(Condition::Between {
                column,
                low: coerce(low)?,
                high: coerce(high)?,
            }),
            (Op::In | Op::NotIn, Operand::List(items)) => {
                let values = items.iter().map(coerce).collect::<Result<Vec<_>, _>>()?;
                let negated = operator == Op::NotIn;
                if values.is_empty() {
                    return Ok(if negated {
                        Condition::True
                    } else {
                        Condition::False
                    });
                }
                Ok(Condition::InList {
                    column,
                    values,
                    negated,
                })
            }
            (op, Operand::Single(value)) => {
                let op = compare_op(op).ok_or_else(mismatch)?;
                Ok(Condition::Compare {
                    column,
                    op,
                    value: coerce(value)?,
                })
            }
            _ => Err(mismatch()),
        }
    }

    /// Expand a relative date operator to a half-open `[start, end)` range
    fn relative_date(
        &self,
        operator: FieldOperator,
        days: Option<i64>,
        column: ColumnRef,
    ) -> Result<Condition, FilterError> {
        use FieldOperator as Op;

        let now = self.ctx.now();
        let day = start_of_day(now);
        let week = start_of_week(now);
        let month = start_of_month(now);
        let year = start_of_year(now);

        let range = match (operator, days) {
            (Op::Today, None) => Some((Some(day), days_after(day, 1))),
            (Op::Yesterday, None) => Some((days_before(day, 1), Some(day))),
            (Op::ThisWeek, None) => Some((Some(week), days_after(week, 7))),
            (Op::LastWeek, None) => Some((days_before(week, 7), Some(week))),
            (Op::ThisMonth, None) => Some((Some(month), shift_months(month, 1))),
            (Op::LastMonth, None) => Some((shift_months(month, -1), Some(month))),
            (Op::ThisYear, None) => Some((Some(year), shift_months(year, 12))),
            (Op::LastYear, None) => Some((shift_months(year, -12), Some(year))),
            (Op::LastNDays, Some(n)) => Some((days_before(now, n), Some(now))),
            (Op::OlderThanDays, Some(n)) => {
                let end = days_before(now, n).ok_or_else(|| out_of_range(operator))?;
                return Ok(Condition::Compare {
                    column,
                    op: CompareOp::Lt,
                    value: SqlValue::Timestamp(end),
                });
            }
            _ => None,
        };

        match range {
            Some((Some(start), Some(end))) => Ok(Condition::And(vec![
                Condition::Compare {
                    column: column.clone(),
                    op: CompareOp::Gte,
                    value: SqlValue::Timestamp(start),
                },
                Condition::Compare {
                    column,
                    op: CompareOp::Lt,
                    value: SqlValue::Timestamp(end),
                },
            ])),
            Some(_) => Err(out_of_range(operator)),
            None => Err(FilterError::ConditionResolution(format!(
                "'{}' is not a relative date operator",
                operator
            ))),
        }
    }
}

fn compare_op(operator: FieldOperator) -> Option<CompareOp> {
    match operator {
        FieldOperator::Eq => Some(CompareOp::Eq),
        FieldOperator::Ne => Some(CompareOp::Ne),
        FieldOperator::Gt | FieldOperator::After => Some(CompareOp::Gt),
        FieldOperator::Gte => Some(CompareOp::Gte),
        FieldOperator::Lt | FieldOperator::Before => Some(CompareOp::Lt),
        FieldOperator::Lte => Some(CompareOp::Lte),
        _ => None,
    }
}

fn out_of_range(operator: FieldOperator) -> FilterError {
    FilterError::ConditionResolution(format!("'{}' range is out of bounds", operator))
}

fn resolve_raw(raw: &RawCondition, scope: &Scope) -> Result<Condition, FilterError> {
    let sql = raw.sql.replace(ALIAS_TOKEN, &scope.alias);
    let placeholders = count_placeholders(&sql);
    if placeholders != raw.params.len() {
        return Err(FilterError::ConditionResolution(format!(
            "raw condition has {} placeholders but {} parameters",
            placeholders,
            raw.params.len()
        )));
    }
    Ok(Condition::Raw {
        sql,
        params: raw.params.clone(),
    })
}
