//! Filter AST
//!
//! Typed representation of a client-supplied search predicate. Every node is
//! exactly one variant; the parser is the only place untyped input becomes a
//! node, but trees can also be assembled programmatically.

use super::condition::{CompareOp, SqlValue};
use super::operators::{FieldOperator, FilterValue, Operand};

/// Token replaced by the current scope alias inside [`RawCondition::sql`]
pub const ALIAS_TOKEN: &str = "{alias}";

#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field_name: String,
    pub operator: FieldOperator,
    pub operand: Operand,
}

impl FieldCondition {
    pub fn new(field_name: impl Into<String>, operator: FieldOperator, operand: Operand) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            operand,
        }
    }

    /// Single-operand condition, e.g. `eq`, `contains`, `is_null`
    pub fn single(
        field_name: impl Into<String>,
        operator: FieldOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self::new(field_name, operator, Operand::Single(value.into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Field(FieldCondition),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Entity(EntityFilter),
    Array(ArrayCondition),
    Raw(RawCondition),
}

impl FilterNode {
    pub fn not(child: FilterNode) -> Self {
        FilterNode::Not(Box::new(child))
    }

    /// Number of leaf predicates (field, collection and raw conditions)
    pub fn condition_count(&self) -> usize {
        match self {
            FilterNode::Field(_) | FilterNode::Raw(_) => 1,
            FilterNode::And(children) | FilterNode::Or(children) => {
                children.iter().map(FilterNode::condition_count).sum()
            }
            FilterNode::Not(child) => child.condition_count(),
            FilterNode::Entity(filter) => filter.condition_count(),
            FilterNode::Array(array) => array.condition_count(),
        }
    }
}

impl From<FieldCondition> for FilterNode {
    fn from(condition: FieldCondition) -> Self {
        FilterNode::Field(condition)
    }
}

impl From<EntityFilter> for FilterNode {
    fn from(filter: EntityFilter) -> Self {
        FilterNode::Entity(filter)
    }
}

impl From<ArrayCondition> for FilterNode {
    fn from(condition: ArrayCondition) -> Self {
        FilterNode::Array(condition)
    }
}

/// Validated filter for one concrete entity
///
/// All parts are ANDed together. Empty `and`/`or` lists mean the slot is
/// absent; an empty filter matches every row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityFilter {
    pub entity_code: String,
    pub field_conditions: Vec<FieldCondition>,
    pub nested: Vec<NestedFilter>,
    pub arrays: Vec<ArrayCondition>,
    pub and: Vec<FilterNode>,
    pub or: Vec<FilterNode>,
    pub not: Option<Box<FilterNode>>,
}

impl EntityFilter {
    pub fn new(entity_code: impl Into<String>) -> Self {
        Self {
            entity_code: entity_code.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, condition: FieldCondition) -> Self {
        self.field_conditions.push(condition);
        self
    }

    pub fn with_nested(mut self, relation_name: impl Into<String>, filter: FilterNode) -> Self {
        self.nested.push(NestedFilter {
            relation_name: relation_name.into(),
            filter,
        });
        self
    }

    pub fn with_array(mut self, condition: ArrayCondition) -> Self {
        self.arrays.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.field_conditions.is_empty()
            && self.nested.is_empty()
            && self.arrays.is_empty()
            && self.and.is_empty()
            && self.or.is_empty()
            && self.not.is_none()
    }

    fn condition_count(&self) -> usize {
        self.field_conditions.len()
            + self
                .nested
                .iter()
                .map(|n| n.filter.condition_count())
                .sum::<usize>()
            + self
                .arrays
                .iter()
                .map(ArrayCondition::condition_count)
                .sum::<usize>()
            + self
                .and
                .iter()
                .chain(self.or.iter())
                .chain(self.not.as_deref())
                .map(FilterNode::condition_count)
                .sum::<usize>()
    }
}

/// Sub-filter across a relation, evaluated against the relation's target
#[derive(Debug, Clone, PartialEq)]
pub struct NestedFilter {
    pub relation_name: String,
    pub filter: FilterNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl SizeOp {
    pub fn compare_op(&self) -> CompareOp {
        match self {
            SizeOp::Eq => CompareOp::Eq,
            SizeOp::Gt => CompareOp::Gt,
            SizeOp::Gte => CompareOp::Gte,
            SizeOp::Lt => CompareOp::Lt,
            SizeOp::Lte => CompareOp::Lte,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayPredicate {
    Quantified {
        mode: Quantifier,
        filter: Box<FilterNode>,
    },
    /// Number of related rows compared with `value`
    Size { op: SizeOp, value: u64 },
}

/// Predicate over a collection relation of the current entity
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayCondition {
    pub relation_name: String,
    pub predicate: ArrayPredicate,
}

impl ArrayCondition {
    pub fn quantified(
        relation_name: impl Into<String>,
        mode: Quantifier,
        filter: impl Into<FilterNode>,
    ) -> Self {
        Self {
            relation_name: relation_name.into(),
            predicate: ArrayPredicate::Quantified {
                mode,
                filter: Box::new(filter.into()),
            },
        }
    }

    pub fn size(relation_name: impl Into<String>, op: SizeOp, value: u64) -> Self {
        Self {
            relation_name: relation_name.into(),
            predicate: ArrayPredicate::Size { op, value },
        }
    }

    fn condition_count(&self) -> usize {
        match &self.predicate {
            ArrayPredicate::Quantified { filter, .. } => 1 + filter.condition_count(),
            ArrayPredicate::Size { .. } => 1,
        }
    }
}

/// Pre-rendered condition for cases the compiler cannot express generically
///
/// Every `?` in `sql` is bound to the next value of `params`, and
/// [`ALIAS_TOKEN`] is replaced by the alias of the scope it is resolved in.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCondition {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl RawCondition {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_entity_filter() {
        let filter = EntityFilter::new("card");
        assert!(filter.is_empty());
        assert_eq!(FilterNode::Entity(filter).condition_count(), 0);
    }

    #[test]
    fn test_condition_count_walks_every_slot() {
        let summary = EntityFilter::new("summary_card_users").with_field(FieldCondition::single(
            "collection",
            FieldOperator::Eq,
            "OWNED",
        ));
        let mut card = EntityFilter::new("card")
            .with_field(FieldCondition::single("name", FieldOperator::Contains, "Naruto"))
            .with_array(ArrayCondition::quantified("summary", Quantifier::Any, summary))
            .with_array(ArrayCondition::size("stats", SizeOp::Gt, 0));
        card.or = vec![
            FieldCondition::single("rank", FieldOperator::Eq, "S").into(),
            FieldCondition::single("rank", FieldOperator::Eq, "A").into(),
        ];
        card.not = Some(Box::new(
            FieldCondition::single("image", FieldOperator::IsNull, true).into(),
        ));

        assert!(!card.is_empty());
        // name + (any + collection) + size + two ranks + image
        assert_eq!(FilterNode::Entity(card).condition_count(), 7);
    }

    #[test]
    fn test_size_op_maps_to_compare_op() {
        assert_eq!(SizeOp::Eq.compare_op(), CompareOp::Eq);
        assert_eq!(SizeOp::Lte.compare_op(), CompareOp::Lte);
    }
}
