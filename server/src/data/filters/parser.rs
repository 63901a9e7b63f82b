//! Filter parser
//!
//! Turns untyped JSON filters into [`FilterNode`] trees, validating every
//! field, relation, operator and operand against the metadata registry.
//!
//! Accepted shapes:
//! - `{"and": [..]}`, `{"or": [..]}`, `{"not": {..}}` logical combinators
//! - `{"field": {"operator": operand, ..}}` field conditions
//! - `{"relation": {..}}` nested filters on the relation target
//! - `{"relation": {"any" | "all" | "none": {..}}}` and size keywords on
//!   collection relations

use serde_json::{Map, Value};

use crate::core::constants::{
    DEFAULT_MAX_FILTER_BYTES, DEFAULT_MAX_FILTER_CONDITIONS, DEFAULT_MAX_FILTER_DEPTH,
};

use super::ast::{
    ArrayCondition, EntityFilter, FieldCondition, FilterNode, NestedFilter, Quantifier, SizeOp,
};
use super::error::FilterError;
use super::operators::FieldOperator;
use super::registry::{EntityMetadata, JoinDescriptor, MetadataRegistry};

const AND: &str = "and";
const OR: &str = "or";
const NOT: &str = "not";

/// Keywords accepted on collection relations
pub const ARRAY_KEYWORDS: &[&str] = &[
    "any",
    "all",
    "none",
    "is_empty",
    "is_not_empty",
    "size_eq",
    "size_gt",
    "size_gte",
    "size_lt",
    "size_lte",
];

fn is_logical(key: &str) -> bool {
    matches!(key, AND | OR | NOT)
}

fn is_array_keyword(key: &str) -> bool {
    ARRAY_KEYWORDS.contains(&key)
}

/// Bounds applied to untrusted filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterLimits {
    pub max_filter_bytes: usize,
    pub max_depth: usize,
    pub max_conditions: usize,
}

impl Default for FilterLimits {
    fn default() -> Self {
        Self {
            max_filter_bytes: DEFAULT_MAX_FILTER_BYTES,
            max_depth: DEFAULT_MAX_FILTER_DEPTH,
            max_conditions: DEFAULT_MAX_FILTER_CONDITIONS,
        }
    }
}

pub struct FilterParser<'a> {
    registry: &'a MetadataRegistry,
    limits: FilterLimits,
}

/// Per-call counters
#[derive(Default)]
struct ParseState {
    conditions: usize,
}

impl<'a> FilterParser<'a> {
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self {
            registry,
            limits: FilterLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: FilterLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Parse a JSON document, enforcing the payload size limit first
    pub fn parse_str(&self, input: &str, entity: Option<&str>) -> Result<FilterNode, FilterError> {
        if input.len() > self.limits.max_filter_bytes {
            return Err(FilterError::FilterTooComplex(format!(
                "filter is {} bytes, limit is {}",
                input.len(),
                self.limits.max_filter_bytes
            )));
        }
        let value: Value = serde_json::from_str(input)
            .map_err(|e| FilterError::MalformedFilter(format!("invalid JSON: {}", e)))?;
        self.parse(&value, entity)
    }

    /// Parse a filter against `entity`, or against the detected entity when
    /// none is given
    pub fn parse(&self, value: &Value, entity: Option<&str>) -> Result<FilterNode, FilterError> {
        let entity = match entity {
            Some(code) => self.registry.lookup(code)?,
            None => {
                let code = self.detect_entity(value)?;
                self.registry.lookup(&code)?
            }
        };
        let mut state = ParseState::default();
        let node = self.parse_node(value, entity, 0, &mut state)?;
        tracing::trace!(
            entity = %entity.entity_code,
            conditions = state.conditions,
            "Parsed filter"
        );
        Ok(node)
    }

    /// Pick the only entity whose fields and relations explain every key
    pub fn detect_entity(&self, value: &Value) -> Result<String, FilterError> {
        let mut keys = Vec::new();
        collect_keys(value, &mut keys, 0, self.limits.max_depth)?;

        let mut candidates = Vec::new();
        let mut best: Option<(&EntityMetadata, usize)> = None;
        for entity in self.registry.entities() {
            let matched = keys.iter().filter(|k| entity.has_key(k)).count();
            if matched == keys.len() {
                candidates.push(entity.entity_code.clone());
            }
            if best.is_none_or(|(_, score)| matched > score) {
                best = Some((entity, matched));
            }
        }

        match candidates.len() {
            1 => {
                let entity = candidates.remove(0);
                tracing::debug!(entity = %entity, "Detected filter entity");
                Ok(entity)
            }
            0 => {
                let (entity, _) = best.ok_or_else(|| {
                    FilterError::MalformedFilter("no entities are registered".to_string())
                })?;
                let key = keys
                    .iter()
                    .find(|k| !entity.has_key(k))
                    .cloned()
                    .unwrap_or_default();
                Err(FilterError::unknown_field(&entity.entity_code, key))
            }
            _ => Err(FilterError::AmbiguousEntityDetection { candidates }),
        }
    }

    fn parse_node(
        &self,
        value: &Value,
        entity: &EntityMetadata,
        depth: usize,
        state: &mut ParseState,
    ) -> Result<FilterNode, FilterError> {
        if depth > self.limits.max_depth {
            return Err(FilterError::FilterTooComplex(format!(
                "nesting deeper than {} levels",
                self.limits.max_depth
            )));
        }
        let map = value.as_object().ok_or_else(|| {
            FilterError::MalformedFilter(format!("expected a filter object, got {}", value))
        })?;
        if !map.is_empty() && map.keys().all(|k| is_logical(k)) {
            return self.parse_combinators(map, entity, depth, state);
        }
        self.parse_entity(map, entity, depth, state)
            .map(FilterNode::Entity)
    }

    fn parse_combinators(
        &self,
        map: &Map<String, Value>,
        entity: &EntityMetadata,
        depth: usize,
        state: &mut ParseState,
    ) -> Result<FilterNode, FilterError> {
        let mut nodes = Vec::with_capacity(map.len());
        for (key, value) in map {
            let node = match key.as_str() {
                AND => FilterNode::And(self.parse_list(AND, value, entity, depth, state)?),
                OR => FilterNode::Or(self.parse_list(OR, value, entity, depth, state)?),
                _ => FilterNode::not(self.parse_negated(value, entity, depth, state)?),
            };
            nodes.push(node);
        }
        if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else {
            Ok(FilterNode::And(nodes))
        }
    }

    fn parse_list(
        &self,
        operator: &str,
        value: &Value,
        entity: &EntityMetadata,
        depth: usize,
        state: &mut ParseState,
    ) -> Result<Vec<FilterNode>, FilterError> {
        let items = value.as_array().ok_or_else(|| {
            FilterError::malformed_logical(operator, "expected a list of filters")
        })?;
        items
            .iter()
            .map(|item| {
                if !item.is_object() {
                    return Err(FilterError::malformed_logical(
                        operator,
                        "every item must be a filter object",
                    ));
                }
                self.parse_node(item, entity, depth + 1, state)
            })
            .collect()
    }

    fn parse_negated(
        &self,
        value: &Value,
        entity: &EntityMetadata,
        depth: usize,
        state: &mut ParseState,
    ) -> Result<FilterNode, FilterError> {
        if !value.is_object() {
            return Err(FilterError::malformed_logical(NOT, "expected a filter object"));
        }
        self.parse_node(value, entity, depth + 1, state)
    }

    fn parse_entity(
        &self,
        map: &Map<String, Value>,
        entity: &EntityMetadata,
        depth: usize,
        state: &mut ParseState,
    ) -> Result<EntityFilter, FilterError> {
        let mut filter = EntityFilter::new(&entity.entity_code);
        for (key, value) in map {
            match key.as_str() {
                AND => filter
                    .and
                    .extend(self.parse_list(AND, value, entity, depth, state)?),
                OR => filter
                    .or
                    .extend(self.parse_list(OR, value, entity, depth, state)?),
                NOT => {
                    let node = self.parse_negated(value, entity, depth, state)?;
                    filter.not = Some(Box::new(match filter.not.take() {
                        Some(previous) => FilterNode::And(vec![*previous, node]),
                        None => node,
                    }));
                }
                name => {
                    if entity.get_field(name).is_some() {
                        let conditions = self.parse_field(entity, name, value, state)?;
                        filter.field_conditions.extend(conditions);
                    } else if let Some(join) = entity.get_join(name) {
                        self.parse_relation(&mut filter, join, value, depth, state)?;
                    } else {
                        return Err(unknown_key(entity, name, value));
                    }
                }
            }
        }
        Ok(filter)
    }

    fn parse_field(
        &self,
        entity: &EntityMetadata,
        name: &str,
        value: &Value,
        state: &mut ParseState,
    ) -> Result<Vec<FieldCondition>, FilterError> {
        let field = self.registry.lookup_field(&entity.entity_code, name)?;
        let operators = value
            .as_object()
            .filter(|ops| !ops.is_empty())
            .ok_or_else(|| {
                FilterError::MalformedFilter(format!(
                    "'{}' expects a map of operator to value",
                    name
                ))
            })?;

        let mut conditions = Vec::with_capacity(operators.len());
        for (op_name, operand) in operators {
            let operator = FieldOperator::from_name(op_name)
                .filter(|op| op.supports(&field.value_kind))
                .ok_or_else(|| FilterError::UnsupportedOperator {
                    field: name.to_string(),
                    operator: op_name.clone(),
                    kind: field.value_kind.name().to_string(),
                })?;
            let operand = operator.operand_from_json(name, operand)?;
            operator.check_operand(name, &field.value_kind, &operand)?;
            self.count_condition(state)?;
            conditions.push(FieldCondition::new(name, operator, operand));
        }
        Ok(conditions)
    }

    fn parse_relation(
        &self,
        filter: &mut EntityFilter,
        join: &JoinDescriptor,
        value: &Value,
        depth: usize,
        state: &mut ParseState,
    ) -> Result<(), FilterError> {
        let relation = &join.relation_name;
        let map = value.as_object().ok_or_else(|| {
            FilterError::MalformedFilter(format!("relation '{}' expects a filter object", relation))
        })?;
        let target = self.registry.lookup(&join.target_entity)?;

        // `{"relation": {"is_null": true}}` and friends: relations take
        // collection keywords or a nested filter, never field operators
        if let Some(op_name) = map
            .keys()
            .find(|k| FieldOperator::from_name(k).is_some() && !target.has_key(k))
        {
            let kind = if join.is_many() {
                "collection relation"
            } else {
                "single-valued relation"
            };
            return Err(FilterError::UnsupportedOperator {
                field: relation.clone(),
                operator: op_name.clone(),
                kind: kind.to_string(),
            });
        }

        let keywords = map.keys().filter(|k| is_array_keyword(k)).count();
        if keywords == 0 {
            let nested = self.parse_node(value, target, depth + 1, state)?;
            filter.nested.push(NestedFilter {
                relation_name: relation.clone(),
                filter: nested,
            });
            return Ok(());
        }
        if keywords != map.len() {
            return Err(FilterError::MalformedFilter(format!(
                "relation '{}' mixes collection keywords with field filters",
                relation
            )));
        }
        if !join.is_many() {
            let keyword = map.keys().next().cloned().unwrap_or_default();
            return Err(FilterError::UnsupportedOperator {
                field: relation.clone(),
                operator: keyword,
                kind: "single-valued relation".to_string(),
            });
        }

        for (keyword, operand) in map {
            let condition = match keyword.as_str() {
                "any" | "all" | "none" => {
                    let mode = match keyword.as_str() {
                        "any" => Quantifier::Any,
                        "all" => Quantifier::All,
                        _ => Quantifier::None,
                    };
                    if !operand.is_object() {
                        return Err(FilterError::MalformedFilter(format!(
                            "'{}.{}' expects a filter object",
                            relation, keyword
                        )));
                    }
                    let inner = self.parse_node(operand, target, depth + 1, state)?;
                    ArrayCondition::quantified(relation.clone(), mode, inner)
                }
                "is_empty" | "is_not_empty" => {
                    let flag = operand.as_bool().ok_or_else(|| {
                        FilterError::value_mismatch(relation, keyword, "true or false")
                    })?;
                    let empty = flag == (keyword == "is_empty");
                    if empty {
                        ArrayCondition::size(relation.clone(), SizeOp::Eq, 0)
                    } else {
                        ArrayCondition::size(relation.clone(), SizeOp::Gt, 0)
                    }
                }
                _ => {
                    let op = match keyword.as_str() {
                        "size_eq" => SizeOp::Eq,
                        "size_gt" => SizeOp::Gt,
                        "size_gte" => SizeOp::Gte,
                        "size_lt" => SizeOp::Lt,
                        _ => SizeOp::Lte,
                    };
                    let size = operand
                        .as_u64()
                        .filter(|n| i64::try_from(*n).is_ok())
                        .ok_or_else(|| {
                            FilterError::value_mismatch(
                                relation,
                                keyword,
                                format!("an integer between 0 and {}", i64::MAX),
                            )
                        })?;
                    ArrayCondition::size(relation.clone(), op, size)
                }
            };
            self.count_condition(state)?;
            filter.arrays.push(condition);
        }
        Ok(())
    }

    fn count_condition(&self, state: &mut ParseState) -> Result<(), FilterError> {
        state.conditions += 1;
        if state.conditions > self.limits.max_conditions {
            return Err(FilterError::FilterTooComplex(format!(
                "more than {} conditions",
                self.limits.max_conditions
            )));
        }
        Ok(())
    }
}

/// `UnknownRelation` when the value looks like a nested filter, `UnknownField` otherwise
fn unknown_key(entity: &EntityMetadata, key: &str, value: &Value) -> FilterError {
    let looks_nested = value
        .as_object()
        .is_some_and(|map| map.keys().all(|k| FieldOperator::from_name(k).is_none()));
    if looks_nested {
        FilterError::unknown_relation(&entity.entity_code, key)
    } else {
        FilterError::unknown_field(&entity.entity_code, key)
    }
}

/// Non-logical keys of a filter, looking through combinators
fn collect_keys(
    value: &Value,
    keys: &mut Vec<String>,
    depth: usize,
    max_depth: usize,
) -> Result<(), FilterError> {
    if depth > max_depth {
        return Err(FilterError::FilterTooComplex(format!(
            "nesting deeper than {} levels",
            max_depth
        )));
    }
    let map = value.as_object().ok_or_else(|| {
        FilterError::MalformedFilter(format!("expected a filter object, got {}", value))
    })?;
    for (key, child) in map {
        match key.as_str() {
            AND | OR => {
                let items = child.as_array().ok_or_else(|| {
                    FilterError::malformed_logical(key, "expected a list of filters")
                })?;
                for item in items {
                    if !item.is_object() {
                        return Err(FilterError::malformed_logical(
                            key,
                            "every item must be a filter object",
                        ));
                    }
                    collect_keys(item, keys, depth + 1, max_depth)?;
                }
            }
            NOT => {
                if !child.is_object() {
                    return Err(FilterError::malformed_logical(NOT, "expected a filter object"));
                }
                collect_keys(child, keys, depth + 1, max_depth)?
            }
            _ => {
                if !keys.iter().any(|k| k == key) {
                    keys.push(key.clone());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::constants::MAX_RELATIVE_DAYS;
    use crate::data::filters::ast::ArrayPredicate;
    use crate::data::filters::operators::{FilterValue, Operand};
    use crate::domain::catalog::catalog_registry;

    fn parse(value: Value, entity: Option<&str>) -> Result<FilterNode, FilterError> {
        let registry = catalog_registry().unwrap();
        FilterParser::new(&registry).parse(&value, entity)
    }

    fn entity(node: FilterNode) -> EntityFilter {
        match node {
            FilterNode::Entity(filter) => filter,
            other => panic!("expected entity filter, got {:?}", other),
        }
    }

    #[test]
    fn test_field_conditions() {
        let filter = entity(
            parse(
                json!({"name": {"contains": "Naruto"}, "rank": {"eq": "S"}}),
                Some("card"),
            )
            .unwrap(),
        );
        assert_eq!(filter.entity_code, "card");
        assert_eq!(
            filter.field_conditions,
            vec![
                FieldCondition::single("name", FieldOperator::Contains, "Naruto"),
                FieldCondition::single("rank", FieldOperator::Eq, "S"),
            ]
        );
    }

    #[test]
    fn test_multiple_operators_on_one_field() {
        let filter = entity(
            parse(json!({"card_id": {"gte": 10, "lt": 20}}), Some("card")).unwrap(),
        );
        assert_eq!(filter.field_conditions.len(), 2);
        assert_eq!(
            filter.field_conditions[1].operand,
            Operand::Single(FilterValue::Integer(20))
        );
    }

    #[test]
    fn test_empty_object_is_empty_filter() {
        let filter = entity(parse(json!({}), Some("card")).unwrap());
        assert!(filter.is_empty());
    }

    #[test]
    fn test_top_level_or() {
        let node = parse(
            json!({"or": [{"rank": {"eq": "S"}}, {"rank": {"eq": "A"}}]}),
            Some("card"),
        )
        .unwrap();
        let FilterNode::Or(children) = node else {
            panic!("expected or");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[0], FilterNode::Entity(f) if f.field_conditions.len() == 1));
    }

    #[test]
    fn test_top_level_and_or_together() {
        let node = parse(
            json!({"and": [{"rank": {"eq": "S"}}], "or": [{"name": {"eq": "x"}}]}),
            Some("card"),
        )
        .unwrap();
        let FilterNode::And(parts) = node else {
            panic!("expected and");
        };
        assert!(matches!(parts[0], FilterNode::And(_)));
        assert!(matches!(parts[1], FilterNode::Or(_)));
    }

    #[test]
    fn test_top_level_not() {
        let node = parse(json!({"not": {"rank": {"eq": "E"}}}), Some("card")).unwrap();
        assert!(matches!(node, FilterNode::Not(_)));
    }

    #[test]
    fn test_logical_slots_inside_entity() {
        let filter = entity(
            parse(
                json!({
                    "name": {"icontains": "sasuke"},
                    "or": [{"rank": {"eq": "S"}}, {"rank": {"eq": "A"}}],
                    "not": {"image": {"is_null": true}}
                }),
                Some("card"),
            )
            .unwrap(),
        );
        assert_eq!(filter.field_conditions.len(), 1);
        assert_eq!(filter.or.len(), 2);
        assert!(filter.and.is_empty());
        assert!(filter.not.is_some());
    }

    #[test]
    fn test_malformed_logical_operator() {
        assert!(matches!(
            parse(json!({"and": {"rank": {"eq": "S"}}}), Some("card")),
            Err(FilterError::MalformedLogicalOperator { operator, .. }) if operator == "and"
        ));
        assert!(matches!(
            parse(json!({"or": [1, 2]}), Some("card")),
            Err(FilterError::MalformedLogicalOperator { operator, .. }) if operator == "or"
        ));
        assert!(matches!(
            parse(json!({"not": [{"rank": {"eq": "S"}}]}), Some("card")),
            Err(FilterError::MalformedLogicalOperator { operator, .. }) if operator == "not"
        ));
    }

    #[test]
    fn test_non_object_filter() {
        assert!(matches!(
            parse(json!([1, 2]), Some("card")),
            Err(FilterError::MalformedFilter(_))
        ));
    }

    #[test]
    fn test_unknown_field_and_relation() {
        assert_eq!(
            parse(json!({"power": {"gt": 3}}), Some("card")),
            Err(FilterError::unknown_field("card", "power"))
        );
        assert_eq!(
            parse(json!({"owners": {"username": {"eq": "x"}}}), Some("card")),
            Err(FilterError::unknown_relation("card", "owners"))
        );
    }

    #[test]
    fn test_unknown_entity() {
        assert_eq!(
            parse(json!({}), Some("planet")),
            Err(FilterError::unknown_entity("planet"))
        );
    }

    #[test]
    fn test_unsupported_operator() {
        assert!(matches!(
            parse(json!({"rank": {"contains": "S"}}), Some("card")),
            Err(FilterError::UnsupportedOperator { field, operator, .. })
                if field == "rank" && operator == "contains"
        ));
        assert!(matches!(
            parse(json!({"name": {"resembles": "x"}}), Some("card")),
            Err(FilterError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_value_kind_mismatch() {
        assert!(matches!(
            parse(json!({"card_id": {"eq": "abc"}}), Some("card")),
            Err(FilterError::ValueKindMismatch { .. })
        ));
        assert!(matches!(
            parse(json!({"rank": {"eq": "SSS"}}), Some("card")),
            Err(FilterError::ValueKindMismatch { .. })
        ));
        assert!(matches!(
            parse(json!({"created_at": {"between": ["2024-01-01"]}}), Some("card")),
            Err(FilterError::ValueKindMismatch { .. })
        ));
        assert!(matches!(
            parse(json!({"name": {"eq": null}}), Some("card")),
            Err(FilterError::ValueKindMismatch { .. })
        ));
    }

    #[test]
    fn test_operator_map_required() {
        assert!(matches!(
            parse(json!({"name": "Naruto"}), Some("card")),
            Err(FilterError::MalformedFilter(_))
        ));
        assert!(matches!(
            parse(json!({"name": {}}), Some("card")),
            Err(FilterError::MalformedFilter(_))
        ));
    }

    #[test]
    fn test_array_any() {
        let filter = entity(
            parse(
                json!({"summary": {"any": {"collection": {"eq": "OWNED"}}}}),
                Some("card"),
            )
            .unwrap(),
        );
        assert_eq!(filter.arrays.len(), 1);
        let condition = &filter.arrays[0];
        assert_eq!(condition.relation_name, "summary");
        let ArrayPredicate::Quantified { mode, filter: inner } = &condition.predicate else {
            panic!("expected quantified predicate");
        };
        assert_eq!(*mode, Quantifier::Any);
        assert!(matches!(inner.as_ref(), FilterNode::Entity(f) if f.entity_code == "summary_card_users"));
    }

    #[test]
    fn test_array_size_keywords() {
        let filter = entity(
            parse(
                json!({"summary": {"is_empty": false, "size_lte": 3}}),
                Some("card"),
            )
            .unwrap(),
        );
        assert_eq!(
            filter.arrays,
            vec![
                ArrayCondition::size("summary", SizeOp::Gt, 0),
                ArrayCondition::size("summary", SizeOp::Lte, 3),
            ]
        );
    }

    #[test]
    fn test_array_size_requires_count() {
        assert!(matches!(
            parse(json!({"summary": {"size_gt": -1}}), Some("card")),
            Err(FilterError::ValueKindMismatch { .. })
        ));
        assert!(matches!(
            parse(json!({"summary": {"is_empty": "yes"}}), Some("card")),
            Err(FilterError::ValueKindMismatch { .. })
        ));
    }

    #[test]
    fn test_array_size_out_of_range() {
        let err = parse(json!({"summary": {"size_eq": u64::MAX}}), Some("card")).unwrap_err();
        assert!(matches!(
            err,
            FilterError::ValueKindMismatch { ref operator, .. } if operator == "size_eq"
        ));
        assert!(err.is_client_error());
        assert!(parse(json!({"summary": {"size_lte": i64::MAX}}), Some("card")).is_ok());
    }

    #[test]
    fn test_relative_days_out_of_range() {
        for operator in ["last_n_days", "older_than_days"] {
            let err = parse(
                json!({"created_at": {operator: 1_000_000_000_000_i64}}),
                Some("card"),
            )
            .unwrap_err();
            assert!(matches!(err, FilterError::ValueKindMismatch { .. }));
            assert!(err.is_client_error());
            assert!(
                parse(
                    json!({"created_at": {operator: MAX_RELATIVE_DAYS}}),
                    Some("card")
                )
                .is_ok()
            );
            assert!(
                parse(
                    json!({"created_at": {operator: MAX_RELATIVE_DAYS + 1}}),
                    Some("card")
                )
                .is_err()
            );
        }
    }

    #[test]
    fn test_is_null_on_relation_is_rejected() {
        assert_eq!(
            parse(json!({"summary": {"is_null": true}}), Some("card")),
            Err(FilterError::UnsupportedOperator {
                field: "summary".into(),
                operator: "is_null".into(),
                kind: "collection relation".into(),
            })
        );
        assert!(matches!(
            parse(json!({"card": {"eq": 1}}), Some("summary_card_users")),
            Err(FilterError::UnsupportedOperator { ref kind, .. }) if kind == "single-valued relation"
        ));
        assert!(parse(json!({"summary": {"is_empty": true}}), Some("card")).is_ok());
    }

    #[test]
    fn test_array_keywords_mixed_with_fields() {
        assert!(matches!(
            parse(
                json!({"summary": {"any": {}, "collection": {"eq": "OWNED"}}}),
                Some("card")
            ),
            Err(FilterError::MalformedFilter(_))
        ));
    }

    #[test]
    fn test_array_keywords_on_single_relation() {
        assert!(matches!(
            parse(json!({"card": {"any": {}}}), Some("summary_card_users")),
            Err(FilterError::UnsupportedOperator { field, .. }) if field == "card"
        ));
    }

    #[test]
    fn test_nested_relation() {
        let filter = entity(
            parse(
                json!({"card": {"rank": {"in": ["S", "ASS"]}}}),
                Some("summary_card_users"),
            )
            .unwrap(),
        );
        let NestedFilter { relation_name, filter: inner } = &filter.nested[0];
        assert_eq!(relation_name, "card");
        assert!(matches!(inner, FilterNode::Entity(f) if f.entity_code == "card"));
    }

    #[test]
    fn test_detect_entity() {
        let registry = catalog_registry().unwrap();
        let parser = FilterParser::new(&registry);
        assert_eq!(
            parser
                .detect_entity(&json!({"name": {"contains": "x"}, "rank": {"eq": "S"}}))
                .unwrap(),
            "card"
        );
        assert_eq!(
            parser
                .detect_entity(&json!({"or": [{"state": {"eq": "LOCKED"}}]}))
                .unwrap(),
            "summary_card_users"
        );
        assert_eq!(
            parser
                .detect_entity(&json!({"summary": {"any": {}}}))
                .unwrap(),
            "card"
        );
    }

    #[test]
    fn test_detect_entity_ambiguous() {
        let registry = catalog_registry().unwrap();
        let parser = FilterParser::new(&registry);
        assert_eq!(
            parser.detect_entity(&json!({"collection": {"eq": "OWNED"}})),
            Err(FilterError::AmbiguousEntityDetection {
                candidates: vec!["card_users_stats".into(), "summary_card_users".into()]
            })
        );
    }

    #[test]
    fn test_detect_entity_malformed_logical_operator() {
        let registry = catalog_registry().unwrap();
        let parser = FilterParser::new(&registry);
        for (filter, expected) in [
            (json!({"and": [1]}), "and"),
            (json!({"or": [{"rank": {"eq": "S"}}, "x"]}), "or"),
            (json!({"not": [1]}), "not"),
        ] {
            assert!(matches!(
                parser.detect_entity(&filter),
                Err(FilterError::MalformedLogicalOperator { ref operator, .. }) if operator == expected
            ));
            assert_eq!(
                parser.detect_entity(&filter).unwrap_err(),
                parse(filter, Some("card")).unwrap_err()
            );
        }
    }

    #[test]
    fn test_detect_entity_unknown_field() {
        assert_eq!(
            parse(json!({"name": {"eq": "x"}, "power": {"gt": 1}}), None),
            Err(FilterError::unknown_field("card", "power"))
        );
    }

    #[test]
    fn test_parse_without_entity() {
        let node = parse(json!({"username": {"startswith": "adm"}}), None).unwrap();
        assert_eq!(entity(node).entity_code, "animestars_user");
    }

    #[test]
    fn test_payload_size_limit() {
        let registry = catalog_registry().unwrap();
        let parser = FilterParser::new(&registry).with_limits(FilterLimits {
            max_filter_bytes: 16,
            ..Default::default()
        });
        assert!(matches!(
            parser.parse_str(r#"{"name": {"contains": "Naruto"}}"#, Some("card")),
            Err(FilterError::FilterTooComplex(_))
        ));
        assert!(matches!(
            parser.parse_str("{", Some("card")),
            Err(FilterError::MalformedFilter(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let registry = catalog_registry().unwrap();
        let parser = FilterParser::new(&registry).with_limits(FilterLimits {
            max_depth: 2,
            ..Default::default()
        });
        let deep = json!({"not": {"not": {"not": {"rank": {"eq": "S"}}}}});
        assert!(matches!(
            parser.parse(&deep, Some("card")),
            Err(FilterError::FilterTooComplex(_))
        ));
    }

    #[test]
    fn test_condition_limit() {
        let registry = catalog_registry().unwrap();
        let parser = FilterParser::new(&registry).with_limits(FilterLimits {
            max_conditions: 2,
            ..Default::default()
        });
        let filter = json!({"card_id": {"gt": 1, "lt": 9}, "rank": {"eq": "S"}});
        assert!(matches!(
            parser.parse(&filter, Some("card")),
            Err(FilterError::FilterTooComplex(_))
        ));
    }
}
