//! Join planner
//!
//! Collects the relation paths a filter traverses and assigns each distinct
//! path an alias. Aliases are minted per call, so concurrent compilations
//! never share state.

use std::collections::{BTreeMap, HashMap};

use crate::core::constants::ROOT_ALIAS;

use super::ast::{ArrayCondition, ArrayPredicate, EntityFilter, FilterNode};
use super::condition::JoinClause;
use super::error::FilterError;
use super::registry::{Cardinality, JoinPredicate, MetadataRegistry};

/// Where a planned join is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinScope {
    /// `LEFT JOIN` in the outer query (single-valued chain from the root)
    Root,
    /// Inside the correlated subquery of the collection relation at `anchor`
    Correlated { anchor: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJoin {
    /// Dot-separated relation chain from the root, e.g. `summary.card`
    pub path: String,
    pub alias: String,
    pub parent_alias: String,
    pub source_entity: String,
    pub target_entity: String,
    pub table: String,
    pub cardinality: Cardinality,
    pub predicate: JoinPredicate,
    pub scope: JoinScope,
}

impl PlannedJoin {
    pub fn join_clause(&self) -> JoinClause {
        JoinClause {
            table: self.table.clone(),
            alias: self.alias.clone(),
            on: self.predicate.bind(&self.parent_alias, &self.alias),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    pub root_entity: String,
    pub root_table: String,
    pub root_alias: String,
    joins: Vec<PlannedJoin>,
    index: HashMap<String, usize>,
}

impl JoinPlan {
    fn new(root_entity: &str, root_table: &str) -> Self {
        Self {
            root_entity: root_entity.to_string(),
            root_table: root_table.to_string(),
            root_alias: ROOT_ALIAS.to_string(),
            joins: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&PlannedJoin> {
        self.index.get(path).map(|&i| &self.joins[i])
    }

    pub fn alias_for(&self, path: &str) -> Option<&str> {
        self.get(path).map(|join| join.alias.as_str())
    }

    /// Joins in discovery order (a prefix always precedes its extensions)
    pub fn joins(&self) -> &[PlannedJoin] {
        &self.joins
    }

    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.joins
            .iter()
            .map(|join| (join.path.clone(), join.alias.clone()))
            .collect()
    }

    /// Joins rendered in the outer FROM clause
    pub fn root_joins(&self) -> impl Iterator<Item = &PlannedJoin> {
        self.joins
            .iter()
            .filter(|join| join.scope == JoinScope::Root)
    }

    /// Single-valued joins rendered inside the subquery anchored at `anchor`
    pub fn correlated_joins<'p>(&'p self, anchor: &'p str) -> impl Iterator<Item = &'p PlannedJoin> {
        self.joins.iter().filter(move |join| {
            join.cardinality == Cardinality::One
                && matches!(&join.scope, JoinScope::Correlated { anchor: a } if a == anchor)
        })
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    fn push(&mut self, join: PlannedJoin) {
        self.index.insert(join.path.clone(), self.joins.len());
        self.joins.push(join);
    }
}

/// Position in the filter tree while walking
#[derive(Debug, Clone)]
struct Scope {
    entity: String,
    path: Option<String>,
    alias: String,
    anchor: Option<String>,
}

pub struct JoinPlanner<'a> {
    registry: &'a MetadataRegistry,
}

impl<'a> JoinPlanner<'a> {
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self { registry }
    }

    pub fn plan(&self, root_entity: &str, node: &FilterNode) -> Result<JoinPlan, FilterError> {
        let root = self.registry.lookup(root_entity)?;
        let mut plan = JoinPlan::new(&root.entity_code, &root.table);
        let scope = Scope {
            entity: root.entity_code.clone(),
            path: None,
            alias: plan.root_alias.clone(),
            anchor: None,
        };
        self.walk(node, &scope, &mut plan)?;
        tracing::trace!(
            entity = %root_entity,
            joins = plan.len(),
            "Planned joins"
        );
        Ok(plan)
    }

    fn walk(&self, node: &FilterNode, scope: &Scope, plan: &mut JoinPlan) -> Result<(), FilterError> {
        match node {
            FilterNode::Field(_) | FilterNode::Raw(_) => Ok(()),
            FilterNode::And(children) | FilterNode::Or(children) => children
                .iter()
                .try_for_each(|child| self.walk(child, scope, plan)),
            FilterNode::Not(child) => self.walk(child, scope, plan),
            FilterNode::Entity(filter) => self.walk_entity(filter, scope, plan),
            FilterNode::Array(condition) => self.walk_array(condition, scope, plan),
        }
    }

    fn walk_array(
        &self,
        condition: &ArrayCondition,
        scope: &Scope,
        plan: &mut JoinPlan,
    ) -> Result<(), FilterError> {
        let child = self.visit(&condition.relation_name, scope, plan)?;
        match &condition.predicate {
            ArrayPredicate::Quantified { filter, .. } => self.walk(filter, &child, plan),
            ArrayPredicate::Size { .. } => Ok(()),
        }
    }

    fn walk_entity(
        &self,
        filter: &EntityFilter,
        scope: &Scope,
        plan: &mut JoinPlan,
    ) -> Result<(), FilterError> {
        if filter.entity_code != scope.entity {
            return Err(FilterError::ConditionResolution(format!(
                "filter for '{}' used where '{}' is expected",
                filter.entity_code, scope.entity
            )));
        }
        for nested in &filter.nested {
            let child = self.visit(&nested.relation_name, scope, plan)?;
            self.walk(&nested.filter, &child, plan)?;
        }
        for array in &filter.arrays {
            self.walk_array(array, scope, plan)?;
        }
        for node in filter.and.iter().chain(&filter.or).chain(filter.not.as_deref()) {
            self.walk(node, scope, plan)?;
        }
        Ok(())
    }

    /// Plan `relation` from `scope` (once per path) and return the scope of its target
    fn visit(&self, relation: &str, scope: &Scope, plan: &mut JoinPlan) -> Result<Scope, FilterError> {
        let join = self.registry.lookup_relation(&scope.entity, relation)?;
        let path = match &scope.path {
            Some(parent) => format!("{}.{}", parent, relation),
            None => relation.to_string(),
        };
        let anchor = match join.cardinality {
            Cardinality::Many => Some(path.clone()),
            Cardinality::One => scope.anchor.clone(),
        };

        let alias = match plan.alias_for(&path) {
            Some(alias) => alias.to_string(),
            None => {
                let target = self.registry.lookup(&join.target_entity)?;
                let alias = format!("t{}", plan.len() + 1);
                plan.push(PlannedJoin {
                    path: path.clone(),
                    alias: alias.clone(),
                    parent_alias: scope.alias.clone(),
                    source_entity: scope.entity.clone(),
                    target_entity: target.entity_code.clone(),
                    table: target.table.clone(),
                    cardinality: join.cardinality,
                    predicate: join.predicate.clone(),
                    scope: match &anchor {
                        Some(anchor) => JoinScope::Correlated {
                            anchor: anchor.clone(),
                        },
                        None => JoinScope::Root,
                    },
                });
                alias
            }
        };

        Ok(Scope {
            entity: join.target_entity.clone(),
            path: Some(path),
            alias,
            anchor,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::data::filters::parser::FilterParser;
    use crate::domain::catalog::catalog_registry;

    fn plan(entity: &str, filter: Value) -> Result<JoinPlan, FilterError> {
        let registry = catalog_registry().unwrap();
        let node = FilterParser::new(&registry).parse(&filter, Some(entity))?;
        JoinPlanner::new(&registry).plan(entity, &node)
    }

    #[test]
    fn test_no_relations() {
        let plan = plan("card", json!({"rank": {"eq": "S"}})).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.root_alias, "t0");
        assert_eq!(plan.root_table, "animestars_cards");
    }

    #[test]
    fn test_array_relation_single_path() {
        let plan = plan(
            "card",
            json!({"summary": {"any": {"collection": {"eq": "OWNED"}}}}),
        )
        .unwrap();
        assert_eq!(plan.len(), 1);
        let join = plan.get("summary").unwrap();
        assert_eq!(join.alias, "t1");
        assert_eq!(join.parent_alias, "t0");
        assert_eq!(join.table, "animestars_summary_card_users");
        assert_eq!(
            join.scope,
            JoinScope::Correlated {
                anchor: "summary".into()
            }
        );
        assert_eq!(plan.root_joins().count(), 0);
    }

    #[test]
    fn test_paths_are_deduplicated() {
        let plan = plan(
            "card",
            json!({"or": [
                {"summary": {"all": {"collection": {"eq": "OWNED"}}}},
                {"summary": {"none": {"state": {"eq": "LOCKED"}}}},
                {"summary": {"size_gt": 2}}
            ]}),
        )
        .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.alias_for("summary"), Some("t1"));
    }

    #[test]
    fn test_single_relation_from_root() {
        let plan = plan("card", json!({"author_user": {"username": {"eq": "kakashi"}}})).unwrap();
        let join = plan.get("author_user").unwrap();
        assert_eq!(join.scope, JoinScope::Root);
        assert_eq!(join.cardinality, Cardinality::One);
        assert_eq!(plan.root_joins().count(), 1);
    }

    #[test]
    fn test_single_relation_below_collection() {
        let plan = plan(
            "card",
            json!({"summary": {"any": {"card": {"rank": {"eq": "S"}}}}}),
        )
        .unwrap();
        let aliases = plan.aliases();
        assert_eq!(aliases.get("summary").map(String::as_str), Some("t1"));
        assert_eq!(aliases.get("summary.card").map(String::as_str), Some("t2"));

        let nested = plan.get("summary.card").unwrap();
        assert_eq!(nested.parent_alias, "t1");
        assert_eq!(
            nested.scope,
            JoinScope::Correlated {
                anchor: "summary".into()
            }
        );
        assert_eq!(plan.root_joins().count(), 0);
        assert_eq!(plan.correlated_joins("summary").count(), 1);
    }

    #[test]
    fn test_discovery_order() {
        let plan = plan(
            "deck",
            json!({"cards": {"any": {"author_user": {"username": {"eq": "x"}}, "summary": {"is_empty": true}}}}),
        )
        .unwrap();
        let paths: Vec<_> = plan.joins().iter().map(|j| j.path.as_str()).collect();
        assert_eq!(paths, vec!["cards", "cards.author_user", "cards.summary"]);
        let aliases: Vec<_> = plan.joins().iter().map(|j| j.alias.as_str()).collect();
        assert_eq!(aliases, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_aliases_are_fresh_per_call() {
        let filter = json!({"summary": {"any": {"collection": {"eq": "OWNED"}}}});
        let first = plan("card", filter.clone()).unwrap();
        let second = plan("card", filter).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_relation() {
        let registry = catalog_registry().unwrap();
        let node = FilterNode::Entity(EntityFilter::new("card").with_nested(
            "owners",
            FilterNode::Entity(EntityFilter::new("animestars_user")),
        ));
        assert_eq!(
            JoinPlanner::new(&registry).plan("card", &node),
            Err(FilterError::unknown_relation("card", "owners"))
        );
    }

    #[test]
    fn test_entity_mismatch() {
        let registry = catalog_registry().unwrap();
        let node = FilterNode::Entity(EntityFilter::new("deck"));
        assert!(matches!(
            JoinPlanner::new(&registry).plan("card", &node),
            Err(FilterError::ConditionResolution(_))
        ));
    }

    #[test]
    fn test_join_clause() {
        let plan = plan("card", json!({"author_user": {"username": {"eq": "x"}}})).unwrap();
        let clause = plan.get("author_user").unwrap().join_clause();
        assert_eq!(clause.table, "animestars_users");
        assert_eq!(clause.alias, "t1");
    }
}
