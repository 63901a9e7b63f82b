//! Filter engine
//!
//! Entry point for callers: owns the validated registry and turns filters
//! and pagination queries into ready-to-run SQL. The engine is cheap to
//! clone and holds no mutable state, so one instance serves every request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::core::constants::MAX_PER_PAGE;
use crate::data::error::SearchError;
use crate::data::pagination::{FilterInput, PaginationQuery, PaginationResult};
use crate::data::sql::{Backend, SqlDialect};
use crate::data::traits::SearchExecutor;

use super::ast::{EntityFilter, FilterNode};
use super::condition::{Condition, SqlParams, SqlValue};
use super::error::FilterError;
use super::parser::{FilterLimits, FilterParser};
use super::planner::{JoinPlan, JoinPlanner};
use super::registry::MetadataRegistry;
use super::resolver::{ConditionResolver, ResolveContext};

/// A filter resolved against a join plan
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub root_entity: String,
    pub plan: JoinPlan,
    pub condition: Condition,
}

impl CompiledFilter {
    /// Relation path to alias, for the storage layer
    pub fn join_aliases(&self) -> BTreeMap<String, String> {
        self.plan.aliases()
    }

    /// Root table plus the single-valued joins of the outer query
    pub fn from_sql(&self, dialect: &dyn SqlDialect, params: &mut SqlParams) -> String {
        let mut sql = format!("{} {}", self.plan.root_table, self.plan.root_alias);
        for join in self.plan.root_joins() {
            sql.push(' ');
            sql.push_str(&join.join_clause().to_sql(dialect, params));
        }
        sql
    }

    pub fn where_sql(&self, dialect: &dyn SqlDialect, params: &mut SqlParams) -> String {
        self.condition.to_sql(dialect, params)
    }
}

/// Everything a storage backend needs to run the count and page queries
#[derive(Clone)]
pub struct SearchRequest {
    pub root_entity: String,
    pub from_sql: String,
    pub where_sql: String,
    /// Qualified primary key columns of the root entity
    pub primary_key: Vec<String>,
    /// Single-valued joins in the outer query may repeat root rows
    pub distinct: bool,
    pub order: Vec<String>,
    pub page: u32,
    pub per_page: u32,
    pub join_aliases: BTreeMap<String, String>,
    params: Vec<SqlValue>,
    dialect: &'static dyn SqlDialect,
}

impl SearchRequest {
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.dialect
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Count of distinct root rows matching the filter, ignoring order and paging
    pub fn count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM (SELECT DISTINCT {} FROM {} WHERE {}) AS filtered",
            self.primary_key.join(", "),
            self.from_sql,
            self.where_sql
        )
    }

    pub fn page_sql(&self) -> String {
        let root_alias = self
            .primary_key
            .first()
            .and_then(|c| c.split('.').next())
            .unwrap_or_default();
        format!(
            "SELECT {}{}.* FROM {} WHERE {} ORDER BY {} {}",
            if self.distinct { "DISTINCT " } else { "" },
            root_alias,
            self.from_sql,
            self.where_sql,
            self.order.join(", "),
            self.dialect.limit_offset(self.per_page, self.offset())
        )
    }
}

impl fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRequest")
            .field("root_entity", &self.root_entity)
            .field("from_sql", &self.from_sql)
            .field("where_sql", &self.where_sql)
            .field("params", &self.params)
            .field("order", &self.order)
            .field("page", &self.page)
            .field("per_page", &self.per_page)
            .field("dialect", &self.dialect.name())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FilterEngine {
    registry: Arc<MetadataRegistry>,
    backend: Backend,
    limits: FilterLimits,
    max_per_page: u32,
}

impl FilterEngine {
    /// Validate the registry and build an engine around it
    pub fn new(registry: Arc<MetadataRegistry>, backend: Backend) -> Result<Self, FilterError> {
        registry.validate()?;
        tracing::debug!(
            entities = registry.len(),
            backend = %backend,
            "FilterEngine initialized"
        );
        Ok(Self {
            registry,
            backend,
            limits: FilterLimits::default(),
            max_per_page: MAX_PER_PAGE,
        })
    }

    pub fn with_limits(mut self, limits: FilterLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_per_page(mut self, max_per_page: u32) -> Self {
        self.max_per_page = max_per_page;
        self
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn limits(&self) -> FilterLimits {
        self.limits
    }

    fn parser(&self) -> FilterParser<'_> {
        FilterParser::new(&self.registry).with_limits(self.limits)
    }

    pub fn parse(&self, value: &Value, entity: Option<&str>) -> Result<FilterNode, FilterError> {
        self.parser().parse(value, entity)
    }

    pub fn parse_str(&self, input: &str, entity: Option<&str>) -> Result<FilterNode, FilterError> {
        self.parser().parse_str(input, entity)
    }

    pub fn detect_entity(&self, value: &Value) -> Result<String, FilterError> {
        self.parser().detect_entity(value)
    }

    pub fn plan(&self, root_entity: &str, node: &FilterNode) -> Result<JoinPlan, FilterError> {
        JoinPlanner::new(&self.registry).plan(root_entity, node)
    }

    pub fn resolve(
        &self,
        node: &FilterNode,
        plan: &JoinPlan,
        ctx: ResolveContext,
    ) -> Result<Condition, FilterError> {
        ConditionResolver::new(&self.registry, plan, ctx).resolve(node)
    }

    pub fn compile(&self, root_entity: &str, node: &FilterNode) -> Result<CompiledFilter, FilterError> {
        self.compile_at(root_entity, node, ResolveContext::default())
    }

    /// Compile with an explicit clock for relative dates
    pub fn compile_at(
        &self,
        root_entity: &str,
        node: &FilterNode,
        ctx: ResolveContext,
    ) -> Result<CompiledFilter, FilterError> {
        let plan = self.plan(root_entity, node)?;
        let condition = self.resolve(node, &plan, ctx)?;
        tracing::debug!(
            entity = %root_entity,
            joins = plan.len(),
            conditions = node.condition_count(),
            "Compiled filter"
        );
        Ok(CompiledFilter {
            root_entity: root_entity.to_string(),
            plan,
            condition,
        })
    }

    pub fn prepare_search(
        &self,
        root_entity: &str,
        query: &PaginationQuery,
    ) -> Result<SearchRequest, FilterError> {
        self.prepare_search_at(root_entity, query, ResolveContext::default())
    }

    pub fn prepare_search_at(
        &self,
        root_entity: &str,
        query: &PaginationQuery,
        ctx: ResolveContext,
    ) -> Result<SearchRequest, FilterError> {
        query.check()?;
        if query.per_page > self.max_per_page {
            return Err(FilterError::InvalidPagination(format!(
                "Per page must be between 1 and {}",
                self.max_per_page
            )));
        }
        let root = self.registry.lookup(root_entity)?;

        let node = match &query.filter {
            None => FilterNode::Entity(EntityFilter::new(root_entity)),
            Some(FilterInput::Untyped(value)) => self.parse(value, Some(root_entity))?,
            Some(FilterInput::Typed(node)) => node.clone(),
        };
        let compiled = self.compile_at(root_entity, &node, ctx)?;
        let alias = compiled.plan.root_alias.clone();
        let dialect = self.backend.dialect();

        let mut order = Vec::with_capacity(query.order_by.len() + root.primary_key.len());
        let mut ordered_columns = Vec::new();
        for order_by in &query.order_by {
            let field = self.registry.lookup_field(root_entity, &order_by.field)?;
            let column = format!("{}.{}", alias, field.column);
            order.push(dialect.order_by_with_nulls(&column, order_by.direction.is_desc(), true));
            ordered_columns.push(field.column.clone());
        }
        for pk in &root.primary_key {
            if !ordered_columns.contains(pk) {
                order.push(format!("{}.{} ASC", alias, pk));
            }
        }

        let mut params = SqlParams::default();
        let from_sql = compiled.from_sql(dialect, &mut params);
        let where_sql = compiled.where_sql(dialect, &mut params);

        Ok(SearchRequest {
            root_entity: root_entity.to_string(),
            from_sql,
            where_sql,
            primary_key: root
                .primary_key
                .iter()
                .map(|pk| format!("{}.{}", alias, pk))
                .collect(),
            distinct: compiled.plan.root_joins().next().is_some(),
            order,
            page: query.page,
            per_page: query.per_page,
            join_aliases: compiled.join_aliases(),
            params: params.values,
            dialect,
        })
    }

    /// Run a paginated search through `executor`
    pub async fn search<T, E>(
        &self,
        executor: &E,
        root_entity: &str,
        query: &PaginationQuery,
    ) -> Result<PaginationResult<T>, SearchError>
    where
        T: Send,
        E: SearchExecutor<T> + ?Sized,
    {
        let request = self.prepare_search(root_entity, query)?;
        let total = executor.count(&request).await?;
        let items = if request.offset() >= total {
            Vec::new()
        } else {
            executor.fetch_page(&request).await?
        };
        tracing::debug!(
            entity = %root_entity,
            total,
            page = request.page,
            items = items.len(),
            "Search completed"
        );
        Ok(PaginationResult::new(
            items,
            request.page,
            request.per_page,
            total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::data::error::DataError;
    use crate::data::pagination::OrderBy;
    use crate::domain::catalog::catalog_registry;

    fn engine(backend: Backend) -> FilterEngine {
        FilterEngine::new(Arc::new(catalog_registry().unwrap()), backend).unwrap()
    }

    fn ctx() -> ResolveContext {
        ResolveContext::at(Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_new_rejects_invalid_registry() {
        let mut registry = MetadataRegistry::new();
        registry
            .register(
                crate::data::filters::EntityMetadata::new("card", "cards")
                    .primary_key(&["id"])
                    .join(crate::data::filters::JoinDescriptor::many(
                        "owners",
                        "user",
                        crate::data::filters::JoinPredicate::on("id", "card_id"),
                    )),
            )
            .unwrap();
        assert!(matches!(
            FilterEngine::new(Arc::new(registry), Backend::Sqlite),
            Err(FilterError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_compile_collection_filter() {
        let engine = engine(Backend::Sqlite);
        let node = engine
            .parse(
                &json!({"summary": {"any": {"collection": {"eq": "OWNED"}}}}),
                None,
            )
            .unwrap();
        let compiled = engine.compile_at("card", &node, ctx()).unwrap();
        assert_eq!(
            compiled.join_aliases(),
            BTreeMap::from([("summary".to_string(), "t1".to_string())])
        );
        assert!(matches!(
            compiled.condition,
            Condition::Exists { negated: false, .. }
        ));
    }

    #[test]
    fn test_prepare_search_without_filter() {
        let engine = engine(Backend::Sqlite);
        let request = engine
            .prepare_search_at("card", &PaginationQuery::default(), ctx())
            .unwrap();
        assert_eq!(
            request.count_sql(),
            "SELECT COUNT(*) FROM (SELECT DISTINCT t0.id FROM animestars_cards t0 WHERE 1=1) AS filtered"
        );
        assert_eq!(
            request.page_sql(),
            "SELECT t0.* FROM animestars_cards t0 WHERE 1=1 ORDER BY t0.id ASC LIMIT 10 OFFSET 0"
        );
        assert!(request.params().is_empty());
        assert!(!request.distinct);
    }

    #[test]
    fn test_prepare_search_with_filter_and_order() {
        let engine = engine(Backend::Postgres);
        let query = PaginationQuery::new(3, 20)
            .with_filter(json!({"rank": {"in": ["S", "A"]}, "name": {"icontains": "uchiha"}}))
            .with_order(OrderBy::asc("name"));
        let request = engine.prepare_search_at("card", &query, ctx()).unwrap();
        assert_eq!(
            request.where_sql,
            "(t0.rank IN ($1, $2) AND t0.name ILIKE $3 ESCAPE '\\')"
        );
        assert_eq!(
            request.page_sql(),
            "SELECT t0.* FROM animestars_cards t0 \
             WHERE (t0.rank IN ($1, $2) AND t0.name ILIKE $3 ESCAPE '\\') \
             ORDER BY t0.name ASC NULLS LAST, t0.id ASC LIMIT 20 OFFSET 40"
        );
        assert_eq!(
            request.params(),
            &[
                SqlValue::Text("S".into()),
                SqlValue::Text("A".into()),
                SqlValue::Text("%uchiha%".into()),
            ]
        );
    }

    #[test]
    fn test_prepare_search_with_root_join_is_distinct() {
        let engine = engine(Backend::Sqlite);
        let query = PaginationQuery::default()
            .with_filter(json!({"author_user": {"username": {"eq": "kishimoto"}}}));
        let request = engine.prepare_search_at("card", &query, ctx()).unwrap();
        assert!(request.distinct);
        assert_eq!(
            request.from_sql,
            "animestars_cards t0 LEFT JOIN animestars_users t1 ON t0.author = t1.username"
        );
        assert!(request.page_sql().starts_with("SELECT DISTINCT t0.* FROM"));
        assert_eq!(
            request.join_aliases.get("author_user").map(String::as_str),
            Some("t1")
        );
    }

    #[test]
    fn test_prepare_search_typed_filter() {
        let engine = engine(Backend::Sqlite);
        let node = engine
            .parse(&json!({"rank": {"eq": "S"}}), Some("card"))
            .unwrap();
        let typed = PaginationQuery::default().with_filter(node);
        let untyped = PaginationQuery::default().with_filter(json!({"rank": {"eq": "S"}}));
        let typed = engine.prepare_search_at("card", &typed, ctx()).unwrap();
        let untyped = engine.prepare_search_at("card", &untyped, ctx()).unwrap();
        assert_eq!(typed.where_sql, untyped.where_sql);
        assert_eq!(typed.params(), untyped.params());
    }

    #[test]
    fn test_prepare_search_rejects_unknown_order_field() {
        let engine = engine(Backend::Sqlite);
        let query = PaginationQuery::default().with_order(OrderBy::desc("power"));
        assert_eq!(
            engine.prepare_search_at("card", &query, ctx()).unwrap_err(),
            FilterError::unknown_field("card", "power")
        );
    }

    #[test]
    fn test_prepare_search_rejects_page_size() {
        let engine = engine(Backend::Sqlite).with_max_per_page(50);
        let query = PaginationQuery::new(1, 51);
        assert!(matches!(
            engine.prepare_search_at("card", &query, ctx()),
            Err(FilterError::InvalidPagination(_))
        ));
        assert!(matches!(
            engine.prepare_search_at("card", &PaginationQuery::new(0, 10), ctx()),
            Err(FilterError::InvalidPagination(_))
        ));
    }

    #[test]
    fn test_prepare_search_unknown_entity() {
        let engine = engine(Backend::Sqlite);
        assert_eq!(
            engine
                .prepare_search_at("planet", &PaginationQuery::default(), ctx())
                .unwrap_err(),
            FilterError::unknown_entity("planet")
        );
    }

    #[test]
    fn test_order_on_primary_key_is_not_repeated() {
        let engine = engine(Backend::Sqlite);
        let query = PaginationQuery::default().with_order(OrderBy::parse("username:asc").unwrap());
        let request = engine
            .prepare_search_at("animestars_user", &query, ctx())
            .unwrap();
        assert_eq!(request.order.len(), 1);
    }

    struct FixedExecutor {
        total: u64,
        fetched: Mutex<usize>,
    }

    #[async_trait]
    impl SearchExecutor<u64> for FixedExecutor {
        async fn count(&self, _request: &SearchRequest) -> Result<u64, DataError> {
            Ok(self.total)
        }

        async fn fetch_page(&self, request: &SearchRequest) -> Result<Vec<u64>, DataError> {
            *self.fetched.lock().unwrap() += 1;
            let start = request.offset();
            let end = (start + u64::from(request.per_page)).min(self.total);
            Ok((start..end).collect())
        }
    }

    #[tokio::test]
    async fn test_search_packages_result() {
        let engine = engine(Backend::Sqlite);
        let executor = FixedExecutor {
            total: 25,
            fetched: Mutex::new(0),
        };
        let result = engine
            .search(&executor, "card", &PaginationQuery::new(2, 10))
            .await
            .unwrap();
        assert_eq!(result.total, 25);
        assert_eq!(result.items, (10..20).collect::<Vec<_>>());
        assert_eq!(result.total_pages, 3);
        assert!(result.has_next);
    }

    #[tokio::test]
    async fn test_search_past_last_page_skips_fetch() {
        let engine = engine(Backend::Sqlite);
        let executor = FixedExecutor {
            total: 5,
            fetched: Mutex::new(0),
        };
        let result = engine
            .search(&executor, "card", &PaginationQuery::new(4, 10))
            .await
            .unwrap();
        assert!(result.items.is_empty());
        assert!(!result.has_next);
        assert_eq!(*executor.fetched.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_propagates_filter_errors() {
        let engine = engine(Backend::Sqlite);
        let executor = FixedExecutor {
            total: 0,
            fetched: Mutex::new(0),
        };
        let query = PaginationQuery::default().with_filter(json!({"power": {"gt": 1}}));
        let err = engine.search(&executor, "card", &query).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Filter(FilterError::UnknownField { .. })
        ));
    }
}
