//! Core application

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::core::cli::{self, Commands, FilterSource, QueryArgs};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG, ENV_LOG_FORMAT};
use crate::data::filters::{EntityFilter, FilterEngine, FilterNode, JoinScope};
use crate::data::error::DataError;
use crate::data::pagination::{FilterInput, OrderBy, PaginationQuery};
use crate::data::sql::Backend;
use crate::data::sqlite::{JsonRow, SqliteExecutor};
use crate::domain::catalog_registry;
use crate::utils::file::expand_path;

pub struct CoreApp {
    pub config: AppConfig,
    pub engine: FilterEngine,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let config = AppConfig::load(&cli_config)?;
        let app = Self::init(config)?;

        match command.unwrap_or(Commands::Entities) {
            Commands::Entities => app.print_entities(),
            Commands::Detect { source } => app.detect(&source),
            Commands::Compile { query } => app.compile(&query),
            Commands::Search { query } => app.search(&query).await,
        }
    }

    /// Build the filter engine over the card catalog
    pub fn init(config: AppConfig) -> Result<Self> {
        let registry = catalog_registry().context("Failed to register catalog entities")?;
        let engine = FilterEngine::new(Arc::new(registry), config.database.backend)
            .context("Failed to initialize filter engine")?
            .with_limits(config.filters)
            .with_max_per_page(config.pagination.max_per_page);
        Ok(Self { config, engine })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_env_filter(filter);

        // stdout carries command output, logs go to stderr
        match std::env::var(ENV_LOG_FORMAT).as_deref() {
            Ok("json") => builder.json().init(),
            _ => builder.with_ansi(true).compact().init(),
        }
    }

    fn print_entities(&self) -> Result<()> {
        let entities: Vec<Value> = self
            .engine
            .registry()
            .entities()
            .map(|entity| {
                let fields: Vec<Value> = entity
                    .fields()
                    .map(|f| {
                        json!({
                            "name": f.field_name,
                            "column": f.column,
                            "kind": f.value_kind.name(),
                        })
                    })
                    .collect();
                let relations: Vec<Value> = entity
                    .joins()
                    .map(|j| {
                        json!({
                            "name": j.relation_name,
                            "target": j.target_entity,
                            "many": j.is_many(),
                        })
                    })
                    .collect();
                json!({
                    "entity": entity.entity_code,
                    "table": entity.table,
                    "primary_key": entity.primary_key,
                    "fields": fields,
                    "relations": relations,
                })
            })
            .collect();
        print_json(&Value::Array(entities))
    }

    fn detect(&self, source: &FilterSource) -> Result<()> {
        let text = read_filter(source)?.context("Provide a filter with --filter or --file")?;
        let value: Value = serde_json::from_str(&text).context("Filter is not valid JSON")?;
        let entity = self.engine.detect_entity(&value)?;
        println!("{}", entity);
        Ok(())
    }

    /// Resolve the root entity and build the pagination query for `args`
    fn build_query(&self, args: &QueryArgs) -> Result<(String, PaginationQuery)> {
        let text = read_filter(&args.source)?;

        let entity = match (&args.entity, &text) {
            (Some(entity), _) => entity.clone(),
            (None, Some(text)) => {
                let value: Value =
                    serde_json::from_str(text).context("Filter is not valid JSON")?;
                let entity = self.engine.detect_entity(&value)?;
                tracing::info!(entity = %entity, "Detected entity from filter");
                entity
            }
            (None, None) => anyhow::bail!("--entity is required when no filter is given"),
        };

        let filter = text
            .map(|t| self.engine.parse_str(&t, Some(&entity)))
            .transpose()?
            .map(FilterInput::Typed);

        let order_by = args
            .order_by
            .iter()
            .map(|s| OrderBy::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        let query = PaginationQuery {
            page: args.page,
            per_page: args
                .per_page
                .unwrap_or(self.config.pagination.default_per_page),
            order_by,
            filter,
        };
        Ok((entity, query))
    }

    fn compile(&self, args: &QueryArgs) -> Result<()> {
        let (entity, query) = self.build_query(args)?;
        let request = self.engine.prepare_search(&entity, &query)?;

        let mut output = json!({
            "entity": request.root_entity,
            "backend": self.engine.backend().name(),
            "count_sql": request.count_sql(),
            "page_sql": request.page_sql(),
            "params": request.params(),
            "join_aliases": request.join_aliases,
        });

        if self.config.debug {
            let node = match &query.filter {
                Some(FilterInput::Typed(node)) => node.clone(),
                _ => FilterNode::Entity(EntityFilter::new(&entity)),
            };
            let plan = self.engine.plan(&entity, &node)?;
            let joins: Vec<Value> = plan
                .joins()
                .iter()
                .map(|j| {
                    let scope = match &j.scope {
                        JoinScope::Root => "root".to_string(),
                        JoinScope::Correlated { anchor } => format!("correlated:{}", anchor),
                    };
                    json!({
                        "path": j.path,
                        "alias": j.alias,
                        "parent_alias": j.parent_alias,
                        "table": j.table,
                        "scope": scope,
                    })
                })
                .collect();
            output["joins"] = Value::Array(joins);
        }

        print_json(&output)
    }

    async fn search(&self, args: &QueryArgs) -> Result<()> {
        if self.config.database.backend != Backend::Sqlite {
            return Err(DataError::backend_unavailable(
                self.config.database.backend.name(),
                "search runs on sqlite only, use `compile` to render SQL for it",
            )
            .into());
        }
        let url = self
            .config
            .database
            .url
            .as_deref()
            .context("Set a database URL with --database-url or database.url")?;

        let (entity, query) = self.build_query(args)?;
        let executor = SqliteExecutor::connect(url)
            .await
            .with_context(|| format!("Failed to open database: {}", url))?;

        let result = self
            .engine
            .search::<JsonRow, _>(&executor, &entity, &query)
            .await;
        executor.close().await;

        print_json(&serde_json::to_value(result?)?)
    }
}

/// Filter text from `--filter` or `--file`, if either was given
fn read_filter(source: &FilterSource) -> Result<Option<String>> {
    if let Some(filter) = &source.filter {
        return Ok(Some(filter.clone()));
    }
    source
        .file
        .as_ref()
        .map(|path| {
            let path = expand_path(&path.to_string_lossy());
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read filter file: {}", path.display()))
        })
        .transpose()
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
