use clap::{Args, Parser, Subcommand};

use std::path::PathBuf;

use crate::data::sql::Backend;

use super::constants::{
    ENV_CONFIG, ENV_DATABASE_BACKEND, ENV_DATABASE_URL, ENV_DEBUG, ENV_DEFAULT_PER_PAGE,
    ENV_MAX_FILTER_BYTES, ENV_MAX_FILTER_CONDITIONS, ENV_MAX_FILTER_DEPTH, ENV_MAX_PER_PAGE,
};

#[derive(Parser)]
#[command(name = "cardex")]
#[command(version, about = "Filter compiler for the card catalog", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug mode
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// SQL backend the filters are rendered for (sqlite or postgres)
    #[arg(long, global = true, env = ENV_DATABASE_BACKEND, value_parser = parse_backend)]
    pub backend: Option<Backend>,

    /// Database connection URL (used by `search`)
    #[arg(long, global = true, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    /// Max filter JSON size in bytes
    #[arg(long, global = true, env = ENV_MAX_FILTER_BYTES)]
    pub max_filter_bytes: Option<usize>,

    /// Max nesting depth of a filter
    #[arg(long, global = true, env = ENV_MAX_FILTER_DEPTH)]
    pub max_filter_depth: Option<usize>,

    /// Max number of conditions in a filter
    #[arg(long, global = true, env = ENV_MAX_FILTER_CONDITIONS)]
    pub max_filter_conditions: Option<usize>,

    /// Page size used when a command does not set one
    #[arg(long, global = true, env = ENV_DEFAULT_PER_PAGE)]
    pub default_per_page: Option<u32>,

    /// Largest accepted page size
    #[arg(long, global = true, env = ENV_MAX_PER_PAGE)]
    pub max_per_page: Option<u32>,
}

/// Parse SQL backend from CLI/env string
fn parse_backend(s: &str) -> Result<Backend, String> {
    match s.to_lowercase().as_str() {
        "sqlite" => Ok(Backend::Sqlite),
        "postgres" | "postgresql" => Ok(Backend::Postgres),
        _ => Err(format!(
            "Invalid backend '{}'. Valid options: sqlite, postgres",
            s
        )),
    }
}

/// Where a command reads its filter from
#[derive(Args, Clone, Debug, Default)]
pub struct FilterSource {
    /// Filter as inline JSON
    #[arg(long, short = 'f', conflicts_with = "file")]
    pub filter: Option<String>,

    /// Read the filter JSON from a file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Entity, filter and page options shared by `compile` and `search`
#[derive(Args, Clone, Debug, Default)]
pub struct QueryArgs {
    /// Root entity code (detected from the filter when omitted)
    #[arg(long, short = 'e')]
    pub entity: Option<String>,

    #[command(flatten)]
    pub source: FilterSource,

    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Items per page
    #[arg(long)]
    pub per_page: Option<u32>,

    /// Ordering as `field`, `field:asc` or `field:desc` (repeatable)
    #[arg(long = "order-by")]
    pub order_by: Vec<String>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List registered entities with their fields and relations
    Entities,
    /// Compile a filter and print the count and page SQL
    Compile {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Print the entity a filter targets
    Detect {
        #[command(flatten)]
        source: FilterSource,
    },
    /// Run a filtered, paginated search against the database
    Search {
        #[command(flatten)]
        query: QueryArgs,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub database_url: Option<String>,
    pub max_filter_bytes: Option<usize>,
    pub max_filter_depth: Option<usize>,
    pub max_filter_conditions: Option<usize>,
    pub default_per_page: Option<u32>,
    pub max_per_page: Option<u32>,
}

fn into_parts(cli: Cli) -> (CliConfig, Option<Commands>) {
    let config = CliConfig {
        debug: cli.debug,
        config: cli.config,
        backend: cli.backend,
        database_url: cli.database_url,
        max_filter_bytes: cli.max_filter_bytes,
        max_filter_depth: cli.max_filter_depth,
        max_filter_conditions: cli.max_filter_conditions,
        default_per_page: cli.default_per_page,
        max_per_page: cli.max_per_page,
    };
    (config, cli.command)
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    into_parts(Cli::parse())
}
