use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::data::filters::FilterLimits;
use crate::data::sql::Backend;
use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_MAX_FILTER_BYTES, DEFAULT_MAX_FILTER_CONDITIONS,
    DEFAULT_MAX_FILTER_DEPTH, DEFAULT_PER_PAGE, MAX_PER_PAGE,
};

// =============================================================================
// File Config Sections
// =============================================================================

/// Database configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    pub backend: Option<Backend>,
    pub url: Option<String>,
}

/// Filter limits section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FiltersFileConfig {
    pub max_filter_bytes: Option<usize>,
    pub max_depth: Option<usize>,
    pub max_conditions: Option<usize>,
}

/// Pagination section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PaginationFileConfig {
    pub default_per_page: Option<u32>,
    pub max_per_page: Option<u32>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub database: Option<DatabaseFileConfig>,
    pub filters: Option<FiltersFileConfig>,
    pub pagination: Option<PaginationFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(database) = other.database {
            let current = self.database.get_or_insert_with(DatabaseFileConfig::default);
            if database.backend.is_some() {
                tracing::trace!(backend = ?database.backend, "Merging database.backend");
                current.backend = database.backend;
            }
            if database.url.is_some() {
                tracing::trace!("Merging database.url");
                current.url = database.url;
            }
        }

        if let Some(filters) = other.filters {
            let current = self.filters.get_or_insert_with(FiltersFileConfig::default);
            if filters.max_filter_bytes.is_some() {
                tracing::trace!(value = ?filters.max_filter_bytes, "Merging filters.max_filter_bytes");
                current.max_filter_bytes = filters.max_filter_bytes;
            }
            if filters.max_depth.is_some() {
                tracing::trace!(value = ?filters.max_depth, "Merging filters.max_depth");
                current.max_depth = filters.max_depth;
            }
            if filters.max_conditions.is_some() {
                tracing::trace!(value = ?filters.max_conditions, "Merging filters.max_conditions");
                current.max_conditions = filters.max_conditions;
            }
        }

        if let Some(pagination) = other.pagination {
            let current = self
                .pagination
                .get_or_insert_with(PaginationFileConfig::default);
            if pagination.default_per_page.is_some() {
                tracing::trace!(value = ?pagination.default_per_page, "Merging pagination.default_per_page");
                current.default_per_page = pagination.default_per_page;
            }
            if pagination.max_per_page.is_some() {
                tracing::trace!(value = ?pagination.max_per_page, "Merging pagination.max_per_page");
                current.max_per_page = pagination.max_per_page;
            }
        }

        if other.debug.is_some() {
            self.debug = other.debug;
        }
    }
}

// =============================================================================
// Final Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub backend: Backend,
    /// Connection URL, only needed for commands that run queries
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub filters: FilterLimits,
    pub pagination: PaginationConfig,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.cardex/cardex.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::from_layers(cli, file_config)
    }

    /// Layer defaults, file config and CLI/env overrides
    pub(crate) fn from_layers(cli: &CliConfig, file_config: FileConfig) -> Result<Self> {
        let file_database = file_config.database.unwrap_or_default();
        let file_filters = file_config.filters.unwrap_or_default();
        let file_pagination = file_config.pagination.unwrap_or_default();

        let database = DatabaseConfig {
            backend: cli.backend.or(file_database.backend).unwrap_or_default(),
            url: cli.database_url.clone().or(file_database.url),
        };

        let filters = FilterLimits {
            max_filter_bytes: cli
                .max_filter_bytes
                .or(file_filters.max_filter_bytes)
                .unwrap_or(DEFAULT_MAX_FILTER_BYTES),
            max_depth: cli
                .max_filter_depth
                .or(file_filters.max_depth)
                .unwrap_or(DEFAULT_MAX_FILTER_DEPTH),
            max_conditions: cli
                .max_filter_conditions
                .or(file_filters.max_conditions)
                .unwrap_or(DEFAULT_MAX_FILTER_CONDITIONS),
        };

        let pagination = PaginationConfig {
            default_per_page: cli
                .default_per_page
                .or(file_pagination.default_per_page)
                .unwrap_or(DEFAULT_PER_PAGE),
            max_per_page: cli
                .max_per_page
                .or(file_pagination.max_per_page)
                .unwrap_or(MAX_PER_PAGE),
        };

        // debug: CLI/env flag takes precedence, then file config, default false
        let debug = cli.debug || file_config.debug.unwrap_or(false);

        let config = Self {
            database,
            filters,
            pagination,
            debug,
        };
        config.validate()?;

        tracing::debug!(
            backend = %config.database.backend,
            max_depth = config.filters.max_depth,
            max_per_page = config.pagination.max_per_page,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.filters.max_filter_bytes == 0
            || self.filters.max_depth == 0
            || self.filters.max_conditions == 0
        {
            anyhow::bail!("Filter limits must be greater than zero");
        }
        let PaginationConfig {
            default_per_page,
            max_per_page,
        } = self.pagination;
        if max_per_page == 0 || max_per_page > MAX_PER_PAGE {
            anyhow::bail!("pagination.max_per_page must be between 1 and {}", MAX_PER_PAGE);
        }
        if default_per_page == 0 || default_per_page > max_per_page {
            anyhow::bail!(
                "pagination.default_per_page must be between 1 and max_per_page ({})",
                max_per_page
            );
        }
        Ok(())
    }
}

fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
