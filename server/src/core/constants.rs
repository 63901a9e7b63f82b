// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "cardex";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".cardex";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "cardex.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "CARDEX_CONFIG";

// =============================================================================
// Environment Variables - Debug & Logging
// =============================================================================

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "CARDEX_DEBUG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "CARDEX_LOG";

/// Environment variable for log output format (`compact` or `json`)
pub const ENV_LOG_FORMAT: &str = "CARDEX_LOG_FORMAT";

// =============================================================================
// Environment Variables - Database
// =============================================================================

/// Environment variable for the SQL backend (`sqlite` or `postgres`)
pub const ENV_DATABASE_BACKEND: &str = "CARDEX_DATABASE_BACKEND";

/// Environment variable for the database connection URL
pub const ENV_DATABASE_URL: &str = "CARDEX_DATABASE_URL";

// =============================================================================
// SQLite
// =============================================================================

/// Max connections in the SQLite pool used by `search`
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// Busy timeout for SQLite connections
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Environment Variables - Filters
// =============================================================================

/// Environment variable for the max filter payload size in bytes
pub const ENV_MAX_FILTER_BYTES: &str = "CARDEX_MAX_FILTER_BYTES";

/// Environment variable for the max filter nesting depth
pub const ENV_MAX_FILTER_DEPTH: &str = "CARDEX_MAX_FILTER_DEPTH";

/// Environment variable for the max number of conditions in a filter
pub const ENV_MAX_FILTER_CONDITIONS: &str = "CARDEX_MAX_FILTER_CONDITIONS";

// =============================================================================
// Filter Defaults
// =============================================================================

/// Max filter JSON size (64KB)
pub const DEFAULT_MAX_FILTER_BYTES: usize = 64 * 1024;

/// Max nesting depth of logical operators and relations
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 16;

/// Max number of field and collection conditions in one filter
pub const DEFAULT_MAX_FILTER_CONDITIONS: usize = 200;

/// Largest day count accepted by `last_n_days` and `older_than_days`
pub const MAX_RELATIVE_DAYS: i64 = 365_000;

// =============================================================================
// Environment Variables - Pagination
// =============================================================================

/// Environment variable for the default page size
pub const ENV_DEFAULT_PER_PAGE: &str = "CARDEX_DEFAULT_PER_PAGE";

/// Environment variable for the max page size
pub const ENV_MAX_PER_PAGE: &str = "CARDEX_MAX_PER_PAGE";

// =============================================================================
// Pagination Defaults
// =============================================================================

/// First page number
pub const DEFAULT_PAGE: u32 = 1;

/// Default items per page
pub const DEFAULT_PER_PAGE: u32 = 10;

/// Hard upper bound for items per page
pub const MAX_PER_PAGE: u32 = 500;

/// Alias of the root entity in compiled queries
pub const ROOT_ALIAS: &str = "t0";
