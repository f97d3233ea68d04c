//! Shared types, error model, and configuration for aulabot.
//!
//! This crate is the foundation depended on by all other aulabot crates.
//! It provides:
//! - [`AulabotError`], the unified error type
//! - Domain types ([`Intent`], [`EntitySet`], [`QuerySpec`], [`ResultRow`])
//! - Configuration ([`AppConfig`], config loading)
//! - The [`Fetcher`] trait every data source implements

pub mod config;
pub mod error;
pub mod fetcher;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, BackendConfig, CacheConfig, DatabaseConfig, FetchConfig, RowLimits,
    config_dir, config_file_path, expand_home, init_config, init_config_at, load_config, load_config_from,
    validate_api_key, validate_config,
};
pub use error::{AulabotError, Result};
pub use fetcher::Fetcher;
pub use types::{
    Backend, Course, EntitySet, Intent, QuerySpec, RestQuery, ResultRow, ResultSet, SqlQuery,
    SqlValue,
};
