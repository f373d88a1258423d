//! Configuration module for Site-Audit
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section except `[user-agent]` and `[storage]` has defaults.
//!
//! # Example
//!
//! ```no_run
//! use site_audit::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("audit.toml")).unwrap();
//! println!("External chunk size: {}", config.external_links.chunk_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CallbackConfig, Config, CrawlerConfig, ExternalLinksConfig, FalsePositiveRuleConfig,
    InternalLinksConfig, RecoveryConfig, RetryConfig, StorageConfig, UserAgentConfig,
    WorkerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::{validate, MIN_MULTI_DOMAIN_DELAY_MS, MIN_SINGLE_DOMAIN_DELAY_MS};
