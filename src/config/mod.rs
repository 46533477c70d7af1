//! Configuration system for proxied-proxy.
//!
//! This module provides TOML configuration loading with hierarchy merging.
//!
//! # Configuration Hierarchy
//!
//! 1. Embedded defaults (`config/default.toml`)
//! 2. System config: `/etc/proxied-proxy/config.toml`
//! 3. User config: `~/.config/proxied-proxy/config.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. CLI flags (highest priority)
//!
//! # Example
//!
//! ```toml
//! [policy]
//! blocked_domain = "reddit.com"
//!
//! [first_hop]
//! listen = "0.0.0.0:8080"
//! username = "haha"
//! password = "hehe"
//!
//! [second_hop]
//! upstream = "127.0.0.1:8080"
//! ```

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{ConfigLoader, SYSTEM_CONFIG_PATH};
pub use schema::{
    Config, FirstHopConfig, MitmConfig, PolicyConfig, SecondHopConfig, TelemetryConfig,
    DEFAULT_CONFIG,
};
