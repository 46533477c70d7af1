//! Configuration loading with hierarchy merging.
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults (compiled into binary)
//! 2. System config: `/etc/proxied-proxy/config.toml`
//! 3. User config: `~/.config/proxied-proxy/config.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. CLI flags (highest priority)
//!
//! Scalars set in a later source override earlier ones.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ConfigError;
use super::schema::Config;
use crate::cli::Cli;

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/proxied-proxy/config.toml";

/// User configuration directory name.
pub const USER_CONFIG_DIR: &str = "proxied-proxy";

/// User configuration filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Configuration loader with support for hierarchy merging.
pub struct ConfigLoader {
    /// Path to system-wide configuration.
    system_path: PathBuf,
    /// Path to user configuration.
    user_path: PathBuf,
}

impl ConfigLoader {
    /// Create a new ConfigLoader with default paths.
    #[must_use]
    pub fn new() -> Self {
        let user_config_dir = dirs::config_dir()
            .map(|p| p.join(USER_CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR));

        Self {
            system_path: PathBuf::from(SYSTEM_CONFIG_PATH),
            user_path: user_config_dir.join(USER_CONFIG_FILE),
        }
    }

    /// Create a ConfigLoader with custom paths (for testing).
    #[must_use]
    pub fn with_paths(system_path: PathBuf, user_path: PathBuf) -> Self {
        Self {
            system_path,
            user_path,
        }
    }

    /// Load, merge and validate configuration from all sources.
    ///
    /// Missing system and user files are skipped. A missing `--config` file,
    /// invalid TOML, or an invalid merged result is an error.
    pub fn load(&self, cli: &Cli) -> Result<Config, ConfigError> {
        let mut config = Config::embedded()?;
        debug!("Loaded embedded default configuration");

        for path in [&self.system_path, &self.user_path] {
            match load_file(path)? {
                Some(file_config) => {
                    config.merge(file_config);
                    debug!("Loaded config from {:?}", path);
                }
                None => debug!("No config found at {:?}", path),
            }
        }

        if let Some(ref cli_config_path) = cli.config {
            match load_file(cli_config_path)? {
                Some(cli_config) => {
                    config.merge(cli_config);
                    debug!("Loaded additional config from {:?}", cli_config_path);
                }
                None => {
                    // Unlike system/user config, a missing CLI-specified config is an error
                    return Err(ConfigError::ReadError {
                        path: cli_config_path.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "Specified config file not found",
                        ),
                    });
                }
            }
        }

        apply_cli_flags(&mut config, cli);
        config.validate()?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_cli_flags(config: &mut Config, cli: &Cli) {
    if let Some(ref domain) = cli.blocked_domain {
        config.policy.blocked_domain = domain.clone();
    }
    if let Some(ref listen) = cli.first_hop_listen {
        config.first_hop.listen = listen.clone();
    }
    if let Some(ref listen) = cli.second_hop_listen {
        config.second_hop.listen = listen.clone();
    }
    if let Some(ref upstream) = cli.upstream {
        config.second_hop.upstream = upstream.clone();
    }
    if cli.no_second_hop {
        config.second_hop.enabled = Some(false);
    }
}

/// Load a config file, returning None if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<Config>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let config: Config =
                toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            Ok(Some(config))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
