//! Configuration schema definitions.
//!
//! Every field deserializes to an empty value when absent so that a file only
//! needs to mention what it overrides. The complete set of defaults lives in
//! `config/default.toml`, which is compiled into the binary and always loaded
//! first.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::error::ConfigError;
use crate::proxy::{Credentials, DomainPolicy, HopMode, ProxyConfig, UpstreamChain};
use crate::telemetry::AuditLogger;

/// Embedded default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Blocked-domain policy.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Authenticating listener that talks to targets directly.
    #[serde(default)]
    pub first_hop: FirstHopConfig,

    /// Chaining listener.
    #[serde(default)]
    pub second_hop: SecondHopConfig,

    /// Interception certificate settings.
    #[serde(default)]
    pub mitm: MitmConfig,

    /// Audit logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Parse the embedded defaults.
    pub fn embedded() -> Result<Config, ConfigError> {
        toml::from_str(DEFAULT_CONFIG).map_err(|e| ConfigError::ParseError {
            path: "<embedded>".into(),
            source: e,
        })
    }

    /// Merge another config into this one. Scalars are overridden when set.
    pub fn merge(&mut self, other: Config) {
        self.policy.merge(other.policy);
        self.first_hop.merge(other.first_hop);
        self.second_hop.merge(other.second_hop);
        self.mitm.merge(other.mitm);
        self.telemetry.merge(other.telemetry);
    }

    /// Check that the merged configuration can start the proxy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("policy.blocked_domain", &self.policy.blocked_domain)?;
        require("mitm.common_name", &self.mitm.common_name)?;

        parse_listen("first_hop.listen", &self.first_hop.listen)?;
        require("first_hop.username", &self.first_hop.username)?;
        require_timeout(
            "first_hop.connect_timeout_secs",
            self.first_hop.connect_timeout_secs,
        )?;

        if self.second_hop.is_enabled() {
            parse_listen("second_hop.listen", &self.second_hop.listen)?;
            require("second_hop.upstream", &self.second_hop.upstream)?;
            require("second_hop.username", &self.second_hop.username)?;
            require_timeout(
                "second_hop.connect_timeout_secs",
                self.second_hop.connect_timeout_secs,
            )?;
        }

        Ok(())
    }

    /// Listener configuration for the first hop.
    pub fn first_hop_config(&self, audit: Arc<AuditLogger>) -> Result<ProxyConfig, ConfigError> {
        let listen = parse_listen("first_hop.listen", &self.first_hop.listen)?;
        let mode = HopMode::first_hop(Credentials::new(
            &self.first_hop.username,
            &self.first_hop.password,
        ));

        Ok(self
            .proxy_config(listen, mode, audit)
            .with_connect_timeout(Duration::from_secs(self.first_hop.connect_timeout_secs)))
    }

    /// Listener configuration for the second hop, or `None` when disabled.
    pub fn second_hop_config(
        &self,
        audit: Arc<AuditLogger>,
    ) -> Result<Option<ProxyConfig>, ConfigError> {
        if !self.second_hop.is_enabled() {
            return Ok(None);
        }

        let listen = parse_listen("second_hop.listen", &self.second_hop.listen)?;
        let upstream = UpstreamChain::new(
            &self.second_hop.upstream,
            Credentials::new(&self.second_hop.username, &self.second_hop.password),
        );

        Ok(Some(
            self.proxy_config(listen, HopMode::second_hop(upstream), audit)
                .with_connect_timeout(Duration::from_secs(
                    self.second_hop.connect_timeout_secs,
                )),
        ))
    }

    fn proxy_config(
        &self,
        listen: SocketAddr,
        mode: HopMode,
        audit: Arc<AuditLogger>,
    ) -> ProxyConfig {
        ProxyConfig::new(
            listen,
            mode,
            Arc::new(DomainPolicy::new(&self.policy.blocked_domain)),
        )
        .with_mitm_common_name(&self.mitm.common_name)
        .with_audit(audit)
    }
}

/// Blocked-domain policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PolicyConfig {
    /// Domain refused on both hops (`www.` form included).
    #[serde(default)]
    pub blocked_domain: String,
}

impl PolicyConfig {
    fn merge(&mut self, other: PolicyConfig) {
        if !other.blocked_domain.is_empty() {
            self.blocked_domain = other.blocked_domain;
        }
    }
}

/// First hop listener settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FirstHopConfig {
    /// `host:port` to bind.
    #[serde(default)]
    pub listen: String,

    /// Username clients must present.
    #[serde(default)]
    pub username: String,

    /// Secret clients must present.
    #[serde(default)]
    pub password: String,

    /// Timeout for dialing targets, in seconds.
    #[serde(default)]
    pub connect_timeout_secs: u64,
}

impl FirstHopConfig {
    fn merge(&mut self, other: FirstHopConfig) {
        if !other.listen.is_empty() {
            self.listen = other.listen;
        }
        if !other.username.is_empty() {
            self.username = other.username;
        }
        if !other.password.is_empty() {
            self.password = other.password;
        }
        if other.connect_timeout_secs != 0 {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
    }
}

/// Second hop listener settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SecondHopConfig {
    /// Whether to run the second hop at all.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// `host:port` to bind.
    #[serde(default)]
    pub listen: String,

    /// Upstream proxy `host:port`.
    #[serde(default)]
    pub upstream: String,

    /// Username injected upstream.
    #[serde(default)]
    pub username: String,

    /// Secret injected upstream.
    #[serde(default)]
    pub password: String,

    /// Timeout for dialing the upstream, in seconds.
    #[serde(default)]
    pub connect_timeout_secs: u64,
}

impl SecondHopConfig {
    /// Enabled unless explicitly turned off.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    fn merge(&mut self, other: SecondHopConfig) {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if !other.listen.is_empty() {
            self.listen = other.listen;
        }
        if !other.upstream.is_empty() {
            self.upstream = other.upstream;
        }
        if !other.username.is_empty() {
            self.username = other.username;
        }
        if !other.password.is_empty() {
            self.password = other.password;
        }
        if other.connect_timeout_secs != 0 {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
    }
}

/// Interception certificate settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MitmConfig {
    /// CN of the generated certificate.
    #[serde(default)]
    pub common_name: String,
}

impl MitmConfig {
    fn merge(&mut self, other: MitmConfig) {
        if !other.common_name.is_empty() {
            self.common_name = other.common_name;
        }
    }
}

/// Audit logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TelemetryConfig {
    /// Send audit events to the local syslog daemon.
    #[serde(default)]
    pub syslog: Option<bool>,
}

impl TelemetryConfig {
    /// Whether syslog auditing is on.
    pub fn syslog_enabled(&self) -> bool {
        self.syslog.unwrap_or(false)
    }

    fn merge(&mut self, other: TelemetryConfig) {
        if other.syslog.is_some() {
            self.syslog = other.syslog;
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn require_timeout(field: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn parse_listen(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("'{}' is not a socket address: {}", value, e),
    })
}
