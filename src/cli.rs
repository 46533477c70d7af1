//! Command-line interface definitions for proxied-proxy.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Chained forward proxy with Basic auth and single-domain blocking.
///
/// Runs two listeners: an authenticating first hop that talks to targets
/// directly, and a second hop that forwards everything through an upstream
/// proxy with injected credentials. Requests for the blocked domain are
/// refused on both; CONNECTs to it are answered over a locally terminated TLS
/// session.
#[derive(Parser, Debug)]
#[command(name = "proxied-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to additional config file.
    ///
    /// Merged on top of the system and user configs; only CLI flags take
    /// priority over it.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address for the first hop listener.
    #[arg(long = "first-hop-listen", value_name = "ADDR")]
    pub first_hop_listen: Option<String>,

    /// Address for the second hop listener.
    #[arg(long = "second-hop-listen", value_name = "ADDR")]
    pub second_hop_listen: Option<String>,

    /// Upstream proxy the second hop chains through.
    #[arg(short = 'u', long = "upstream", value_name = "HOST:PORT")]
    pub upstream: Option<String>,

    /// Domain to block on both hops.
    #[arg(short = 'b', long = "blocked-domain", value_name = "DOMAIN")]
    pub blocked_domain: Option<String>,

    /// Run only the first hop.
    #[arg(long = "no-second-hop")]
    pub no_second_hop: bool,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["proxied-proxy"]);
        assert!(cli.config.is_none());
        assert!(cli.blocked_domain.is_none());
        assert!(!cli.no_second_hop);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::parse_from([
            "proxied-proxy",
            "-c",
            "/tmp/proxy.toml",
            "--first-hop-listen",
            "127.0.0.1:8080",
            "--second-hop-listen",
            "127.0.0.1:5555",
            "-u",
            "proxy.corp:3128",
            "-b",
            "example.org",
            "--no-second-hop",
            "-vv",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/proxy.toml")));
        assert_eq!(cli.first_hop_listen.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(cli.second_hop_listen.as_deref(), Some("127.0.0.1:5555"));
        assert_eq!(cli.upstream.as_deref(), Some("proxy.corp:3128"));
        assert_eq!(cli.blocked_domain.as_deref(), Some("example.org"));
        assert!(cli.no_second_hop);
        assert_eq!(cli.verbose, 2);
    }
}
