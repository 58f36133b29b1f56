use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, time::Duration};

use crate::models::policy::{BlockRule, BlockRuleError, PassthroughSet};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Centralized gateway configuration.
/// Combines environment variables and CLI arguments; built once at startup
/// and shared read-only with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub bind: String,
    pub verbose: bool,
    pub credentials: Option<PathBuf>,
    /// Storage API base URL; GCS itself when unset.
    pub endpoint: Option<String>,
    /// Raw `key:value` block rule, parsed on every request.
    pub block_if: Option<String>,
    /// Raw comma-separated passthrough keys, parsed on every request.
    pub pass_through: Option<String>,
    pub backend_timeout: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.into(),
            verbose: false,
            credentials: None,
            endpoint: None,
            block_if: None,
            pass_through: None,
            backend_timeout: None,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Serve Google Cloud Storage objects over plain HTTP")]
pub struct Args {
    /// Bind address (overrides GCS_GATEWAY_BIND)
    #[arg(short = 'b', long)]
    pub bind: Option<String>,

    /// Show access log (overrides GCS_GATEWAY_VERBOSE)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Path to a service-account key file. Default application credentials
    /// are used when absent (overrides GCS_GATEWAY_CREDENTIALS)
    #[arg(short = 'c', long)]
    pub credentials: Option<PathBuf>,

    /// Storage API base URL, e.g. an emulator such as `http://localhost:4443`
    /// (overrides GCS_GATEWAY_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Metadata `key:value` which, if present on an object, results in a 404
    /// (overrides GCS_GATEWAY_BLOCK_IF)
    #[arg(long)]
    pub block_if: Option<String>,

    /// Comma-separated metadata keys to pass through as headers
    /// (overrides GCS_GATEWAY_PASS_THROUGH)
    #[arg(long)]
    pub pass_through: Option<String>,

    /// Deadline in seconds for each backend call (overrides GCS_GATEWAY_BACKEND_TIMEOUT)
    #[arg(long)]
    pub backend_timeout: Option<u64>,
}

impl GatewayConfig {
    /// Parse environment variables + CLI args into GatewayConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed arguments over values looked up through `env`.
    pub fn merge(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_timeout = match env("GCS_GATEWAY_BACKEND_TIMEOUT") {
            Some(value) => Some(value.parse::<u64>().with_context(|| {
                format!("parsing GCS_GATEWAY_BACKEND_TIMEOUT value `{}`", value)
            })?),
            None => None,
        };
        let env_verbose = env("GCS_GATEWAY_VERBOSE")
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            bind: args
                .bind
                .or_else(|| env("GCS_GATEWAY_BIND"))
                .unwrap_or_else(|| DEFAULT_BIND.into()),
            verbose: args.verbose || env_verbose,
            credentials: args
                .credentials
                .or_else(|| env("GCS_GATEWAY_CREDENTIALS").map(PathBuf::from)),
            endpoint: args.endpoint.or_else(|| env("GCS_GATEWAY_ENDPOINT")),
            block_if: args.block_if.or_else(|| env("GCS_GATEWAY_BLOCK_IF")),
            pass_through: args.pass_through.or_else(|| env("GCS_GATEWAY_PASS_THROUGH")),
            backend_timeout: args
                .backend_timeout
                .or(env_timeout)
                .map(Duration::from_secs),
        })
    }

    /// The configured block rule, parsed fresh.
    ///
    /// An unset option yields `Ok(None)` and blocks nothing. A present but
    /// empty value (`--block-if ""`, `GCS_GATEWAY_BLOCK_IF=`) is malformed
    /// like any other value without exactly one `:`, so every object request
    /// fails until it is fixed.
    pub fn block_rule(&self) -> Result<Option<BlockRule>, BlockRuleError> {
        self.block_if.as_deref().map(str::parse).transpose()
    }

    /// The configured passthrough whitelist, parsed fresh.
    pub fn passthrough(&self) -> PassthroughSet {
        PassthroughSet::parse(self.pass_through.as_deref().unwrap_or(""))
    }
}
