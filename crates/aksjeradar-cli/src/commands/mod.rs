mod history;
mod quote;
mod sources;
mod summary;

use aksjeradar_core::{system_clock, AksjeradarConfig, DataOrigin, ProviderAttempt, Resolver};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, Metadata};

pub struct CommandResult {
    pub data: Value,
    pub origins: Vec<DataOrigin>,
    pub attempts: Vec<ProviderAttempt>,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
    pub cache_hit: bool,
}

impl CommandResult {
    pub fn ok(data: Value, origins: Vec<DataOrigin>) -> Self {
        Self {
            data,
            origins,
            attempts: Vec::new(),
            warnings: Vec::new(),
            latency_ms: 0,
            cache_hit: false,
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<ProviderAttempt>) -> Self {
        self.attempts.extend(attempts);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let resolver = build_resolver(cli.offline).await;

    let command_result = match &cli.command {
        Command::Quote(args) => quote::run(args, &resolver).await?,
        Command::History(args) => history::run(args, &resolver).await?,
        Command::Summary(args) => summary::run(args, &resolver).await?,
        Command::Sources => sources::run(&resolver)?,
    };

    let CommandResult {
        data,
        origins,
        attempts,
        warnings,
        latency_ms,
        cache_hit,
    } = command_result;

    let mut meta = Metadata::new(origins, latency_ms, cache_hit);
    if cli.offline {
        meta.push_warning("offline mode: no providers registered");
    }
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope {
        meta,
        data,
        attempts,
    })
}

async fn build_resolver(offline: bool) -> Resolver {
    let config = AksjeradarConfig::from_env();
    debug!(?config, offline, "building resolver");
    if offline {
        config.build_offline_resolver(system_clock()).await
    } else {
        config.build_resolver(system_clock()).await
    }
}

/// Warning text for a record served from synthetic data.
fn fallback_warning(symbol: &str) -> String {
    format!("no provider answered for '{symbol}'; serving fallback data")
}
