use serde::Serialize;

use aksjeradar_core::{Quote, Resolver};

use crate::cli::QuoteArgs;
use crate::error::CliError;

use super::{fallback_warning, CommandResult};

#[derive(Debug, Serialize)]
struct QuoteResponseData {
    quotes: Vec<Quote>,
}

pub async fn run(args: &QuoteArgs, resolver: &Resolver) -> Result<CommandResult, CliError> {
    let mut quotes = Vec::with_capacity(args.symbols.len());
    let mut origins = Vec::with_capacity(args.symbols.len());
    let mut attempts = Vec::new();
    let mut warnings = Vec::new();
    let mut latency_ms = 0_u64;
    let mut all_cached = true;

    for raw in &args.symbols {
        let resolution = resolver.resolve_quote(raw).await;
        if resolution.is_fallback() {
            warnings.push(fallback_warning(raw));
        }
        origins.push(resolution.origin);
        attempts.extend(resolution.attempts);
        latency_ms = latency_ms.saturating_add(resolution.latency_ms);
        all_cached &= resolution.from_cache;
        quotes.push(resolution.data);
    }

    let data = serde_json::to_value(QuoteResponseData { quotes })?;
    Ok(CommandResult::ok(data, origins)
        .with_attempts(attempts)
        .with_warnings(warnings)
        .with_latency(latency_ms)
        .with_cache_hit(all_cached))
}
