use aksjeradar_core::Resolver;

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::{fallback_warning, CommandResult};

pub async fn run(args: &HistoryArgs, resolver: &Resolver) -> Result<CommandResult, CliError> {
    let resolution = resolver
        .resolve_history(&args.symbol, &args.period, &args.interval)
        .await;

    let mut warnings = Vec::new();
    if resolution.data.period.as_str() != args.period.trim().to_ascii_lowercase() {
        warnings.push(format!(
            "unknown period '{}'; used {}",
            args.period, resolution.data.period
        ));
    }
    if resolution.data.interval.as_str() != args.interval.trim().to_ascii_lowercase() {
        warnings.push(format!(
            "unknown interval '{}'; used {}",
            args.interval, resolution.data.interval
        ));
    }
    if resolution.is_fallback() {
        warnings.push(fallback_warning(&args.symbol));
    }

    let data = serde_json::to_value(&resolution.data)?;
    Ok(CommandResult::ok(data, vec![resolution.origin])
        .with_attempts(resolution.attempts)
        .with_warnings(warnings)
        .with_latency(resolution.latency_ms)
        .with_cache_hit(resolution.from_cache))
}
