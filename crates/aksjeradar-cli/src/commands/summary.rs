use aksjeradar_core::Resolver;

use crate::cli::SummaryArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &SummaryArgs, resolver: &Resolver) -> Result<CommandResult, CliError> {
    let started = std::time::Instant::now();
    let summary = resolver.market_summary(args.market).await;

    let origins = summary.quotes.iter().map(|quote| quote.source).collect();
    let mut warnings = Vec::new();
    if summary.fallback_count > 0 {
        warnings.push(format!(
            "{} of {} {} quotes are fallback data",
            summary.fallback_count,
            summary.quotes.len(),
            summary.market
        ));
    }

    let data = serde_json::to_value(&summary)?;
    Ok(CommandResult::ok(data, origins)
        .with_warnings(warnings)
        .with_latency(started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64))
}
