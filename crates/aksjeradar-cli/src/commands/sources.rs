use serde::Serialize;

use aksjeradar_core::{provider_priority, MarketRegion, ProviderId, ProviderStatus, Resolver};

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    registered: Vec<ProviderId>,
    priority: Vec<RegionPriority>,
    providers: Vec<ProviderStatus>,
}

#[derive(Debug, Serialize)]
struct RegionPriority {
    region: MarketRegion,
    order: Vec<ProviderId>,
}

const REGIONS: [MarketRegion; 5] = [
    MarketRegion::Oslo,
    MarketRegion::Global,
    MarketRegion::Index,
    MarketRegion::Crypto,
    MarketRegion::Currency,
];

pub fn run(resolver: &Resolver) -> Result<CommandResult, CliError> {
    let registered = resolver.providers();
    let priority = REGIONS
        .into_iter()
        .map(|region| RegionPriority {
            region,
            order: provider_priority(region)
                .iter()
                .copied()
                .filter(|provider| registered.contains(provider))
                .collect(),
        })
        .collect();

    let data = serde_json::to_value(SourcesResponseData {
        registered,
        priority,
        providers: resolver.provider_status(),
    })?;

    Ok(CommandResult::ok(data, Vec::new()))
}
