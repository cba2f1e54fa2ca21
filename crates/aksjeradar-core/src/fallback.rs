//! Deterministic synthetic market data.
//!
//! When every live provider fails, the resolver still has to return a
//! plausible record. The generator derives a stable base price from a hash
//! of the symbol, so repeated calls agree to within a small per-call jitter.
//! Every record it produces is labeled [`DataOrigin::Fallback`].

use crate::data_source::HistoryRequest;
use crate::{Bar, BarSeries, DataOrigin, MarketRegion, Quote, Symbol, UtcDateTime};

/// Largest jitter the generator accepts, as a fraction of the base price.
pub const MAX_JITTER: f64 = 0.05;
const DEFAULT_JITTER: f64 = 0.015;
const DEFAULT_MAX_HISTORY_BARS: usize = 2_000;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Reference levels for the tickers the dashboard shows by default.
const KNOWN_PRICES: &[(&str, f64)] = &[
    ("EQNR.OL", 285.0),
    ("DNB.OL", 210.0),
    ("TEL.OL", 130.0),
    ("NHY.OL", 65.0),
    ("MOWI.OL", 190.0),
    ("ORK.OL", 75.0),
    ("YAR.OL", 340.0),
    ("AKRBP.OL", 260.0),
    ("AAPL", 190.0),
    ("MSFT", 420.0),
    ("AMZN", 180.0),
    ("GOOGL", 170.0),
    ("NVDA", 900.0),
    ("META", 480.0),
    ("TSLA", 175.0),
    ("BTC-USD", 63_000.0),
    ("ETH-USD", 3_000.0),
    ("SOL-USD", 145.0),
    ("XRP-USD", 0.52),
    ("ADA-USD", 0.45),
    ("USDNOK=X", 10.8),
    ("EURNOK=X", 11.6),
    ("GBPNOK=X", 13.5),
    ("SEKNOK=X", 1.0),
    ("DKKNOK=X", 1.56),
    ("^OSEBX", 1_400.0),
    ("^GSPC", 5_200.0),
];

/// Synthetic quote and history generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackGenerator {
    jitter: f64,
    max_history_bars: usize,
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER)
    }
}

impl FallbackGenerator {
    /// `jitter` is clamped to `0.0..=MAX_JITTER`.
    pub fn new(jitter: f64) -> Self {
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, MAX_JITTER)
        } else {
            DEFAULT_JITTER
        };
        Self {
            jitter,
            max_history_bars: DEFAULT_MAX_HISTORY_BARS,
        }
    }

    pub fn with_max_history_bars(mut self, max_history_bars: usize) -> Self {
        self.max_history_bars = max_history_bars.max(1);
        self
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Stable reference price for `symbol`.
    pub fn base_price(&self, symbol: &Symbol) -> f64 {
        if let Some((_, price)) = KNOWN_PRICES
            .iter()
            .find(|(ticker, _)| *ticker == symbol.as_str())
        {
            return *price;
        }

        let (low, high) = match symbol.region() {
            MarketRegion::Oslo => (50.0, 500.0),
            MarketRegion::Global => (20.0, 500.0),
            MarketRegion::Index => (500.0, 5_000.0),
            MarketRegion::Crypto => (0.1, 100.0),
            MarketRegion::Currency => (0.5, 15.0),
        };
        let mut rng = fastrand::Rng::with_seed(symbol_seed(symbol));
        round_price(low + rng.f64() * (high - low))
    }

    /// Synthetic quote with every optional field populated. Never fails.
    pub fn quote(&self, symbol: &Symbol) -> Quote {
        let base = self.base_price(symbol);
        let mut seeded = fastrand::Rng::with_seed(symbol_seed(symbol) ^ 0x5155_4f54_45);

        let offset = (fastrand::f64() * 2.0 - 1.0) * self.jitter;
        let price = round_price(base * (1.0 + offset));
        let previous_close = round_price(base * (1.0 + signed(&mut seeded, 0.02)));
        let open = round_price(previous_close * (1.0 + signed(&mut seeded, 0.01)));
        let day_high = round_price(price.max(open) * (1.0 + seeded.f64() * 0.01)).max(price.max(open));
        let day_low = round_price(price.min(open) * (1.0 - seeded.f64() * 0.01)).min(price.min(open));
        let change = price - previous_close;

        Quote {
            symbol: symbol.clone(),
            price,
            change: Some(round_price(change)),
            change_percent: Some((change / previous_close * 10_000.0).round() / 100.0),
            volume: Some(synthetic_volume(&mut seeded, symbol.region())),
            day_high: Some(day_high),
            day_low: Some(day_low),
            open: Some(open),
            previous_close: Some(previous_close),
            currency: symbol.default_currency().to_owned(),
            source: DataOrigin::Fallback,
            as_of: UtcDateTime::now(),
        }
    }

    /// Seeded random walk that ends near the base price, oldest bar first.
    pub fn history(&self, req: &HistoryRequest) -> BarSeries {
        let count = req.expected_bars().min(self.max_history_bars).max(1);
        let seed = symbol_seed(&req.symbol) ^ text_seed(&req.cache_key());
        let mut rng = fastrand::Rng::with_seed(seed);
        let volatility = match req.symbol.region() {
            MarketRegion::Crypto => 0.04,
            MarketRegion::Currency => 0.005,
            _ => 0.02,
        };

        let mut closes = Vec::with_capacity(count);
        let mut level = 1.0_f64;
        for _ in 0..count {
            level *= 1.0 + signed(&mut rng, volatility);
            closes.push(level);
        }
        let scale = self.base_price(&req.symbol) / level;

        let step = req.interval.duration();
        let now = UtcDateTime::now();
        let mut previous = closes[0] * scale * (1.0 - signed(&mut rng, volatility / 2.0));
        let mut bars = Vec::with_capacity(count);
        for (index, raw_close) in closes.into_iter().enumerate() {
            let close = raw_close * scale;
            let open = previous;
            let high = open.max(close) * (1.0 + rng.f64() * volatility / 2.0);
            let low = open.min(close) * (1.0 - rng.f64() * volatility / 2.0);
            let back = i32::try_from(count - 1 - index).unwrap_or(i32::MAX);
            bars.push(Bar {
                ts: now.saturating_sub(step.saturating_mul(back)),
                open,
                high,
                low,
                close,
                volume: Some(synthetic_volume(&mut rng, req.symbol.region())),
            });
            previous = close;
        }

        BarSeries::new(
            req.symbol.clone(),
            req.period,
            req.interval,
            bars,
            DataOrigin::Fallback,
        )
    }
}

/// 64-bit FNV-1a hash of the symbol text.
pub fn symbol_seed(symbol: &Symbol) -> u64 {
    text_seed(symbol.as_str())
}

fn text_seed(text: &str) -> u64 {
    text.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Uniform value in `-bound..bound`.
fn signed(rng: &mut fastrand::Rng, bound: f64) -> f64 {
    (rng.f64() * 2.0 - 1.0) * bound
}

fn synthetic_volume(rng: &mut fastrand::Rng, region: MarketRegion) -> u64 {
    match region {
        MarketRegion::Currency | MarketRegion::Index => 0,
        MarketRegion::Crypto => rng.u64(1_000..500_000),
        MarketRegion::Oslo | MarketRegion::Global => rng.u64(100_000..5_000_000),
    }
}

fn round_price(value: f64) -> f64 {
    let factor = if value.abs() >= 1.0 { 100.0 } else { 10_000.0 };
    (value * factor).round() / factor
}
