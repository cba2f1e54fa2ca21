use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 32;
const PLACEHOLDER_SYMBOL: &str = "UNKNOWN";
const CRYPTO_QUOTE_CURRENCIES: [&str; 6] = ["USD", "EUR", "NOK", "GBP", "BTC", "ETH"];

/// Exchange/asset grouping derived from a ticker's suffix conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegion {
    /// Oslo Børs listings (`EQNR.OL`).
    Oslo,
    /// Index tickers (`^OSEBX`, `^GSPC`).
    Index,
    /// Crypto pairs (`BTC-USD`).
    Crypto,
    /// Currency crosses (`USDNOK=X`).
    Currency,
    /// Everything else, treated as a global equity listing.
    Global,
}

/// Normalized market symbol/ticker.
///
/// Symbols are opaque beyond trimming and upper-casing: anything without
/// whitespace or control characters is accepted and used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            if ch.is_whitespace() || ch.is_control() {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    /// Best-effort normalization that never fails.
    ///
    /// Invalid characters are dropped and the result is truncated; input with
    /// nothing usable left maps to a placeholder symbol.
    pub fn lenient(input: &str) -> Self {
        if let Ok(symbol) = Self::parse(input) {
            return symbol;
        }

        let cleaned = input
            .trim()
            .chars()
            .filter(|ch| !ch.is_whitespace() && !ch.is_control())
            .take(MAX_SYMBOL_LEN)
            .collect::<String>()
            .to_uppercase();

        if cleaned.is_empty() {
            Self(String::from(PLACEHOLDER_SYMBOL))
        } else {
            Self(cleaned)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn region(&self) -> MarketRegion {
        let value = self.as_str();
        if value.starts_with('^') {
            return MarketRegion::Index;
        }
        if value.ends_with("=X") {
            return MarketRegion::Currency;
        }
        if value.ends_with(".OL") {
            return MarketRegion::Oslo;
        }
        if let Some((_, quote)) = value.rsplit_once('-') {
            if CRYPTO_QUOTE_CURRENCIES.contains(&quote) {
                return MarketRegion::Crypto;
            }
        }
        MarketRegion::Global
    }

    /// Currency a quote for this symbol is most likely denominated in.
    pub fn default_currency(&self) -> &'static str {
        let value = self.as_str();
        match self.region() {
            MarketRegion::Oslo => "NOK",
            MarketRegion::Index if value.starts_with("^OSE") => "NOK",
            MarketRegion::Index | MarketRegion::Global => "USD",
            MarketRegion::Crypto => value
                .rsplit_once('-')
                .and_then(|(_, quote)| known_currency(quote))
                .unwrap_or("USD"),
            MarketRegion::Currency => value
                .strip_suffix("=X")
                .filter(|pair| pair.len() >= 6)
                .and_then(|pair| pair.get(pair.len() - 3..))
                .and_then(known_currency)
                .unwrap_or("USD"),
        }
    }

    /// Ticker without the exchange suffix (`EQNR.OL` -> `EQNR`).
    pub fn base(&self) -> &str {
        match self.region() {
            MarketRegion::Oslo => self.as_str().trim_end_matches(".OL"),
            MarketRegion::Currency => self.as_str().trim_end_matches("=X"),
            _ => self.as_str(),
        }
    }
}

fn known_currency(code: &str) -> Option<&'static str> {
    ["USD", "EUR", "NOK", "GBP", "SEK", "DKK", "JPY", "CHF", "BTC", "ETH"]
        .into_iter()
        .find(|known| *known == code)
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
