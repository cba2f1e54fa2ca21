//! # Domain Models
//!
//! Canonical domain types for Aksjeradar market data.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Quote`] | Normalized quote snapshot with explicit unknown fields |
//! | [`DataOrigin`] | Provider or synthetic fallback that produced a record |
//! | [`Bar`] | OHLCV bar with timestamp |
//! | [`BarSeries`] | Price history for a symbol/period/interval |
//! | [`Market`] / [`MarketSummary`] | Dashboard market panels |
//! | [`Symbol`] | Normalized, opaque ticker |
//! | [`Interval`] / [`Period`] | History bucket size and look-back |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! ## Validation
//!
//! Constructors enforce the numeric invariants (finite, non-negative prices,
//! consistent bar ranges). A quote with a zero price is representable but
//! [`Quote::is_valid`] reports it as "no data".

mod interval;
mod models;
mod symbol;
mod timestamp;

pub use interval::{Interval, Period};
pub use models::{
    validate_currency_code, Bar, BarSeries, DataOrigin, Market, MarketSummary, Quote,
};
pub use symbol::{MarketRegion, Symbol};
pub use timestamp::UtcDateTime;
