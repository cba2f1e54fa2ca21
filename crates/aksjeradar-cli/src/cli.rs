//! CLI argument definitions for Aksjeradar.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quote` | Resolve quotes for one or more symbols |
//! | `history` | Resolve price history for a symbol |
//! | `summary` | Resolve a market overview panel |
//! | `sources` | Show provider budgets and breaker state |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--offline` | `false` | Register no providers; serve fallback data only |
//! | `--log-level` | `warn` | Log filter when `RUST_LOG` is unset |
//!
//! # Examples
//!
//! ```bash
//! aksjeradar quote EQNR.OL DNB.OL --pretty
//! aksjeradar history AAPL --period 3mo --interval 1d
//! aksjeradar summary oslo
//! aksjeradar --offline quote BTC-USD
//! ```

use aksjeradar_core::Market;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Aksjeradar market-data CLI
///
/// Resolves quotes and history through Yahoo, Stooq and Alpha Vantage with
/// caching, per-provider rate limits and deterministic fallback data.
#[derive(Debug, Parser)]
#[command(
    name = "aksjeradar",
    author,
    version,
    about = "Aksjeradar market-data resolver",
    long_about = "Resolves market quotes and price history from several providers in priority \
order. Every answer carries its origin; when no provider answers, synthetic data labeled \
'fallback' is returned instead of an error.\n\
\n\
Configuration is read from AKSJERADAR_* environment variables."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Register no providers; every answer is fallback data.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Log filter used when RUST_LOG is not set (e.g. info, debug, aksjeradar_core=debug).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text for terminal display.
    Table,
    /// Single JSON object output.
    Json,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve quote(s) for one or more symbols.
    ///
    /// # Examples
    ///
    ///   aksjeradar quote EQNR.OL
    ///   aksjeradar quote AAPL MSFT BTC-USD --pretty
    Quote(QuoteArgs),

    /// Resolve OHLCV history for a symbol.
    ///
    /// Unknown period or interval values fall back to 1mo / 1d.
    ///
    /// # Examples
    ///
    ///   aksjeradar history EQNR.OL
    ///   aksjeradar history AAPL --period 6mo --interval 1wk
    History(HistoryArgs),

    /// Resolve every constituent of a market panel.
    Summary(SummaryArgs),

    /// Show provider request budgets and circuit breaker state.
    Sources,
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    /// One or more symbols (e.g., EQNR.OL, AAPL, BTC-USD, USDNOK=X).
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub symbol: String,

    /// Look-back period: 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y.
    #[arg(long, default_value = "1mo")]
    pub period: String,

    /// Bar interval: 1m, 5m, 15m, 1h, 1d, 1wk, 1mo.
    #[arg(long, default_value = "1d")]
    pub interval: String,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Market panel: oslo, global, crypto or currency.
    #[arg(value_parser = parse_market)]
    pub market: Market,
}

fn parse_market(raw: &str) -> Result<Market, String> {
    raw.parse::<Market>().map_err(|error| error.to_string())
}
