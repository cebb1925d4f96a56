//! CLI definition and dispatch.
//!
//! Progress and summaries go to stderr; machine-readable results (JSON) go
//! to stdout. Every failure maps to the exit code of its `QuantxError`.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvDataAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::file_strategy_store::{FileStrategyStore, load_strategy_file};
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::analytics::{AnalyticsConfig, AnalyticsService};
use crate::domain::backtest::BacktestResult;
use crate::domain::config_validation::{load_analytics_config, load_initial_capital};
use crate::domain::error::QuantxError;
use crate::domain::strategy::{StrategyDefinition, default_strategies};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{ChainProvider, OhlcvProvider};
use crate::ports::report_port::ReportPort;
use crate::ports::strategy_store::StrategyStore;

#[derive(Parser, Debug)]
#[command(name = "quantx", about = "Option analytics and strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the probability, volatility, OI and regime models
    Analyze {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        symbol: String,
        /// Defaults to the nearest listed expiry
        #[arg(long)]
        expiry: Option<NaiveDate>,
    },
    /// Fuse the model outputs into a single bias
    Consensus {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        expiry: Option<NaiveDate>,
    },
    /// IV surface and term structure across listed expiries
    Surface {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        symbol: String,
    },
    /// Evaluate a stored strategy once against the latest chain
    Live {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        strategy: String,
        #[arg(long)]
        symbol: String,
    },
    /// Run a stored strategy over historical bars
    Backtest {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        strategy: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        capital: Option<f64>,
        /// Write a JSON report here instead of printing the result
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a strategy file
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// List stored strategies
    Strategies {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the built-in strategies to the store first
        #[arg(long)]
        init: bool,
    },
    /// List symbols with OHLCV data
    ListSymbols {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Analyze {
            config,
            symbol,
            expiry,
        } => run_analyze(config.as_deref(), &symbol, expiry),
        Command::Consensus {
            config,
            symbol,
            expiry,
        } => run_consensus(config.as_deref(), &symbol, expiry),
        Command::Surface { config, symbol } => run_surface(config.as_deref(), &symbol),
        Command::Live {
            config,
            strategy,
            symbol,
        } => run_live(config.as_deref(), &strategy, &symbol),
        Command::Backtest {
            config,
            strategy,
            symbol,
            start,
            end,
            capital,
            output,
        } => run_backtest(
            config.as_deref(),
            &strategy,
            &symbol,
            start,
            end,
            capital,
            output.as_deref(),
        ),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Strategies { config, init } => run_strategies(config.as_deref(), init),
        Command::ListSymbols { config } => run_list_symbols(config.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, QuantxError> {
    match path {
        Some(path) => FileConfigAdapter::from_file(path),
        None => FileConfigAdapter::from_string("").map_err(|reason| QuantxError::ConfigParse {
            file: "<defaults>".to_string(),
            reason,
        }),
    }
}

/// Loaded configuration plus the file-backed adapters it points at.
pub struct Runtime {
    pub config: FileConfigAdapter,
    pub analytics: AnalyticsConfig,
    pub data: CsvDataAdapter,
    pub store: FileStrategyStore,
}

impl Runtime {
    pub fn load(path: Option<&Path>) -> Result<Self, QuantxError> {
        if let Some(path) = path {
            eprintln!("Loading config from {}", path.display());
        }
        let config = load_config(path)?;
        let analytics = load_analytics_config(&config)?;
        let data_dir = config
            .get_string("data", "dir")
            .unwrap_or_else(|| "data".to_string());
        let strategy_dir = config
            .get_string("data", "strategies")
            .unwrap_or_else(|| "strategies".to_string());
        Ok(Self {
            config,
            analytics,
            data: CsvDataAdapter::new(PathBuf::from(data_dir)),
            store: FileStrategyStore::new(PathBuf::from(strategy_dir)),
        })
    }

    pub fn service(&self) -> AnalyticsService<'_> {
        AnalyticsService::new(&self.data, &self.data, &self.store, self.analytics.clone())
    }

    fn resolve_expiry(
        &self,
        symbol: &str,
        expiry: Option<NaiveDate>,
    ) -> Result<NaiveDate, QuantxError> {
        match expiry {
            Some(expiry) => Ok(expiry),
            None => self
                .data
                .expiries(symbol)?
                .into_iter()
                .min()
                .ok_or_else(|| QuantxError::NoData {
                    symbol: symbol.to_string(),
                }),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), QuantxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_analyze(
    config: Option<&Path>,
    symbol: &str,
    expiry: Option<NaiveDate>,
) -> Result<(), QuantxError> {
    let runtime = Runtime::load(config)?;
    let expiry = runtime.resolve_expiry(symbol, expiry)?;
    eprintln!("Analyzing {symbol} expiry {expiry}");

    let outputs = runtime.service().evaluate_models(symbol, expiry)?;

    let vol = &outputs.volatility;
    eprintln!("\n=== Models ===");
    match vol.atm_iv {
        Some(iv) => eprintln!("ATM IV:           {:.2}%", iv * 100.0),
        None => eprintln!("ATM IV:           n/a"),
    }
    if let Some(rank) = vol.iv_rank {
        eprintln!("IV Rank:          {rank:.1}");
    }
    if let Some(p) = outputs.probability.as_ref().and_then(|p| p.lognormal) {
        eprintln!("P(ITM) lognormal: {:.1}%", p * 100.0);
    }
    if let Some(pcr) = outputs.open_interest.pcr_oi {
        eprintln!("PCR (OI):         {pcr:.2}");
    }
    eprintln!("Regime:           {:?}", outputs.regime.regime);

    print_json(&outputs)
}

fn run_consensus(
    config: Option<&Path>,
    symbol: &str,
    expiry: Option<NaiveDate>,
) -> Result<(), QuantxError> {
    let runtime = Runtime::load(config)?;
    let expiry = runtime.resolve_expiry(symbol, expiry)?;
    let result = runtime.service().consensus(symbol, expiry)?;

    eprintln!(
        "{symbol} {expiry}: {:?} score {:+.3} confidence {:.0}%",
        result.bias,
        result.score,
        result.confidence
    );
    print_json(&result)
}

fn run_surface(config: Option<&Path>, symbol: &str) -> Result<(), QuantxError> {
    let runtime = Runtime::load(config)?;
    let surface = runtime.service().volatility_surface(symbol)?;

    eprintln!("{symbol}: {} solved legs", surface.points.len());
    for point in &surface.term_structure {
        eprintln!(
            "  {}  ATM IV {:.2}%  ({:.3}y)",
            point.expiry,
            point.atm_iv * 100.0,
            point.time
        );
    }
    print_json(&surface)
}

fn run_live(config: Option<&Path>, strategy: &str, symbol: &str) -> Result<(), QuantxError> {
    let runtime = Runtime::load(config)?;
    let decision = runtime.service().run_live(strategy, symbol)?;

    if decision.executed {
        eprintln!("{strategy} on {symbol}: executed {} fills", decision.fills.len());
        for fill in &decision.fills {
            eprintln!(
                "  {} {} {} @ {:.2}",
                fill.side, fill.quantity, fill.instrument, fill.price
            );
        }
    } else if let Some(reason) = &decision.skip_reason {
        eprintln!("{strategy} on {symbol}: skipped ({reason})");
    }
    print_json(&decision)
}

fn run_backtest(
    config: Option<&Path>,
    strategy_name: &str,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    capital: Option<f64>,
    output: Option<&Path>,
) -> Result<(), QuantxError> {
    let runtime = Runtime::load(config)?;
    let capital = match capital {
        Some(c) => c,
        None => load_initial_capital(&runtime.config)?,
    };

    eprintln!("Running backtest: {strategy_name} on {symbol}, {start} to {end}");
    let result = runtime
        .service()
        .run_backtest(strategy_name, symbol, start, end, capital)?;
    print_summary(&result);

    match output {
        Some(path) => {
            let strategy = runtime
                .store
                .get(strategy_name)?
                .ok_or_else(|| QuantxError::StrategyNotFound {
                    name: strategy_name.to_string(),
                })?;
            JsonReportAdapter::new().write(&result, &strategy, path)?;
            eprintln!("\nReport written to: {}", path.display());
            Ok(())
        }
        None => print_json(&result),
    }
}

fn print_summary(result: &BacktestResult) {
    let stats = &result.stats;
    eprintln!("\n=== Results ({}) ===", result.id);
    eprintln!("Final Capital:    {:.2}", result.final_capital);
    eprintln!("Total Return:     {:.2}%", stats.total_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", stats.sharpe);
    eprintln!("Sortino Ratio:    {:.2}", stats.sortino);
    eprintln!("Max Drawdown:     -{:.1}%", stats.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", stats.total_trades);
    eprintln!("Win Rate:         {:.1}%", stats.win_rate * 100.0);
    match stats.profit_factor {
        Some(pf) => eprintln!("Profit Factor:    {pf:.2}"),
        None => eprintln!("Profit Factor:    n/a"),
    }
    eprintln!("Fees:             {:.2}", stats.total_fees);
}

fn describe(strategy: &StrategyDefinition) {
    eprintln!("Strategy: {} ({})", strategy.name, strategy.mode);
    for c in &strategy.conditions {
        eprintln!("  when    {c}");
    }
    for f in &strategy.filters {
        eprintln!("  filter  {f}");
    }
    for a in &strategy.actions {
        eprintln!("  do      {a}");
    }
    for e in &strategy.exits {
        eprintln!("  exit    {e}");
    }
}

fn run_validate(path: &Path) -> Result<(), QuantxError> {
    let strategy = load_strategy_file(path)?;
    describe(&strategy);
    eprintln!("Strategy is valid.");
    Ok(())
}

fn run_strategies(config: Option<&Path>, init: bool) -> Result<(), QuantxError> {
    let runtime = Runtime::load(config)?;
    if init {
        for strategy in default_strategies() {
            runtime.store.save(&strategy)?;
            eprintln!("Saved {}", strategy.name);
        }
    }
    let names = runtime.store.list()?;
    if names.is_empty() {
        eprintln!(
            "No strategies in {} (use --init to write the built-in ones)",
            runtime.store.dir().display()
        );
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn run_list_symbols(config: Option<&Path>) -> Result<(), QuantxError> {
    let runtime = Runtime::load(config)?;
    let symbols = runtime.data.list_symbols()?;
    if symbols.is_empty() {
        eprintln!("No symbols found");
    }
    for symbol in symbols {
        println!("{symbol}");
    }
    Ok(())
}
