//! volcast CLI: serve the API, manage price data, fit and query models.
//!
//! Commands:
//! - `serve`: run the HTTP service
//! - `download`: fetch full daily history from Alpha Vantage and store it
//! - `seed`: store a deterministic synthetic GARCH price series
//! - `fit` / `predict` / `models`: train, forecast, list artifact versions
//! - `submit` / `forecast-id`: on-chain oracle submission and query

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use volcast_core::data::synthetic::{garch_price_series, SyntheticParams};
use volcast_server::onchain::Network;
use volcast_server::{service, AppState, ServiceConfig};

#[derive(Parser)]
#[command(
    name = "volcast",
    about = "volcast, GARCH volatility forecasting service"
)]
struct Cli {
    /// TOML config file (environment variables still take precedence).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve {
        /// Bind address (overrides config).
        #[arg(long)]
        bind: Option<String>,

        /// Port (overrides config).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fetch full daily history for a ticker and replace the stored table.
    Download {
        /// Ticker. Defaults to the configured test ticker.
        ticker: Option<String>,
    },
    /// Store a deterministic synthetic price series under a ticker.
    Seed {
        ticker: Option<String>,

        /// Number of weekday rows to generate.
        #[arg(long, default_value_t = 1000)]
        rows: usize,

        /// First date (YYYY-MM-DD).
        #[arg(long, default_value = "2015-01-01")]
        start: String,
    },
    /// Fit a GARCH(p, q) model and write its artifact.
    Fit {
        ticker: Option<String>,

        /// Delete stored rows and fetch fresh history first.
        #[arg(long, default_value_t = false)]
        new_data: bool,

        #[arg(long, default_value_t = 2500)]
        n_observations: i64,

        /// Variance lags.
        #[arg(long, default_value_t = 1)]
        p: i64,

        /// Shock lags.
        #[arg(long, default_value_t = 1)]
        q: i64,
    },
    /// Forecast variance with the stored model.
    Predict {
        ticker: Option<String>,

        #[arg(long, default_value_t = 5)]
        n_days: i64,

        /// Artifact version. Defaults to the highest.
        #[arg(long)]
        version: Option<u64>,
    },
    /// List stored artifact versions for a ticker.
    Models { ticker: Option<String> },
    /// Forecast with the stored model and submit it to the oracle contract.
    Submit {
        ticker: Option<String>,

        /// VolatilityOracle contract address.
        #[arg(long)]
        contract: String,

        #[arg(long, default_value_t = 5)]
        n_days: i64,

        /// testnet or mainnet.
        #[arg(long, default_value = "testnet")]
        network: Network,

        /// Gas price in wei. Defaults to the node's current price.
        #[arg(long)]
        gas_price: Option<u64>,
    },
    /// Query the latest forecast id the contract holds for a ticker.
    ForecastId {
        ticker: Option<String>,

        #[arg(long)]
        contract: String,

        #[arg(long, default_value = "testnet")]
        network: Network,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            run_serve(config)
        }
        Commands::Download { ticker } => {
            let ticker = ticker.unwrap_or_else(|| config.test_ticker.clone());
            run_download(build_state(config)?, &ticker)
        }
        Commands::Seed {
            ticker,
            rows,
            start,
        } => {
            let ticker = ticker.unwrap_or_else(|| config.test_ticker.clone());
            run_seed(build_state(config)?, &ticker, rows, &start)
        }
        Commands::Fit {
            ticker,
            new_data,
            n_observations,
            p,
            q,
        } => {
            let ticker = ticker.unwrap_or_else(|| config.test_ticker.clone());
            run_fit(build_state(config)?, &ticker, new_data, n_observations, p, q)
        }
        Commands::Predict {
            ticker,
            n_days,
            version,
        } => {
            let ticker = ticker.unwrap_or_else(|| config.test_ticker.clone());
            run_predict(build_state(config)?, &ticker, n_days, version)
        }
        Commands::Models { ticker } => {
            let ticker = ticker.unwrap_or_else(|| config.test_ticker.clone());
            run_models(build_state(config)?, &ticker)
        }
        Commands::Submit {
            ticker,
            contract,
            n_days,
            network,
            gas_price,
        } => {
            let ticker = ticker.unwrap_or_else(|| config.test_ticker.clone());
            run_submit(build_state(config)?, &ticker, &contract, n_days, network, gas_price)
        }
        Commands::ForecastId {
            ticker,
            contract,
            network,
        } => {
            let ticker = ticker.unwrap_or_else(|| config.test_ticker.clone());
            run_forecast_id(build_state(config)?, &ticker, &contract, network)
        }
    }
}

/// Built before any runtime exists: the price provider owns a blocking HTTP client.
fn build_state(config: ServiceConfig) -> Result<Arc<AppState>> {
    AppState::new(config).context("initialise service state")
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")
}

fn run_serve(config: ServiceConfig) -> Result<()> {
    let state = build_state(config)?;
    runtime()?.block_on(volcast_server::serve(state))?;
    Ok(())
}

fn run_download(state: Arc<AppState>, ticker: &str) -> Result<()> {
    let rows = state.repo.fetch_remote(ticker)?;
    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => println!(
            "{ticker}: stored {} rows ({} .. {})",
            rows.len(),
            first.timestamp,
            last.timestamp
        ),
        _ => println!("{ticker}: provider returned no rows"),
    }
    Ok(())
}

fn run_seed(state: Arc<AppState>, ticker: &str, rows: usize, start: &str) -> Result<()> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("invalid --start '{start}'"))?;
    let series = garch_price_series(ticker, rows, start, SyntheticParams::default());
    state.repo.save(ticker, &series)?;
    println!("{ticker}: stored {} synthetic rows", series.len());
    Ok(())
}

fn run_fit(
    state: Arc<AppState>,
    ticker: &str,
    new_data: bool,
    n_observations: i64,
    p: i64,
    q: i64,
) -> Result<()> {
    let outcome = service::fit_model(&state, ticker, new_data, n_observations, p, q)?;
    println!(
        "{ticker}: model v{} fitted on {} observations -> {}",
        outcome.meta.version,
        outcome.meta.n_observations,
        outcome.path.display()
    );
    Ok(())
}

fn run_predict(state: Arc<AppState>, ticker: &str, n_days: i64, version: Option<u64>) -> Result<()> {
    let (forecast, meta) = service::predict(&state, ticker, n_days, version)?;
    eprintln!("{ticker}: model v{} fitted {}", meta.version, meta.fitted_at);
    println!("{}", serde_json::to_string_pretty(&forecast)?);
    Ok(())
}

fn run_models(state: Arc<AppState>, ticker: &str) -> Result<()> {
    let metas = state.models.list(ticker)?;
    if metas.is_empty() {
        bail!("no stored models for '{ticker}'");
    }
    println!("{:<8} {:<26} {:>6}  {:<23}  DATA HASH", "VERSION", "FITTED AT", "OBS", "RANGE");
    for m in &metas {
        let range = match (m.first_date, m.last_date) {
            (Some(a), Some(b)) => format!("{a}..{b}"),
            _ => "-".to_string(),
        };
        println!(
            "{:<8} {:<26} {:>6}  {:<23}  {}",
            m.version,
            m.fitted_at.format("%Y-%m-%d %H:%M:%S UTC"),
            m.n_observations,
            range,
            &m.data_hash[..m.data_hash.len().min(16)]
        );
    }
    Ok(())
}

fn run_submit(
    state: Arc<AppState>,
    ticker: &str,
    contract: &str,
    n_days: i64,
    network: Network,
    gas_price: Option<u64>,
) -> Result<()> {
    let (forecast, meta) = service::predict(&state, ticker, n_days, None)?;
    eprintln!(
        "{ticker}: submitting {} days from model v{} to {network}",
        forecast.len(),
        meta.version
    );
    let hash = runtime()?.block_on(service::submit_forecast(
        &state, ticker, &forecast, contract, network, gas_price,
    ))?;
    println!("{hash}");
    Ok(())
}

fn run_forecast_id(state: Arc<AppState>, ticker: &str, contract: &str, network: Network) -> Result<()> {
    let id = runtime()?.block_on(service::latest_forecast_id(&state, ticker, contract, network))?;
    println!("{id}");
    Ok(())
}
