//! Forecast submission to the VolatilityOracle contract on Mantle.
//!
//! Values are sent as fixed-point integers (x 1,000,000, truncated) in
//! forecast entry order. One attempt per call; the submit path waits until
//! the transaction is mined.

use ethers::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use volcast_core::model::Forecast;

use crate::config::ServiceConfig;

abigen!(
    VolatilityOracle,
    r#"[
        function submitForecast(string ticker, uint256[] volatilities, uint256 nDays) external
        function getLatestForecastId(string ticker) external view returns (uint256)
    ]"#
);

pub const FIXED_POINT_SCALE: f64 = 1_000_000.0;
pub const SUBMIT_GAS_LIMIT: u64 = 500_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        })
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(format!("unknown network '{other}' (expected testnet or mainnet)")),
        }
    }
}

#[derive(Debug, Error)]
pub enum OnChainError {
    #[error("Failed to connect to Mantle {network}: {reason}")]
    Connection { network: Network, reason: String },

    #[error("invalid contract address '{0}'")]
    InvalidAddress(String),

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("forecast value for day {day} cannot be scaled to uint256: {value}")]
    InvalidValue { day: String, value: f64 },

    #[error("transaction submission failed: {0}")]
    Submit(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("contract call failed: {0}")]
    Call(String),
}

/// One forecast submission.
pub struct Submission<'a> {
    pub ticker: &'a str,
    pub forecast: &'a Forecast,
    pub contract_address: &'a str,
    pub private_key: &'a str,
    pub network: Network,
    /// Wei; the node's current gas price when absent.
    pub gas_price: Option<u64>,
}

/// Scale a variance to the contract's fixed-point representation.
pub fn fixed_point(day: &str, value: f64) -> Result<U256, OnChainError> {
    let scaled = (value * FIXED_POINT_SCALE).trunc();
    if !scaled.is_finite() || scaled < 0.0 || scaled >= u128::MAX as f64 {
        return Err(OnChainError::InvalidValue {
            day: day.to_string(),
            value,
        });
    }
    Ok(U256::from(scaled as u128))
}

pub fn scale_forecast(forecast: &Forecast) -> Result<Vec<U256>, OnChainError> {
    forecast
        .iter()
        .map(|(day, value)| fixed_point(day, value))
        .collect()
}

fn parse_address(contract_address: &str) -> Result<Address, OnChainError> {
    contract_address
        .trim()
        .parse::<Address>()
        .map_err(|_| OnChainError::InvalidAddress(contract_address.to_string()))
}

/// RPC endpoints per network. Holds no signing material.
#[derive(Debug, Clone)]
pub struct OracleClient {
    testnet_rpc: String,
    mainnet_rpc: String,
}

impl OracleClient {
    pub fn new(testnet_rpc: impl Into<String>, mainnet_rpc: impl Into<String>) -> Self {
        Self {
            testnet_rpc: testnet_rpc.into(),
            mainnet_rpc: mainnet_rpc.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.testnet_rpc.clone(), config.mainnet_rpc.clone())
    }

    pub fn rpc_url(&self, network: Network) -> &str {
        match network {
            Network::Testnet => &self.testnet_rpc,
            Network::Mainnet => &self.mainnet_rpc,
        }
    }

    /// Provider plus chain id; the chain-id probe doubles as the reachability check.
    async fn connect(&self, network: Network) -> Result<(Provider<Http>, u64), OnChainError> {
        let connection = |reason: String| OnChainError::Connection { network, reason };
        let provider = Provider::<Http>::try_from(self.rpc_url(network))
            .map_err(|e| connection(e.to_string()))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| connection(e.to_string()))?;
        Ok((provider, chain_id.as_u64()))
    }

    /// Submit a forecast and wait for it to be mined. Returns the `0x` transaction hash.
    pub async fn submit(&self, submission: Submission<'_>) -> Result<String, OnChainError> {
        let address = parse_address(submission.contract_address)?;
        let wallet = LocalWallet::from_str(submission.private_key.trim())
            .map_err(|_| OnChainError::InvalidPrivateKey)?;
        let volatilities = scale_forecast(submission.forecast)?;
        let n_days = U256::from(volatilities.len());

        let (provider, chain_id) = self.connect(submission.network).await?;
        let client = Arc::new(SignerMiddleware::new(
            provider,
            wallet.with_chain_id(chain_id),
        ));

        let gas_price = match submission.gas_price {
            Some(wei) => U256::from(wei),
            None => client
                .get_gas_price()
                .await
                .map_err(|e| OnChainError::Submit(format!("gas price: {e}")))?,
        };

        tracing::info!(
            ticker = submission.ticker,
            network = %submission.network,
            contract = %address,
            n_days = volatilities.len(),
            "submitting forecast"
        );

        let oracle = VolatilityOracle::new(address, client);
        let call = oracle
            .submit_forecast(submission.ticker.to_string(), volatilities, n_days)
            .legacy()
            .gas(SUBMIT_GAS_LIMIT)
            .gas_price(gas_price);
        let pending = call
            .send()
            .await
            .map_err(|e| OnChainError::Submit(e.to_string()))?;
        let tx_hash = format!("{:#x}", pending.tx_hash());

        let receipt = pending
            .await
            .map_err(|e| OnChainError::Submit(e.to_string()))?
            .ok_or_else(|| OnChainError::TransactionFailed(format!("{tx_hash} (no receipt)")))?;

        if receipt.status != Some(U64::from(1)) {
            return Err(OnChainError::TransactionFailed(tx_hash));
        }

        let mined = format!("{:#x}", receipt.transaction_hash);
        tracing::info!(
            ticker = submission.ticker,
            tx = %mined,
            block = ?receipt.block_number,
            "forecast mined"
        );
        Ok(mined)
    }

    /// Read-only `getLatestForecastId(ticker)`, as a decimal string.
    pub async fn latest_forecast_id(
        &self,
        ticker: &str,
        contract_address: &str,
        network: Network,
    ) -> Result<String, OnChainError> {
        let address = parse_address(contract_address)?;
        let (provider, _) = self.connect(network).await?;
        let oracle = VolatilityOracle::new(address, Arc::new(provider));
        let id = oracle
            .get_latest_forecast_id(ticker.to_string())
            .call()
            .await
            .map_err(|e| OnChainError::Call(e.to_string()))?;
        Ok(id.to_string())
    }
}
