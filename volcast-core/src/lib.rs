//! volcast core: price history, return series, GARCH estimation, model artifacts.
//!
//! This crate holds everything the service needs below the HTTP edge:
//! - Price repository over a pluggable table store (Parquet or in-memory)
//! - Alpha Vantage daily-adjusted CSV provider
//! - Absolute-return series derivation
//! - GARCH(p, q) estimation and variance forecasting
//! - Versioned model artifacts on disk
//! - The per-ticker volatility model state machine tying them together

pub mod data;
pub mod model;
