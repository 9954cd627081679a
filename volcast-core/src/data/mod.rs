//! Price data: rows, providers, table stores, and derived return series.

pub mod alpha_vantage;
pub mod provider;
pub mod repository;
pub mod returns;
pub mod store;
pub mod synthetic;

pub use alpha_vantage::AlphaVantageProvider;
pub use provider::{DataError, PriceProvider, PriceRow};
pub use repository::PriceRepository;
pub use returns::{absolute_returns, ReturnSeries};
pub use store::{MemoryStore, ParquetTableStore, PriceStore, TableMeta};
