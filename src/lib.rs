// Real-estate valuation and market-signal engine.

pub mod analyzer;
pub mod config;
pub mod dataset;
pub mod model;
pub mod sample;
pub mod utils;

pub use analyzer::{InvestmentAnalyzer, MarketAnalyzer, MarketForecast, PredictiveEngine};
pub use config::{AppConfig, ConfigError, EngineConfig, InvestmentGoals, load_config};
pub use dataset::{Dataset, load_dataset};
pub use model::{AnalysisError, ModelError, Property, PropertyType, Transaction};
