// Analyzer module: market signals, valuation and investment scoring.

pub mod comparables;
pub mod investment;
pub mod market_indicators;
pub mod stats;
pub mod valuation;

pub use investment::InvestmentAnalyzer;
pub use market_indicators::MarketAnalyzer;
pub use valuation::{MarketForecast, PredictiveEngine};
