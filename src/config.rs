use crate::model::{PropertyType, RiskLevel};
use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use thiserror::Error;

/// Score every [0, 100] signal falls back to when its inputs are missing.
pub const NEUTRAL_SCORE: f64 = 50.0;

pub const DEFAULT_TREND_THRESHOLD_PERCENT: f64 = 2.0;
pub const DEFAULT_TREND_WINDOW_MONTHS: u32 = 12;
pub const DEFAULT_EMERGING_WINDOW_MONTHS: u32 = 6;
pub const DEFAULT_VELOCITY_REFERENCE_DAYS: f64 = 60.0;
pub const BUYERS_MARKET_BELOW: f64 = 40.0;
pub const SELLERS_MARKET_ABOVE: f64 = 60.0;

pub const DEFAULT_RECENCY_WINDOW_MONTHS: u32 = 12;
pub const DEFAULT_MAX_COMPARABLES: usize = 10;
pub const DEFAULT_MIN_COMPARABLES: usize = 3;
pub const CONFIDENCE_COMPARABLES_REFERENCE: f64 = 10.0;
pub const CONFIDENCE_DATA_POINTS_REFERENCE: f64 = 24.0;
pub const DEFAULT_CONFIDENCE_SPREAD: f64 = 0.05;

pub const OPPORTUNITY_DESIRABILITY_WEIGHT: f64 = 0.30;
pub const OPPORTUNITY_MARKET_WEIGHT: f64 = 0.25;
pub const OPPORTUNITY_GROWTH_WEIGHT: f64 = 0.25;
pub const OPPORTUNITY_ECONOMIC_WEIGHT: f64 = 0.20;

pub const DEFAULT_MIN_ROI: f64 = 15.0;
pub const DEFAULT_HOLDING_YEARS: u32 = 5;

/// January through December.
pub const SEASONAL_FACTORS: [f64; 12] = [0.92, 0.94, 1.02, 1.08, 1.12, 1.10, 1.05, 1.03, 1.06, 1.04, 0.98, 0.96];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Inclusive clamp range for a multiplicative factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorRange {
    pub min: f64,
    pub max: f64,
}

impl FactorRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Per-month price multipliers. Lookup is total over the twelve months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalTable {
    pub factors: [f64; 12],
}

impl Default for SeasonalTable {
    fn default() -> Self {
        Self { factors: SEASONAL_FACTORS }
    }
}

impl SeasonalTable {
    pub fn factor(&self, month: Month) -> f64 {
        self.factors[month.number_from_month() as usize - 1]
    }

    pub fn for_date(&self, date: NaiveDate) -> f64 {
        self.factors[date.month0() as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Price change (percent) beyond which a trend is up or down.
    pub trend_threshold_percent: f64,
    pub trend_window_months: u32,
    pub emerging_window_months: u32,
    /// Days on market that map to a velocity of 50.
    pub velocity_reference_days: f64,
    pub heat_volume_weight: f64,
    pub heat_inventory_weight: f64,
    pub heat_dom_weight: f64,
    /// Heat points per percent of sales-volume growth.
    pub heat_volume_scale: f64,
    /// Heat points per percent of days-on-market shrinkage.
    pub heat_dom_scale: f64,
    /// Heat points lost per month of supply.
    pub heat_supply_scale: f64,
    pub buyers_market_below: f64,
    pub sellers_market_above: f64,
    /// Trailing snapshots used for price volatility.
    pub volatility_window: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            trend_threshold_percent: DEFAULT_TREND_THRESHOLD_PERCENT,
            trend_window_months: DEFAULT_TREND_WINDOW_MONTHS,
            emerging_window_months: DEFAULT_EMERGING_WINDOW_MONTHS,
            velocity_reference_days: DEFAULT_VELOCITY_REFERENCE_DAYS,
            heat_volume_weight: 0.35,
            heat_inventory_weight: 0.35,
            heat_dom_weight: 0.30,
            heat_volume_scale: 2.5,
            heat_dom_scale: 2.5,
            heat_supply_scale: 10.0,
            buyers_market_below: BUYERS_MARKET_BELOW,
            sellers_market_above: SELLERS_MARKET_ABOVE,
            volatility_window: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    pub recency_window_months: u32,
    pub max_comparables: usize,
    pub min_comparables: usize,
    pub size_weight: f64,
    pub bedroom_weight: f64,
    pub recency_weight: f64,
    /// Distance added to comparables drawn from other locations.
    pub location_mismatch_penalty: f64,
    pub location_factor_range: FactorRange,
    pub property_factor_range: FactorRange,
    pub trend_factor_range: FactorRange,
    /// Trend factor change per percent of price change.
    pub trend_sensitivity: f64,
    pub new_construction_age: i32,
    pub old_construction_age: i32,
    pub age_adjustment: f64,
    pub amenity_step: f64,
    pub amenity_cap: f64,
    pub bedroom_step: f64,
    pub bathroom_step: f64,
    pub room_adjustment_cap: f64,
    pub confidence_comparables_reference: f64,
    pub confidence_data_points_reference: f64,
    /// Half-width of the interval at zero confidence, as a fraction of the value.
    pub confidence_spread: f64,
    /// Months after which forecast confidence halves.
    pub forecast_half_life_months: f64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            recency_window_months: DEFAULT_RECENCY_WINDOW_MONTHS,
            max_comparables: DEFAULT_MAX_COMPARABLES,
            min_comparables: DEFAULT_MIN_COMPARABLES,
            size_weight: 0.5,
            bedroom_weight: 0.2,
            recency_weight: 0.3,
            location_mismatch_penalty: 0.25,
            location_factor_range: FactorRange::new(0.7, 1.3),
            property_factor_range: FactorRange::new(0.9, 1.2),
            trend_factor_range: FactorRange::new(0.95, 1.10),
            trend_sensitivity: 0.005,
            new_construction_age: 5,
            old_construction_age: 30,
            age_adjustment: 0.10,
            amenity_step: 0.005,
            amenity_cap: 0.10,
            bedroom_step: 0.02,
            bathroom_step: 0.015,
            room_adjustment_cap: 0.05,
            confidence_comparables_reference: CONFIDENCE_COMPARABLES_REFERENCE,
            confidence_data_points_reference: CONFIDENCE_DATA_POINTS_REFERENCE,
            confidence_spread: DEFAULT_CONFIDENCE_SPREAD,
            forecast_half_life_months: 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpportunityWeights {
    pub desirability: f64,
    pub market_conditions: f64,
    pub growth_potential: f64,
    pub economic_factors: f64,
}

impl Default for OpportunityWeights {
    fn default() -> Self {
        Self {
            desirability: OPPORTUNITY_DESIRABILITY_WEIGHT,
            market_conditions: OPPORTUNITY_MARKET_WEIGHT,
            growth_potential: OPPORTUNITY_GROWTH_WEIGHT,
            economic_factors: OPPORTUNITY_ECONOMIC_WEIGHT,
        }
    }
}

impl OpportunityWeights {
    fn sum(&self) -> f64 {
        self.desirability + self.market_conditions + self.growth_potential + self.economic_factors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DesirabilityWeights {
    pub safety: f64,
    pub schools: f64,
    pub income: f64,
    pub walkability: f64,
}

impl Default for DesirabilityWeights {
    fn default() -> Self {
        Self {
            safety: 0.30,
            schools: 0.25,
            income: 0.25,
            walkability: 0.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestmentConfig {
    pub opportunity_weights: OpportunityWeights,
    pub desirability_weights: DesirabilityWeights,
    /// Safety points lost per crime per 1000 residents.
    pub crime_scale: f64,
    /// Median income that scores 100.
    pub income_reference: f64,
    pub growth_price_scale: f64,
    pub growth_volume_scale: f64,
    /// Share of growth potential taken from price change (rest from volume change).
    pub growth_price_share: f64,
    pub population_growth_scale: f64,
    /// Monthly rent per sq ft by location.
    pub location_rent_per_sqft: HashMap<String, f64>,
    /// Monthly rent per sq ft by property type, used when the location has no benchmark.
    pub type_rent_per_sqft: HashMap<PropertyType, f64>,
    pub default_rent_per_sqft: f64,
    pub amenity_rent_bonus: f64,
    pub amenity_rent_cap: f64,
    /// Size of the notional property used for area-level ROI.
    pub notional_square_footage: f64,
    pub low_risk_heat_below: f64,
    pub low_risk_volatility_below: f64,
    pub high_risk_volatility_above: f64,
    pub low_risk_desirability_min: f64,
    pub high_risk_desirability_below: f64,
    pub short_horizon_growth_above: f64,
    pub medium_horizon_growth_above: f64,
}

impl Default for InvestmentConfig {
    fn default() -> Self {
        let type_rent_per_sqft = HashMap::from([
            (PropertyType::Apartment, 1.5),
            (PropertyType::Villa, 1.8),
            (PropertyType::Townhouse, 1.6),
            (PropertyType::Residential, 1.5),
            (PropertyType::Commercial, 2.0),
        ]);

        Self {
            opportunity_weights: OpportunityWeights::default(),
            desirability_weights: DesirabilityWeights::default(),
            crime_scale: 5.0,
            income_reference: 150_000.0,
            growth_price_scale: 5.0,
            growth_volume_scale: 2.0,
            growth_price_share: 0.7,
            population_growth_scale: 10.0,
            location_rent_per_sqft: HashMap::new(),
            type_rent_per_sqft,
            default_rent_per_sqft: 1.5,
            amenity_rent_bonus: 0.02,
            amenity_rent_cap: 0.10,
            notional_square_footage: 1200.0,
            low_risk_heat_below: 70.0,
            low_risk_volatility_below: 4.0,
            high_risk_volatility_above: 16.0,
            low_risk_desirability_min: 60.0,
            high_risk_desirability_below: 40.0,
            short_horizon_growth_above: 10.0,
            medium_horizon_growth_above: 3.0,
        }
    }
}

/// Investor criteria for opportunity searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestmentGoals {
    /// Minimum total ROI (percent) over the holding period. Default 15.
    pub min_roi: f64,
    /// Highest acceptable risk level. Default medium.
    pub risk_tolerance: RiskLevel,
    /// Holding period in years. Default 5.
    pub time_horizon_years: u32,
    /// Property types of interest; empty accepts all. Default empty.
    pub property_types: Vec<PropertyType>,
    /// Upper bound on the purchase price. Default none.
    pub max_investment: Option<f64>,
}

impl Default for InvestmentGoals {
    fn default() -> Self {
        Self {
            min_roi: DEFAULT_MIN_ROI,
            risk_tolerance: RiskLevel::Medium,
            time_horizon_years: DEFAULT_HOLDING_YEARS,
            property_types: Vec::new(),
            max_investment: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub market: MarketConfig,
    pub valuation: ValuationConfig,
    pub investment: InvestmentConfig,
    pub seasonal: SeasonalTable,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.market;
        let v = &self.valuation;
        let i = &self.investment;

        if m.trend_window_months == 0 || m.emerging_window_months == 0 || v.recency_window_months == 0 {
            return Err(ConfigError::Invalid("analysis windows must be at least one month".into()));
        }
        if v.min_comparables == 0 || v.max_comparables < v.min_comparables {
            return Err(ConfigError::Invalid(format!(
                "comparable limits must satisfy 1 <= min ({}) <= max ({})",
                v.min_comparables, v.max_comparables
            )));
        }
        if m.velocity_reference_days <= 0.0 || m.buyers_market_below > m.sellers_market_above {
            return Err(ConfigError::Invalid("market thresholds are inconsistent".into()));
        }
        for (name, range) in [
            ("location_factor_range", v.location_factor_range),
            ("property_factor_range", v.property_factor_range),
            ("trend_factor_range", v.trend_factor_range),
        ] {
            if range.min <= 0.0 || range.min > range.max {
                return Err(ConfigError::Invalid(format!("{} must satisfy 0 < min <= max", name)));
            }
        }
        if self.seasonal.factors.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(ConfigError::Invalid("seasonal factors must be positive".into()));
        }
        let heat_weights = m.heat_volume_weight + m.heat_inventory_weight + m.heat_dom_weight;
        if heat_weights <= 0.0 || i.opportunity_weights.sum() <= 0.0 {
            return Err(ConfigError::Invalid("score weights must not all be zero".into()));
        }
        if v.confidence_comparables_reference <= 0.0 || v.confidence_data_points_reference <= 0.0 {
            return Err(ConfigError::Invalid("confidence references must be positive".into()));
        }
        if i.notional_square_footage <= 0.0 || i.income_reference <= 0.0 {
            return Err(ConfigError::Invalid("investment references must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON dataset with transactions, market data and neighborhoods.
    pub data_path: Option<String>,
    pub engine: EngineConfig,
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let config: AppConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;
    config.engine.validate()?;
    Ok(config)
}
