// Core structs: Property, Transaction, MarketData, Neighborhood and the engine's result records
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Apartment,
    Villa,
    Townhouse,
    Commercial,
    /// Any other residential property.
    #[default]
    #[serde(alias = "residential-other")]
    Residential,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::Villa => "villa",
            PropertyType::Townhouse => "townhouse",
            PropertyType::Commercial => "commercial",
            PropertyType::Residential => "residential",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apartment" => Ok(PropertyType::Apartment),
            "villa" => Ok(PropertyType::Villa),
            "townhouse" => Ok(PropertyType::Townhouse),
            "commercial" => Ok(PropertyType::Commercial),
            "residential" | "residential-other" => Ok(PropertyType::Residential),
            other => Err(ModelError::invalid(
                "property_type",
                format!("unrecognized property type '{}'", other),
            )),
        }
    }
}

/// Unvalidated property fields. Converted into a [`Property`] with `try_into`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyRecord {
    pub id: String,
    pub location: String,
    pub property_type: PropertyType,
    pub square_footage: f64,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    #[serde(default)]
    pub year_built: Option<i32>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub asking_price: Option<f64>,
}

/// A valuation subject. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PropertyRecord")]
pub struct Property {
    id: String,
    location: String,
    property_type: PropertyType,
    square_footage: f64,
    bedrooms: Option<u32>,
    bathrooms: Option<f64>,
    year_built: Option<i32>,
    amenities: Vec<String>,
    asking_price: Option<f64>,
}

impl TryFrom<PropertyRecord> for Property {
    type Error = ModelError;

    fn try_from(rec: PropertyRecord) -> Result<Self, Self::Error> {
        if let Some(baths) = rec.bathrooms {
            if !baths.is_finite() || baths < 0.0 {
                return Err(ModelError::invalid("bathrooms", format!("must not be negative, got {}", baths)));
            }
        }
        let asking_price = match rec.asking_price {
            Some(p) => Some(require_positive("asking_price", p)?),
            None => None,
        };

        Ok(Property {
            id: require_non_empty("id", rec.id)?,
            location: require_non_empty("location", rec.location)?,
            property_type: rec.property_type,
            square_footage: require_positive("square_footage", rec.square_footage)?,
            bedrooms: rec.bedrooms,
            bathrooms: rec.bathrooms,
            year_built: rec.year_built,
            amenities: rec.amenities,
            asking_price,
        })
    }
}

impl Property {
    pub fn new(
        id: impl Into<String>,
        location: impl Into<String>,
        property_type: PropertyType,
        square_footage: f64,
    ) -> Result<Self, ModelError> {
        PropertyRecord {
            id: id.into(),
            location: location.into(),
            property_type,
            square_footage,
            ..Default::default()
        }
        .try_into()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn square_footage(&self) -> f64 {
        self.square_footage
    }

    pub fn bedrooms(&self) -> Option<u32> {
        self.bedrooms
    }

    pub fn bathrooms(&self) -> Option<f64> {
        self.bathrooms
    }

    pub fn year_built(&self) -> Option<i32> {
        self.year_built
    }

    pub fn amenities(&self) -> &[String] {
        &self.amenities
    }

    pub fn asking_price(&self) -> Option<f64> {
        self.asking_price
    }

    /// Age in whole years at `as_of`, never negative.
    pub fn age(&self, as_of: NaiveDate) -> Option<i32> {
        self.year_built.map(|y| (as_of.year() - y).max(0))
    }

    pub fn has_amenity(&self, amenity: &str) -> bool {
        self.amenities.iter().any(|a| a.eq_ignore_ascii_case(amenity))
    }
}

/// Unvalidated transaction fields. Converted into a [`Transaction`] with `try_into`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub location: String,
    pub property_type: PropertyType,
    pub square_footage: f64,
    pub sale_price: f64,
    pub sale_date: NaiveDate,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

/// A closed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionRecord")]
pub struct Transaction {
    id: String,
    location: String,
    property_type: PropertyType,
    square_footage: f64,
    sale_price: f64,
    sale_date: NaiveDate,
    bedrooms: Option<u32>,
    bathrooms: Option<f64>,
    amenities: Vec<String>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = ModelError;

    fn try_from(rec: TransactionRecord) -> Result<Self, Self::Error> {
        if let Some(baths) = rec.bathrooms {
            if !baths.is_finite() || baths < 0.0 {
                return Err(ModelError::invalid("bathrooms", format!("must not be negative, got {}", baths)));
            }
        }

        Ok(Transaction {
            id: require_non_empty("id", rec.id)?,
            location: require_non_empty("location", rec.location)?,
            property_type: rec.property_type,
            square_footage: require_positive("square_footage", rec.square_footage)?,
            sale_price: require_positive("sale_price", rec.sale_price)?,
            sale_date: rec.sale_date,
            bedrooms: rec.bedrooms,
            bathrooms: rec.bathrooms,
            amenities: rec.amenities,
        })
    }
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        location: impl Into<String>,
        property_type: PropertyType,
        square_footage: f64,
        sale_price: f64,
        sale_date: NaiveDate,
    ) -> Result<Self, ModelError> {
        TransactionRecord {
            id: id.into(),
            location: location.into(),
            property_type,
            square_footage,
            sale_price,
            sale_date,
            ..Default::default()
        }
        .try_into()
    }

    pub fn with_rooms(mut self, bedrooms: u32, bathrooms: u32) -> Self {
        self.bedrooms = Some(bedrooms);
        self.bathrooms = Some(bathrooms as f64);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn square_footage(&self) -> f64 {
        self.square_footage
    }

    pub fn sale_price(&self) -> f64 {
        self.sale_price
    }

    pub fn sale_date(&self) -> NaiveDate {
        self.sale_date
    }

    pub fn bedrooms(&self) -> Option<u32> {
        self.bedrooms
    }

    pub fn bathrooms(&self) -> Option<f64> {
        self.bathrooms
    }

    pub fn amenities(&self) -> &[String] {
        &self.amenities
    }

    pub fn price_per_sqft(&self) -> f64 {
        self.sale_price / self.square_footage
    }
}

/// Monthly market snapshot for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub location: String,
    /// Start of the month this snapshot covers.
    pub period: NaiveDate,
    pub median_price: f64,
    pub sales_volume: u32,
    pub inventory: u32,
    pub avg_days_on_market: f64,
}

impl MarketData {
    /// Monthly absorption rate (sales / inventory).
    pub fn absorption_rate(&self) -> f64 {
        if self.inventory > 0 {
            self.sales_volume as f64 / self.inventory as f64
        } else {
            0.0
        }
    }

    /// Months needed to sell the active inventory at the current sales pace.
    pub fn months_of_supply(&self) -> f64 {
        self.inventory as f64 / self.sales_volume.max(1) as f64
    }
}

/// Static desirability profile of a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub location: String,
    /// Crimes per 1000 residents.
    pub crime_rate: f64,
    /// School rating on a 0-10 scale.
    pub school_rating: f64,
    pub median_income: f64,
    /// Walkability on a 0-100 scale.
    pub walkability_score: f64,
    /// Annual population growth in percent.
    pub population_growth_rate: f64,
    /// Employment rate in percent, when known.
    #[serde(default)]
    pub employment_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Stable => "stable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrend {
    pub area: String,
    pub direction: TrendDirection,
    pub price_change_percent: f64,
    pub volume_change_percent: f64,
    pub inventory_change_percent: f64,
    pub days_on_market_change_percent: f64,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    /// Months between the first and last snapshot in the window.
    pub span_months: u32,
    pub data_points: usize,
    /// 0 when the window held too few snapshots.
    pub confidence: f64,
}

impl MarketTrend {
    /// Stable, zero-confidence trend used when an area lacks data.
    pub fn neutral(area: &str, data_points: usize) -> Self {
        Self {
            area: area.to_string(),
            direction: TrendDirection::Stable,
            price_change_percent: 0.0,
            volume_change_percent: 0.0,
            inventory_change_percent: 0.0,
            days_on_market_change_percent: 0.0,
            period_start: None,
            period_end: None,
            span_months: 0,
            data_points,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    BuyersMarket,
    Balanced,
    SellersMarket,
}

impl fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MarketCondition::BuyersMarket => "buyer's market",
            MarketCondition::Balanced => "balanced",
            MarketCondition::SellersMarket => "seller's market",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub area: String,
    pub heat_index: f64,
    pub velocity: f64,
    pub condition: MarketCondition,
    pub price_volatility: f64,
    pub trend: MarketTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Multipliers applied to the comparable-sales base value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub base_value: f64,
    pub location_factor: f64,
    pub property_factor: f64,
    pub seasonal_factor: f64,
    pub trend_factor: f64,
}

impl FactorBreakdown {
    pub fn product(&self) -> f64 {
        self.base_value * self.location_factor * self.property_factor * self.seasonal_factor * self.trend_factor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub property_id: String,
    pub as_of: NaiveDate,
    pub predicted_value: f64,
    pub confidence_level: f64,
    pub confidence_interval: ConfidenceInterval,
    pub market_trend: TrendDirection,
    pub factors: FactorBreakdown,
    pub comparable_count: usize,
    pub data_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub month: NaiveDate,
    pub projected_median_price: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiProjection {
    pub purchase_price: f64,
    pub holding_period_years: u32,
    pub rental_yield_percent: f64,
    pub projected_value: f64,
    pub appreciation_gain: f64,
    pub appreciation_percent: f64,
    pub rental_income: f64,
    pub total_return: f64,
    pub total_roi_percent: f64,
    pub annual_roi_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeHorizon {
    Short,
    Medium,
    Long,
}

/// The four weighted components of an opportunity score, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadrantScores {
    pub desirability: f64,
    pub market_conditions: f64,
    pub growth_potential: f64,
    pub economic_factors: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentOpportunity {
    pub location: String,
    pub opportunity_score: f64,
    pub scores: QuadrantScores,
    pub predicted_roi: f64,
    pub annual_roi: f64,
    pub predicted_appreciation: f64,
    pub rental_yield: f64,
    pub median_price: f64,
    pub heat_index: f64,
    pub velocity: f64,
    pub risk_level: RiskLevel,
    pub time_horizon: TimeHorizon,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
}

impl ModelError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ModelError::InvalidInput { field, reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("insufficient data for '{location}': {found} data points, {required} required")]
    InsufficientData {
        location: String,
        found: usize,
        required: usize,
    },
    #[error("no comparable {property_type} transactions for '{location}'")]
    NoComparableData {
        location: String,
        property_type: PropertyType,
    },
    #[error(transparent)]
    InvalidInput(#[from] ModelError),
}

fn require_positive(field: &'static str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ModelError::invalid(field, format!("must be a positive number, got {}", value)))
    }
}

fn require_non_empty(field: &'static str, value: String) -> Result<String, ModelError> {
    if value.trim().is_empty() {
        Err(ModelError::invalid(field, "must not be empty"))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_property_rejects_non_positive_square_footage() {
        let err = Property::new("P1", "Downtown", PropertyType::Apartment, 0.0).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput { field: "square_footage", .. }));

        assert!(Property::new("P1", "Downtown", PropertyType::Apartment, -10.0).is_err());
        assert!(Property::new("P1", "Downtown", PropertyType::Apartment, f64::NAN).is_err());
    }

    #[test]
    fn test_property_rejects_empty_location() {
        let err = Property::new("P1", "  ", PropertyType::Villa, 1000.0).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput { field: "location", .. }));
    }

    #[test]
    fn test_property_age_and_amenities() {
        let property: Property = PropertyRecord {
            id: "P1".into(),
            location: "Downtown".into(),
            property_type: PropertyType::Apartment,
            square_footage: 1200.0,
            year_built: Some(2018),
            amenities: vec!["Park".into(), "Metro Station".into()],
            ..Default::default()
        }
        .try_into()
        .unwrap();

        assert_eq!(property.age(date(2024, 5, 1)), Some(6));
        assert_eq!(property.age(date(2010, 1, 1)), Some(0));
        assert!(property.has_amenity("park"));
        assert!(!property.has_amenity("pool"));
    }

    #[test]
    fn test_transaction_rejects_non_positive_price() {
        let err = Transaction::new("T1", "Downtown", PropertyType::Apartment, 1000.0, 0.0, date(2024, 1, 1))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput { field: "sale_price", .. }));
    }

    #[test]
    fn test_transaction_price_per_sqft() {
        let tx = Transaction::new("T1", "Downtown", PropertyType::Apartment, 1200.0, 420_000.0, date(2024, 1, 1))
            .unwrap();
        assert!((tx.price_per_sqft() - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_property_type_parsing() {
        assert_eq!("Villa".parse::<PropertyType>().unwrap(), PropertyType::Villa);
        assert_eq!("residential-other".parse::<PropertyType>().unwrap(), PropertyType::Residential);
        assert!("castle".parse::<PropertyType>().is_err());
    }

    #[test]
    fn test_deserialization_goes_through_validation() {
        let ok = r#"{"id":"T1","location":"Downtown","property_type":"apartment",
                     "square_footage":1200,"sale_price":400000,"sale_date":"2024-03-01"}"#;
        let tx: Transaction = serde_json::from_str(ok).unwrap();
        assert_eq!(tx.sale_date(), date(2024, 3, 1));

        let bad_size = ok.replace("1200", "-1");
        assert!(serde_json::from_str::<Transaction>(&bad_size).is_err());

        let bad_type = ok.replace("apartment", "castle");
        assert!(serde_json::from_str::<Transaction>(&bad_type).is_err());

        let bad_date = ok.replace("2024-03-01", "2024-13-45");
        assert!(serde_json::from_str::<Transaction>(&bad_date).is_err());
    }

    #[test]
    fn test_months_of_supply_guards_zero_sales() {
        let snapshot = MarketData {
            location: "Downtown".into(),
            period: date(2024, 1, 1),
            median_price: 400_000.0,
            sales_volume: 0,
            inventory: 30,
            avg_days_on_market: 40.0,
        };
        assert_eq!(snapshot.months_of_supply(), 30.0);
        assert_eq!(snapshot.absorption_rate(), 0.0);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }
}
