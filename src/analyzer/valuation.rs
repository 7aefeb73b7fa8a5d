use crate::analyzer::comparables::{ComparableSet, select_comparables};
use crate::analyzer::market_indicators::MarketAnalyzer;
use crate::analyzer::stats::{clamp01, median, weighted_mean};
use crate::config::{EngineConfig, SeasonalTable, ValuationConfig};
use crate::dataset::Dataset;
use crate::model::{
    AnalysisError, ConfidenceInterval, FactorBreakdown, ForecastPoint, MarketTrend, PredictionResult, Property,
};
use crate::utils::add_months;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

/// Point valuations and forward projections.
#[derive(Debug, Clone, Copy)]
pub struct PredictiveEngine<'a> {
    data: &'a Dataset,
    config: &'a EngineConfig,
    market: MarketAnalyzer<'a>,
}

impl<'a> PredictiveEngine<'a> {
    pub fn new(data: &'a Dataset, config: &'a EngineConfig) -> Self {
        Self {
            data,
            config,
            market: MarketAnalyzer::new(data, config),
        }
    }

    fn valuation(&self) -> &ValuationConfig {
        &self.config.valuation
    }

    /// Values `property` as of `as_of`:
    /// base value from comparables, times location, property, seasonal and trend factors.
    ///
    /// Fails with `NoComparableData` only when no same-type sale exists in the
    /// recency window anywhere; thin evidence lowers the confidence instead.
    pub fn predict_property_value(&self, property: &Property, as_of: NaiveDate) -> Result<PredictionResult, AnalysisError> {
        let comparables = select_comparables(self.data, property, as_of, self.valuation());
        if comparables.is_empty() {
            warn!(
                "No comparable {} sales for {} in {}",
                property.property_type(),
                property.id(),
                property.location()
            );
            return Err(AnalysisError::NoComparableData {
                location: property.location().to_string(),
                property_type: property.property_type(),
            });
        }

        let base_value = self
            .base_value(property, &comparables)
            .ok_or_else(|| AnalysisError::NoComparableData {
                location: property.location().to_string(),
                property_type: property.property_type(),
            })?;

        let trend = self.market.analyze_market_trend_as_of(
            property.location(),
            self.config.market.trend_window_months,
            as_of,
        );

        let factors = FactorBreakdown {
            base_value,
            location_factor: self.location_factor(property.location(), as_of),
            property_factor: self.property_factor(property, &comparables, as_of),
            seasonal_factor: self.config.seasonal.for_date(as_of),
            trend_factor: self.trend_factor(&trend),
        };
        let predicted_value = factors.product();

        let data_points = self.data.data_point_count_until(property.location(), as_of);
        let confidence_level = self.confidence(comparables.len(), data_points);
        let half_width = predicted_value * self.valuation().confidence_spread * (1.0 - confidence_level);

        info!(
            "Valued {} at {:.0} (confidence {:.2}, {} comparables)",
            property.id(),
            predicted_value,
            confidence_level,
            comparables.len()
        );

        Ok(PredictionResult {
            property_id: property.id().to_string(),
            as_of,
            predicted_value,
            confidence_level,
            confidence_interval: ConfidenceInterval {
                low: predicted_value - half_width,
                high: predicted_value + half_width,
            },
            market_trend: trend.direction,
            factors,
            comparable_count: comparables.len(),
            data_points,
        })
    }

    /// Similarity-weighted mean of the comparables' price per sq ft, scaled to the subject.
    fn base_value(&self, property: &Property, comparables: &ComparableSet) -> Option<f64> {
        let pairs: Vec<(f64, f64)> = comparables
            .comparables
            .iter()
            .map(|c| (c.transaction.price_per_sqft() * property.square_footage(), c.similarity))
            .collect();
        weighted_mean(&pairs)
    }

    /// Latest local median relative to the median of every location's latest median,
    /// using only snapshots on or before `as_of`.
    pub fn location_factor(&self, location: &str, as_of: NaiveDate) -> f64 {
        let range = self.valuation().location_factor_range;
        let Some(local) = self.data.latest_snapshot_until(location, as_of) else {
            return 1.0;
        };
        let city_medians: Vec<f64> = self
            .data
            .market_locations()
            .filter_map(|l| self.data.latest_snapshot_until(l, as_of))
            .map(|s| s.median_price)
            .collect();
        match median(&city_medians) {
            Some(city) if city > 0.0 => range.clamp(local.median_price / city),
            _ => 1.0,
        }
    }

    /// Additive adjustments for age, amenities and rooms versus the comparables.
    pub fn property_factor(&self, property: &Property, comparables: &ComparableSet, as_of: NaiveDate) -> f64 {
        let v = self.valuation();
        let mut adjustment = 0.0;

        if let Some(age) = property.age(as_of) {
            adjustment += age_adjustment(age, v);
        }
        adjustment += (property.amenities().len() as f64 * v.amenity_step).min(v.amenity_cap);

        if let (Some(beds), Some(typical)) = (property.bedrooms(), median(&comparables.bedrooms())) {
            adjustment += ((beds as f64 - typical) * v.bedroom_step).clamp(-v.room_adjustment_cap, v.room_adjustment_cap);
        }
        if let (Some(baths), Some(typical)) = (property.bathrooms(), median(&comparables.bathrooms())) {
            adjustment += ((baths - typical) * v.bathroom_step).clamp(-v.room_adjustment_cap, v.room_adjustment_cap);
        }

        v.property_factor_range.clamp(1.0 + adjustment)
    }

    pub fn trend_factor(&self, trend: &MarketTrend) -> f64 {
        let v = self.valuation();
        v.trend_factor_range.clamp(1.0 + trend.price_change_percent * v.trend_sensitivity)
    }

    /// Valuation confidence in [0, 1] from comparable and snapshot counts.
    /// Below the minimum comparable count the result is cut sharply.
    pub fn confidence(&self, comparable_count: usize, data_points: usize) -> f64 {
        let v = self.valuation();
        let comparable_share = (comparable_count as f64 / v.confidence_comparables_reference).min(1.0);
        let data_share = (data_points as f64 / v.confidence_data_points_reference).min(1.0);
        let mut confidence = clamp01(0.5 * comparable_share + 0.5 * data_share);

        if comparable_count < v.min_comparables {
            confidence *= 0.5 * comparable_count as f64 / v.min_comparables as f64;
        }
        confidence
    }

    /// Projects the location's median price month by month from its latest snapshot.
    /// Empty when the location has no market data.
    pub fn forecast_market_trend(&self, location: &str, months_ahead: u32) -> MarketForecast {
        let Some(latest) = self.data.latest_snapshot(location) else {
            debug!("No market data to forecast {}", location);
            return MarketForecast::empty(self.config.seasonal.clone());
        };
        let trend = self
            .market
            .analyze_market_trend(location, self.config.market.trend_window_months);
        let monthly_rate = trend.price_change_percent / 100.0 / trend.span_months.max(1) as f64;

        MarketForecast {
            base_period: latest.period,
            base_price: latest.median_price,
            monthly_rate,
            base_confidence: trend.confidence,
            half_life_months: self.valuation().forecast_half_life_months.max(1.0),
            base_seasonal: self.config.seasonal.for_date(latest.period),
            seasonal: self.config.seasonal.clone(),
            step: 0,
            horizon: months_ahead,
        }
    }
}

fn age_adjustment(age: i32, v: &ValuationConfig) -> f64 {
    if age <= v.new_construction_age {
        v.age_adjustment
    } else if age >= v.old_construction_age {
        -v.age_adjustment
    } else {
        let span = (v.old_construction_age - v.new_construction_age).max(1) as f64;
        let progress = (age - v.new_construction_age) as f64 / span;
        v.age_adjustment - 2.0 * v.age_adjustment * progress
    }
}

/// Finite monthly projection. Clone it to replay the sequence from the start.
#[derive(Debug, Clone)]
pub struct MarketForecast {
    base_period: NaiveDate,
    base_price: f64,
    /// Linear growth per month, as a fraction of the base price.
    monthly_rate: f64,
    base_confidence: f64,
    half_life_months: f64,
    base_seasonal: f64,
    seasonal: SeasonalTable,
    step: u32,
    horizon: u32,
}

impl MarketForecast {
    fn empty(seasonal: SeasonalTable) -> Self {
        Self {
            base_period: NaiveDate::MIN,
            base_price: 0.0,
            monthly_rate: 0.0,
            base_confidence: 0.0,
            half_life_months: 1.0,
            base_seasonal: 1.0,
            seasonal,
            step: 0,
            horizon: 0,
        }
    }

    /// Median price of the snapshot the projection starts from.
    pub fn base_price(&self) -> f64 {
        self.base_price
    }
}

impl Iterator for MarketForecast {
    type Item = ForecastPoint;

    fn next(&mut self) -> Option<ForecastPoint> {
        if self.step >= self.horizon {
            return None;
        }
        self.step += 1;

        let month = add_months(self.base_period, self.step);
        let trend_price = self.base_price * (1.0 + self.monthly_rate * self.step as f64);
        let seasonal = self.seasonal.for_date(month) / self.base_seasonal;

        Some(ForecastPoint {
            month,
            projected_median_price: (trend_price * seasonal).max(0.0),
            confidence: self.base_confidence * 0.5f64.powf(self.step as f64 / self.half_life_months),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.horizon - self.step) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MarketForecast {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarketData, PropertyRecord, PropertyType, Transaction};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(location: &str, period: NaiveDate, median_price: f64) -> MarketData {
        MarketData {
            location: location.into(),
            period,
            median_price,
            sales_volume: 40,
            inventory: 100,
            avg_days_on_market: 35.0,
        }
    }

    fn downtown_sales(count: usize) -> Vec<Transaction> {
        (0..count)
            .map(|i| {
                let sqft = 1150.0 + i as f64 * 10.0;
                Transaction::new(
                    format!("D{}", i),
                    "Downtown",
                    PropertyType::Apartment,
                    sqft,
                    sqft * 350.0,
                    date(2024, 1 + (i % 4) as u32, 10),
                )
                .unwrap()
            })
            .collect()
    }

    fn apartment(amenities: usize) -> Property {
        PropertyRecord {
            id: "P1".into(),
            location: "Downtown".into(),
            property_type: PropertyType::Apartment,
            square_footage: 1200.0,
            amenities: (0..amenities).map(|i| format!("amenity-{}", i)).collect(),
            ..Default::default()
        }
        .try_into()
        .unwrap()
    }

    #[test]
    fn test_downtown_valuation_composes_all_factors() {
        let mut data = Dataset::new();
        data.add_historical_data(downtown_sales(10));
        data.add_market_data(vec![
            snapshot("Downtown", date(2024, 4, 1), 420_000.0 / 1.06),
            snapshot("Downtown", date(2024, 5, 1), 420_000.0),
            snapshot("Suburbs", date(2024, 5, 1), 400_000.0),
            snapshot("Olaya", date(2024, 5, 1), 380_000.0),
        ]);
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);

        let result = engine.predict_property_value(&apartment(4), date(2024, 5, 15)).unwrap();
        let f = result.factors;

        assert!((f.base_value - 420_000.0).abs() < 1e-6);
        assert!((f.location_factor - 1.05).abs() < 1e-9);
        assert!((f.property_factor - 1.02).abs() < 1e-9);
        assert_eq!(f.seasonal_factor, 1.12);
        assert!((f.trend_factor - 1.03).abs() < 1e-9);

        let expected = 350.0 * 1200.0 * 1.05 * 1.02 * 1.12 * 1.03;
        assert!((result.predicted_value - expected).abs() < 1.0, "{}", result.predicted_value);
        assert_eq!(result.comparable_count, 10);
        assert!(result.confidence_interval.contains(result.predicted_value));
        assert_eq!(result.market_trend, crate::model::TrendDirection::Up);
    }

    #[test]
    fn test_valuation_ignores_snapshots_after_as_of() {
        let as_of = date(2024, 5, 15);
        let mut data = Dataset::new();
        data.add_historical_data(downtown_sales(10));
        data.add_market_data(
            (0..7u32).map(|i| snapshot("Downtown", add_months(date(2023, 11, 1), i), 400_000.0 + 1_000.0 * i as f64)),
        );
        data.add_market_data(vec![snapshot("Suburbs", date(2024, 5, 1), 380_000.0)]);
        let config = EngineConfig::default();

        let before = PredictiveEngine::new(&data, &config)
            .predict_property_value(&apartment(2), as_of)
            .unwrap();

        data.add_market_data(
            (1..=12u32).map(|i| snapshot("Downtown", add_months(date(2024, 5, 1), i), 406_000.0 * 1.03f64.powi(i as i32))),
        );
        data.add_market_data(vec![snapshot("Suburbs", date(2024, 12, 1), 900_000.0)]);

        let after = PredictiveEngine::new(&data, &config)
            .predict_property_value(&apartment(2), as_of)
            .unwrap();

        assert_eq!(before, after);
        assert_eq!(after.data_points, 7);

        assert_eq!(data.data_point_count_until("Downtown", date(2025, 5, 15)), 19);
    }

    #[test]
    fn test_sparse_history_confidence() {
        let mut data = Dataset::new();
        data.add_historical_data(downtown_sales(4));
        data.add_market_data(vec![
            snapshot("Downtown", date(2024, 3, 1), 400_000.0),
            snapshot("Downtown", date(2024, 4, 1), 401_000.0),
        ]);
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);

        let result = engine.predict_property_value(&apartment(0), date(2024, 5, 1)).unwrap();

        assert_eq!(result.comparable_count, 4);
        assert_eq!(result.data_points, 2);
        let expected = 0.5 * 0.4 + 0.5 * (2.0 / 24.0);
        assert!((result.confidence_level - expected).abs() < 1e-9);
        assert!((result.confidence_level - 0.2417).abs() < 1e-4);

        let width = result.confidence_interval.high - result.confidence_interval.low;
        let expected_width = 2.0 * result.predicted_value * 0.05 * (1.0 - expected);
        assert!((width - expected_width).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_is_monotonic() {
        let data = Dataset::new();
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);

        for points in [0, 2, 12, 24, 40] {
            let mut previous = -1.0;
            for count in 0..=15 {
                let c = engine.confidence(count, points);
                assert!(c >= previous, "count {} points {}", count, points);
                assert!((0.0..=1.0).contains(&c));
                previous = c;
            }
        }
        for count in [0, 1, 3, 10] {
            let mut previous = -1.0;
            for points in 0..=30 {
                let c = engine.confidence(count, points);
                assert!(c >= previous);
                previous = c;
            }
        }
        assert_eq!(engine.confidence(10, 24), 1.0);
    }

    #[test]
    fn test_few_comparables_degrade_instead_of_failing() {
        let mut data = Dataset::new();
        data.add_historical_data(downtown_sales(1));
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);

        let result = engine.predict_property_value(&apartment(0), date(2024, 5, 1)).unwrap();
        assert_eq!(result.comparable_count, 1);
        assert!(result.confidence_level < 0.05);
        assert!(result.predicted_value > 0.0);
        assert!(result.confidence_interval.low <= result.predicted_value);
        assert!(result.predicted_value <= result.confidence_interval.high);
    }

    #[test]
    fn test_no_comparables_is_reported() {
        let mut data = Dataset::new();
        data.add_historical_data(vec![
            Transaction::new("V1", "Downtown", PropertyType::Villa, 3000.0, 900_000.0, date(2024, 3, 1)).unwrap(),
        ]);
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);

        let err = engine.predict_property_value(&apartment(0), date(2024, 5, 1)).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::NoComparableData { property_type: PropertyType::Apartment, .. }
        ));
    }

    #[test]
    fn test_property_factor_stays_in_range() {
        let mut data = Dataset::new();
        data.add_historical_data(downtown_sales(5).into_iter().map(|t| t.with_rooms(1, 1)));
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);
        let as_of = date(2024, 5, 1);
        let comparables = select_comparables(&data, &apartment(0), as_of, &config.valuation);

        let luxury: Property = PropertyRecord {
            id: "lux".into(),
            location: "Downtown".into(),
            property_type: PropertyType::Apartment,
            square_footage: 1200.0,
            bedrooms: Some(6),
            bathrooms: Some(5.0),
            year_built: Some(2024),
            amenities: (0..40).map(|i| i.to_string()).collect(),
            ..Default::default()
        }
        .try_into()
        .unwrap();
        let old: Property = PropertyRecord {
            id: "old".into(),
            location: "Downtown".into(),
            property_type: PropertyType::Apartment,
            square_footage: 1200.0,
            bedrooms: Some(1),
            year_built: Some(1950),
            ..Default::default()
        }
        .try_into()
        .unwrap();

        assert_eq!(engine.property_factor(&luxury, &comparables, as_of), 1.2);
        assert!((engine.property_factor(&old, &comparables, as_of) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_location_factor_is_clamped_and_defaults_to_one() {
        let mut data = Dataset::new();
        data.add_market_data(vec![
            snapshot("Prime", date(2024, 5, 1), 2_000_000.0),
            snapshot("Mid", date(2024, 5, 1), 400_000.0),
            snapshot("Low", date(2024, 5, 1), 100_000.0),
        ]);
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);

        assert_eq!(engine.location_factor("Prime", date(2024, 5, 15)), 1.3);
        assert_eq!(engine.location_factor("Low", date(2024, 5, 15)), 0.7);
        assert_eq!(engine.location_factor("Mid", date(2024, 5, 15)), 1.0);
        assert_eq!(engine.location_factor("Unknown", date(2024, 5, 15)), 1.0);
    }

    #[test]
    fn test_forecast_is_finite_restartable_and_decaying() {
        let mut data = Dataset::new();
        data.add_market_data(
            (0..12u32).map(|i| snapshot("Downtown", add_months(date(2023, 6, 1), i), 400_000.0 + 4_000.0 * i as f64)),
        );
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);

        let forecast = engine.forecast_market_trend("Downtown", 24);
        assert_eq!(forecast.len(), 24);
        let replay = forecast.clone();

        let points: Vec<ForecastPoint> = forecast.collect();
        assert_eq!(points, replay.collect::<Vec<_>>());
        assert_eq!(points[0].month, date(2024, 6, 1));
        assert!(points.windows(2).all(|w| w[1].confidence < w[0].confidence));
        assert!((points[11].confidence - points[0].confidence * 0.5f64.powf(11.0 / 12.0)).abs() < 1e-12);
        assert!(points[23].projected_median_price > points[11].projected_median_price);
        assert!(points.iter().all(|p| p.projected_median_price > 0.0));
    }

    #[test]
    fn test_forecast_for_unknown_location_is_empty() {
        let data = Dataset::new();
        let config = EngineConfig::default();
        let engine = PredictiveEngine::new(&data, &config);
        assert_eq!(engine.forecast_market_trend("Nowhere", 12).count(), 0);
    }
}
