use crate::analyzer::market_indicators::MarketAnalyzer;
use crate::analyzer::stats::{clamp_score, weighted_mean};
use crate::analyzer::valuation::PredictiveEngine;
use crate::config::{EngineConfig, InvestmentConfig, InvestmentGoals, NEUTRAL_SCORE};
use crate::dataset::Dataset;
use crate::model::{
    AnalysisError, InvestmentOpportunity, MarketTrend, ModelError, Neighborhood, Property, PropertyType,
    QuadrantScores, RiskLevel, RoiProjection, TimeHorizon,
};
use crate::utils::location_key;
use tracing::{debug, info, warn};

/// Yield, ROI and opportunity scoring on top of the market and valuation signals.
#[derive(Debug, Clone, Copy)]
pub struct InvestmentAnalyzer<'a> {
    data: &'a Dataset,
    config: &'a EngineConfig,
    market: MarketAnalyzer<'a>,
    engine: PredictiveEngine<'a>,
}

impl<'a> InvestmentAnalyzer<'a> {
    pub fn new(data: &'a Dataset, config: &'a EngineConfig) -> Self {
        Self {
            data,
            config,
            market: MarketAnalyzer::new(data, config),
            engine: PredictiveEngine::new(data, config),
        }
    }

    fn investment(&self) -> &InvestmentConfig {
        &self.config.investment
    }

    /// Monthly rent from the location's per-sq-ft benchmark, else the property type's,
    /// plus a capped bonus per amenity.
    pub fn estimate_monthly_rent(&self, property: &Property) -> f64 {
        let i = self.investment();
        let key = location_key(property.location());
        let rate = i
            .location_rent_per_sqft
            .iter()
            .find(|(location, _)| location_key(location) == key)
            .map(|(_, rate)| *rate)
            .or_else(|| i.type_rent_per_sqft.get(&property.property_type()).copied())
            .unwrap_or(i.default_rent_per_sqft);
        let bonus = (property.amenities().len() as f64 * i.amenity_rent_bonus).min(i.amenity_rent_cap);
        property.square_footage() * rate * (1.0 + bonus)
    }

    /// Gross annual rental yield in percent.
    pub fn calculate_rental_yield(&self, property: &Property, purchase_price: f64) -> Result<f64, AnalysisError> {
        let price = require_purchase_price(purchase_price)?;
        Ok(self.estimate_monthly_rent(property) * 12.0 / price * 100.0)
    }

    /// Appreciation from the market forecast plus undiscounted rental income.
    pub fn predict_roi(
        &self,
        property: &Property,
        purchase_price: f64,
        holding_period_years: u32,
    ) -> Result<RoiProjection, AnalysisError> {
        let price = require_purchase_price(purchase_price)?;
        if holding_period_years == 0 {
            return Err(ModelError::invalid("holding_period_years", "must be at least one year").into());
        }
        let horizon_months = holding_period_years
            .checked_mul(12)
            .ok_or_else(|| ModelError::invalid("holding_period_years", format!("{} years is too long", holding_period_years)))?;
        let years = holding_period_years as f64;
        let rental_yield_percent = self.calculate_rental_yield(property, price)?;

        let forecast = self.engine.forecast_market_trend(property.location(), horizon_months);
        let base_price = forecast.base_price();
        let appreciation_ratio = match forecast.last() {
            Some(point) if base_price > 0.0 => point.projected_median_price / base_price,
            _ => 1.0,
        };

        let projected_value = price * appreciation_ratio;
        let appreciation_gain = projected_value - price;
        let rental_income = rental_yield_percent / 100.0 * price * years;
        let total_return = appreciation_gain + rental_income;
        let total_roi_percent = total_return / price * 100.0;

        Ok(RoiProjection {
            purchase_price: price,
            holding_period_years,
            rental_yield_percent,
            projected_value,
            appreciation_gain,
            appreciation_percent: appreciation_gain / price * 100.0,
            rental_income,
            total_return,
            total_roi_percent,
            annual_roi_percent: total_roi_percent / years,
        })
    }

    /// Safety, schools, income and walkability blended into [0, 100].
    pub fn desirability_score(&self, hood: &Neighborhood) -> f64 {
        let i = self.investment();
        let w = &i.desirability_weights;
        let safety = clamp_score(100.0 - hood.crime_rate * i.crime_scale);
        let schools = clamp_score(hood.school_rating * 10.0);
        let income = clamp_score(hood.median_income / i.income_reference * 100.0);
        let walkability = clamp_score(hood.walkability_score);

        blend(&[
            (safety, w.safety),
            (schools, w.schools),
            (income, w.income),
            (walkability, w.walkability),
        ])
    }

    pub fn market_conditions_score(&self, heat_index: f64, velocity: f64) -> f64 {
        clamp_score((heat_index + velocity) / 2.0)
    }

    pub fn growth_potential_score(&self, trend: &MarketTrend) -> f64 {
        let i = self.investment();
        let price = clamp_score(NEUTRAL_SCORE + trend.price_change_percent * i.growth_price_scale);
        let volume = clamp_score(NEUTRAL_SCORE + trend.volume_change_percent * i.growth_volume_scale);
        let share = i.growth_price_share.clamp(0.0, 1.0);
        clamp_score(share * price + (1.0 - share) * volume)
    }

    /// Employment and population growth; a missing employment rate counts as neutral.
    pub fn economic_score(&self, hood: &Neighborhood) -> f64 {
        let employment = hood.employment_rate.map(clamp_score).unwrap_or(NEUTRAL_SCORE);
        let population =
            clamp_score(NEUTRAL_SCORE + hood.population_growth_rate * self.investment().population_growth_scale);
        clamp_score((employment + population) / 2.0)
    }

    /// Weighted blend of the four quadrant scores, in [0, 100].
    pub fn opportunity_score(&self, scores: &QuadrantScores) -> f64 {
        let w = &self.investment().opportunity_weights;
        blend(&[
            (scores.desirability, w.desirability),
            (scores.market_conditions, w.market_conditions),
            (scores.growth_potential, w.growth_potential),
            (scores.economic_factors, w.economic_factors),
        ])
    }

    pub fn assess_risk(&self, heat_index: f64, volatility: f64, desirability: f64) -> RiskLevel {
        let i = self.investment();
        if volatility > i.high_risk_volatility_above || desirability < i.high_risk_desirability_below {
            RiskLevel::High
        } else if heat_index < i.low_risk_heat_below
            && volatility < i.low_risk_volatility_below
            && desirability >= i.low_risk_desirability_min
        {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        }
    }

    fn time_horizon(&self, trend: &MarketTrend) -> TimeHorizon {
        let i = self.investment();
        if trend.price_change_percent > i.short_horizon_growth_above {
            TimeHorizon::Short
        } else if trend.price_change_percent > i.medium_horizon_growth_above {
            TimeHorizon::Medium
        } else {
            TimeHorizon::Long
        }
    }

    /// Top locations by opportunity score whose ROI reaches `min_roi`, at any risk level.
    pub fn identify_investment_opportunities(&self, max_opportunities: usize, min_roi: f64) -> Vec<InvestmentOpportunity> {
        let goals = InvestmentGoals {
            min_roi,
            risk_tolerance: RiskLevel::High,
            ..InvestmentGoals::default()
        };
        self.find_opportunities(&goals, max_opportunities)
    }

    /// Locations with both neighborhood and market data that satisfy `goals`,
    /// sorted by opportunity score, then ROI, then name.
    pub fn find_opportunities(&self, goals: &InvestmentGoals, max_opportunities: usize) -> Vec<InvestmentOpportunity> {
        let mut opportunities: Vec<InvestmentOpportunity> = self
            .data
            .neighborhoods()
            .filter_map(|hood| self.evaluate_location(hood, goals))
            .collect();

        opportunities.sort_by(|a, b| {
            b.opportunity_score
                .total_cmp(&a.opportunity_score)
                .then_with(|| b.predicted_roi.total_cmp(&a.predicted_roi))
                .then_with(|| a.location.cmp(&b.location))
        });
        opportunities.truncate(max_opportunities);

        info!("Found {} investment opportunities", opportunities.len());
        opportunities
    }

    fn evaluate_location(&self, hood: &Neighborhood, goals: &InvestmentGoals) -> Option<InvestmentOpportunity> {
        let location = hood.location.as_str();
        let Some(latest) = self.data.latest_snapshot(location) else {
            debug!("Skipping {}: no market data", location);
            return None;
        };
        let median_price = latest.median_price;

        if goals.max_investment.is_some_and(|max| median_price > max) {
            debug!("Skipping {}: median {:.0} above budget", location, median_price);
            return None;
        }
        if !goals.property_types.is_empty() && !self.has_sales_of(location, &goals.property_types) {
            debug!("Skipping {}: no sales of the requested property types", location);
            return None;
        }

        let property_type = goals.property_types.first().copied().unwrap_or_default();
        let notional = match Property::new(
            format!("notional-{}", location_key(location)),
            location,
            property_type,
            self.investment().notional_square_footage,
        ) {
            Ok(p) => p,
            Err(e) => {
                warn!("Cannot build notional property for {}: {}", location, e);
                return None;
            }
        };

        let roi = match self.predict_roi(&notional, median_price, goals.time_horizon_years.max(1)) {
            Ok(roi) => roi,
            Err(e) => {
                warn!("ROI projection failed for {}: {}", location, e);
                return None;
            }
        };
        if roi.total_roi_percent < goals.min_roi {
            debug!("Skipping {}: ROI {:.1}% below {:.1}%", location, roi.total_roi_percent, goals.min_roi);
            return None;
        }

        let trend = self
            .market
            .analyze_market_trend(location, self.config.market.trend_window_months);
        let heat_index = self.market.calculate_market_heat_index(location);
        let velocity = self.market.calculate_market_velocity(location);
        let scores = QuadrantScores {
            desirability: self.desirability_score(hood),
            market_conditions: self.market_conditions_score(heat_index, velocity),
            growth_potential: self.growth_potential_score(&trend),
            economic_factors: self.economic_score(hood),
        };

        let risk_level = self.assess_risk(heat_index, self.market.price_volatility(location), scores.desirability);
        if risk_level > goals.risk_tolerance {
            debug!("Skipping {}: {} risk exceeds tolerance", location, risk_level);
            return None;
        }

        Some(InvestmentOpportunity {
            location: location.to_string(),
            opportunity_score: self.opportunity_score(&scores),
            scores,
            predicted_roi: roi.total_roi_percent,
            annual_roi: roi.annual_roi_percent,
            predicted_appreciation: roi.appreciation_percent,
            rental_yield: roi.rental_yield_percent,
            median_price,
            heat_index,
            velocity,
            risk_level,
            time_horizon: self.time_horizon(&trend),
        })
    }

    fn has_sales_of(&self, location: &str, types: &[PropertyType]) -> bool {
        let key = location_key(location);
        self.data
            .transactions()
            .iter()
            .any(|t| types.contains(&t.property_type()) && location_key(t.location()) == key)
    }
}

fn blend(pairs: &[(f64, f64)]) -> f64 {
    weighted_mean(pairs).map(clamp_score).unwrap_or(NEUTRAL_SCORE)
}

fn require_purchase_price(price: f64) -> Result<f64, ModelError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(ModelError::invalid("purchase_price", format!("must be a positive number, got {}", price)))
    }
}
