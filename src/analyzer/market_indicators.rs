use crate::analyzer::stats::{clamp01, clamp_score, mean, percent_change, variance};
use crate::config::{EngineConfig, MarketConfig, NEUTRAL_SCORE};
use crate::dataset::Dataset;
use crate::model::{AnalysisError, MarketCondition, MarketData, MarketSummary, MarketTrend, TrendDirection};
use crate::utils::{month_index, sub_months};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Snapshots needed before a trend can be computed.
const MIN_TREND_POINTS: usize = 2;

/// Maps a heat index onto the buyer's / balanced / seller's classification.
pub fn classify_heat_index(heat_index: f64, config: &MarketConfig) -> MarketCondition {
    if heat_index < config.buyers_market_below {
        MarketCondition::BuyersMarket
    } else if heat_index > config.sellers_market_above {
        MarketCondition::SellersMarket
    } else {
        MarketCondition::Balanced
    }
}

/// Descriptive and momentum signals per location.
#[derive(Debug, Clone, Copy)]
pub struct MarketAnalyzer<'a> {
    data: &'a Dataset,
    config: &'a MarketConfig,
}

impl<'a> MarketAnalyzer<'a> {
    pub fn new(data: &'a Dataset, config: &'a EngineConfig) -> Self {
        Self {
            data,
            config: &config.market,
        }
    }

    pub fn config(&self) -> &MarketConfig {
        self.config
    }

    /// Trend over the last `period_months` months of snapshots, or
    /// `InsufficientData` when the window holds fewer than two snapshots.
    ///
    /// Changes compare the mean of the earliest third of the window against the
    /// mean of the latest third, rescaled to cover the whole window span.
    pub fn try_analyze_market_trend(&self, area: &str, period_months: u32) -> Result<MarketTrend, AnalysisError> {
        self.trend_over(area, &self.data.snapshots(area), period_months)
    }

    /// Trend computed only from snapshots whose period starts on or before `as_of`.
    pub fn try_analyze_market_trend_as_of(
        &self,
        area: &str,
        period_months: u32,
        as_of: NaiveDate,
    ) -> Result<MarketTrend, AnalysisError> {
        self.trend_over(area, &self.data.snapshots_until(area, as_of), period_months)
    }

    /// Point-in-time counterpart of [`analyze_market_trend`](Self::analyze_market_trend).
    pub fn analyze_market_trend_as_of(&self, area: &str, period_months: u32, as_of: NaiveDate) -> MarketTrend {
        self.neutral_on_error(area, self.try_analyze_market_trend_as_of(area, period_months, as_of))
    }

    fn trend_over(&self, area: &str, series: &[&MarketData], period_months: u32) -> Result<MarketTrend, AnalysisError> {
        let window = match series.last() {
            Some(latest) => {
                let cutoff = sub_months(latest.period, period_months.max(1));
                series.iter().copied().filter(|s| s.period > cutoff).collect::<Vec<_>>()
            }
            None => Vec::new(),
        };

        if window.len() < MIN_TREND_POINTS {
            return Err(AnalysisError::InsufficientData {
                location: area.to_string(),
                found: window.len(),
                required: MIN_TREND_POINTS,
            });
        }

        let n = window.len();
        let k = (n / 3).max(1);
        let early = &window[..k];
        let late = &window[n - k..];
        let first = window[0];
        let last = window[n - 1];

        let span = (month_index(last.period) - month_index(first.period)).max(0) as f64;
        let distance = month_centre(late) - month_centre(early);
        let scale = if distance > 0.0 { span / distance } else { 1.0 };

        let price_change_percent = window_change(early, late, scale, |s| s.median_price);
        let direction = if price_change_percent > self.config.trend_threshold_percent {
            TrendDirection::Up
        } else if price_change_percent < -self.config.trend_threshold_percent {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        };

        let trend = MarketTrend {
            area: area.to_string(),
            direction,
            price_change_percent,
            volume_change_percent: window_change(early, late, scale, |s| s.sales_volume as f64),
            inventory_change_percent: window_change(early, late, scale, |s| s.inventory as f64),
            days_on_market_change_percent: window_change(early, late, scale, |s| s.avg_days_on_market),
            period_start: Some(first.period),
            period_end: Some(last.period),
            span_months: span as u32,
            data_points: n,
            confidence: clamp01(n as f64 / period_months.max(1) as f64),
        };
        debug!(
            "Trend for {}: {} ({:+.2}% over {} snapshots)",
            area, trend.direction, trend.price_change_percent, n
        );
        Ok(trend)
    }

    /// Like [`try_analyze_market_trend`](Self::try_analyze_market_trend), but reports
    /// insufficient data as a stable, zero-confidence trend.
    pub fn analyze_market_trend(&self, area: &str, period_months: u32) -> MarketTrend {
        self.neutral_on_error(area, self.try_analyze_market_trend(area, period_months))
    }

    fn neutral_on_error(&self, area: &str, result: Result<MarketTrend, AnalysisError>) -> MarketTrend {
        match result {
            Ok(trend) => trend,
            Err(AnalysisError::InsufficientData { found, .. }) => {
                warn!("Insufficient market data for {}: {} snapshot(s) in window", area, found);
                MarketTrend::neutral(area, found)
            }
            Err(e) => {
                warn!("Trend analysis failed for {}: {}", area, e);
                MarketTrend::neutral(area, 0)
            }
        }
    }

    /// Heat index in [0, 100] from sales-volume growth, inventory scarcity and
    /// days-on-market shrinkage. Areas without data score 50.
    pub fn calculate_market_heat_index(&self, area: &str) -> f64 {
        let Some(latest) = self.data.latest_snapshot(area) else {
            return NEUTRAL_SCORE;
        };
        let c = self.config;

        let (volume_score, dom_score) = match self.try_analyze_market_trend(area, c.trend_window_months) {
            Ok(trend) => (
                clamp_score(NEUTRAL_SCORE + trend.volume_change_percent * c.heat_volume_scale),
                clamp_score(NEUTRAL_SCORE - trend.days_on_market_change_percent * c.heat_dom_scale),
            ),
            Err(_) => (NEUTRAL_SCORE, NEUTRAL_SCORE),
        };
        let scarcity_score = clamp_score(100.0 - latest.months_of_supply() * c.heat_supply_scale);

        let total_weight = c.heat_volume_weight + c.heat_inventory_weight + c.heat_dom_weight;
        if total_weight <= 0.0 {
            return NEUTRAL_SCORE;
        }
        let heat = (c.heat_volume_weight * volume_score
            + c.heat_inventory_weight * scarcity_score
            + c.heat_dom_weight * dom_score)
            / total_weight;
        clamp_score(heat)
    }

    /// Velocity in [0, 100], inversely proportional to average days on market;
    /// the reference days score 50. Areas without data score 50.
    pub fn calculate_market_velocity(&self, area: &str) -> f64 {
        match self.data.latest_snapshot(area) {
            Some(latest) => clamp_score(
                NEUTRAL_SCORE * self.config.velocity_reference_days / latest.avg_days_on_market.max(1.0),
            ),
            None => NEUTRAL_SCORE,
        }
    }

    pub fn classify_market(&self, area: &str) -> MarketCondition {
        classify_heat_index(self.calculate_market_heat_index(area), self.config)
    }

    /// Variance of the trailing month-over-month median price changes (percent).
    pub fn price_volatility(&self, area: &str) -> f64 {
        let series = self.data.snapshots(area);
        let start = series.len().saturating_sub(self.config.volatility_window + 1);
        let changes: Vec<f64> = series[start..]
            .windows(2)
            .map(|w| percent_change(w[0].median_price, w[1].median_price))
            .collect();
        variance(&changes)
    }

    /// Locations whose trailing price change exceeds `min_growth_rate`, with the
    /// growth rate, fastest first. Recomputed on every call.
    pub fn emerging_market_growth(&self, min_growth_rate: f64) -> Vec<(String, f64)> {
        let window = self.config.emerging_window_months;
        let mut growth: Vec<(String, f64)> = self
            .data
            .market_locations()
            .filter_map(|location| {
                self.try_analyze_market_trend(location, window)
                    .ok()
                    .map(|trend| (location.to_string(), trend.price_change_percent))
            })
            .filter(|(_, rate)| *rate > min_growth_rate)
            .collect();
        growth.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        growth
    }

    pub fn identify_emerging_markets(&self, min_growth_rate: f64) -> impl Iterator<Item = String> {
        self.emerging_market_growth(min_growth_rate)
            .into_iter()
            .map(|(location, _)| location)
    }

    pub fn market_summary(&self, area: &str) -> MarketSummary {
        let heat_index = self.calculate_market_heat_index(area);
        MarketSummary {
            area: area.to_string(),
            heat_index,
            velocity: self.calculate_market_velocity(area),
            condition: classify_heat_index(heat_index, self.config),
            price_volatility: self.price_volatility(area),
            trend: self.analyze_market_trend(area, self.config.trend_window_months),
        }
    }
}

/// Percent change between the means of two parts of a window, times `scale`.
fn window_change(early: &[&MarketData], late: &[&MarketData], scale: f64, field: fn(&MarketData) -> f64) -> f64 {
    percent_change(average(early, field), average(late, field)) * scale
}

fn average(part: &[&MarketData], field: fn(&MarketData) -> f64) -> f64 {
    let values: Vec<f64> = part.iter().map(|s| field(s)).collect();
    mean(&values).unwrap_or(0.0)
}

fn month_centre(part: &[&MarketData]) -> f64 {
    let months: Vec<f64> = part.iter().map(|s| month_index(s.period) as f64).collect();
    mean(&months).unwrap_or(0.0)
}
