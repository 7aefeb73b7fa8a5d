// Deterministic synthetic market used by the `--sample` flag and the tests.

use crate::dataset::Dataset;
use crate::model::{MarketData, Neighborhood, PropertyType, Transaction, TransactionRecord};
use crate::utils::{month_start, sub_months};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Months of market snapshots generated per area.
pub const SAMPLE_MONTHS: u32 = 24;
/// Weeks of sales history generated before `as_of`.
pub const SAMPLE_WEEKS: u32 = 50;

struct AreaProfile {
    location: &'static str,
    property_type: PropertyType,
    square_footage: f64,
    bedrooms: u32,
    bathrooms: u32,
    /// A sale happens every `sale_every` weeks.
    sale_every: u32,
    base_sale_price: f64,
    weekly_sale_step: f64,
    base_median: f64,
    monthly_median_step: f64,
    base_sales: u32,
    sales_cycle: u32,
    base_inventory: u32,
    inventory_cycle: u32,
    base_days_on_market: f64,
    days_cycle: u32,
    neighborhood: Neighborhood,
}

fn profiles() -> Vec<AreaProfile> {
    vec![
        AreaProfile {
            location: "Downtown",
            property_type: PropertyType::Apartment,
            square_footage: 1200.0,
            bedrooms: 2,
            bathrooms: 2,
            sale_every: 1,
            base_sale_price: 450_000.0,
            weekly_sale_step: 2_000.0,
            base_median: 450_000.0,
            monthly_median_step: 5_000.0,
            base_sales: 45,
            sales_cycle: 10,
            base_inventory: 120,
            inventory_cycle: 20,
            base_days_on_market: 35.0,
            days_cycle: 10,
            neighborhood: Neighborhood {
                location: "Downtown".into(),
                crime_rate: 5.2,
                school_rating: 8.5,
                median_income: 85_000.0,
                walkability_score: 85.0,
                population_growth_rate: 1.5,
                employment_rate: Some(96.0),
            },
        },
        AreaProfile {
            location: "Suburbs",
            property_type: PropertyType::Villa,
            square_footage: 3400.0,
            bedrooms: 4,
            bathrooms: 3,
            sale_every: 2,
            base_sale_price: 750_000.0,
            weekly_sale_step: 3_000.0,
            base_median: 750_000.0,
            monthly_median_step: 8_000.0,
            base_sales: 30,
            sales_cycle: 8,
            base_inventory: 80,
            inventory_cycle: 15,
            base_days_on_market: 45.0,
            days_cycle: 12,
            neighborhood: Neighborhood {
                location: "Suburbs".into(),
                crime_rate: 2.8,
                school_rating: 9.2,
                median_income: 95_000.0,
                walkability_score: 65.0,
                population_growth_rate: 2.5,
                employment_rate: Some(97.5),
            },
        },
        AreaProfile {
            location: "Olaya",
            property_type: PropertyType::Townhouse,
            square_footage: 2200.0,
            bedrooms: 3,
            bathrooms: 3,
            sale_every: 3,
            base_sale_price: 600_000.0,
            weekly_sale_step: 500.0,
            base_median: 600_000.0,
            monthly_median_step: 1_500.0,
            base_sales: 35,
            sales_cycle: 6,
            base_inventory: 150,
            inventory_cycle: 10,
            base_days_on_market: 55.0,
            days_cycle: 8,
            neighborhood: Neighborhood {
                location: "Olaya".into(),
                crime_rate: 3.9,
                school_rating: 8.1,
                median_income: 110_000.0,
                walkability_score: 78.0,
                population_growth_rate: 1.1,
                employment_rate: None,
            },
        },
    ]
}

/// Builds a dataset of three areas ending at `as_of`. The same seed always
/// produces the same dataset.
pub fn generate(seed: u64, as_of: NaiveDate) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Dataset::new();
    let last_month = month_start(as_of);

    for profile in profiles() {
        let snapshots: Vec<MarketData> = (0..SAMPLE_MONTHS)
            .map(|i| {
                let noise = 1.0 + rng.random_range(-0.005..0.005);
                MarketData {
                    location: profile.location.into(),
                    period: sub_months(last_month, SAMPLE_MONTHS - 1 - i),
                    median_price: (profile.base_median + profile.monthly_median_step * i as f64) * noise,
                    sales_volume: profile.base_sales + i % profile.sales_cycle,
                    inventory: profile.base_inventory - i % profile.inventory_cycle,
                    avg_days_on_market: profile.base_days_on_market - (i % profile.days_cycle) as f64,
                }
            })
            .collect();

        let transactions: Vec<Transaction> = (0..SAMPLE_WEEKS)
            .filter(|week| week % profile.sale_every == 0)
            .filter_map(|week| {
                let noise = 1.0 + rng.random_range(-0.02..0.02);
                let record = TransactionRecord {
                    id: format!("{}-{:03}", profile.location.to_uppercase(), week),
                    location: profile.location.into(),
                    property_type: profile.property_type,
                    square_footage: profile.square_footage + rng.random_range(0..200) as f64,
                    sale_price: (profile.base_sale_price + profile.weekly_sale_step * week as f64) * noise,
                    sale_date: as_of - Duration::weeks((SAMPLE_WEEKS - week) as i64),
                    bedrooms: Some(profile.bedrooms),
                    bathrooms: Some(profile.bathrooms as f64),
                    amenities: Vec::new(),
                };
                match Transaction::try_from(record) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        warn!("Dropping generated sale: {}", e);
                        None
                    }
                }
            })
            .collect();

        data.add_market_data(snapshots);
        data.add_historical_data(transactions);
        data.add_neighborhoods([profile.neighborhood]);
    }

    debug!(
        "Generated sample dataset: {} sales across {} areas",
        data.transactions().len(),
        data.market_locations().count()
    );
    data
}
