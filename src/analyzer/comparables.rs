use crate::config::ValuationConfig;
use crate::dataset::Dataset;
use crate::model::{Property, Transaction};
use crate::utils::{location_key, sub_months};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// A transaction chosen as evidence for a valuation, with its similarity in (0, 1].
#[derive(Debug, Clone, Copy)]
pub struct Comparable<'a> {
    pub transaction: &'a Transaction,
    pub similarity: f64,
    pub same_location: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ComparableSet<'a> {
    /// Most similar first.
    pub comparables: Vec<Comparable<'a>>,
    /// True when too few local sales forced a city-wide search.
    pub used_fallback: bool,
}

impl ComparableSet<'_> {
    pub fn len(&self) -> usize {
        self.comparables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparables.is_empty()
    }

    pub fn bedrooms(&self) -> Vec<f64> {
        self.comparables
            .iter()
            .filter_map(|c| c.transaction.bedrooms().map(f64::from))
            .collect()
    }

    pub fn bathrooms(&self) -> Vec<f64> {
        self.comparables
            .iter()
            .filter_map(|c| c.transaction.bathrooms())
            .collect()
    }
}

/// Picks the sales most similar to `property` within the recency window before `as_of`.
///
/// Same-type sales in the property's location are preferred; when fewer than
/// `min_comparables` exist, same-type sales anywhere are considered.
pub fn select_comparables<'a>(
    data: &'a Dataset,
    property: &Property,
    as_of: NaiveDate,
    config: &ValuationConfig,
) -> ComparableSet<'a> {
    let window_start = sub_months(as_of, config.recency_window_months);
    let window_days = (as_of - window_start).num_days().max(1) as f64;
    let subject_location = location_key(property.location());

    let candidates: Vec<&Transaction> = data
        .transactions()
        .iter()
        .filter(|t| t.property_type() == property.property_type())
        .filter(|t| t.sale_date() > window_start && t.sale_date() <= as_of)
        .collect();
    let local: Vec<&Transaction> = candidates
        .iter()
        .copied()
        .filter(|t| location_key(t.location()) == subject_location)
        .collect();

    let used_fallback = local.len() < config.min_comparables;
    let pool = if used_fallback {
        warn!(
            "Only {} local {} sales for {}; searching all locations ({} candidates)",
            local.len(),
            property.property_type(),
            property.location(),
            candidates.len()
        );
        candidates
    } else {
        local
    };

    let mut comparables: Vec<Comparable> = pool
        .into_iter()
        .map(|t| {
            let same_location = location_key(t.location()) == subject_location;
            Comparable {
                transaction: t,
                similarity: similarity(property, t, as_of, window_days, same_location, config),
                same_location,
            }
        })
        .collect();

    comparables.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| b.transaction.sale_date().cmp(&a.transaction.sale_date()))
            .then_with(|| a.transaction.id().cmp(b.transaction.id()))
    });
    comparables.truncate(config.max_comparables);

    debug!(
        "Selected {} comparables for {} (fallback: {})",
        comparables.len(),
        property.id(),
        used_fallback
    );
    ComparableSet {
        comparables,
        used_fallback,
    }
}

/// Inverse weighted distance over size, bedroom count and sale recency.
pub fn similarity(
    property: &Property,
    tx: &Transaction,
    as_of: NaiveDate,
    window_days: f64,
    same_location: bool,
    config: &ValuationConfig,
) -> f64 {
    let size_delta = (tx.square_footage() - property.square_footage()).abs() / property.square_footage();
    let bedroom_delta = match (property.bedrooms(), tx.bedrooms()) {
        (Some(a), Some(b)) => (a as f64 - b as f64).abs(),
        _ => 0.0,
    };
    let age_in_window = (as_of - tx.sale_date()).num_days().max(0) as f64 / window_days.max(1.0);

    let mut distance = config.size_weight * size_delta
        + config.bedroom_weight * bedroom_delta
        + config.recency_weight * age_in_window;
    if !same_location {
        distance += config.location_mismatch_penalty;
    }
    1.0 / (1.0 + distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PropertyRecord, PropertyType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sale(id: &str, location: &str, sqft: f64, sold: NaiveDate) -> Transaction {
        Transaction::new(id, location, PropertyType::Apartment, sqft, sqft * 350.0, sold).unwrap()
    }

    fn subject() -> Property {
        PropertyRecord {
            id: "P1".into(),
            location: "Downtown".into(),
            property_type: PropertyType::Apartment,
            square_footage: 1200.0,
            bedrooms: Some(2),
            ..Default::default()
        }
        .try_into()
        .unwrap()
    }

    #[test]
    fn test_prefers_local_sales_and_ranks_by_similarity() {
        let mut data = Dataset::new();
        data.add_historical_data(vec![
            sale("far-size", "Downtown", 2400.0, date(2024, 4, 1)),
            sale("close", "Downtown", 1210.0, date(2024, 4, 1)),
            sale("close-old", "Downtown", 1210.0, date(2023, 8, 1)),
            sale("elsewhere", "Suburbs", 1200.0, date(2024, 4, 1)),
        ]);
        let config = ValuationConfig::default();

        let set = select_comparables(&data, &subject(), date(2024, 5, 1), &config);
        let ids: Vec<&str> = set.comparables.iter().map(|c| c.transaction.id()).collect();

        assert!(!set.used_fallback);
        assert_eq!(ids, vec!["close", "close-old", "far-size"]);
        assert!(set.comparables.iter().all(|c| c.similarity > 0.0 && c.similarity <= 1.0));
    }

    #[test]
    fn test_falls_back_to_citywide_when_location_is_thin() {
        let mut data = Dataset::new();
        data.add_historical_data(vec![
            sale("local", "Downtown", 1200.0, date(2024, 4, 1)),
            sale("a", "Suburbs", 1200.0, date(2024, 4, 1)),
            sale("b", "Olaya", 1200.0, date(2024, 3, 1)),
        ]);
        let config = ValuationConfig::default();

        let set = select_comparables(&data, &subject(), date(2024, 5, 1), &config);

        assert!(set.used_fallback);
        assert_eq!(set.len(), 3);
        assert_eq!(set.comparables[0].transaction.id(), "local");
        assert!(set.comparables[0].same_location);
        assert!(!set.comparables[1].same_location);
    }

    #[test]
    fn test_respects_recency_window_and_as_of() {
        let mut data = Dataset::new();
        data.add_historical_data(vec![
            sale("too-old", "Downtown", 1200.0, date(2022, 1, 1)),
            sale("future", "Downtown", 1200.0, date(2024, 6, 1)),
            sale("ok", "Downtown", 1200.0, date(2024, 1, 1)),
        ]);
        let config = ValuationConfig::default();

        let set = select_comparables(&data, &subject(), date(2024, 5, 1), &config);
        let ids: Vec<&str> = set.comparables.iter().map(|c| c.transaction.id()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    #[test]
    fn test_truncates_to_max_comparables() {
        let mut data = Dataset::new();
        data.add_historical_data(
            (0..25).map(|i| sale(&format!("T{:02}", i), "Downtown", 1100.0 + i as f64 * 10.0, date(2024, 3, 1))),
        );
        let config = ValuationConfig::default();

        let set = select_comparables(&data, &subject(), date(2024, 5, 1), &config);
        assert_eq!(set.len(), config.max_comparables);
        assert_eq!(set.comparables[0].transaction.id(), "T10");
    }

    #[test]
    fn test_other_property_types_are_never_comparable() {
        let mut data = Dataset::new();
        data.add_historical_data(vec![
            Transaction::new("V1", "Downtown", PropertyType::Villa, 1200.0, 500_000.0, date(2024, 4, 1)).unwrap(),
        ]);
        let set = select_comparables(&data, &subject(), date(2024, 5, 1), &ValuationConfig::default());
        assert!(set.is_empty());
    }
}
