use crate::config::ConfigError;
use crate::model::{MarketData, Neighborhood, Transaction};
use crate::utils::{location_key, month_start};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use tracing::{debug, info, warn};

/// On-disk layout of a dataset file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetFile {
    pub transactions: Vec<Transaction>,
    pub market_data: Vec<MarketData>,
    pub neighborhoods: Vec<Neighborhood>,
}

/// Historical data shared by all analyzers.
///
/// Loading takes `&mut self` and querying takes `&self`, so a loaded dataset can
/// be shared across threads for concurrent queries.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    transactions: Vec<Transaction>,
    transaction_ids: HashSet<String>,
    market: BTreeMap<String, BTreeMap<NaiveDate, MarketData>>,
    neighborhoods: HashMap<String, Neighborhood>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file_contents(file: DatasetFile) -> Self {
        let mut dataset = Self::new();
        dataset.add_historical_data(file.transactions);
        dataset.add_market_data(file.market_data);
        dataset.add_neighborhoods(file.neighborhoods);
        dataset
    }

    /// Appends transactions; ones whose id is already loaded are skipped.
    /// Returns how many were added.
    pub fn add_historical_data(&mut self, transactions: impl IntoIterator<Item = Transaction>) -> usize {
        let mut added = 0;
        for tx in transactions {
            if !self.transaction_ids.insert(tx.id().to_string()) {
                debug!("Skipping duplicate transaction {}", tx.id());
                continue;
            }
            self.transactions.push(tx);
            added += 1;
        }
        self.transactions
            .sort_by(|a, b| a.sale_date().cmp(&b.sale_date()).then_with(|| a.id().cmp(b.id())));
        debug!("Loaded {} transactions ({} total)", added, self.transactions.len());
        added
    }

    /// Adds monthly snapshots. The first snapshot for a (location, month) wins;
    /// snapshots with a non-positive median price are rejected.
    pub fn add_market_data(&mut self, snapshots: impl IntoIterator<Item = MarketData>) -> usize {
        let mut added = 0;
        for mut snapshot in snapshots {
            if !snapshot.median_price.is_finite() || snapshot.median_price <= 0.0 {
                warn!(
                    "Rejecting snapshot for {} ({}): median price {}",
                    snapshot.location, snapshot.period, snapshot.median_price
                );
                continue;
            }
            if !snapshot.avg_days_on_market.is_finite() || snapshot.avg_days_on_market < 0.0 {
                warn!(
                    "Rejecting snapshot for {} ({}): days on market {}",
                    snapshot.location, snapshot.period, snapshot.avg_days_on_market
                );
                continue;
            }
            snapshot.period = month_start(snapshot.period);
            let series = self.market.entry(location_key(&snapshot.location)).or_default();
            if series.contains_key(&snapshot.period) {
                debug!("Skipping duplicate snapshot for {} ({})", snapshot.location, snapshot.period);
                continue;
            }
            series.insert(snapshot.period, snapshot);
            added += 1;
        }
        debug!("Loaded {} market snapshots", added);
        added
    }

    /// Adds neighborhood profiles; at most one per location.
    pub fn add_neighborhoods(&mut self, records: impl IntoIterator<Item = Neighborhood>) -> usize {
        let mut added = 0;
        for record in records {
            let key = location_key(&record.location);
            if self.neighborhoods.contains_key(&key) {
                debug!("Skipping duplicate neighborhood {}", record.location);
                continue;
            }
            self.neighborhoods.insert(key, record);
            added += 1;
        }
        added
    }

    /// Transactions in sale-date order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Snapshots for a location in chronological order.
    pub fn snapshots(&self, location: &str) -> Vec<&MarketData> {
        self.market
            .get(&location_key(location))
            .map(|series| series.values().collect())
            .unwrap_or_default()
    }

    pub fn latest_snapshot(&self, location: &str) -> Option<&MarketData> {
        self.market
            .get(&location_key(location))
            .and_then(|series| series.values().next_back())
    }

    /// Snapshots whose period starts on or before `as_of`, in chronological order.
    pub fn snapshots_until(&self, location: &str, as_of: NaiveDate) -> Vec<&MarketData> {
        self.market
            .get(&location_key(location))
            .map(|series| series.range(..=as_of).map(|(_, s)| s).collect())
            .unwrap_or_default()
    }

    pub fn latest_snapshot_until(&self, location: &str, as_of: NaiveDate) -> Option<&MarketData> {
        self.market
            .get(&location_key(location))
            .and_then(|series| series.range(..=as_of).next_back().map(|(_, s)| s))
    }

    pub fn data_point_count(&self, location: &str) -> usize {
        self.market.get(&location_key(location)).map_or(0, |series| series.len())
    }

    pub fn data_point_count_until(&self, location: &str, as_of: NaiveDate) -> usize {
        self.market
            .get(&location_key(location))
            .map_or(0, |series| series.range(..=as_of).count())
    }

    /// Display names of every location with market data, ordered by key.
    pub fn market_locations(&self) -> impl Iterator<Item = &str> {
        self.market
            .values()
            .filter_map(|series| series.values().next().map(|s| s.location.as_str()))
    }

    pub fn neighborhood(&self, location: &str) -> Option<&Neighborhood> {
        self.neighborhoods.get(&location_key(location))
    }

    pub fn neighborhoods(&self) -> impl Iterator<Item = &Neighborhood> {
        self.neighborhoods.values()
    }
}

/// Reads a JSON dataset file.
pub fn load_dataset(path: &str) -> Result<Dataset, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let file: DatasetFile = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;
    info!(
        "Read {} transactions, {} snapshots, {} neighborhoods from {}",
        file.transactions.len(),
        file.market_data.len(),
        file.neighborhoods.len(),
        path
    );
    Ok(Dataset::from_file_contents(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyType;
    use std::io::Write;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(location: &str, period: NaiveDate, median: f64) -> MarketData {
        MarketData {
            location: location.into(),
            period,
            median_price: median,
            sales_volume: 40,
            inventory: 100,
            avg_days_on_market: 35.0,
        }
    }

    #[test]
    fn test_transactions_are_deduplicated_and_sorted() {
        let late = Transaction::new("T2", "Downtown", PropertyType::Apartment, 1000.0, 300_000.0, date(2024, 6, 1))
            .unwrap();
        let early = Transaction::new("T1", "Downtown", PropertyType::Apartment, 1000.0, 290_000.0, date(2024, 1, 1))
            .unwrap();

        let mut data = Dataset::new();
        assert_eq!(data.add_historical_data(vec![late.clone(), early.clone()]), 2);
        assert_eq!(data.add_historical_data(vec![late]), 0);

        let ids: Vec<&str> = data.transactions().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["T1", "T2"]);
    }

    #[test]
    fn test_market_data_is_keyed_by_location_and_month() {
        let mut data = Dataset::new();
        let added = data.add_market_data(vec![
            snapshot("Downtown", date(2024, 2, 15), 410_000.0),
            snapshot("downtown", date(2024, 2, 1), 999_999.0),
            snapshot("Downtown", date(2024, 1, 1), 400_000.0),
            snapshot("Downtown", date(2024, 3, 1), 0.0),
        ]);

        assert_eq!(added, 2);
        assert_eq!(data.data_point_count("DOWNTOWN"), 2);
        let series = data.snapshots("Downtown");
        assert_eq!(series[0].period, date(2024, 1, 1));
        assert_eq!(series[1].period, date(2024, 2, 1));
        assert_eq!(data.latest_snapshot("downtown").unwrap().median_price, 410_000.0);
        assert!(data.snapshots("Nowhere").is_empty());
    }

    #[test]
    fn test_snapshot_queries_bounded_by_date() {
        let mut data = Dataset::new();
        data.add_market_data(vec![
            snapshot("Downtown", date(2024, 1, 1), 400_000.0),
            snapshot("Downtown", date(2024, 2, 1), 405_000.0),
            snapshot("Downtown", date(2024, 3, 1), 410_000.0),
        ]);

        let until = data.snapshots_until("downtown", date(2024, 2, 20));
        assert_eq!(until.len(), 2);
        assert_eq!(data.data_point_count_until("Downtown", date(2024, 2, 20)), 2);
        assert_eq!(
            data.latest_snapshot_until("Downtown", date(2024, 2, 1)).map(|s| s.median_price),
            Some(405_000.0)
        );
        assert!(data.latest_snapshot_until("Downtown", date(2023, 12, 31)).is_none());
        assert_eq!(data.data_point_count_until("Nowhere", date(2024, 3, 1)), 0);
    }

    #[test]
    fn test_neighborhoods_are_a_lookup_table() {
        let hood = Neighborhood {
            location: "Olaya".into(),
            crime_rate: 3.0,
            school_rating: 8.0,
            median_income: 90_000.0,
            walkability_score: 80.0,
            population_growth_rate: 2.0,
            employment_rate: None,
        };
        let mut data = Dataset::new();
        assert_eq!(data.add_neighborhoods(vec![hood.clone(), hood]), 1);
        assert!(data.neighborhood("olaya").is_some());
    }

    #[test]
    fn test_load_dataset_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "transactions": [{{"id":"T1","location":"Downtown","property_type":"apartment",
                                   "square_footage":1200,"sale_price":420000,"sale_date":"2024-03-01"}}],
                "market_data": [{{"location":"Downtown","period":"2024-03-01","median_price":420000,
                                  "sales_volume":40,"inventory":100,"avg_days_on_market":30}}]
            }}"#
        )
        .unwrap();

        let data = load_dataset(file.path().to_str().unwrap()).unwrap();
        assert_eq!(data.transactions().len(), 1);
        assert_eq!(data.data_point_count("Downtown"), 1);
        assert_eq!(data.market_locations().collect::<Vec<_>>(), vec!["Downtown"]);
    }

    #[test]
    fn test_load_dataset_rejects_invalid_transaction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"transactions": [{{"id":"T1","location":"Downtown","property_type":"apartment",
                                    "square_footage":0,"sale_price":420000,"sale_date":"2024-03-01"}}]}}"#
        )
        .unwrap();

        let err = load_dataset(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
