// Command-line entry point: loads a dataset, runs one engine query and prints JSON.

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use riyadh::config::{AppConfig, ConfigError, EngineConfig, InvestmentGoals, load_config};
use riyadh::dataset::{Dataset, load_dataset};
use riyadh::model::{
    AnalysisError, ForecastPoint, MarketSummary, ModelError, Property, PropertyRecord, PropertyType, RiskLevel,
};
use riyadh::utils::parse_date;
use riyadh::{InvestmentAnalyzer, MarketAnalyzer, PredictiveEngine, sample};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Level, debug, error, info};

/// Riyadh - real-estate valuation and market signals.
#[derive(Parser, Debug)]
#[command(name = "riyadh")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// JSON dataset; overrides `data_path` from the config
    #[arg(short, long, global = true)]
    data: Option<String>,

    /// Use the synthetic dataset generated from this seed
    #[arg(long, global = true, conflicts_with = "data")]
    sample: Option<u64>,

    /// Valuation date (YYYY-MM-DD or YYYY-MM); defaults to today
    #[arg(long, global = true)]
    as_of: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Predict the value of a property
    Predict(PropertyArgs),

    /// Show trend, heat, velocity and classification for an area
    Market {
        location: String,
        /// Trend window in months
        #[arg(long, default_value_t = 12)]
        period: u32,
    },

    /// Project the median price of an area month by month
    Forecast {
        location: String,
        #[arg(long, default_value_t = 12)]
        months: u32,
    },

    /// Rental yield and ROI for buying a property at a given price
    Roi {
        #[command(flatten)]
        property: PropertyArgs,
        /// Purchase price
        #[arg(long)]
        price: f64,
        /// Holding period in years
        #[arg(long, default_value_t = 5)]
        years: u32,
    },

    /// Rank areas as investment opportunities
    Opportunities(OpportunityArgs),

    /// List areas whose recent price growth exceeds a threshold
    Emerging {
        /// Minimum price growth in percent
        #[arg(long, default_value_t = 5.0)]
        min_growth: f64,
    },

    /// Summarise every area concurrently
    Report {
        /// Forecast horizon in months
        #[arg(long, default_value_t = 12)]
        months: u32,
    },
}

#[derive(Args, Debug)]
struct PropertyArgs {
    /// Area the property is in
    #[arg(long)]
    location: String,

    /// apartment, villa, townhouse, commercial or residential
    #[arg(long = "type", default_value = "residential")]
    property_type: PropertyType,

    /// Size in square feet
    #[arg(long)]
    size: f64,

    #[arg(long)]
    bedrooms: Option<u32>,

    #[arg(long)]
    bathrooms: Option<f64>,

    #[arg(long)]
    year_built: Option<i32>,

    /// Comma-separated amenities
    #[arg(long, value_delimiter = ',')]
    amenities: Vec<String>,
}

#[derive(Args, Debug)]
struct OpportunityArgs {
    /// Maximum number of results
    #[arg(long, default_value_t = 10)]
    max: usize,

    /// Minimum total ROI in percent
    #[arg(long, default_value_t = 15.0)]
    min_roi: f64,

    /// Highest acceptable risk: low, medium or high
    #[arg(long, value_parser = parse_risk)]
    risk: Option<RiskLevel>,

    /// Holding period in years
    #[arg(long, default_value_t = 5)]
    years: u32,

    /// Maximum purchase price
    #[arg(long)]
    budget: Option<f64>,

    /// Comma-separated property types to consider
    #[arg(long = "types", value_delimiter = ',')]
    property_types: Vec<PropertyType>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("Failed to serialize output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Invalid date '{0}', expected YYYY-MM-DD or YYYY-MM")]
    Date(String),
    #[error("No dataset: pass --data, --sample or set data_path in the config")]
    NoDataset,
}

#[derive(Serialize)]
struct RoiReport {
    rental_yield_percent: f64,
    monthly_rent: f64,
    projection: riyadh::model::RoiProjection,
}

#[derive(Serialize)]
struct EmergingMarket {
    location: String,
    price_change_percent: f64,
}

#[derive(Serialize)]
struct AreaReport {
    summary: MarketSummary,
    forecast: Vec<ForecastPoint>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let app_config = match &cli.source.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    let as_of = match &cli.source.as_of {
        Some(raw) => parse_date(raw).ok_or_else(|| CliError::Date(raw.clone()))?,
        None => Local::now().date_naive(),
    };
    let data = load_data(&cli.source, &app_config, as_of)?;
    let engine = app_config.engine;
    info!("Valuation date: {}", as_of);

    match cli.command {
        Commands::Predict(args) => {
            let property = build_property(&args)?;
            let prediction = PredictiveEngine::new(&data, &engine).predict_property_value(&property, as_of)?;
            print_json(&prediction)
        }
        Commands::Market { location, period } => {
            let market = MarketAnalyzer::new(&data, &engine);
            let mut summary = market.market_summary(&location);
            summary.trend = market.analyze_market_trend(&location, period);
            print_json(&summary)
        }
        Commands::Forecast { location, months } => {
            let forecast: Vec<ForecastPoint> = PredictiveEngine::new(&data, &engine)
                .forecast_market_trend(&location, months)
                .collect();
            print_json(&forecast)
        }
        Commands::Roi { property, price, years } => {
            let property = build_property(&property)?;
            let investment = InvestmentAnalyzer::new(&data, &engine);
            let report = RoiReport {
                rental_yield_percent: investment.calculate_rental_yield(&property, price)?,
                monthly_rent: investment.estimate_monthly_rent(&property),
                projection: investment.predict_roi(&property, price, years)?,
            };
            print_json(&report)
        }
        Commands::Opportunities(args) => {
            let goals = InvestmentGoals {
                min_roi: args.min_roi,
                risk_tolerance: args.risk.unwrap_or(RiskLevel::High),
                time_horizon_years: args.years,
                property_types: args.property_types,
                max_investment: args.budget,
            };
            let opportunities = InvestmentAnalyzer::new(&data, &engine).find_opportunities(&goals, args.max);
            print_json(&opportunities)
        }
        Commands::Emerging { min_growth } => {
            let emerging: Vec<EmergingMarket> = MarketAnalyzer::new(&data, &engine)
                .emerging_market_growth(min_growth)
                .into_iter()
                .map(|(location, price_change_percent)| EmergingMarket {
                    location,
                    price_change_percent,
                })
                .collect();
            print_json(&emerging)
        }
        Commands::Report { months } => {
            let reports = report(Arc::new(data), Arc::new(engine), months).await?;
            print_json(&reports)
        }
    }
}

/// Evaluates every area on the blocking pool; all tasks share one read-only dataset.
async fn report(data: Arc<Dataset>, engine: Arc<EngineConfig>, months: u32) -> Result<Vec<AreaReport>, CliError> {
    let locations: Vec<String> = data.market_locations().map(str::to_string).collect();
    info!("Building report for {} areas...", locations.len());

    let tasks: Vec<_> = locations
        .into_iter()
        .map(|location| {
            let data = Arc::clone(&data);
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || {
                debug!("Evaluating {}", location);
                AreaReport {
                    summary: MarketAnalyzer::new(&data, &engine).market_summary(&location),
                    forecast: PredictiveEngine::new(&data, &engine)
                        .forecast_market_trend(&location, months)
                        .collect(),
                }
            })
        })
        .collect();

    let mut reports = Vec::new();
    for result in join_all(tasks).await {
        reports.push(result?);
    }
    Ok(reports)
}

fn load_data(source: &SourceArgs, config: &AppConfig, as_of: NaiveDate) -> Result<Dataset, CliError> {
    if let Some(seed) = source.sample {
        info!("Generating sample dataset (seed {})", seed);
        return Ok(sample::generate(seed, as_of));
    }
    let path = source
        .data
        .as_deref()
        .or(config.data_path.as_deref())
        .ok_or(CliError::NoDataset)?;
    Ok(load_dataset(path)?)
}

fn build_property(args: &PropertyArgs) -> Result<Property, ModelError> {
    PropertyRecord {
        id: format!("cli-{}", Local::now().format("%Y%m%d%H%M%S")),
        location: args.location.clone(),
        property_type: args.property_type,
        square_footage: args.size,
        bedrooms: args.bedrooms,
        bathrooms: args.bathrooms,
        year_built: args.year_built,
        amenities: args.amenities.clone(),
        ..Default::default()
    }
    .try_into()
}

fn parse_risk(raw: &str) -> Result<RiskLevel, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" => Ok(RiskLevel::Low),
        "medium" => Ok(RiskLevel::Medium),
        "high" => Ok(RiskLevel::High),
        other => Err(format!("unknown risk level '{}'", other)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
