//! # Command Line Interface
//!
//! CLI for running dashboard requests against an order store fixture and
//! inspecting range resolution and cache keys.

use crate::config::AnalyticsConfig;
use crate::engine::AggregationEngine;
use crate::filters::{FilterDimension, FilterSet, ViewType};
use crate::range::{parse_iso_date, Clock, DateRangeResolver, FixedClock, RangeName, SystemClock};
use crate::request::DashboardRequest;
use crate::store::{InMemoryOrderStore, StoreFixture};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Donation analytics CLI
#[derive(Parser)]
#[command(name = "analytics-cli")]
#[command(about = "Donation dashboard analytics from the command line")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute a dashboard payload from a JSON store fixture
    Compute {
        /// Order store fixture
        #[arg(short, long)]
        store: PathBuf,

        #[command(flatten)]
        request: RequestArgs,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Resolve a symbolic range and show its class
    Resolve {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Print the cache key a request maps to
    CacheKey {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Write the default configuration to a file
    Config {
        /// Output path
        #[arg(short, long, default_value = "analytics.toml")]
        output: PathBuf,
    },
}

/// Request parameters shared by the subcommands
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Symbolic range (today, last7days, thismonth, custom, ...)
    #[arg(short, long, default_value = "last30days")]
    pub range: String,

    /// Custom range start (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<String>,

    /// Custom range end (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<String>,

    /// daily or weekly
    #[arg(long, default_value = "daily")]
    pub view: String,

    /// Dashboard tab (raised, payment, country, daytime, designation, url, frequency, customer)
    #[arg(short, long, default_value = "raised")]
    pub tab: String,

    /// Filter as key=value, repeatable
    #[arg(short, long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,

    /// Override today's date (YYYY-MM-DD)
    #[arg(long)]
    pub today: Option<String>,
}

impl RequestArgs {
    /// Build a validated dashboard request
    pub fn to_request(&self) -> Result<DashboardRequest> {
        let mut filters = FilterSet::new();
        for raw in &self.filters {
            let (key, value) = FilterSet::parse_assignment(raw)?;
            filters = filters.with(key, value);
        }

        Ok(DashboardRequest {
            date_range: self.range.parse::<RangeName>()?,
            date_from: self.from.clone(),
            date_to: self.to.clone(),
            view_type: self.view.parse::<ViewType>()?,
            filter: self.tab.parse::<FilterDimension>()?,
            filters,
            minimal: false,
        })
    }

    fn clock(&self, config: &AnalyticsConfig) -> Result<Box<dyn Clock>> {
        Ok(match &self.today {
            Some(today) => Box::new(FixedClock(parse_iso_date(today)?)),
            None => Box::new(SystemClock::with_offset_minutes(config.range.utc_offset_minutes)),
        })
    }
}

/// CLI handler
pub struct CliHandler {
    config: AnalyticsConfig,
}

impl CliHandler {
    /// Create new CLI handler, loading the configuration file when given
    pub fn new(config_path: Option<&PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => AnalyticsConfig::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => AnalyticsConfig::default(),
        };
        Ok(Self { config })
    }

    /// Handle CLI commands
    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Compute { store, request, pretty } => {
                self.compute(&store, &request, pretty).await?;
            }
            Commands::Resolve { request } => {
                self.resolve(&request)?;
            }
            Commands::CacheKey { request } => {
                self.cache_key(&request)?;
            }
            Commands::Config { output } => {
                self.write_config(&output)?;
            }
        }
        Ok(())
    }

    fn engine(&self, store: InMemoryOrderStore, args: &RequestArgs) -> Result<AggregationEngine> {
        Ok(AggregationEngine::new(Arc::new(store), self.config.clone())
            .with_clock(args.clock(&self.config)?))
    }

    /// Run one request and print the JSON payload
    async fn compute(&self, store_path: &PathBuf, args: &RequestArgs, pretty: bool) -> Result<()> {
        let store = InMemoryOrderStore::from_json_file(store_path)?;
        let engine = self.engine(store, args)?;
        let request = args.to_request()?;

        let response = match engine.compute(&request).await {
            Ok(response) => response,
            Err(err) => anyhow::bail!("{}", err.user_message()),
        };

        let json = if pretty {
            serde_json::to_string_pretty(&response)?
        } else {
            serde_json::to_string(&response)?
        };
        println!("{}", json);
        Ok(())
    }

    /// Show the concrete dates of a range
    fn resolve(&self, args: &RequestArgs) -> Result<()> {
        let request = args.to_request()?;
        let resolver = DateRangeResolver::new(args.clock(&self.config)?, self.config.range.clone());
        let range = resolver.resolve(
            request.date_range,
            request.date_from.as_deref(),
            request.date_to.as_deref(),
        )?;
        let class = resolver.classify(request.date_range, &range);

        println!("Range:  {} ({})", request.date_range, range);
        println!("Days:   {}", range.day_count());
        println!("Class:  {:?}", class);
        println!("Chunks: {}", range.chunks(self.config.range.chunk_days).len());
        Ok(())
    }

    /// Show the cache key of a request
    fn cache_key(&self, args: &RequestArgs) -> Result<()> {
        let engine = self.engine(InMemoryOrderStore::new(StoreFixture::default()), args)?;
        let key = engine.cache_key(&args.to_request()?)?;
        println!("{}", key.id());
        println!("{}", key.as_str());
        Ok(())
    }

    /// Write the default configuration
    fn write_config(&self, output: &PathBuf) -> Result<()> {
        AnalyticsConfig::default().save_to_file(output)?;
        println!("Wrote default configuration to {}", output.display());
        Ok(())
    }
}
