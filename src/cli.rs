use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::clients::PriceSample;
use crate::config::AppConfig;
use crate::domain::{math, TradePayload};
use crate::engine::{
    AnalysisInput, AnalysisOutcome, DivergenceAnalyzer, FeeRecommendation, FeeRecommender,
    SplitShares,
};
use crate::error::{RecoupError, Result};

#[derive(Parser)]
#[command(name = "recoup")]
#[command(version = "0.1.0")]
#[command(about = "Venue dislocation capture and correction engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory path
    #[arg(short, long, default_value = "config")]
    pub config: String,

    /// Drive the engine against simulated collaborators (no live venue)
    #[arg(short, long, default_value = "true")]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the capture/correction loop
    Run,
    /// Load, validate and print the effective configuration
    CheckConfig,
    /// One-shot divergence analysis for a venue/reference price pair
    Divergence {
        /// Venue spot price (decimal, quote per base)
        #[arg(long)]
        venue: String,
        /// Oracle reference price (decimal)
        #[arg(long)]
        reference: String,
        /// Triggering trade size (decimal, whole units)
        #[arg(long, default_value = "100.0")]
        amount: String,
        /// Pool liquidity (decimal, whole units)
        #[arg(long, default_value = "1000000.0")]
        liquidity: String,
        /// Print the analysis as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Preview how a profit amount splits between LPs, treasury and executor
    Split {
        /// Total profit to split (decimal, whole units)
        #[arg(long)]
        profit: String,
        /// Treasury share override in bps
        #[arg(long)]
        treasury_bps: Option<u32>,
        /// LP share override in bps
        #[arg(long)]
        lp_bps: Option<u32>,
        /// Print the split as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run a short burst of simulated trades and print the engine status
    Status {
        /// Number of simulated trades to push through the pipeline
        #[arg(long, default_value = "25")]
        ticks: u64,
    },
}

pub fn check_config(config_dir: &str) -> Result<()> {
    let config = AppConfig::load_from(config_dir)?;

    if let Err(problems) = config.validate() {
        println!("\x1b[31m✗ Configuration invalid ({} problems)\x1b[0m", problems.len());
        for problem in &problems {
            println!("  - {}", problem);
        }
        return Err(RecoupError::Validation(format!(
            "{} configuration problems",
            problems.len()
        )));
    }

    println!("\x1b[36m=== recoup configuration ===\x1b[0m");
    println!("\x1b[33mAnalyzer:\x1b[0m");
    println!("  min divergence:     {} bps", config.analyzer.min_divergence_bps);
    println!("  capture share:      {} bps", config.analyzer.capture_share_bps);
    println!("  max capture ratio:  {} bps", config.analyzer.max_capture_ratio_bps);
    println!("  liquidity floor:    {}", config.analyzer.liquidity_floor);
    println!("  max staleness:      {}s", config.analyzer.max_staleness_secs);
    println!("\x1b[33mFees:\x1b[0m");
    println!("  default fee:        {} bps", config.fees.default_fee_bps);
    println!("  max fee:            {} bps", config.fees.max_fee_bps);
    println!("  fee scale:          {} bps", config.fees.fee_scale_bps);
    println!("\x1b[33mLedger:\x1b[0m");
    println!("  max opportunity age: {}s", config.ledger.max_opportunity_age_secs);
    println!("  min profit:          {} bps", config.ledger.min_profit_bps);
    println!("  min divergence:      {} bps", config.ledger.min_divergence_bps);
    println!("\x1b[33mDistribution:\x1b[0m");
    println!("  LP share:           {} bps", config.distribution.default_lp_share_bps);
    println!("  treasury share:     {} bps", config.distribution.default_treasury_bps);
    println!("  donate threshold:   {}", config.distribution.min_donate_amount);
    println!("  donate interval:    {}s", config.distribution.min_donate_interval_secs);
    println!("\x1b[33mAccess:\x1b[0m");
    println!("  owner:              {}", config.access.owner);
    println!("  pipeline:           {}", config.access.pipeline);
    println!("  executors:          {}", config.access.executors.len());
    println!("\ndry_run: {}", config.dry_run);
    println!("\x1b[32m✓ Configuration valid\x1b[0m");
    Ok(())
}

/// JSON shape for `divergence --json`.
#[derive(Serialize)]
struct DivergenceReport {
    venue_price: String,
    reference_price: String,
    outcome: AnalysisOutcome,
    fee: FeeRecommendation,
}

pub fn preview_divergence(
    config: &AppConfig,
    venue: &str,
    reference: &str,
    amount: &str,
    liquidity: &str,
    json: bool,
) -> Result<()> {
    let analyzer = DivergenceAnalyzer::new(config.analyzer.clone())?;
    let fees = FeeRecommender::new(config.fees.clone());

    let venue_price = math::parse_wad(venue)?;
    let reference_price = math::parse_wad(reference)?;
    let trade_size = math::parse_wad(amount)?;
    let liquidity = math::parse_wad(liquidity)?;

    let now = Utc::now();
    let sample = PriceSample::new(reference_price, 0, now);
    let input = AnalysisInput {
        venue_price,
        reference: Some(&sample),
        trade_size,
        liquidity,
        now,
    };
    let outcome = analyzer.analyze(&input)?;
    let payload = TradePayload::default();
    let recommendation = fees.recommend(&outcome, &payload);

    if json {
        let report = DivergenceReport {
            venue_price: math::format_wad(venue_price),
            reference_price: math::format_wad(reference_price),
            outcome,
            fee: recommendation,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\x1b[36m=== divergence analysis ===\x1b[0m");
    println!("  venue price:     {}", math::format_wad(venue_price));
    println!("  reference price: {}", math::format_wad(reference_price));
    match outcome {
        AnalysisOutcome::Capture {
            amount,
            divergence_bps,
        } => {
            println!("  divergence:      {} bps", divergence_bps);
            println!("\x1b[32m✓ capture {}\x1b[0m", math::format_wad(amount));
        }
        AnalysisOutcome::BelowThreshold { divergence_bps } => {
            println!("  divergence:      {} bps", divergence_bps);
            println!(
                "\x1b[33m- below the {} bps threshold, no capture\x1b[0m",
                analyzer.min_divergence_bps()
            );
        }
        AnalysisOutcome::ThinLiquidity { liquidity } => {
            println!("  liquidity:       {}", math::format_wad(liquidity));
            println!("\x1b[31m! thin liquidity, protective fee only\x1b[0m");
        }
        AnalysisOutcome::NoReference => {
            println!("\x1b[31m! no usable reference price\x1b[0m");
        }
    }
    println!(
        "  fee: {} bps ({})",
        recommendation.fee_bps, recommendation.reason
    );
    Ok(())
}

/// JSON shape for `split --json`.
#[derive(Serialize)]
struct SplitPreview {
    total: String,
    lp_share_bps: u32,
    treasury_bps: u32,
    shares: SplitShares,
}

pub fn preview_split(
    config: &AppConfig,
    profit: &str,
    treasury_bps: Option<u32>,
    lp_bps: Option<u32>,
    json: bool,
) -> Result<()> {
    let total = math::parse_wad(profit)?;
    let lp_share_bps = lp_bps.unwrap_or(config.distribution.default_lp_share_bps);
    let treasury_bps = treasury_bps.unwrap_or(config.distribution.default_treasury_bps);
    let shares = SplitShares::resolve(total, lp_share_bps, treasury_bps)?;

    if json {
        let preview = SplitPreview {
            total: math::format_wad(total),
            lp_share_bps,
            treasury_bps,
            shares,
        };
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    println!("\x1b[36m=== profit split ===\x1b[0m");
    println!("  total:    {}", math::format_wad(total));
    println!("  LPs:      {} ({} bps)", math::format_wad(shares.lp), lp_share_bps);
    println!(
        "  treasury: {} ({} bps)",
        math::format_wad(shares.treasury),
        treasury_bps
    );
    println!("  executor: {}", math::format_wad(shares.executor));
    Ok(())
}
