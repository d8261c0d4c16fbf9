use std::sync::Arc;

use alloy::primitives::{Address, I256, U256};
use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::signal;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use recoup::cli::{self, Cli, Commands};
use recoup::clients::sim::{SimCreditFacility, SimOracle, SimReputation, SimSettlement, SimVenue};
use recoup::clients::VenueClient;
use recoup::config::{AppConfig, LoggingConfig};
use recoup::domain::{math, Direction, PairKey, TradePayload};
use recoup::engine::{
    AccessRegistry, AgentRouter, CreditFundedExecutor, DecisionCategory, DefaultBackrunAgent,
    DefaultCaptureAgent, DefaultFeeAgent, DivergenceAnalyzer, FeeRecommender, OpportunityLedger,
    ProfitDistributor, RecordOutcome, TradeIntent, TradePipeline,
};
use recoup::error::{RecoupError, Result};
use recoup::services::Metrics;

/// Ticks between status log lines and expiry sweeps in the sim loop.
const STATUS_EVERY: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => {
            init_logging_simple();
            cli::check_config(&cli.config)?;
        }
        Some(Commands::Divergence {
            venue,
            reference,
            amount,
            liquidity,
            json,
        }) => {
            init_logging_simple();
            let config = load_config(&cli.config);
            cli::preview_divergence(&config, venue, reference, amount, liquidity, *json)?;
        }
        Some(Commands::Split {
            profit,
            treasury_bps,
            lp_bps,
            json,
        }) => {
            init_logging_simple();
            let config = load_config(&cli.config);
            cli::preview_split(&config, profit, *treasury_bps, *lp_bps, *json)?;
        }
        Some(Commands::Status { ticks }) => {
            init_logging_simple();
            let config = load_config(&cli.config);
            run_status_burst(&config, *ticks).await?;
        }
        Some(Commands::Run) | None => {
            let config = load_config(&cli.config);
            init_logging(&config.logging);
            run_engine(&config).await?;
        }
    }

    Ok(())
}

/// Load configuration, falling back to built-in defaults when the directory
/// is missing or incomplete. `check-config` is the strict path.
fn load_config(config_dir: &str) -> AppConfig {
    match AppConfig::load_from(config_dir) {
        Ok(config) => match config.validate() {
            Ok(()) => config,
            Err(problems) => {
                eprintln!(
                    "Warning: configuration incomplete ({} problems), using built-in defaults",
                    problems.len()
                );
                AppConfig::default_config(true)
            }
        },
        Err(e) => {
            eprintln!(
                "Warning: config load failed ({}), using built-in defaults",
                e
            );
            AppConfig::default_config(true)
        }
    }
}

// =============================================================================
// Simulated engine wiring
// =============================================================================

/// The full engine stack wired to the in-memory collaborators.
struct SimEngine {
    pair: PairKey,
    reference_price: U256,
    trade_size: U256,
    min_profit_floor: U256,
    jitter_bps: u64,
    payload_fee_bps: u32,
    keeper: Address,
    venue: Arc<SimVenue>,
    oracle: Arc<SimOracle>,
    router: Arc<AgentRouter>,
    pipeline: TradePipeline,
    executor: CreditFundedExecutor,
    distributor: Arc<ProfitDistributor>,
    ledger: Arc<OpportunityLedger>,
    metrics: Arc<Metrics>,
}

impl SimEngine {
    fn build(config: &AppConfig) -> Result<Self> {
        let sim = &config.sim;
        let pair = sim.pair()?;
        let reference_price = sim.start_price_wad()?;
        let liquidity = sim.liquidity_wad()?;
        let trade_size = sim.trade_size_wad()?;

        let keeper = config
            .access
            .executor_addresses()?
            .first()
            .copied()
            .ok_or_else(|| {
                RecoupError::Validation("access.executors must list at least one keeper".to_string())
            })?;
        let access = Arc::new(AccessRegistry::from_config(&config.access)?);
        let metrics = Arc::new(Metrics::new());

        let venue = Arc::new(SimVenue::new());
        venue.set_pool(pair, reference_price, liquidity, sim.fee_bps);
        let oracle = Arc::new(SimOracle::new());
        oracle.set_price(pair.base, pair.quote, reference_price, Utc::now());

        let analyzer = Arc::new(DivergenceAnalyzer::new(config.analyzer.clone())?);
        let fees = Arc::new(FeeRecommender::new(config.fees.clone()));
        let router = Arc::new(AgentRouter::with_defaults(
            access.clone(),
            Arc::new(SimReputation::new(I256::ZERO)),
            Arc::new(DefaultCaptureAgent::new(analyzer.clone())),
            Arc::new(DefaultFeeAgent::new(fees.clone())),
            Arc::new(DefaultBackrunAgent::new(&config.analyzer)),
        ));
        let ledger = Arc::new(OpportunityLedger::new(
            &config.ledger,
            access.clone(),
            metrics.clone(),
        ));
        let distributor = Arc::new(ProfitDistributor::new(
            &config.distribution,
            venue.clone(),
            Arc::new(SimSettlement::new()),
            metrics.clone(),
        )?);
        let executor = CreditFundedExecutor::new(
            ledger.clone(),
            venue.clone(),
            Arc::new(SimCreditFacility::new(sim.credit_premium_bps)),
            distributor.clone(),
            access.clone(),
            metrics.clone(),
        );
        let pipeline = TradePipeline::new(
            access,
            oracle.clone(),
            venue.clone(),
            router.clone(),
            ledger.clone(),
            distributor.clone(),
            fees,
            metrics.clone(),
        );

        Ok(Self {
            pair,
            reference_price,
            trade_size,
            min_profit_floor: math::bps_of(trade_size, config.ledger.min_profit_bps)?,
            jitter_bps: sim.jitter_bps,
            payload_fee_bps: config.fees.default_fee_bps,
            keeper,
            venue,
            oracle,
            router,
            pipeline,
            executor,
            distributor,
            ledger,
            metrics,
        })
    }

    /// One simulated venue trade: walk the price, run the pre/post-trade
    /// pipeline, and chase any recorded opportunity with a correction.
    async fn tick(&self, rng: &mut StdRng) -> Result<()> {
        let state = self.venue.spot_state(self.pair).await?;
        let jitter = rng.gen_range(0..=self.jitter_bps) as u32;
        let delta = math::bps_of(state.price, jitter)?;
        let price = if rng.gen_bool(0.5) {
            state.price.saturating_add(delta)
        } else {
            state.price.saturating_sub(delta)
        };
        self.venue.set_price(self.pair, price);
        self.oracle
            .set_price(self.pair.base, self.pair.quote, self.reference_price, Utc::now());

        let direction = if rng.gen_bool(0.5) {
            Direction::Buy
        } else {
            Direction::Sell
        };
        let intent = TradeIntent {
            pair: self.pair,
            direction,
            amount: self.trade_size,
            payload: TradePayload::new(self.payload_fee_bps),
        };
        self.pipeline.pre_trade(&intent).await?;
        let report = self.pipeline.post_trade(&intent).await?;

        if matches!(report.outcome, Some(RecordOutcome::Recorded)) {
            // A correction trades the dislocated pool back to the reference.
            self.venue.set_reversion(self.pair, self.reference_price);
            if let Err(err) = self
                .executor
                .execute(self.keeper, self.pair, self.min_profit_floor, &intent.payload)
                .await
            {
                debug!(pair = %self.pair, error = %err, "correction attempt did not complete");
            }
        }

        if self
            .distributor
            .can_donate(self.pair, Utc::now())
            .await
            .is_ready()
        {
            if let Err(err) = self.distributor.donate(self.pair, Utc::now()).await {
                warn!(pair = %self.pair, error = %err, "donation attempt failed");
            }
        }
        Ok(())
    }
}

async fn run_engine(config: &AppConfig) -> Result<()> {
    if !config.dry_run {
        warn!("live venue integration is not wired in; driving the simulated venue");
    }
    let engine = SimEngine::build(config)?;
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.sim.interval_ms.max(1)));
    info!(
        pair = %engine.pair,
        price = %math::format_wad(engine.reference_price),
        interval_ms = config.sim.interval_ms,
        "starting dislocation capture loop"
    );

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = engine.tick(&mut rng).await {
                    warn!(error = %err, "sim tick failed");
                }
                ticks += 1;
                if ticks % STATUS_EVERY == 0 {
                    engine.ledger.sweep_expired(Utc::now()).await;
                    engine.metrics.log_status();
                }
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
    engine.metrics.log_status();
    Ok(())
}

async fn run_status_burst(config: &AppConfig, ticks: u64) -> Result<()> {
    let engine = SimEngine::build(config)?;
    let mut rng = StdRng::from_entropy();
    for _ in 0..ticks {
        if let Err(err) = engine.tick(&mut rng).await {
            warn!(error = %err, "sim tick failed");
        }
    }
    println!("{}", engine.metrics.summary());
    println!(
        "pending opportunities: {}",
        engine.ledger.pending(Utc::now()).await.len()
    );
    for (asset, amount) in engine.distributor.accumulated_for_pair(engine.pair).await {
        println!("accumulated {}: {}", asset, math::format_wad(amount));
    }
    for category in DecisionCategory::all() {
        let slot = engine.router.status(category).await;
        println!(
            "{} agent: primary={:?} backup={:?} enabled={}",
            category, slot.primary, slot.backup, slot.enabled
        );
    }
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},recoup=debug", logging.level)));

    let log_dir = std::env::var("RECOUP_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .unwrap_or_else(|_| "/var/log/recoup".to_string());

    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial log file, so preflight writability first.
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".recoup_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, "recoup.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the writer alive for the life of the process.
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: could not create log directory {}, file logging disabled",
            log_dir
        );
        None
    };
    let file_logging_enabled = file_layer.is_some();

    let (console_layer, json_layer) = if logging.json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/recoup.log", log_dir);
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
