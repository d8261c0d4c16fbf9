use crate::domain::{math, PairKey};
use crate::error::{RecoupError, Result as EngineResult};
use alloy::primitives::{Address, U256};
use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    pub access: AccessConfig,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Run against simulated collaborators only
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

/// Divergence analysis and capture sizing
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Minimum divergence before any capture, in bps
    #[serde(default = "default_min_divergence_bps")]
    pub min_divergence_bps: u64,
    /// Share of the swap-implied opportunity size to capture, in bps
    #[serde(default = "default_capture_share_bps")]
    pub capture_share_bps: u32,
    /// Hard cap on capture as a fraction of available liquidity, in bps
    #[serde(default = "default_max_capture_ratio_bps")]
    pub max_capture_ratio_bps: u32,
    /// Below this liquidity (decimal, whole units) sizing is skipped and the
    /// protective max fee is recommended instead
    #[serde(default = "default_liquidity_floor")]
    pub liquidity_floor: String,
    /// Oracle samples older than this are rejected
    #[serde(default = "default_max_staleness_secs")]
    pub max_staleness_secs: i64,
}

fn default_min_divergence_bps() -> u64 {
    50
}

fn default_capture_share_bps() -> u32 {
    8000
}

fn default_max_capture_ratio_bps() -> u32 {
    5000
}

fn default_liquidity_floor() -> String {
    "10.0".to_string()
}

fn default_max_staleness_secs() -> i64 {
    60
}

impl AnalyzerConfig {
    pub fn liquidity_floor_wad(&self) -> EngineResult<U256> {
        math::parse_wad(&self.liquidity_floor)
    }

    pub fn max_staleness(&self) -> Duration {
        Duration::seconds(self.max_staleness_secs)
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_divergence_bps: default_min_divergence_bps(),
            capture_share_bps: default_capture_share_bps(),
            max_capture_ratio_bps: default_max_capture_ratio_bps(),
            liquidity_floor: default_liquidity_floor(),
            max_staleness_secs: default_max_staleness_secs(),
        }
    }
}

/// Fee recommendation bounds
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Fee recommended when nothing else applies, in bps
    #[serde(default = "default_fee_bps")]
    pub default_fee_bps: u32,
    /// Protective ceiling for any recommendation, in bps
    #[serde(default = "default_max_fee_bps")]
    pub max_fee_bps: u32,
    /// Linear divergence-to-fee multiplier, in bps of bps (10000 = 1:1)
    #[serde(default = "default_fee_scale_bps")]
    pub fee_scale_bps: u32,
}

fn default_fee_bps() -> u32 {
    30
}

fn default_max_fee_bps() -> u32 {
    3000
}

fn default_fee_scale_bps() -> u32 {
    10_000
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            default_fee_bps: default_fee_bps(),
            max_fee_bps: default_max_fee_bps(),
            fee_scale_bps: default_fee_scale_bps(),
        }
    }
}

/// Opportunity lifecycle bounds
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// An opportunity older than this can never execute
    #[serde(default = "default_max_opportunity_age_secs")]
    pub max_opportunity_age_secs: i64,
    /// Estimated profit below this fraction of the candidate amount is not
    /// worth recording, in bps
    #[serde(default = "default_min_profit_bps")]
    pub min_profit_bps: u32,
    /// Post-trade divergence below this is not worth recording, in bps
    #[serde(default = "default_min_divergence_bps")]
    pub min_divergence_bps: u64,
}

fn default_max_opportunity_age_secs() -> i64 {
    300
}

fn default_min_profit_bps() -> u32 {
    30
}

impl LedgerConfig {
    pub fn max_opportunity_age(&self) -> Duration {
        Duration::seconds(self.max_opportunity_age_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_opportunity_age_secs: default_max_opportunity_age_secs(),
            min_profit_bps: default_min_profit_bps(),
            min_divergence_bps: default_min_divergence_bps(),
        }
    }
}

/// Profit split and donation gating
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    /// Default LP share of realized profit, in bps
    #[serde(default = "default_lp_share_bps")]
    pub default_lp_share_bps: u32,
    /// Default treasury share of realized profit, in bps
    #[serde(default)]
    pub default_treasury_bps: u32,
    /// Treasury address for the default split (hex; may stay zero while
    /// `default_treasury_bps` is zero)
    #[serde(default = "default_zero_address")]
    pub treasury: String,
    /// Minimum accumulated amount (decimal, whole units) before a donation
    /// release may fire
    #[serde(default = "default_min_donate_amount")]
    pub min_donate_amount: String,
    /// Minimum seconds between donation releases for one pair
    #[serde(default = "default_min_donate_interval_secs")]
    pub min_donate_interval_secs: i64,
}

fn default_lp_share_bps() -> u32 {
    8000
}

fn default_zero_address() -> String {
    format!("{}", Address::ZERO)
}

fn default_min_donate_amount() -> String {
    "0.1".to_string()
}

fn default_min_donate_interval_secs() -> i64 {
    3600
}

impl DistributionConfig {
    pub fn min_donate_amount_wad(&self) -> EngineResult<U256> {
        math::parse_wad(&self.min_donate_amount)
    }

    pub fn min_donate_interval(&self) -> Duration {
        Duration::seconds(self.min_donate_interval_secs)
    }

    pub fn treasury_address(&self) -> EngineResult<Address> {
        parse_address(&self.treasury)
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            default_lp_share_bps: default_lp_share_bps(),
            default_treasury_bps: 0,
            treasury: default_zero_address(),
            min_donate_amount: default_min_donate_amount(),
            min_donate_interval_secs: default_min_donate_interval_secs(),
        }
    }
}

/// Authorized identities (hex addresses)
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    pub owner: String,
    /// The decision pipeline identity; the only writer of the ledger
    pub pipeline: String,
    /// Executors allowed to run queued corrections
    #[serde(default)]
    pub executors: Vec<String>,
}

impl AccessConfig {
    pub fn owner_address(&self) -> EngineResult<Address> {
        parse_address(&self.owner)
    }

    pub fn pipeline_address(&self) -> EngineResult<Address> {
        parse_address(&self.pipeline)
    }

    pub fn executor_addresses(&self) -> EngineResult<Vec<Address>> {
        self.executors.iter().map(|s| parse_address(s)).collect()
    }
}

/// Dry-run simulation knobs
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Base asset address of the simulated pair
    #[serde(default = "default_sim_base")]
    pub base: String,
    /// Quote asset address of the simulated pair
    #[serde(default = "default_sim_quote")]
    pub quote: String,
    #[serde(default = "default_sim_fee_bps")]
    pub fee_bps: u32,
    /// Starting venue price (decimal, quote per base)
    #[serde(default = "default_sim_price")]
    pub start_price: String,
    /// Pool liquidity (decimal, whole units)
    #[serde(default = "default_sim_liquidity")]
    pub liquidity: String,
    /// Random walk amplitude per tick, in bps
    #[serde(default = "default_sim_jitter_bps")]
    pub jitter_bps: u64,
    /// Simulated trade size per tick (decimal, whole units)
    #[serde(default = "default_sim_trade_size")]
    pub trade_size: String,
    /// Milliseconds between simulated trades
    #[serde(default = "default_sim_interval_ms")]
    pub interval_ms: u64,
    /// Premium charged by the simulated credit facility, in bps
    #[serde(default = "default_sim_credit_premium_bps")]
    pub credit_premium_bps: u32,
}

fn default_sim_base() -> String {
    "0x00000000000000000000000000000000000000aa".to_string()
}

fn default_sim_quote() -> String {
    "0x00000000000000000000000000000000000000bb".to_string()
}

fn default_sim_fee_bps() -> u32 {
    30
}

fn default_sim_price() -> String {
    "2000.0".to_string()
}

fn default_sim_liquidity() -> String {
    "1000000.0".to_string()
}

fn default_sim_jitter_bps() -> u64 {
    120
}

fn default_sim_trade_size() -> String {
    "25.0".to_string()
}

fn default_sim_interval_ms() -> u64 {
    1000
}

fn default_sim_credit_premium_bps() -> u32 {
    9
}

impl SimConfig {
    pub fn pair(&self) -> EngineResult<PairKey> {
        Ok(PairKey::new(
            parse_address(&self.base)?,
            parse_address(&self.quote)?,
            self.fee_bps,
        ))
    }

    pub fn start_price_wad(&self) -> EngineResult<U256> {
        math::parse_wad(&self.start_price)
    }

    pub fn liquidity_wad(&self) -> EngineResult<U256> {
        math::parse_wad(&self.liquidity)
    }

    pub fn trade_size_wad(&self) -> EngineResult<U256> {
        math::parse_wad(&self.trade_size)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            base: default_sim_base(),
            quote: default_sim_quote(),
            fee_bps: default_sim_fee_bps(),
            start_price: default_sim_price(),
            liquidity: default_sim_liquidity(),
            jitter_bps: default_sim_jitter_bps(),
            trade_size: default_sim_trade_size(),
            interval_ms: default_sim_interval_ms(),
            credit_premium_bps: default_sim_credit_premium_bps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

pub(crate) fn parse_address(s: &str) -> EngineResult<Address> {
    Address::from_str(s.trim())
        .map_err(|e| RecoupError::AddressParsing(format!("{:?}: {}", s, e)))
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("dry_run", true)?
            .set_default("access.owner", format!("{}", Address::ZERO))?
            .set_default("access.pipeline", format!("{}", Address::ZERO))?
            .set_default("access.executors", Vec::<String>::new())?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("RECOUP_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (RECOUP_ACCESS__OWNER, etc.)
            .add_source(
                Environment::with_prefix("RECOUP")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI and dry-run usage
    pub fn default_config(dry_run: bool) -> Self {
        Self {
            analyzer: AnalyzerConfig {
                min_divergence_bps: default_min_divergence_bps(),
                capture_share_bps: default_capture_share_bps(),
                max_capture_ratio_bps: default_max_capture_ratio_bps(),
                liquidity_floor: default_liquidity_floor(),
                max_staleness_secs: default_max_staleness_secs(),
            },
            fees: FeeConfig {
                default_fee_bps: default_fee_bps(),
                max_fee_bps: default_max_fee_bps(),
                fee_scale_bps: default_fee_scale_bps(),
            },
            ledger: LedgerConfig {
                max_opportunity_age_secs: default_max_opportunity_age_secs(),
                min_profit_bps: default_min_profit_bps(),
                min_divergence_bps: default_min_divergence_bps(),
            },
            distribution: DistributionConfig {
                default_lp_share_bps: default_lp_share_bps(),
                default_treasury_bps: 0,
                treasury: default_zero_address(),
                min_donate_amount: default_min_donate_amount(),
                min_donate_interval_secs: default_min_donate_interval_secs(),
            },
            access: AccessConfig {
                owner: "0x0000000000000000000000000000000000000001".to_string(),
                pipeline: "0x0000000000000000000000000000000000000002".to_string(),
                executors: vec!["0x0000000000000000000000000000000000000003".to_string()],
            },
            sim: SimConfig::default(),
            logging: LoggingConfig::default(),
            dry_run,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.analyzer.capture_share_bps > math::BPS_DENOMINATOR {
            errors.push("analyzer.capture_share_bps must be <= 10000".to_string());
        }
        if self.analyzer.max_capture_ratio_bps > math::BPS_DENOMINATOR {
            errors.push("analyzer.max_capture_ratio_bps must be <= 10000".to_string());
        }
        if self.analyzer.min_divergence_bps == 0 {
            errors.push("analyzer.min_divergence_bps must be positive".to_string());
        }
        if self.analyzer.max_staleness_secs <= 0 {
            errors.push("analyzer.max_staleness_secs must be positive".to_string());
        }
        if let Err(e) = self.analyzer.liquidity_floor_wad() {
            errors.push(format!("analyzer.liquidity_floor: {}", e));
        }

        if self.fees.max_fee_bps > math::BPS_DENOMINATOR {
            errors.push("fees.max_fee_bps must be <= 10000".to_string());
        }
        if self.fees.default_fee_bps > self.fees.max_fee_bps {
            errors.push("fees.default_fee_bps must not exceed fees.max_fee_bps".to_string());
        }

        if self.ledger.max_opportunity_age_secs <= 0 {
            errors.push("ledger.max_opportunity_age_secs must be positive".to_string());
        }
        if self.ledger.min_divergence_bps == 0 {
            errors.push("ledger.min_divergence_bps must be positive".to_string());
        }

        let lp = self.distribution.default_lp_share_bps;
        let treasury = self.distribution.default_treasury_bps;
        if lp.saturating_add(treasury) > math::BPS_DENOMINATOR {
            errors.push(format!(
                "distribution shares exceed 10000 bps: lp {} + treasury {}",
                lp, treasury
            ));
        }
        if treasury > 0 {
            match self.distribution.treasury_address() {
                Ok(addr) if addr == Address::ZERO => {
                    errors.push("distribution.treasury must be set when default_treasury_bps > 0"
                        .to_string());
                }
                Ok(_) => {}
                Err(e) => errors.push(format!("distribution.treasury: {}", e)),
            }
        }
        if let Err(e) = self.distribution.min_donate_amount_wad() {
            errors.push(format!("distribution.min_donate_amount: {}", e));
        }
        if self.distribution.min_donate_interval_secs < 0 {
            errors.push("distribution.min_donate_interval_secs must not be negative".to_string());
        }

        if self.sim.fee_bps > math::BPS_DENOMINATOR {
            errors.push("sim.fee_bps must be <= 10000".to_string());
        }
        if let Err(e) = self.sim.pair() {
            errors.push(format!("sim pair: {}", e));
        }
        if let Err(e) = self.sim.start_price_wad() {
            errors.push(format!("sim.start_price: {}", e));
        }
        if let Err(e) = self.sim.liquidity_wad() {
            errors.push(format!("sim.liquidity: {}", e));
        }
        if let Err(e) = self.sim.trade_size_wad() {
            errors.push(format!("sim.trade_size: {}", e));
        }

        match self.access.owner_address() {
            Ok(addr) if addr == Address::ZERO => {
                errors.push("access.owner must not be the zero address".to_string());
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("access.owner: {}", e)),
        }
        match self.access.pipeline_address() {
            Ok(addr) if addr == Address::ZERO => {
                errors.push("access.pipeline must not be the zero address".to_string());
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("access.pipeline: {}", e)),
        }
        if let Err(e) = self.access.executor_addresses() {
            errors.push(format!("access.executors: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
