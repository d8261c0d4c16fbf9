//! Pre-trade divergence analysis and capture sizing.
//!
//! Decides whether the venue price has drifted far enough from the
//! reference to capture value, and how much can be taken safely.

use crate::clients::PriceSample;
use crate::config::AnalyzerConfig;
use crate::domain::{bps_of, math};
use crate::error::Result;
use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Everything the analyzer looks at for one trade
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    /// Current venue price, WAD
    pub venue_price: U256,
    /// Latest oracle sample, if the feed produced one
    pub reference: Option<&'a PriceSample>,
    /// Size of the triggering trade, in its spend asset
    pub trade_size: U256,
    /// Liquidity available to trade against
    pub liquidity: U256,
    pub now: DateTime<Utc>,
}

/// Outcome of one pre-trade analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalysisOutcome {
    /// Divergence cleared the threshold; capture sized within limits
    Capture { amount: U256, divergence_bps: u64 },
    /// Divergence below the effective threshold
    BelowThreshold { divergence_bps: u64 },
    /// Liquidity under the safety floor: skip sizing, recommend the
    /// protective max fee
    ThinLiquidity { liquidity: U256 },
    /// No usable reference price: skip capture, fall back to the payload fee
    NoReference,
}

impl AnalysisOutcome {
    pub fn should_capture(&self) -> bool {
        matches!(self, AnalysisOutcome::Capture { amount, .. } if !amount.is_zero())
    }

    pub fn capture_amount(&self) -> U256 {
        match self {
            AnalysisOutcome::Capture { amount, .. } => *amount,
            _ => U256::ZERO,
        }
    }

    pub fn divergence_bps(&self) -> Option<u64> {
        match self {
            AnalysisOutcome::Capture { divergence_bps, .. }
            | AnalysisOutcome::BelowThreshold { divergence_bps } => Some(*divergence_bps),
            _ => None,
        }
    }
}

/// Sizes captures from price divergence
pub struct DivergenceAnalyzer {
    config: AnalyzerConfig,
    liquidity_floor: U256,
}

impl DivergenceAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let liquidity_floor = config.liquidity_floor_wad()?;
        Ok(Self {
            config,
            liquidity_floor,
        })
    }

    pub fn min_divergence_bps(&self) -> u64 {
        self.config.min_divergence_bps
    }

    /// Analyze one trade.
    ///
    /// Ordering matters: the thin-liquidity branch comes first (too thin to
    /// size anything safely, whatever the oracle says), then reference
    /// availability, then the threshold and sizing math.
    pub fn analyze(&self, input: &AnalysisInput<'_>) -> Result<AnalysisOutcome> {
        if input.liquidity < self.liquidity_floor {
            debug!(
                liquidity = %input.liquidity,
                floor = %self.liquidity_floor,
                "liquidity under safety floor, skipping capture sizing"
            );
            return Ok(AnalysisOutcome::ThinLiquidity {
                liquidity: input.liquidity,
            });
        }

        let reference = match input.reference {
            Some(sample) if !sample.is_stale(input.now, self.config.max_staleness()) => sample,
            Some(sample) => {
                debug!(
                    age_secs = sample.age(input.now).num_seconds(),
                    max_secs = self.config.max_staleness_secs,
                    "reference price stale, skipping capture"
                );
                return Ok(AnalysisOutcome::NoReference);
            }
            None => return Ok(AnalysisOutcome::NoReference),
        };

        let divergence_bps = math::divergence_bps(input.venue_price, reference.price)?;
        // An oracle reporting a wide confidence band raises the bar: noise
        // inside the band is not divergence.
        let threshold = self
            .config
            .min_divergence_bps
            .max(reference.confidence_bps as u64);
        if divergence_bps < threshold {
            return Ok(AnalysisOutcome::BelowThreshold { divergence_bps });
        }

        // The mispriced slice of this trade is its size scaled by the gap;
        // capture a share of that, hard-capped by the liquidity ratio.
        let opportunity_size = math::mul_div(
            input.trade_size,
            U256::from(divergence_bps),
            U256::from(math::BPS_DENOMINATOR),
        )?;
        let share = bps_of(opportunity_size, self.config.capture_share_bps)?;
        let liquidity_cap = bps_of(input.liquidity, self.config.max_capture_ratio_bps)?;
        let amount = share.min(liquidity_cap);

        debug!(
            %divergence_bps,
            opportunity = %opportunity_size,
            capture = %amount,
            "divergence cleared threshold"
        );
        Ok(AnalysisOutcome::Capture {
            amount,
            divergence_bps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::math::WAD;

    fn test_analyzer() -> DivergenceAnalyzer {
        DivergenceAnalyzer::new(AppConfig::default_config(true).analyzer).unwrap()
    }

    fn fresh_sample(price: U256) -> PriceSample {
        PriceSample::new(price, 0, Utc::now())
    }

    fn input<'a>(
        venue_price: U256,
        reference: Option<&'a PriceSample>,
        trade_size: U256,
        liquidity: U256,
    ) -> AnalysisInput<'a> {
        AnalysisInput {
            venue_price,
            reference,
            trade_size,
            liquidity,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_divergence_triggers_capture() {
        let analyzer = test_analyzer();
        let reference = fresh_sample(U256::from(2000u64) * WAD);
        let outcome = analyzer
            .analyze(&input(
                U256::from(2060u64) * WAD,
                Some(&reference),
                U256::from(1_000u64) * WAD,
                U256::from(1_000_000u64) * WAD,
            ))
            .unwrap();

        // 300 bps gap: opportunity slice is 30, capture 80% of it
        assert_eq!(
            outcome,
            AnalysisOutcome::Capture {
                amount: U256::from(24u64) * WAD,
                divergence_bps: 300,
            }
        );
        assert!(outcome.should_capture());
    }

    #[test]
    fn test_below_threshold_means_no_capture() {
        let analyzer = test_analyzer();
        // 40 bps gap, threshold is 50
        let reference = fresh_sample(U256::from(10_000u64) * WAD);
        let outcome = analyzer
            .analyze(&input(
                U256::from(10_040u64) * WAD,
                Some(&reference),
                U256::from(1_000u64) * WAD,
                U256::from(1_000_000u64) * WAD,
            ))
            .unwrap();

        assert_eq!(outcome, AnalysisOutcome::BelowThreshold { divergence_bps: 40 });
        assert!(!outcome.should_capture());
        assert_eq!(outcome.capture_amount(), U256::ZERO);
    }

    #[test]
    fn test_confidence_band_raises_threshold() {
        let analyzer = test_analyzer();
        // 300 bps gap but the oracle only vouches for +-400 bps
        let reference = PriceSample::new(U256::from(2000u64) * WAD, 400, Utc::now());
        let outcome = analyzer
            .analyze(&input(
                U256::from(2060u64) * WAD,
                Some(&reference),
                U256::from(1_000u64) * WAD,
                U256::from(1_000_000u64) * WAD,
            ))
            .unwrap();

        assert_eq!(
            outcome,
            AnalysisOutcome::BelowThreshold { divergence_bps: 300 }
        );
    }

    #[test]
    fn test_capture_capped_by_liquidity_ratio() {
        let analyzer = test_analyzer();
        let reference = fresh_sample(U256::from(2000u64) * WAD);
        // Huge trade against a small pool: cap at 50% of liquidity
        let liquidity = U256::from(100u64) * WAD;
        let outcome = analyzer
            .analyze(&input(
                U256::from(2060u64) * WAD,
                Some(&reference),
                U256::from(1_000_000u64) * WAD,
                liquidity,
            ))
            .unwrap();

        assert_eq!(outcome.capture_amount(), U256::from(50u64) * WAD);
    }

    #[test]
    fn test_thin_liquidity_is_a_distinct_branch() {
        let analyzer = test_analyzer();
        let reference = fresh_sample(U256::from(2000u64) * WAD);
        // Floor defaults to 10 whole units
        let outcome = analyzer
            .analyze(&input(
                U256::from(2060u64) * WAD,
                Some(&reference),
                U256::from(1_000u64) * WAD,
                U256::from(5u64) * WAD,
            ))
            .unwrap();

        assert_eq!(
            outcome,
            AnalysisOutcome::ThinLiquidity {
                liquidity: U256::from(5u64) * WAD
            }
        );
    }

    #[test]
    fn test_stale_or_missing_reference_skips_capture() {
        let analyzer = test_analyzer();
        let now = Utc::now();
        let stale = PriceSample::new(
            U256::from(2000u64) * WAD,
            0,
            now - chrono::Duration::seconds(120),
        );
        let base = input(
            U256::from(2060u64) * WAD,
            None,
            U256::from(1_000u64) * WAD,
            U256::from(1_000_000u64) * WAD,
        );

        assert_eq!(
            analyzer.analyze(&base).unwrap(),
            AnalysisOutcome::NoReference
        );

        let with_stale = AnalysisInput {
            reference: Some(&stale),
            now,
            ..base
        };
        assert_eq!(
            analyzer.analyze(&with_stale).unwrap(),
            AnalysisOutcome::NoReference
        );
    }
}
