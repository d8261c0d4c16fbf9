//! Pluggable decision agents
//!
//! One agent per decision category: capture sizing, fee recommendation,
//! and the post-trade backrun plan. The router binds an implementation to
//! each category; the defaults here wrap the engine's own analyzer and
//! fee recommender, so a freshly wired engine behaves sensibly before any
//! governance action.

use crate::clients::{PriceSample, SpotState};
use crate::config::AnalyzerConfig;
use crate::domain::{math, Direction, PairKey, TradePayload};
use crate::engine::capture::{FeeRecommendation, FeeRecommender};
use crate::engine::divergence::{AnalysisInput, AnalysisOutcome, DivergenceAnalyzer};
use crate::engine::ledger::OpportunityCandidate;
use crate::error::Result;
use alloy::primitives::U256;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Everything an agent sees before the trade executes.
#[derive(Debug, Clone)]
pub struct PreTradeContext {
    pub pair: PairKey,
    pub direction: Direction,
    /// Size of the incoming trade, in its spend asset
    pub trade_size: U256,
    pub venue: SpotState,
    /// Latest oracle sample, if the feed produced one
    pub reference: Option<PriceSample>,
    pub payload: TradePayload,
    pub now: DateTime<Utc>,
}

impl PreTradeContext {
    pub fn analysis_input(&self) -> AnalysisInput<'_> {
        AnalysisInput {
            venue_price: self.venue.price,
            reference: self.reference.as_ref(),
            trade_size: self.trade_size,
            liquidity: self.venue.liquidity,
            now: self.now,
        }
    }
}

/// Everything an agent sees after the trade settled.
#[derive(Debug, Clone)]
pub struct PostTradeContext {
    pub pair: PairKey,
    /// Direction of the user trade that just landed
    pub direction: Direction,
    pub trade_size: U256,
    /// Venue state after the trade moved the price
    pub venue: SpotState,
    pub reference: Option<PriceSample>,
    pub now: DateTime<Utc>,
}

/// Sizes the pre-trade capture.
pub trait CaptureAgent: Send + Sync {
    fn name(&self) -> &str;

    fn decide(&self, ctx: &PreTradeContext) -> Result<AnalysisOutcome>;
}

/// Recommends the fee applied to the trade.
pub trait FeeAgent: Send + Sync {
    fn name(&self) -> &str;

    fn recommend(&self, ctx: &PreTradeContext, outcome: &AnalysisOutcome) -> FeeRecommendation;
}

/// Plans the correction round trip a settled trade leaves behind.
pub trait BackrunAgent: Send + Sync {
    fn name(&self) -> &str;

    /// `None` means nothing worth recording; threshold enforcement stays
    /// with the ledger.
    fn plan(&self, ctx: &PostTradeContext) -> Result<Option<OpportunityCandidate>>;
}

/// Capture decisions straight from the divergence analyzer.
pub struct DefaultCaptureAgent {
    analyzer: Arc<DivergenceAnalyzer>,
}

impl DefaultCaptureAgent {
    pub fn new(analyzer: Arc<DivergenceAnalyzer>) -> Self {
        Self { analyzer }
    }
}

impl CaptureAgent for DefaultCaptureAgent {
    fn name(&self) -> &str {
        "default-capture"
    }

    fn decide(&self, ctx: &PreTradeContext) -> Result<AnalysisOutcome> {
        self.analyzer.analyze(&ctx.analysis_input())
    }
}

/// Fee recommendations straight from the fee recommender.
pub struct DefaultFeeAgent {
    fees: Arc<FeeRecommender>,
}

impl DefaultFeeAgent {
    pub fn new(fees: Arc<FeeRecommender>) -> Self {
        Self { fees }
    }
}

impl FeeAgent for DefaultFeeAgent {
    fn name(&self) -> &str {
        "default-fee"
    }

    fn recommend(&self, ctx: &PreTradeContext, outcome: &AnalysisOutcome) -> FeeRecommendation {
        self.fees.recommend(outcome, &ctx.payload)
    }
}

/// Plans a correction that trades against whatever gap the settled trade
/// left between the venue and the reference.
pub struct DefaultBackrunAgent {
    max_staleness: Duration,
}

impl DefaultBackrunAgent {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            max_staleness: config.max_staleness(),
        }
    }
}

impl BackrunAgent for DefaultBackrunAgent {
    fn name(&self) -> &str {
        "default-backrun"
    }

    fn plan(&self, ctx: &PostTradeContext) -> Result<Option<OpportunityCandidate>> {
        let Some(reference) = ctx.reference.as_ref() else {
            return Ok(None);
        };
        if reference.is_stale(ctx.now, self.max_staleness) {
            return Ok(None);
        }

        let divergence_bps = math::divergence_bps(ctx.venue.price, reference.price)?;
        if divergence_bps == 0 {
            return Ok(None);
        }

        // Venue above reference: base is rich there, the correction sells
        // it in. Below: the correction buys.
        let direction = if ctx.venue.price > reference.price {
            Direction::Sell
        } else {
            Direction::Buy
        };

        Ok(Some(OpportunityCandidate {
            pair: ctx.pair,
            target_price: reference.price,
            current_price: ctx.venue.price,
            amount: ctx.trade_size,
            direction,
            divergence_bps,
            detected_at: ctx.now,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::math::WAD;
    use alloy::primitives::address;

    fn test_pair() -> PairKey {
        PairKey::new(
            address!("1111111111111111111111111111111111111111"),
            address!("2222222222222222222222222222222222222222"),
            30,
        )
    }

    fn pre_context(venue_price: U256, reference: Option<PriceSample>) -> PreTradeContext {
        PreTradeContext {
            pair: test_pair(),
            direction: Direction::Buy,
            trade_size: U256::from(1_000u64) * WAD,
            venue: SpotState {
                price: venue_price,
                liquidity: U256::from(1_000_000u64) * WAD,
                fee_bps: 30,
            },
            reference,
            payload: TradePayload::default(),
            now: Utc::now(),
        }
    }

    fn post_context(venue_price: U256, reference: Option<PriceSample>) -> PostTradeContext {
        PostTradeContext {
            pair: test_pair(),
            direction: Direction::Buy,
            trade_size: U256::from(100u64) * WAD,
            venue: SpotState {
                price: venue_price,
                liquidity: U256::from(1_000_000u64) * WAD,
                fee_bps: 30,
            },
            reference,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_default_capture_agent_delegates_to_analyzer() {
        let config = AppConfig::default_config(true);
        let agent = DefaultCaptureAgent::new(Arc::new(
            DivergenceAnalyzer::new(config.analyzer).unwrap(),
        ));

        let reference = PriceSample::new(U256::from(2000u64) * WAD, 0, Utc::now());
        let outcome = agent
            .decide(&pre_context(U256::from(2060u64) * WAD, Some(reference)))
            .unwrap();
        assert_eq!(
            outcome,
            AnalysisOutcome::Capture {
                amount: U256::from(24u64) * WAD,
                divergence_bps: 300,
            }
        );

        let outcome = agent
            .decide(&pre_context(U256::from(2060u64) * WAD, None))
            .unwrap();
        assert_eq!(outcome, AnalysisOutcome::NoReference);
    }

    #[test]
    fn test_default_fee_agent_scales_divergence() {
        let config = AppConfig::default_config(true);
        let agent = DefaultFeeAgent::new(Arc::new(FeeRecommender::new(config.fees)));

        let ctx = pre_context(U256::from(2060u64) * WAD, None);
        let outcome = AnalysisOutcome::Capture {
            amount: U256::from(24u64) * WAD,
            divergence_bps: 300,
        };
        // 1:1 scale, so 300 bps of divergence backs a 300 bps fee
        assert_eq!(agent.recommend(&ctx, &outcome).fee_bps, 300);
    }

    #[test]
    fn test_default_backrun_agent_plans_the_correction() {
        let config = AppConfig::default_config(true);
        let agent = DefaultBackrunAgent::new(&config.analyzer);

        let reference = PriceSample::new(U256::from(2000u64) * WAD, 0, Utc::now());
        let candidate = agent
            .plan(&post_context(U256::from(2060u64) * WAD, Some(reference)))
            .unwrap()
            .unwrap();
        assert_eq!(candidate.direction, Direction::Sell);
        assert_eq!(candidate.divergence_bps, 300);
        assert_eq!(candidate.target_price, U256::from(2000u64) * WAD);

        // Venue below reference corrects by buying
        let candidate = agent
            .plan(&post_context(U256::from(1940u64) * WAD, Some(reference)))
            .unwrap()
            .unwrap();
        assert_eq!(candidate.direction, Direction::Buy);
    }

    #[test]
    fn test_default_backrun_agent_skips_unusable_references() {
        let config = AppConfig::default_config(true);
        let agent = DefaultBackrunAgent::new(&config.analyzer);

        assert!(agent
            .plan(&post_context(U256::from(2060u64) * WAD, None))
            .unwrap()
            .is_none());

        let stale = PriceSample::new(
            U256::from(2000u64) * WAD,
            0,
            Utc::now() - Duration::seconds(120),
        );
        assert!(agent
            .plan(&post_context(U256::from(2060u64) * WAD, Some(stale)))
            .unwrap()
            .is_none());

        // No gap, nothing to correct
        let flat = PriceSample::new(U256::from(2000u64) * WAD, 0, Utc::now());
        assert!(agent
            .plan(&post_context(U256::from(2000u64) * WAD, Some(flat)))
            .unwrap()
            .is_none());
    }
}
