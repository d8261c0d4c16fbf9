//! The authorized trade decision path
//!
//! `pre_trade` runs before a trade executes: it sizes the capture, picks
//! the fee, and books the captured value. `post_trade` runs after
//! settlement: it measures what the trade did to the price and records a
//! correction opportunity when one is worth recording. The pipeline is
//! the only identity the ledger accepts records from.

use crate::clients::{PriceOracleClient, PriceSample, VenueClient};
use crate::domain::{Direction, PairKey, TradePayload};
use crate::engine::access::AccessRegistry;
use crate::engine::agents::{PostTradeContext, PreTradeContext};
use crate::engine::capture::{FeeRecommender, FeeReason, PreTradeDirective};
use crate::engine::divergence::AnalysisOutcome;
use crate::engine::distributor::ProfitDistributor;
use crate::engine::ledger::{OpportunityLedger, RecordOutcome};
use crate::engine::router::AgentRouter;
use crate::error::Result;
use crate::services::Metrics;
use alloy::primitives::U256;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One incoming trade, as the venue describes it.
#[derive(Debug, Clone)]
pub struct TradeIntent {
    pub pair: PairKey,
    pub direction: Direction,
    /// Trade size in its spend asset
    pub amount: U256,
    pub payload: TradePayload,
}

/// What the venue applies before executing the trade.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub pair: PairKey,
    pub directive: PreTradeDirective,
    pub correlation_id: Uuid,
}

/// What the post-trade step decided.
#[derive(Debug, Clone, Serialize)]
pub struct PostTradeReport {
    pub pair: PairKey,
    pub divergence_bps: Option<u64>,
    /// `None` when no correction was worth planning
    pub outcome: Option<RecordOutcome>,
}

/// Pre/post-trade decision path wired through the agent router.
pub struct TradePipeline {
    access: Arc<AccessRegistry>,
    oracle: Arc<dyn PriceOracleClient>,
    venue: Arc<dyn VenueClient>,
    router: Arc<AgentRouter>,
    ledger: Arc<OpportunityLedger>,
    distributor: Arc<ProfitDistributor>,
    fees: Arc<FeeRecommender>,
    metrics: Arc<Metrics>,
}

impl TradePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        access: Arc<AccessRegistry>,
        oracle: Arc<dyn PriceOracleClient>,
        venue: Arc<dyn VenueClient>,
        router: Arc<AgentRouter>,
        ledger: Arc<OpportunityLedger>,
        distributor: Arc<ProfitDistributor>,
        fees: Arc<FeeRecommender>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            access,
            oracle,
            venue,
            router,
            ledger,
            distributor,
            fees,
            metrics,
        }
    }

    async fn reference_for(&self, pair: PairKey) -> Option<PriceSample> {
        match self.oracle.latest_price(pair.base, pair.quote).await {
            Ok(sample) => Some(sample),
            Err(err) => {
                debug!(pair = %pair, error = %err, "reference price unavailable");
                None
            }
        }
    }

    /// Decide capture and fee for an incoming trade, and book the capture.
    ///
    /// With no capture agent bound the path degrades safely: zero capture
    /// and the payload-or-default fallback fee.
    pub async fn pre_trade(&self, intent: &TradeIntent) -> Result<TradeReceipt> {
        let venue_state = self.venue.spot_state(intent.pair).await?;
        let reference = self.reference_for(intent.pair).await;
        let ctx = PreTradeContext {
            pair: intent.pair,
            direction: intent.direction,
            trade_size: intent.amount,
            venue: venue_state,
            reference,
            payload: intent.payload.clone(),
            now: Utc::now(),
        };

        let outcome = match self.router.capture_agent().await {
            Some(binding) => binding.handle.decide(&ctx)?,
            None => {
                debug!(pair = %intent.pair, "no capture agent bound");
                AnalysisOutcome::NoReference
            }
        };
        let recommendation = match self.router.fee_agent().await {
            Some(binding) => binding.handle.recommend(&ctx, &outcome),
            None => self.fees.recommend(&outcome, &ctx.payload),
        };

        let capture_amount = outcome.capture_amount();
        if !capture_amount.is_zero() {
            // Captured value is withheld from the trade and held for the
            // pair's LPs; it only leaves through the gated release.
            let asset = intent.direction.funding_asset(&intent.pair);
            self.distributor
                .accumulate(intent.pair, asset, capture_amount)
                .await;
            self.metrics.inc_captures_applied();
        }
        if matches!(
            recommendation.reason,
            FeeReason::ScaledDivergence | FeeReason::ProtectiveMax
        ) {
            self.metrics.inc_fee_overrides();
        }

        let directive = PreTradeDirective {
            capture_amount,
            fee_bps: recommendation.fee_bps,
            divergence_bps: outcome.divergence_bps(),
            fee_reason: recommendation.reason,
        };
        info!(
            pair = %intent.pair,
            capture = %directive.capture_amount,
            fee_bps = directive.fee_bps,
            reason = %directive.fee_reason,
            correlation_id = %intent.payload.correlation_id,
            "pre-trade directive issued"
        );
        Ok(TradeReceipt {
            pair: intent.pair,
            directive,
            correlation_id: intent.payload.correlation_id,
        })
    }

    /// Measure the settled trade's dislocation and record a correction
    /// opportunity when the backrun agent plans one.
    pub async fn post_trade(&self, intent: &TradeIntent) -> Result<PostTradeReport> {
        let venue_state = self.venue.spot_state(intent.pair).await?;
        let reference = self.reference_for(intent.pair).await;
        let ctx = PostTradeContext {
            pair: intent.pair,
            direction: intent.direction,
            trade_size: intent.amount,
            venue: venue_state,
            reference,
            now: Utc::now(),
        };

        let candidate = match self.router.backrun_agent().await {
            Some(binding) => binding.handle.plan(&ctx)?,
            None => None,
        };

        let Some(candidate) = candidate else {
            return Ok(PostTradeReport {
                pair: intent.pair,
                divergence_bps: None,
                outcome: None,
            });
        };

        let divergence_bps = candidate.divergence_bps;
        let outcome = self
            .ledger
            .record(self.access.pipeline(), candidate)
            .await?;
        Ok(PostTradeReport {
            pair: intent.pair,
            divergence_bps: Some(divergence_bps),
            outcome: Some(outcome),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::sim::{SimOracle, SimReputation, SimSettlement, SimVenue};
    use crate::config::AppConfig;
    use crate::domain::math::WAD;
    use crate::domain::{AssetId, OpportunityState};
    use crate::engine::agents::{DefaultBackrunAgent, DefaultCaptureAgent, DefaultFeeAgent};
    use crate::engine::divergence::DivergenceAnalyzer;
    use alloy::primitives::{address, Address, I256};

    const OWNER: Address = address!("00000000000000000000000000000000000000aa");
    const PIPELINE: Address = address!("00000000000000000000000000000000000000bb");

    fn test_pair() -> PairKey {
        PairKey::new(
            address!("1111111111111111111111111111111111111111"),
            address!("2222222222222222222222222222222222222222"),
            30,
        )
    }

    fn quote_asset() -> AssetId {
        AssetId::from(address!("2222222222222222222222222222222222222222"))
    }

    struct Fixture {
        oracle: Arc<SimOracle>,
        venue: Arc<SimVenue>,
        ledger: Arc<OpportunityLedger>,
        distributor: Arc<ProfitDistributor>,
        metrics: Arc<Metrics>,
        pipeline: TradePipeline,
    }

    fn fixture() -> Fixture {
        let config = AppConfig::default_config(true);
        let access = Arc::new(AccessRegistry::new(OWNER, PIPELINE, vec![]));
        let metrics = Arc::new(Metrics::new());

        let oracle = Arc::new(SimOracle::new());
        let venue = Arc::new(SimVenue::new());
        venue.set_pool(
            test_pair(),
            U256::from(2060u64) * WAD,
            U256::from(1_000_000u64) * WAD,
            30,
        );

        let analyzer = Arc::new(DivergenceAnalyzer::new(config.analyzer.clone()).unwrap());
        let fees = Arc::new(FeeRecommender::new(config.fees.clone()));
        let router = Arc::new(AgentRouter::with_defaults(
            access.clone(),
            Arc::new(SimReputation::new(I256::ZERO)),
            Arc::new(DefaultCaptureAgent::new(analyzer)),
            Arc::new(DefaultFeeAgent::new(fees.clone())),
            Arc::new(DefaultBackrunAgent::new(&config.analyzer)),
        ));

        let ledger = Arc::new(OpportunityLedger::new(
            &config.ledger,
            access.clone(),
            metrics.clone(),
        ));
        let distributor = Arc::new(
            ProfitDistributor::new(
                &config.distribution,
                venue.clone(),
                Arc::new(SimSettlement::new()),
                metrics.clone(),
            )
            .unwrap(),
        );

        let pipeline = TradePipeline::new(
            access,
            oracle.clone(),
            venue.clone(),
            router,
            ledger.clone(),
            distributor.clone(),
            fees,
            metrics.clone(),
        );
        Fixture {
            oracle,
            venue,
            ledger,
            distributor,
            metrics,
            pipeline,
        }
    }

    fn intent(amount: U256, fee_bps: u32) -> TradeIntent {
        TradeIntent {
            pair: test_pair(),
            direction: Direction::Buy,
            amount,
            payload: TradePayload::new(fee_bps),
        }
    }

    #[tokio::test]
    async fn test_pre_trade_captures_and_overrides_fee() {
        let fx = fixture();
        fx.oracle.set_price(
            test_pair().base,
            test_pair().quote,
            U256::from(2000u64) * WAD,
            Utc::now(),
        );

        let receipt = fx
            .pipeline
            .pre_trade(&intent(U256::from(1_000u64) * WAD, 0))
            .await
            .unwrap();

        // 300 bps gap on a 1000 trade: 30 mispriced, 24 captured
        assert_eq!(receipt.directive.capture_amount, U256::from(24u64) * WAD);
        assert_eq!(receipt.directive.fee_bps, 300);
        assert_eq!(receipt.directive.divergence_bps, Some(300));
        assert_eq!(receipt.directive.fee_reason, FeeReason::ScaledDivergence);

        // Buy trades spend quote; the capture accumulates there
        assert_eq!(
            fx.distributor.accumulated(test_pair(), quote_asset()).await,
            U256::from(24u64) * WAD
        );
        assert_eq!(
            fx.metrics
                .captures_applied
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_pre_trade_oracle_outage_falls_back_to_payload_fee() {
        let fx = fixture();
        fx.oracle.set_unavailable(true);

        let receipt = fx
            .pipeline
            .pre_trade(&intent(U256::from(1_000u64) * WAD, 25))
            .await
            .unwrap();
        assert_eq!(receipt.directive.capture_amount, U256::ZERO);
        assert_eq!(receipt.directive.fee_bps, 25);
        assert_eq!(receipt.directive.fee_reason, FeeReason::PayloadFloor);

        // No payload fee either: the configured default applies
        let receipt = fx
            .pipeline
            .pre_trade(&intent(U256::from(1_000u64) * WAD, 0))
            .await
            .unwrap();
        assert_eq!(receipt.directive.fee_bps, 30);
        assert_eq!(receipt.directive.fee_reason, FeeReason::Default);
    }

    #[tokio::test]
    async fn test_pre_trade_thin_liquidity_gets_protective_fee() {
        let fx = fixture();
        fx.oracle.set_price(
            test_pair().base,
            test_pair().quote,
            U256::from(2000u64) * WAD,
            Utc::now(),
        );
        // Liquidity under the 10.0 floor
        fx.venue.set_pool(
            test_pair(),
            U256::from(2060u64) * WAD,
            U256::from(5u64) * WAD,
            30,
        );

        let receipt = fx
            .pipeline
            .pre_trade(&intent(U256::from(1_000u64) * WAD, 0))
            .await
            .unwrap();
        assert_eq!(receipt.directive.capture_amount, U256::ZERO);
        assert_eq!(receipt.directive.fee_bps, 3000);
        assert_eq!(receipt.directive.fee_reason, FeeReason::ProtectiveMax);
    }

    #[tokio::test]
    async fn test_post_trade_records_opportunity() {
        let fx = fixture();
        fx.oracle.set_price(
            test_pair().base,
            test_pair().quote,
            U256::from(2000u64) * WAD,
            Utc::now(),
        );

        let report = fx
            .pipeline
            .post_trade(&intent(U256::from(100u64) * WAD, 0))
            .await
            .unwrap();
        assert_eq!(report.divergence_bps, Some(300));
        assert_eq!(report.outcome, Some(RecordOutcome::Recorded));
        assert_eq!(
            fx.ledger.state_of(test_pair(), Utc::now()).await,
            OpportunityState::Pending
        );
    }

    #[tokio::test]
    async fn test_post_trade_below_threshold_skips_recording() {
        let fx = fixture();
        fx.oracle.set_price(
            test_pair().base,
            test_pair().quote,
            U256::from(2000u64) * WAD,
            Utc::now(),
        );
        // 20 bps gap, under the 50 bps recording gate
        fx.venue.set_price(test_pair(), U256::from(2004u64) * WAD);

        let report = fx
            .pipeline
            .post_trade(&intent(U256::from(100u64) * WAD, 0))
            .await
            .unwrap();
        assert_eq!(report.divergence_bps, Some(20));
        assert_eq!(report.outcome, Some(RecordOutcome::BelowDivergence));
        assert!(fx.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_post_trade_without_reference_records_nothing() {
        let fx = fixture();
        fx.oracle.set_unavailable(true);

        let report = fx
            .pipeline
            .post_trade(&intent(U256::from(100u64) * WAD, 0))
            .await
            .unwrap();
        assert_eq!(report.outcome, None);
        assert!(fx.ledger.is_empty().await);
    }
}
