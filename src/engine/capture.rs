//! Capture sizing and fee recommendation for the pre-trade path.

use super::divergence::AnalysisOutcome;
use crate::config::FeeConfig;
use crate::domain::{math, TradePayload};
use alloy::primitives::U256;
use serde::Serialize;
use std::fmt;

/// Why a fee was recommended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeeReason {
    /// The payload's statically supplied fee won
    PayloadFloor,
    /// Divergence-scaled fee won
    ScaledDivergence,
    /// Thin liquidity: maximum protective fee
    ProtectiveMax,
    /// Nothing else applied
    Default,
}

impl fmt::Display for FeeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeeReason::PayloadFloor => "payload floor",
            FeeReason::ScaledDivergence => "scaled divergence",
            FeeReason::ProtectiveMax => "protective max",
            FeeReason::Default => "default",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeRecommendation {
    pub fee_bps: u32,
    pub reason: FeeReason,
}

/// Recommends a fee override from the analysis outcome.
///
/// The recommendation is `max(payload fee, scaled divergence)` capped at
/// the protective ceiling; thin liquidity always gets the ceiling.
pub struct FeeRecommender {
    config: FeeConfig,
}

impl FeeRecommender {
    pub fn new(config: FeeConfig) -> Self {
        Self { config }
    }

    pub fn max_fee_bps(&self) -> u32 {
        self.config.max_fee_bps
    }

    pub fn recommend(&self, outcome: &AnalysisOutcome, payload: &TradePayload) -> FeeRecommendation {
        match outcome {
            AnalysisOutcome::ThinLiquidity { .. } => FeeRecommendation {
                fee_bps: self.config.max_fee_bps,
                reason: FeeReason::ProtectiveMax,
            },
            AnalysisOutcome::NoReference => self.fallback(payload),
            AnalysisOutcome::Capture { divergence_bps, .. }
            | AnalysisOutcome::BelowThreshold { divergence_bps } => {
                let scaled = self.scale(*divergence_bps);
                let payload_fee = payload.fee_bps.min(self.config.max_fee_bps);
                if payload_fee >= scaled {
                    if payload_fee == 0 {
                        return FeeRecommendation {
                            fee_bps: self.config.default_fee_bps,
                            reason: FeeReason::Default,
                        };
                    }
                    FeeRecommendation {
                        fee_bps: payload_fee,
                        reason: FeeReason::PayloadFloor,
                    }
                } else {
                    FeeRecommendation {
                        fee_bps: scaled,
                        reason: FeeReason::ScaledDivergence,
                    }
                }
            }
        }
    }

    /// Recommendation when no analysis ran: the payload fee if one was
    /// supplied, otherwise the default.
    pub fn fallback(&self, payload: &TradePayload) -> FeeRecommendation {
        if payload.fee_bps > 0 {
            FeeRecommendation {
                fee_bps: payload.fee_bps.min(self.config.max_fee_bps),
                reason: FeeReason::PayloadFloor,
            }
        } else {
            FeeRecommendation {
                fee_bps: self.config.default_fee_bps,
                reason: FeeReason::Default,
            }
        }
    }

    fn scale(&self, divergence_bps: u64) -> u32 {
        let scaled = divergence_bps.saturating_mul(self.config.fee_scale_bps as u64)
            / math::BPS_DENOMINATOR as u64;
        let scaled = u32::try_from(scaled).unwrap_or(u32::MAX);
        scaled.min(self.config.max_fee_bps)
    }
}

/// What the pre-trade path tells the venue to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PreTradeDirective {
    /// Value to capture before the trade executes
    pub capture_amount: U256,
    /// Fee to apply to the trade, in bps
    pub fee_bps: u32,
    /// Measured divergence, when a reference was usable
    pub divergence_bps: Option<u64>,
    pub fee_reason: FeeReason,
}
