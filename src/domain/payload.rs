use crate::error::{Result, SplitError};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-trade immutable instructions supplied by the trade originator.
///
/// `treasury_bps`/`lp_share_bps` of zero mean "use the engine defaults";
/// a non-zero pair overrides the default split for profit realized from
/// this trade. Consumed once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePayload {
    /// Statically supplied fee floor, in bps
    pub fee_bps: u32,
    pub treasury_bps: u32,
    pub lp_share_bps: u32,
    pub treasury: Address,
    pub correlation_id: Uuid,
}

impl TradePayload {
    pub fn new(fee_bps: u32) -> Self {
        Self {
            fee_bps,
            treasury_bps: 0,
            lp_share_bps: 0,
            treasury: Address::ZERO,
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn with_split(mut self, treasury_bps: u32, lp_share_bps: u32, treasury: Address) -> Self {
        self.treasury_bps = treasury_bps;
        self.lp_share_bps = lp_share_bps;
        self.treasury = treasury;
        self
    }

    /// Does this payload override the default profit split?
    pub fn has_split_override(&self) -> bool {
        self.treasury_bps > 0 || self.lp_share_bps > 0
    }

    /// Rejects bad payloads before any mutation happens downstream.
    pub fn validate(&self) -> Result<()> {
        let sum = self.treasury_bps.saturating_add(self.lp_share_bps);
        if sum > crate::domain::math::BPS_DENOMINATOR {
            return Err(SplitError::BadShareSum {
                treasury_bps: self.treasury_bps,
                lp_share_bps: self.lp_share_bps,
            }
            .into());
        }
        if self.treasury_bps > 0 && self.treasury == Address::ZERO {
            return Err(SplitError::MissingTreasury {
                treasury_bps: self.treasury_bps,
            }
            .into());
        }
        Ok(())
    }
}

impl Default for TradePayload {
    fn default() -> Self {
        Self::new(0)
    }
}
