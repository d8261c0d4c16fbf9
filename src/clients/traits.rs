//! Client traits for the engine's external collaborators
//!
//! These traits define the seams to the price oracle, the managed venue,
//! the reputation service, the credit facility, and direct settlement.
//! Everything crossing them is WAD-scaled `U256` (or signed `I256` for
//! reputation values).

use crate::domain::{AssetId, Direction, PairKey};
use crate::error::Result;
use alloy::primitives::{Address, I256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A reference price observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Price of base in quote terms, WAD-scaled
    pub price: U256,
    /// Oracle-reported confidence band around the price, in bps
    pub confidence_bps: u32,
    pub updated_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(price: U256, confidence_bps: u32, updated_at: DateTime<Utc>) -> Self {
        Self {
            price,
            confidence_bps,
            updated_at,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.updated_at
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_staleness: Duration) -> bool {
        self.age(now) > max_staleness
    }
}

/// External reference price feed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracleClient: Send + Sync {
    /// Latest reference price for `base` in terms of `quote`.
    async fn latest_price(&self, base: AssetId, quote: AssetId) -> Result<PriceSample>;
}

/// Venue spot state for one pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotState {
    /// Current venue price, WAD-scaled
    pub price: U256,
    /// Liquidity available to trade against
    pub liquidity: U256,
    /// Current pool fee tier, in bps
    pub fee_bps: u32,
}

/// Outcome of one executed swap leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapReceipt {
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Managed liquidity venue: state reads, swap legs, LP donations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn spot_state(&self, pair: PairKey) -> Result<SpotState>;

    /// Execute one swap leg. `amount_in` is denominated in the asset the
    /// direction spends (`Direction::funding_asset`).
    async fn swap(&self, pair: PairKey, direction: Direction, amount_in: U256)
        -> Result<SwapReceipt>;

    /// Forward accumulated value to the pair's liquidity providers.
    async fn donate(&self, pair: PairKey, asset: AssetId, amount: U256) -> Result<()>;
}

/// Aggregated trust score for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationSummary {
    /// Number of attestations behind the value
    pub count: u64,
    /// Signed score, scaled by 10^decimals
    pub value: I256,
    pub decimals: u8,
}

impl ReputationSummary {
    /// Normalize `value` to signed WAD regardless of source decimals.
    pub fn value_wad(&self) -> I256 {
        match self.decimals {
            18 => self.value,
            d if d < 18 => {
                let factor = I256::exp10((18 - d) as usize);
                match self.value.checked_mul(factor) {
                    Some(v) => v,
                    None if self.value.is_negative() => I256::MIN,
                    None => I256::MAX,
                }
            }
            d => self.value / I256::exp10((d - 18) as usize),
        }
    }
}

/// External reputation registry lookups (agent governance only, never the
/// trade path)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReputationClient: Send + Sync {
    async fn summary(
        &self,
        agent: Address,
        observers: Vec<Address>,
        tag1: String,
        tag2: String,
    ) -> Result<ReputationSummary>;
}

/// Work performed while borrowed funds are held.
///
/// Returns the repayment owed back to the facility; erroring aborts the
/// whole borrow.
#[async_trait]
pub trait CreditContinuation: Send + Sync {
    async fn run(&self, asset: AssetId, amount: U256, premium: U256) -> Result<U256>;
}

/// Same-operation uncollateralized credit.
///
/// Platform requirement: implementations must be all-or-nothing. When the
/// continuation errors, or returns a repayment below `amount + premium`,
/// the whole call fails and no lasting effect of the borrow remains. The
/// executor's claim-then-verify pattern depends on this; a facility that
/// cannot unwind a failed borrow degrades it to a race.
#[async_trait]
pub trait CreditFacility: Send + Sync {
    /// Facility premium charged on top of the borrowed amount, in bps.
    fn premium_bps(&self) -> u32;

    /// Borrow `amount` of `asset`, run the continuation while the funds
    /// are held, and collect the repayment it returns.
    async fn with_credit(
        &self,
        asset: AssetId,
        amount: U256,
        continuation: &dyn CreditContinuation,
    ) -> Result<()>;
}

/// Direct value transfers for executor and treasury shares.
///
/// Platform requirement: a transfer either settles fully or fails with no
/// effect; the distributor commits balance bookkeeping only after the
/// corresponding transfer succeeded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementClient: Send + Sync {
    async fn transfer(&self, asset: AssetId, to: Address, amount: U256) -> Result<()>;
}
