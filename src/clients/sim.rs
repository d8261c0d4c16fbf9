//! Deterministic in-memory collaborators.
//!
//! Used by the dry-run driver and the integration tests: every price,
//! liquidity figure, and failure is scripted by the caller, and borrow /
//! transfer volumes stay inspectable afterwards.

use super::traits::{
    CreditContinuation, CreditFacility, PriceOracleClient, PriceSample, ReputationClient,
    ReputationSummary, SettlementClient, SpotState, SwapReceipt, VenueClient,
};
use crate::domain::{bps_of, math, AssetId, Direction, PairKey, BPS_DENOMINATOR};
use crate::error::{RecoupError, Result};
use alloy::primitives::{Address, I256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy)]
struct PoolState {
    price: U256,
    liquidity: U256,
    fee_bps: u32,
    /// Price the pool snaps to after the next swap, if set. Lets tests and
    /// the dry-run driver model a dislocation that corrects once traded
    /// against.
    reversion: Option<U256>,
}

/// In-memory venue with scripted pools
#[derive(Default)]
pub struct SimVenue {
    pools: DashMap<PairKey, PoolState>,
    donations: DashMap<(PairKey, AssetId), U256>,
    fail_swaps: AtomicBool,
    fail_donations: AtomicBool,
}

impl SimVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pool(&self, pair: PairKey, price: U256, liquidity: U256, fee_bps: u32) {
        self.pools.insert(
            pair,
            PoolState {
                price,
                liquidity,
                fee_bps,
                reversion: None,
            },
        );
    }

    pub fn set_price(&self, pair: PairKey, price: U256) {
        if let Some(mut pool) = self.pools.get_mut(&pair) {
            pool.price = price;
        }
    }

    /// Script the price the pool reverts to after the next swap.
    pub fn set_reversion(&self, pair: PairKey, price: U256) {
        if let Some(mut pool) = self.pools.get_mut(&pair) {
            pool.reversion = Some(price);
        }
    }

    pub fn inject_swap_failure(&self, on: bool) {
        self.fail_swaps.store(on, Ordering::SeqCst);
    }

    pub fn inject_donation_failure(&self, on: bool) {
        self.fail_donations.store(on, Ordering::SeqCst);
    }

    /// Total donated so far for a pair/asset.
    pub fn donated(&self, pair: PairKey, asset: AssetId) -> U256 {
        self.donations
            .get(&(pair, asset))
            .map(|v| *v)
            .unwrap_or(U256::ZERO)
    }
}

#[async_trait]
impl VenueClient for SimVenue {
    async fn spot_state(&self, pair: PairKey) -> Result<SpotState> {
        let pool = self
            .pools
            .get(&pair)
            .ok_or_else(|| RecoupError::Validation(format!("unknown pair {}", pair)))?;
        Ok(SpotState {
            price: pool.price,
            liquidity: pool.liquidity,
            fee_bps: pool.fee_bps,
        })
    }

    async fn swap(
        &self,
        pair: PairKey,
        direction: Direction,
        amount_in: U256,
    ) -> Result<SwapReceipt> {
        if self.fail_swaps.load(Ordering::SeqCst) {
            return Err(RecoupError::SettlementFailure(format!(
                "sim swap rejected for {}",
                pair
            )));
        }
        let mut pool = self
            .pools
            .get_mut(&pair)
            .ok_or_else(|| RecoupError::Validation(format!("unknown pair {}", pair)))?;

        let effective_in = bps_of(amount_in, BPS_DENOMINATOR - pool.fee_bps)?;
        let amount_out = match direction {
            // Spend quote, receive base
            Direction::Buy => math::mul_div(effective_in, math::WAD, pool.price)?,
            // Spend base, receive quote
            Direction::Sell => math::mul_div(effective_in, pool.price, math::WAD)?,
        };
        if let Some(reversion) = pool.reversion.take() {
            pool.price = reversion;
        }
        Ok(SwapReceipt {
            amount_in,
            amount_out,
        })
    }

    async fn donate(&self, pair: PairKey, asset: AssetId, amount: U256) -> Result<()> {
        if self.fail_donations.load(Ordering::SeqCst) {
            return Err(RecoupError::SettlementFailure(format!(
                "sim donation rejected for {}",
                pair
            )));
        }
        if !self.pools.contains_key(&pair) {
            return Err(RecoupError::Validation(format!("unknown pair {}", pair)));
        }
        *self.donations.entry((pair, asset)).or_insert(U256::ZERO) += amount;
        Ok(())
    }
}

/// Scriptable reference oracle
#[derive(Default)]
pub struct SimOracle {
    prices: DashMap<(AssetId, AssetId), PriceSample>,
    unavailable: AtomicBool,
}

impl SimOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(
        &self,
        base: AssetId,
        quote: AssetId,
        price: U256,
        updated_at: DateTime<Utc>,
    ) {
        self.prices
            .insert((base, quote), PriceSample::new(price, 0, updated_at));
    }

    pub fn set_sample(&self, base: AssetId, quote: AssetId, sample: PriceSample) {
        self.prices.insert((base, quote), sample);
    }

    pub fn set_unavailable(&self, on: bool) {
        self.unavailable.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl PriceOracleClient for SimOracle {
    async fn latest_price(&self, base: AssetId, quote: AssetId) -> Result<PriceSample> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RecoupError::OracleUnavailable("sim oracle offline".into()));
        }
        self.prices
            .get(&(base, quote))
            .map(|s| *s)
            .ok_or_else(|| RecoupError::OracleUnavailable(format!("no feed for {}/{}", base, quote)))
    }
}

/// Fixed-score reputation registry
pub struct SimReputation {
    scores: DashMap<Address, I256>,
    default_value: I256,
}

impl SimReputation {
    /// `default_value` is WAD-scaled and returned for unknown agents.
    pub fn new(default_value: I256) -> Self {
        Self {
            scores: DashMap::new(),
            default_value,
        }
    }

    pub fn set_score(&self, agent: Address, value_wad: I256) {
        self.scores.insert(agent, value_wad);
    }
}

#[async_trait]
impl ReputationClient for SimReputation {
    async fn summary(
        &self,
        agent: Address,
        observers: Vec<Address>,
        _tag1: String,
        _tag2: String,
    ) -> Result<ReputationSummary> {
        let value = self
            .scores
            .get(&agent)
            .map(|v| *v)
            .unwrap_or(self.default_value);
        Ok(ReputationSummary {
            count: observers.len().max(1) as u64,
            value,
            decimals: 18,
        })
    }
}

/// Credit facility with an unlimited virtual float
pub struct SimCreditFacility {
    premium_bps: u32,
    borrowed: DashMap<AssetId, U256>,
    repaid: DashMap<AssetId, U256>,
}

impl SimCreditFacility {
    pub fn new(premium_bps: u32) -> Self {
        Self {
            premium_bps,
            borrowed: DashMap::new(),
            repaid: DashMap::new(),
        }
    }

    pub fn total_borrowed(&self, asset: AssetId) -> U256 {
        self.borrowed.get(&asset).map(|v| *v).unwrap_or(U256::ZERO)
    }

    pub fn total_repaid(&self, asset: AssetId) -> U256 {
        self.repaid.get(&asset).map(|v| *v).unwrap_or(U256::ZERO)
    }
}

#[async_trait]
impl CreditFacility for SimCreditFacility {
    fn premium_bps(&self) -> u32 {
        self.premium_bps
    }

    async fn with_credit(
        &self,
        asset: AssetId,
        amount: U256,
        continuation: &dyn CreditContinuation,
    ) -> Result<()> {
        let premium = bps_of(amount, self.premium_bps)?;
        let owed = amount + premium;

        // Volumes are recorded only once the whole borrow settles, so a
        // failed continuation leaves no trace of the attempt.
        let repayment = continuation.run(asset, amount, premium).await?;
        if repayment < owed {
            return Err(RecoupError::SettlementFailure(format!(
                "credit repayment {} below owed {}",
                repayment, owed
            )));
        }
        *self.borrowed.entry(asset).or_insert(U256::ZERO) += amount;
        *self.repaid.entry(asset).or_insert(U256::ZERO) += repayment;
        Ok(())
    }
}

/// Settlement client that records outbound transfers
#[derive(Default)]
pub struct SimSettlement {
    transfers: DashMap<(AssetId, Address), U256>,
    fail_transfers: AtomicBool,
}

impl SimSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_transfer_failure(&self, on: bool) {
        self.fail_transfers.store(on, Ordering::SeqCst);
    }

    /// Total transferred to `to` in `asset`.
    pub fn paid(&self, asset: AssetId, to: Address) -> U256 {
        self.transfers
            .get(&(asset, to))
            .map(|v| *v)
            .unwrap_or(U256::ZERO)
    }
}

#[async_trait]
impl SettlementClient for SimSettlement {
    async fn transfer(&self, asset: AssetId, to: Address, amount: U256) -> Result<()> {
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(RecoupError::SettlementFailure(format!(
                "sim transfer to {} rejected",
                to
            )));
        }
        if to == Address::ZERO {
            return Err(RecoupError::Validation("transfer to zero address".into()));
        }
        *self.transfers.entry((asset, to)).or_insert(U256::ZERO) += amount;
        Ok(())
    }
}
