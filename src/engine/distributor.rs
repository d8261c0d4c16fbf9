//! Profit distribution and the gated LP release
//!
//! Realized profit splits three ways: an LP share held back as an
//! accumulated per-pair balance, a treasury share, and the executor
//! remainder. Shares are computed so the three always sum to the input
//! exactly. Accumulated balances leave the engine only through `donate`,
//! which is gated on a size threshold and a per-pair release interval.

use crate::clients::{SettlementClient, VenueClient};
use crate::config::DistributionConfig;
use crate::domain::math::BPS_DENOMINATOR;
use crate::domain::{math, AssetId, PairKey, TradePayload};
use crate::error::{DonateError, Result, SplitError};
use crate::services::Metrics;
use alloy::primitives::{Address, U256};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Exact three-way division of a profit amount.
///
/// `lp + treasury + executor` equals the amount it was resolved from; the
/// executor takes the rounding remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitShares {
    pub lp: U256,
    pub treasury: U256,
    pub executor: U256,
}

impl SplitShares {
    /// Split `total` by share weights. Fails if the weights claim more
    /// than the whole.
    pub fn resolve(
        total: U256,
        lp_share_bps: u32,
        treasury_bps: u32,
    ) -> std::result::Result<Self, SplitError> {
        if lp_share_bps.saturating_add(treasury_bps) > BPS_DENOMINATOR {
            return Err(SplitError::BadShareSum {
                treasury_bps,
                lp_share_bps,
            });
        }
        let lp = Self::share(total, lp_share_bps)?;
        let treasury = Self::share(total, treasury_bps)?;
        // Cannot underflow: both shares round down from fractions of total
        let executor = total.saturating_sub(lp).saturating_sub(treasury);
        Ok(Self {
            lp,
            treasury,
            executor,
        })
    }

    fn share(total: U256, bps: u32) -> std::result::Result<U256, SplitError> {
        total
            .checked_mul(U256::from(bps))
            .map(|scaled| scaled / U256::from(BPS_DENOMINATOR))
            .ok_or(SplitError::ShareOverflow { amount: total })
    }

    pub fn total(&self) -> U256 {
        self.lp
            .saturating_add(self.treasury)
            .saturating_add(self.executor)
    }
}

/// Why a donation release can or cannot fire right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonateReadiness {
    Ready,
    NothingAccumulated,
    BelowThreshold { largest: U256, required: U256 },
    IntervalNotElapsed { elapsed_secs: i64, required_secs: i64 },
}

impl DonateReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, DonateReadiness::Ready)
    }
}

impl fmt::Display for DonateReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DonateReadiness::Ready => write!(f, "ready"),
            DonateReadiness::NothingAccumulated => write!(f, "nothing accumulated"),
            DonateReadiness::BelowThreshold { largest, required } => write!(
                f,
                "below threshold: {} < {}",
                math::format_wad(*largest),
                math::format_wad(*required)
            ),
            DonateReadiness::IntervalNotElapsed {
                elapsed_secs,
                required_secs,
            } => write!(
                f,
                "interval not elapsed: {}s < {}s",
                elapsed_secs, required_secs
            ),
        }
    }
}

/// Splits realized profit and holds the LP share until release.
pub struct ProfitDistributor {
    venue: Arc<dyn VenueClient>,
    settlement: Arc<dyn SettlementClient>,
    metrics: Arc<Metrics>,
    default_lp_share_bps: u32,
    default_treasury_bps: u32,
    default_treasury: Address,
    min_donate_amount: U256,
    min_donate_interval: Duration,
    balances: RwLock<HashMap<(PairKey, AssetId), U256>>,
    last_release: RwLock<HashMap<PairKey, DateTime<Utc>>>,
}

impl ProfitDistributor {
    pub fn new(
        config: &DistributionConfig,
        venue: Arc<dyn VenueClient>,
        settlement: Arc<dyn SettlementClient>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        Ok(Self {
            venue,
            settlement,
            metrics,
            default_lp_share_bps: config.default_lp_share_bps,
            default_treasury_bps: config.default_treasury_bps,
            default_treasury: config.treasury_address()?,
            min_donate_amount: config.min_donate_amount_wad()?,
            min_donate_interval: config.min_donate_interval(),
            balances: RwLock::new(HashMap::new()),
            last_release: RwLock::new(HashMap::new()),
        })
    }

    /// Split `total` and settle the treasury and executor legs.
    ///
    /// The payload's split override wins over the configured defaults when
    /// present. Balance bookkeeping commits only after every transfer
    /// succeeded, so a settlement failure leaves the accumulated balances
    /// untouched.
    pub async fn distribute(
        &self,
        pair: PairKey,
        asset: AssetId,
        total: U256,
        executor: Address,
        payload: &TradePayload,
    ) -> Result<SplitShares> {
        if total.is_zero() {
            return Ok(SplitShares {
                lp: U256::ZERO,
                treasury: U256::ZERO,
                executor: U256::ZERO,
            });
        }

        let (lp_share_bps, treasury_bps, treasury) = if payload.has_split_override() {
            payload.validate()?;
            (payload.lp_share_bps, payload.treasury_bps, payload.treasury)
        } else {
            (
                self.default_lp_share_bps,
                self.default_treasury_bps,
                self.default_treasury,
            )
        };
        if treasury_bps > 0 && treasury == Address::ZERO {
            return Err(SplitError::MissingTreasury { treasury_bps }.into());
        }

        let shares = SplitShares::resolve(total, lp_share_bps, treasury_bps)?;

        if !shares.treasury.is_zero() {
            self.settlement
                .transfer(asset, treasury, shares.treasury)
                .await?;
        }
        if !shares.executor.is_zero() {
            self.settlement
                .transfer(asset, executor, shares.executor)
                .await?;
        }
        self.accumulate(pair, asset, shares.lp).await;

        self.metrics.inc_distributions();
        info!(
            pair = %pair,
            asset = %asset,
            total = %math::format_wad(total),
            lp = %math::format_wad(shares.lp),
            treasury = %math::format_wad(shares.treasury),
            executor_share = %math::format_wad(shares.executor),
            correlation_id = %payload.correlation_id,
            "distributed realized profit"
        );
        Ok(shares)
    }

    /// Add to a pair's held-back balance.
    ///
    /// Captured fees route here in full; the LP leg of a distribution
    /// lands here after the transfers settled.
    pub async fn accumulate(&self, pair: PairKey, asset: AssetId, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let mut balances = self.balances.write().await;
        let slot = balances.entry((pair, asset)).or_insert(U256::ZERO);
        *slot = slot.saturating_add(amount);
        debug!(
            pair = %pair,
            asset = %asset,
            amount = %math::format_wad(amount),
            balance = %math::format_wad(*slot),
            "accumulated value for pair"
        );
    }

    pub async fn accumulated(&self, pair: PairKey, asset: AssetId) -> U256 {
        self.balances
            .read()
            .await
            .get(&(pair, asset))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub async fn accumulated_for_pair(&self, pair: PairKey) -> Vec<(AssetId, U256)> {
        self.balances
            .read()
            .await
            .iter()
            .filter(|((p, _), _)| *p == pair)
            .map(|((_, asset), amount)| (*asset, *amount))
            .collect()
    }

    pub async fn last_release_at(&self, pair: PairKey) -> Option<DateTime<Utc>> {
        self.last_release.read().await.get(&pair).copied()
    }

    /// Side-effect-free release check, same rules `donate` enforces.
    pub async fn can_donate(&self, pair: PairKey, now: DateTime<Utc>) -> DonateReadiness {
        let largest = {
            let balances = self.balances.read().await;
            balances
                .iter()
                .filter(|((p, _), _)| *p == pair)
                .map(|(_, amount)| *amount)
                .max()
                .unwrap_or(U256::ZERO)
        };
        if largest.is_zero() {
            return DonateReadiness::NothingAccumulated;
        }
        if largest < self.min_donate_amount {
            return DonateReadiness::BelowThreshold {
                largest,
                required: self.min_donate_amount,
            };
        }
        if let Some(last) = self.last_release.read().await.get(&pair) {
            let elapsed = now - *last;
            if elapsed < self.min_donate_interval {
                return DonateReadiness::IntervalNotElapsed {
                    elapsed_secs: elapsed.num_seconds(),
                    required_secs: self.min_donate_interval.num_seconds(),
                };
            }
        }
        DonateReadiness::Ready
    }

    /// Release every accumulated balance for a pair to its LPs.
    ///
    /// The whole pair balance is claimed under the lock before any venue
    /// call, so concurrent releases cannot double-spend; if a donation leg
    /// fails, the unreleased remainder is added back without clobbering
    /// amounts accumulated in the meantime. The release timestamp advances
    /// only on full success.
    pub async fn donate(&self, pair: PairKey, now: DateTime<Utc>) -> Result<Vec<(AssetId, U256)>> {
        let claimed: Vec<(AssetId, U256)> = {
            let mut balances = self.balances.write().await;
            let last_release = self.last_release.read().await;

            let assets: Vec<AssetId> = balances
                .keys()
                .filter(|(p, _)| *p == pair)
                .map(|(_, asset)| *asset)
                .collect();
            let largest = assets
                .iter()
                .filter_map(|asset| balances.get(&(pair, *asset)))
                .max()
                .copied()
                .unwrap_or(U256::ZERO);

            if largest.is_zero() {
                return Err(DonateError::NothingAccumulated {
                    pair: pair.to_string(),
                }
                .into());
            }
            if largest < self.min_donate_amount {
                return Err(DonateError::BelowThreshold {
                    accumulated: largest,
                    required: self.min_donate_amount,
                }
                .into());
            }
            if let Some(last) = last_release.get(&pair) {
                let elapsed = now - *last;
                if elapsed < self.min_donate_interval {
                    return Err(DonateError::IntervalNotElapsed {
                        elapsed_secs: elapsed.num_seconds(),
                        required_secs: self.min_donate_interval.num_seconds(),
                    }
                    .into());
                }
            }

            assets
                .into_iter()
                .filter_map(|asset| {
                    balances
                        .remove(&(pair, asset))
                        .filter(|amount| !amount.is_zero())
                        .map(|amount| (asset, amount))
                })
                .collect()
        };

        for (idx, (asset, amount)) in claimed.iter().enumerate() {
            if let Err(err) = self.venue.donate(pair, *asset, *amount).await {
                let mut balances = self.balances.write().await;
                for (asset, amount) in &claimed[idx..] {
                    let slot = balances.entry((pair, *asset)).or_insert(U256::ZERO);
                    *slot = slot.saturating_add(*amount);
                }
                warn!(
                    pair = %pair,
                    asset = %asset,
                    error = %err,
                    "donation leg failed, restored unreleased balances"
                );
                return Err(err);
            }
        }

        self.last_release.write().await.insert(pair, now);
        self.metrics.inc_donations();
        info!(
            pair = %pair,
            legs = claimed.len(),
            "released accumulated value to liquidity providers"
        );
        Ok(claimed)
    }
}
