//! Opportunity ledger
//!
//! Per-pair map of detected correction opportunities. Entries are written
//! only by the trade pipeline and consumed by executors through a
//! claim/restore protocol, so at most one attempt can hold a key at a time.
//! Recording over a live key discards the old opportunity; the newest
//! observation always wins.

use crate::config::LedgerConfig;
use crate::domain::math;
use crate::domain::{Direction, Opportunity, OpportunityState, PairKey};
use crate::engine::access::AccessRegistry;
use crate::error::{RecoupError, Result};
use crate::services::Metrics;
use alloy::primitives::{Address, U256};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A post-trade observation the pipeline wants recorded.
#[derive(Debug, Clone)]
pub struct OpportunityCandidate {
    pub pair: PairKey,
    /// Reference price the venue should return to (WAD)
    pub target_price: U256,
    /// Venue price after the trade (WAD)
    pub current_price: U256,
    /// Correction size in the funding asset
    pub amount: U256,
    pub direction: Direction,
    pub divergence_bps: u64,
    pub detected_at: DateTime<Utc>,
}

impl OpportunityCandidate {
    fn into_opportunity(self) -> Opportunity {
        Opportunity::new(
            self.pair,
            self.target_price,
            self.current_price,
            self.amount,
            self.direction,
            self.detected_at,
        )
    }
}

/// What happened to a candidate handed to [`OpportunityLedger::record`].
///
/// Gate misses are normal operation, not errors; callers that care can
/// branch on the variant, everyone else ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordOutcome {
    /// Stored as a pending opportunity
    Recorded,
    /// Divergence below the recording threshold
    BelowDivergence,
    /// Estimated profit not worth an executor round trip
    BelowProfit,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Recorded => "RECORDED",
            RecordOutcome::BelowDivergence => "BELOW_DIVERGENCE",
            RecordOutcome::BelowProfit => "BELOW_PROFIT",
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded)
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared opportunity store with pipeline-gated writes.
pub struct OpportunityLedger {
    access: Arc<AccessRegistry>,
    metrics: Arc<Metrics>,
    opportunities: RwLock<HashMap<PairKey, Opportunity>>,
    min_divergence_bps: u64,
    min_profit_bps: u32,
    max_age: Duration,
}

impl OpportunityLedger {
    pub fn new(config: &LedgerConfig, access: Arc<AccessRegistry>, metrics: Arc<Metrics>) -> Self {
        Self {
            access,
            metrics,
            opportunities: RwLock::new(HashMap::new()),
            min_divergence_bps: config.min_divergence_bps,
            min_profit_bps: config.min_profit_bps,
            max_age: config.max_opportunity_age(),
        }
    }

    /// Record a post-trade candidate. Pipeline-only.
    ///
    /// Candidates below the divergence or profit gate are skipped, not
    /// stored. An existing entry for the key is replaced wholesale; there
    /// is no merging of amounts or prices across observations.
    pub async fn record(
        &self,
        caller: Address,
        candidate: OpportunityCandidate,
    ) -> Result<RecordOutcome> {
        self.access.ensure_pipeline(caller)?;

        if candidate.amount.is_zero() {
            return Err(RecoupError::Validation(
                "opportunity amount must be positive".to_string(),
            ));
        }
        if candidate.target_price.is_zero() || candidate.current_price.is_zero() {
            return Err(RecoupError::Validation(
                "opportunity prices must be positive".to_string(),
            ));
        }

        if candidate.divergence_bps < self.min_divergence_bps {
            debug!(
                pair = %candidate.pair,
                divergence_bps = candidate.divergence_bps,
                min = self.min_divergence_bps,
                "candidate below divergence gate, skipping"
            );
            return Ok(RecordOutcome::BelowDivergence);
        }

        let divergence_bps = candidate.divergence_bps;
        let opportunity = candidate.into_opportunity();

        let profit = opportunity.estimated_profit()?;
        let floor = math::bps_of(opportunity.amount, self.min_profit_bps)?;
        if profit <= floor {
            debug!(
                pair = %opportunity.pair,
                profit = %math::format_wad(profit),
                floor = %math::format_wad(floor),
                "candidate below profit gate, skipping"
            );
            return Ok(RecordOutcome::BelowProfit);
        }

        let pair = opportunity.pair;
        let amount = opportunity.amount;
        let replaced = {
            let mut map = self.opportunities.write().await;
            map.insert(pair, opportunity)
        };

        if let Some(previous) = replaced {
            if previous.executed {
                debug!(pair = %pair, "new opportunity replaces executed history");
            } else {
                info!(
                    pair = %pair,
                    previous_amount = %math::format_wad(previous.amount),
                    "overwriting live opportunity with fresh observation"
                );
            }
        }

        self.metrics.inc_opportunities_recorded();
        info!(
            pair = %pair,
            divergence_bps,
            amount = %math::format_wad(amount),
            "recorded opportunity"
        );
        Ok(RecordOutcome::Recorded)
    }

    /// Take exclusive ownership of a pending opportunity.
    ///
    /// The entry leaves the map, so a second claimant sees `NoOpportunity`
    /// until the holder either restores it or marks it executed. Expired
    /// entries are dropped here rather than handed out.
    pub async fn claim(&self, pair: PairKey, now: DateTime<Utc>) -> Result<Opportunity> {
        let mut map = self.opportunities.write().await;

        let opportunity = map.remove(&pair).ok_or_else(|| RecoupError::NoOpportunity {
            pair: pair.to_string(),
        })?;

        if opportunity.executed {
            // Terminal history stays in the map; nothing to claim.
            map.insert(pair, opportunity);
            return Err(RecoupError::NoOpportunity {
                pair: pair.to_string(),
            });
        }

        if opportunity.is_expired(now, self.max_age) {
            let age_secs = opportunity.age(now).num_seconds();
            drop(map);
            self.metrics.inc_opportunities_expired();
            info!(pair = %pair, age_secs, "dropping expired opportunity on claim");
            return Err(RecoupError::ExpiredOpportunity {
                pair: pair.to_string(),
                age_secs,
                max_age_secs: self.max_age.num_seconds(),
            });
        }

        debug!(pair = %pair, "opportunity claimed");
        Ok(opportunity)
    }

    /// Put a claimed opportunity back after a failed attempt.
    ///
    /// If the pipeline recorded a fresh opportunity for the key while the
    /// attempt was in flight, that fresh entry wins and the claimed one is
    /// discarded.
    pub async fn restore(&self, opportunity: Opportunity) {
        let pair = opportunity.pair;
        let mut map = self.opportunities.write().await;
        match map.entry(pair) {
            Entry::Vacant(slot) => {
                slot.insert(opportunity);
                debug!(pair = %pair, "restored opportunity after failed attempt");
            }
            Entry::Occupied(_) => {
                debug!(pair = %pair, "fresh record supersedes restored opportunity");
            }
        }
    }

    /// Finalize a claimed opportunity as executed.
    ///
    /// The terminal entry is kept for state queries unless a fresh record
    /// arrived mid-attempt, in which case the live entry is left alone.
    pub async fn mark_executed(&self, mut opportunity: Opportunity) {
        opportunity.executed = true;
        let pair = opportunity.pair;
        let mut map = self.opportunities.write().await;
        match map.entry(pair) {
            Entry::Vacant(slot) => {
                slot.insert(opportunity);
            }
            Entry::Occupied(_) => {
                debug!(pair = %pair, "fresh record supersedes executed history");
            }
        }
    }

    /// Observable state for a key at `now`.
    pub async fn state_of(&self, pair: PairKey, now: DateTime<Utc>) -> OpportunityState {
        let map = self.opportunities.read().await;
        match map.get(&pair) {
            Some(opportunity) => opportunity.state(now, self.max_age),
            None => OpportunityState::None,
        }
    }

    pub async fn get(&self, pair: PairKey) -> Option<Opportunity> {
        self.opportunities.read().await.get(&pair).cloned()
    }

    /// Keys with a claimable opportunity at `now`.
    pub async fn pending(&self, now: DateTime<Utc>) -> Vec<PairKey> {
        self.opportunities
            .read()
            .await
            .values()
            .filter(|opp| opp.state(now, self.max_age).is_executable())
            .map(|opp| opp.pair)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.opportunities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.opportunities.read().await.is_empty()
    }

    /// Drop every expired pending entry. Returns how many were removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.opportunities.write().await;
        let before = map.len();
        map.retain(|pair, opp| {
            let expired = opp.is_expired(now, self.max_age);
            if expired {
                debug!(pair = %pair, age_secs = opp.age(now).num_seconds(), "sweeping expired opportunity");
            }
            !expired
        });
        let removed = before - map.len();
        drop(map);

        for _ in 0..removed {
            self.metrics.inc_opportunities_expired();
        }
        if removed > 0 {
            info!(removed, "swept expired opportunities");
        }
        removed
    }
}
