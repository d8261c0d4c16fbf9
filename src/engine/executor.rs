//! Credit-funded opportunity execution
//!
//! An executor claims a pending opportunity, borrows the correction size
//! from the credit facility, runs both swap legs, verifies the recovery
//! covers principal, premium, and the caller's profit floor, then
//! distributes what is left. Every effect of a failed attempt is unwound
//! by the facility, and the claimed opportunity goes back to the ledger.
//! A funded variant runs the same legs on capital the caller supplies,
//! with no facility and no premium.

use crate::clients::{CreditContinuation, CreditFacility, VenueClient};
use crate::domain::{math, AssetId, Opportunity, PairKey, TradePayload};
use crate::engine::access::AccessRegistry;
use crate::engine::distributor::{ProfitDistributor, SplitShares};
use crate::engine::ledger::OpportunityLedger;
use crate::error::{RecoupError, Result};
use crate::services::Metrics;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one completed round trip.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub pair: PairKey,
    pub executor: Address,
    pub borrowed: U256,
    pub premium: U256,
    pub recovered: U256,
    pub profit: U256,
    pub shares: SplitShares,
    pub elapsed_ms: u64,
    pub correlation_id: Uuid,
}

/// Removes the pair from the in-flight set when the attempt ends, however
/// it ends.
struct InFlightGuard {
    in_flight: Arc<DashMap<PairKey, ()>>,
    pair: PairKey,
}

impl InFlightGuard {
    fn try_acquire(in_flight: &Arc<DashMap<PairKey, ()>>, pair: PairKey) -> Option<Self> {
        match in_flight.entry(pair) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    in_flight: in_flight.clone(),
                    pair,
                })
            }
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.pair);
    }
}

struct RoundTripOutcome {
    premium: U256,
    recovered: U256,
    profit: U256,
    shares: SplitShares,
}

/// The work performed while borrowed funds are held: both swap legs, the
/// profit check, and the distribution. Runs entirely inside the facility's
/// all-or-nothing envelope.
struct RoundTrip {
    venue: Arc<dyn VenueClient>,
    distributor: Arc<ProfitDistributor>,
    opportunity: Opportunity,
    executor: Address,
    payload: TradePayload,
    min_profit: U256,
    outcome: tokio::sync::Mutex<Option<RoundTripOutcome>>,
}

impl RoundTrip {
    fn into_outcome(self) -> Result<RoundTripOutcome> {
        self.outcome.into_inner().ok_or_else(|| {
            RecoupError::Internal("credit continuation finished without an outcome".to_string())
        })
    }
}

#[async_trait]
impl CreditContinuation for RoundTrip {
    async fn run(&self, asset: AssetId, amount: U256, premium: U256) -> Result<U256> {
        let pair = self.opportunity.pair;
        let recovered = correction_legs(self.venue.as_ref(), &self.opportunity, amount).await?;

        let owed = amount
            .checked_add(premium)
            .ok_or_else(|| RecoupError::Validation("credit repayment overflow".to_string()))?;
        let required = owed
            .checked_add(self.min_profit)
            .ok_or_else(|| RecoupError::Validation("profit floor overflow".to_string()))?;
        if recovered < required {
            return Err(RecoupError::InsufficientProfit {
                recovered,
                required,
            });
        }

        let profit = recovered - owed;
        let shares = self
            .distributor
            .distribute(pair, asset, profit, self.executor, &self.payload)
            .await?;

        *self.outcome.lock().await = Some(RoundTripOutcome {
            premium,
            recovered,
            profit,
            shares,
        });
        Ok(owed)
    }
}

/// Leg one pushes the venue toward the reference, leg two unwinds the
/// inventory at the corrected price. Returns the amount recovered.
async fn correction_legs(
    venue: &dyn VenueClient,
    opportunity: &Opportunity,
    amount: U256,
) -> Result<U256> {
    let pair = opportunity.pair;
    let first = venue.swap(pair, opportunity.direction, amount).await?;
    let second = venue
        .swap(pair, opportunity.direction.opposite(), first.amount_out)
        .await?;
    Ok(second.amount_out)
}

/// Where the capital for a round trip comes from.
#[derive(Clone, Copy)]
enum Funding {
    /// Borrowed from the credit facility for the opportunity's full size
    Credit,
    /// Supplied by the caller; no facility, no premium
    External { amount: U256 },
}

/// Runs claimed opportunities through borrowed-capital round trips.
pub struct CreditFundedExecutor {
    ledger: Arc<OpportunityLedger>,
    venue: Arc<dyn VenueClient>,
    facility: Arc<dyn CreditFacility>,
    distributor: Arc<ProfitDistributor>,
    access: Arc<AccessRegistry>,
    metrics: Arc<Metrics>,
    in_flight: Arc<DashMap<PairKey, ()>>,
}

impl CreditFundedExecutor {
    pub fn new(
        ledger: Arc<OpportunityLedger>,
        venue: Arc<dyn VenueClient>,
        facility: Arc<dyn CreditFacility>,
        distributor: Arc<ProfitDistributor>,
        access: Arc<AccessRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ledger,
            venue,
            facility,
            distributor,
            access,
            metrics,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Execute the pending opportunity for `pair` on facility credit.
    ///
    /// The round trip must recover the borrowed amount, the facility
    /// premium, and at least `min_profit` on top. Exactly one concurrent
    /// attempt per pair can get past the claim; the rest see
    /// `NoOpportunity`. On any failure after the claim the opportunity is
    /// restored, unless a fresh record superseded it.
    pub async fn execute(
        &self,
        caller: Address,
        pair: PairKey,
        min_profit: U256,
        payload: &TradePayload,
    ) -> Result<ExecutionReport> {
        self.run(caller, pair, Funding::Credit, min_profit, payload)
            .await
    }

    /// Execute the pending opportunity on the caller's own capital.
    ///
    /// `amount` sizes both legs in place of the recorded size; there is no
    /// facility and no premium, and the recovered principal stays with the
    /// caller. Only realized profit enters distribution. Claim, guard, and
    /// restore discipline are identical to [`Self::execute`].
    pub async fn execute_funded(
        &self,
        caller: Address,
        pair: PairKey,
        amount: U256,
        min_profit: U256,
        payload: &TradePayload,
    ) -> Result<ExecutionReport> {
        if amount.is_zero() {
            return Err(RecoupError::Validation(
                "funded execution needs a positive amount".to_string(),
            ));
        }
        self.run(caller, pair, Funding::External { amount }, min_profit, payload)
            .await
    }

    async fn run(
        &self,
        caller: Address,
        pair: PairKey,
        funding: Funding,
        min_profit: U256,
        payload: &TradePayload,
    ) -> Result<ExecutionReport> {
        let started = Instant::now();

        if let Err(err) = self.access.ensure_executor(caller).await {
            self.metrics.inc_executions_rejected();
            return Err(err);
        }

        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight, pair) else {
            debug!(pair = %pair, "attempt already in flight for pair");
            self.metrics.inc_executions_rejected();
            return Err(RecoupError::NoOpportunity {
                pair: pair.to_string(),
            });
        };

        let opportunity = match self.ledger.claim(pair, Utc::now()).await {
            Ok(opportunity) => opportunity,
            Err(err) => {
                self.metrics.inc_executions_rejected();
                return Err(err);
            }
        };

        let committed = match funding {
            Funding::Credit => opportunity.amount,
            Funding::External { amount } => amount,
        };
        let attempt = match funding {
            Funding::Credit => {
                self.credit_attempt(&opportunity, caller, min_profit, payload)
                    .await
            }
            Funding::External { amount } => {
                self.funded_attempt(&opportunity, amount, caller, min_profit, payload)
                    .await
            }
        };

        match attempt {
            Ok(outcome) => {
                self.ledger.mark_executed(opportunity.clone()).await;
                self.metrics.inc_executions_ok();
                let report = ExecutionReport {
                    pair,
                    executor: caller,
                    borrowed: committed,
                    premium: outcome.premium,
                    recovered: outcome.recovered,
                    profit: outcome.profit,
                    shares: outcome.shares,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    correlation_id: payload.correlation_id,
                };
                info!(
                    pair = %pair,
                    borrowed = %math::format_wad(report.borrowed),
                    recovered = %math::format_wad(report.recovered),
                    profit = %math::format_wad(report.profit),
                    elapsed_ms = report.elapsed_ms,
                    correlation_id = %report.correlation_id,
                    "round trip executed"
                );
                Ok(report)
            }
            Err(err) => {
                self.ledger.restore(opportunity).await;
                self.metrics.inc_executions_failed();
                warn!(
                    pair = %pair,
                    error = %err,
                    correlation_id = %payload.correlation_id,
                    "round trip failed, opportunity restored"
                );
                Err(err)
            }
        }
    }

    async fn credit_attempt(
        &self,
        opportunity: &Opportunity,
        executor: Address,
        min_profit: U256,
        payload: &TradePayload,
    ) -> Result<RoundTripOutcome> {
        let asset = opportunity.funding_asset();
        let amount = opportunity.amount;

        let round_trip = RoundTrip {
            venue: self.venue.clone(),
            distributor: self.distributor.clone(),
            opportunity: opportunity.clone(),
            executor,
            payload: payload.clone(),
            min_profit,
            outcome: tokio::sync::Mutex::new(None),
        };

        self.facility.with_credit(asset, amount, &round_trip).await?;
        round_trip.into_outcome()
    }

    /// Caller-capital legs. The principal never leaves the caller's
    /// custody, so only the realized profit goes through distribution.
    async fn funded_attempt(
        &self,
        opportunity: &Opportunity,
        amount: U256,
        executor: Address,
        min_profit: U256,
        payload: &TradePayload,
    ) -> Result<RoundTripOutcome> {
        let recovered = correction_legs(self.venue.as_ref(), opportunity, amount).await?;

        let required = amount
            .checked_add(min_profit)
            .ok_or_else(|| RecoupError::Validation("profit floor overflow".to_string()))?;
        if recovered < required {
            return Err(RecoupError::InsufficientProfit {
                recovered,
                required,
            });
        }

        let profit = recovered - amount;
        let shares = self
            .distributor
            .distribute(
                opportunity.pair,
                opportunity.funding_asset(),
                profit,
                executor,
                payload,
            )
            .await?;

        Ok(RoundTripOutcome {
            premium: U256::ZERO,
            recovered,
            profit,
            shares,
        })
    }
}
