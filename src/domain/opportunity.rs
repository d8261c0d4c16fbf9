use super::asset::{Direction, PairKey};
use super::math;
use crate::error::Result;
use alloy::primitives::U256;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opportunity state machine states
///
/// Models the lifecycle of a single recorded opportunity. Overwriting a key
/// discards the old opportunity and starts a new machine at `Pending`; it is
/// not a transition of the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpportunityState {
    /// Nothing recorded for the key
    None,
    /// Recorded, awaiting an executor
    Pending,
    /// Round trip completed, profit distributed
    Executed,
    /// Outlived `max_opportunity_age` before any executor claimed it
    Expired,
}

impl OpportunityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityState::None => "NONE",
            OpportunityState::Pending => "PENDING",
            OpportunityState::Executed => "EXECUTED",
            OpportunityState::Expired => "EXPIRED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: OpportunityState) -> bool {
        use OpportunityState::*;

        match (self, target) {
            // From None
            (None, Pending) => true, // Post-trade record

            // From Pending
            (Pending, Executed) => true, // Successful round trip
            (Pending, Expired) => true,  // Outlived max age

            // Executed and Expired are terminal
            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<OpportunityState> {
        use OpportunityState::*;

        match self {
            None => vec![Pending],
            Pending => vec![Executed, Expired],
            Executed => vec![],
            Expired => vec![],
        }
    }

    /// Is this a terminal state for the opportunity?
    pub fn is_terminal(&self) -> bool {
        matches!(self, OpportunityState::Executed | OpportunityState::Expired)
    }

    /// Can an executor still act on this state?
    pub fn is_executable(&self) -> bool {
        matches!(self, OpportunityState::Pending)
    }
}

impl fmt::Display for OpportunityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OpportunityState {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(OpportunityState::None),
            "PENDING" => Ok(OpportunityState::Pending),
            "EXECUTED" => Ok(OpportunityState::Executed),
            "EXPIRED" => Ok(OpportunityState::Expired),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// A detected, time-bounded correction trade.
///
/// Created only by the post-trade decision step; mutated only by the
/// executor; terminal once `executed` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub pair: PairKey,
    /// Reference price the venue should return to (WAD)
    pub target_price: U256,
    /// Venue price at detection time (WAD)
    pub current_price: U256,
    /// Correction size in the funding asset
    pub amount: U256,
    pub direction: Direction,
    pub detected_at: DateTime<Utc>,
    pub executed: bool,
}

impl Opportunity {
    pub fn new(
        pair: PairKey,
        target_price: U256,
        current_price: U256,
        amount: U256,
        direction: Direction,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pair,
            target_price,
            current_price,
            amount,
            direction,
            detected_at,
            executed: false,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.detected_at
    }

    /// Strictly-older-than check; an opportunity exactly at the age limit is
    /// still executable. Executed opportunities never expire.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        !self.executed && self.age(now) > max_age
    }

    pub fn state(&self, now: DateTime<Utc>, max_age: Duration) -> OpportunityState {
        if self.executed {
            OpportunityState::Executed
        } else if self.is_expired(now, max_age) {
            OpportunityState::Expired
        } else {
            OpportunityState::Pending
        }
    }

    /// Gap between current and target price, in basis points of target.
    pub fn divergence_bps(&self) -> Result<u64> {
        math::divergence_bps(self.current_price, self.target_price)
    }

    /// Value expected from closing the gap, denominated in the trade asset.
    pub fn estimated_profit(&self) -> Result<U256> {
        let gap = if self.current_price >= self.target_price {
            self.current_price - self.target_price
        } else {
            self.target_price - self.current_price
        };
        math::mul_div(self.amount, gap, self.target_price)
    }

    pub fn funding_asset(&self) -> super::asset::AssetId {
        self.direction.funding_asset(&self.pair)
    }
}
