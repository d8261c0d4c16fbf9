//! Correction engine
//!
//! Everything between the venue's trade path and the external
//! collaborators lives here:
//! - `divergence` / `capture` - pre-trade analysis, capture sizing, fee
//!   recommendation
//! - `ledger` - the opportunity state machine
//! - `executor` - atomic credit-funded round trips
//! - `distributor` - profit splits and the gated LP release
//! - `agents` / `router` - pluggable decision strategies with governed
//!   failover
//! - `pipeline` - the authorized pre/post-trade decision path
//! - `access` - owner / pipeline / executor authorization

// =============================================================================
// Authorization and analysis
// =============================================================================

pub mod access;
pub mod capture;
pub mod divergence;

// =============================================================================
// Opportunity lifecycle and settlement
// =============================================================================

pub mod distributor;
pub mod executor;
pub mod ledger;

// =============================================================================
// Agent governance and the decision path
// =============================================================================

pub mod agents;
pub mod pipeline;
pub mod router;

pub use access::AccessRegistry;
pub use agents::{
    BackrunAgent, CaptureAgent, DefaultBackrunAgent, DefaultCaptureAgent, DefaultFeeAgent,
    FeeAgent, PostTradeContext, PreTradeContext,
};
pub use capture::{FeeReason, FeeRecommendation, FeeRecommender, PreTradeDirective};
pub use divergence::{AnalysisInput, AnalysisOutcome, DivergenceAnalyzer};
pub use distributor::{DonateReadiness, ProfitDistributor, SplitShares};
pub use executor::{CreditFundedExecutor, ExecutionReport};
pub use ledger::{OpportunityCandidate, OpportunityLedger, RecordOutcome};
pub use pipeline::{PostTradeReport, TradeIntent, TradePipeline, TradeReceipt};
pub use router::{
    AgentBinding, AgentHandle, AgentRouter, AgentSlot, AgentSlotStatus, DecisionCategory,
    SwitchConfig, SwitchOutcome, DEFAULT_BACKRUN_AGENT, DEFAULT_CAPTURE_AGENT, DEFAULT_FEE_AGENT,
};
