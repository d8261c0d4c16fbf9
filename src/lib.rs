pub mod cli;
pub mod clients;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod services;

pub use clients::{
    CreditContinuation, CreditFacility, PriceOracleClient, ReputationClient, SettlementClient,
    VenueClient,
};
pub use config::AppConfig;
pub use domain::{AssetId, Direction, Opportunity, OpportunityState, PairKey, TradePayload};
pub use engine::{
    AccessRegistry, AgentRouter, CreditFundedExecutor, DivergenceAnalyzer, FeeRecommender,
    OpportunityLedger, ProfitDistributor, TradePipeline,
};
pub use error::{RecoupError, Result};
pub use services::Metrics;
