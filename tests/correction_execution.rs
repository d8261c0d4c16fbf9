//! Credit-funded correction scenarios: age limits, rival keepers, and how
//! realized profit is split and settled.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use alloy::primitives::{address, Address, U256};
use chrono::{DateTime, Duration, TimeZone, Utc};
use recoup::clients::sim::{SimCreditFacility, SimSettlement, SimVenue};
use recoup::clients::CreditFacility;
use recoup::config::{DistributionConfig, LedgerConfig};
use recoup::domain::{bps_of, AssetId, Direction, PairKey, TradePayload, WAD};
use recoup::engine::{
    AccessRegistry, CreditFundedExecutor, OpportunityCandidate, OpportunityLedger,
    ProfitDistributor,
};
use recoup::error::RecoupError;
use recoup::services::Metrics;
use recoup::OpportunityState;

const OWNER: Address = address!("00000000000000000000000000000000000000aa");
const PIPELINE: Address = address!("00000000000000000000000000000000000000bb");
const KEEPER: Address = address!("00000000000000000000000000000000000000cc");
const TREASURY: Address = address!("00000000000000000000000000000000000000dd");

fn wad(units: u64) -> U256 {
    U256::from(units) * WAD
}

fn test_pair() -> PairKey {
    PairKey::new(
        address!("1111111111111111111111111111111111111111"),
        address!("2222222222222222222222222222222222222222"),
        0,
    )
}

fn base_asset() -> AssetId {
    AssetId::from(address!("1111111111111111111111111111111111111111"))
}

struct Stack {
    venue: Arc<SimVenue>,
    facility: Arc<SimCreditFacility>,
    settlement: Arc<SimSettlement>,
    ledger: Arc<OpportunityLedger>,
    metrics: Arc<Metrics>,
    executor: CreditFundedExecutor,
}

fn stack_with(ledger_config: LedgerConfig, premium_bps: u32, pool_fee_bps: u32) -> Stack {
    let distribution = DistributionConfig::default();
    let access = Arc::new(AccessRegistry::new(OWNER, PIPELINE, vec![KEEPER]));
    let metrics = Arc::new(Metrics::new());

    let venue = Arc::new(SimVenue::new());
    venue.set_pool(test_pair(), wad(2060), wad(1_000_000), pool_fee_bps);
    let facility = Arc::new(SimCreditFacility::new(premium_bps));
    let settlement = Arc::new(SimSettlement::new());

    let ledger = Arc::new(OpportunityLedger::new(
        &ledger_config,
        access.clone(),
        metrics.clone(),
    ));
    let distributor = Arc::new(
        ProfitDistributor::new(
            &distribution,
            venue.clone(),
            settlement.clone(),
            metrics.clone(),
        )
        .unwrap(),
    );
    let executor = CreditFundedExecutor::new(
        ledger.clone(),
        venue.clone(),
        facility.clone(),
        distributor,
        access,
        metrics.clone(),
    );
    Stack {
        venue,
        facility,
        settlement,
        ledger,
        metrics,
        executor,
    }
}

fn stack() -> Stack {
    stack_with(LedgerConfig::default(), 0, 0)
}

/// Venue at 2060 against a 2000 reference, correcting after one swap.
async fn record_dislocation(stack: &Stack, detected_at: DateTime<Utc>) {
    stack.venue.set_reversion(test_pair(), wad(2000));
    stack
        .ledger
        .record(
            PIPELINE,
            OpportunityCandidate {
                pair: test_pair(),
                target_price: wad(2000),
                current_price: wad(2060),
                amount: wad(1000),
                direction: Direction::Sell,
                divergence_bps: 300,
                detected_at,
            },
        )
        .await
        .unwrap();
}

/// An opportunity recorded three seconds ago with a two-second age limit
/// is unexecutable however fast the keeper is, and claiming drops it.
#[tokio::test]
async fn aged_out_opportunity_is_dropped_not_executed() {
    let stack = stack_with(
        LedgerConfig {
            max_opportunity_age_secs: 2,
            ..LedgerConfig::default()
        },
        0,
        0,
    );
    record_dislocation(&stack, Utc::now() - Duration::seconds(3)).await;

    let err = stack
        .executor
        .execute(KEEPER, test_pair(), U256::ZERO, &TradePayload::new(0))
        .await
        .unwrap_err();
    match err {
        RecoupError::ExpiredOpportunity {
            age_secs,
            max_age_secs,
            ..
        } => {
            assert_eq!(age_secs, 3);
            assert_eq!(max_age_secs, 2);
        }
        other => panic!("expected ExpiredOpportunity, got {other:?}"),
    }
    assert_eq!(
        stack.ledger.state_of(test_pair(), Utc::now()).await,
        OpportunityState::None
    );
    assert_eq!(stack.metrics.opportunities_expired.load(Ordering::Relaxed), 1);
    assert_eq!(stack.facility.total_borrowed(base_asset()), U256::ZERO);

    // The pair is not poisoned: a fresh observation executes normally.
    record_dislocation(&stack, Utc::now()).await;
    assert!(stack
        .executor
        .execute(KEEPER, test_pair(), U256::ZERO, &TradePayload::new(0))
        .await
        .is_ok());
}

/// The age limit is strict: exactly at the limit is still claimable, one
/// second past it is not.
#[tokio::test]
async fn age_limit_boundary_is_strictly_greater_than() {
    let stack = stack_with(
        LedgerConfig {
            max_opportunity_age_secs: 2,
            ..LedgerConfig::default()
        },
        0,
        0,
    );
    let t0 = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
    record_dislocation(&stack, t0).await;

    assert!(stack.ledger.claim(test_pair(), t0 + Duration::seconds(2)).await.is_ok());

    record_dislocation(&stack, t0).await;
    let err = stack
        .ledger
        .claim(test_pair(), t0 + Duration::seconds(3))
        .await
        .unwrap_err();
    assert!(matches!(err, RecoupError::ExpiredOpportunity { .. }));
}

/// Two keepers race for the same opportunity; exactly one settles it and
/// the facility sees exactly one borrow.
#[tokio::test]
async fn rival_keepers_settle_exactly_once() {
    let stack = stack();
    record_dislocation(&stack, Utc::now()).await;
    let executor = Arc::new(stack.executor);

    let first = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .execute(KEEPER, test_pair(), U256::ZERO, &TradePayload::new(0))
                .await
        })
    };
    let second = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .execute(KEEPER, test_pair(), U256::ZERO, &TradePayload::new(0))
                .await
        })
    };

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    let wins = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(wins, 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(matches!(err, RecoupError::NoOpportunity { .. }));
        }
    }

    assert_eq!(stack.facility.total_borrowed(base_asset()), wad(1000));
    assert_eq!(stack.metrics.executions_ok.load(Ordering::Relaxed), 1);
    assert_eq!(
        stack.ledger.state_of(test_pair(), Utc::now()).await,
        OpportunityState::Executed
    );
}

/// Default split: 30 profit pays 24 to LPs and 6 to the keeper, nothing
/// to the treasury.
#[tokio::test]
async fn default_split_pays_lps_then_keeper() {
    let stack = stack();
    record_dislocation(&stack, Utc::now()).await;

    let report = stack
        .executor
        .execute(KEEPER, test_pair(), U256::ZERO, &TradePayload::new(0))
        .await
        .unwrap();
    assert_eq!(report.profit, wad(30));
    assert_eq!(report.shares.lp, wad(24));
    assert_eq!(report.shares.treasury, U256::ZERO);
    assert_eq!(report.shares.executor, wad(6));
    assert_eq!(stack.settlement.paid(base_asset(), KEEPER), wad(6));
}

/// A payload split override routes a treasury share without touching the
/// conservation property.
#[tokio::test]
async fn payload_override_redirects_treasury_share() {
    let stack = stack();
    record_dislocation(&stack, Utc::now()).await;

    let payload = TradePayload::new(0).with_split(1000, 7000, TREASURY);
    let report = stack
        .executor
        .execute(KEEPER, test_pair(), U256::ZERO, &payload)
        .await
        .unwrap();

    assert_eq!(report.profit, wad(30));
    assert_eq!(report.shares.lp, wad(21));
    assert_eq!(report.shares.treasury, wad(3));
    assert_eq!(report.shares.executor, wad(6));
    assert_eq!(stack.settlement.paid(base_asset(), TREASURY), wad(3));
    assert_eq!(stack.settlement.paid(base_asset(), KEEPER), wad(6));
    assert_eq!(
        report.shares.lp + report.shares.treasury + report.shares.executor,
        report.profit
    );
}

/// With venue fees and a credit premium in play the numbers stop being
/// round, but every conservation identity still holds exactly.
#[tokio::test]
async fn venue_fees_shrink_but_conserve_profit() {
    let stack = stack_with(LedgerConfig::default(), 9, 30);
    record_dislocation(&stack, Utc::now()).await;

    let report = stack
        .executor
        .execute(KEEPER, test_pair(), U256::ZERO, &TradePayload::new(0))
        .await
        .unwrap();

    assert_eq!(
        report.premium,
        bps_of(wad(1000), stack.facility.premium_bps()).unwrap()
    );
    assert_eq!(
        report.recovered,
        report.borrowed + report.premium + report.profit
    );
    assert_eq!(
        report.shares.lp + report.shares.treasury + report.shares.executor,
        report.profit
    );
    assert_eq!(report.shares.lp, bps_of(report.profit, 8000).unwrap());
    assert_eq!(
        stack.facility.total_repaid(base_asset()),
        report.borrowed + report.premium
    );
}

/// The profit floor is the keeper's own guard: one unit above realized
/// profit aborts and restores, the exact profit clears.
#[tokio::test]
async fn keeper_profit_floor_aborts_and_restores() {
    let stack = stack();
    record_dislocation(&stack, Utc::now()).await;

    let err = stack
        .executor
        .execute(KEEPER, test_pair(), wad(31), &TradePayload::new(0))
        .await
        .unwrap_err();
    match err {
        RecoupError::InsufficientProfit {
            recovered,
            required,
        } => {
            assert_eq!(recovered, wad(1030));
            assert_eq!(required, wad(1031));
        }
        other => panic!("expected InsufficientProfit, got {other:?}"),
    }
    assert_eq!(
        stack.ledger.state_of(test_pair(), Utc::now()).await,
        OpportunityState::Pending
    );
    assert_eq!(stack.facility.total_borrowed(base_asset()), U256::ZERO);
    assert_eq!(stack.settlement.paid(base_asset(), KEEPER), U256::ZERO);

    // The aborted legs corrected the pool; restage the dislocation.
    stack.venue.set_pool(test_pair(), wad(2060), wad(1_000_000), 0);
    record_dislocation(&stack, Utc::now()).await;

    let report = stack
        .executor
        .execute(KEEPER, test_pair(), wad(30), &TradePayload::new(0))
        .await
        .unwrap();
    assert_eq!(report.profit, wad(30));
}

/// A keeper running its own capital pays no premium and never touches the
/// facility; everything recovered above principal is distributable.
#[tokio::test]
async fn keeper_capital_skips_the_facility() {
    let stack = stack_with(LedgerConfig::default(), 9, 0);
    record_dislocation(&stack, Utc::now()).await;

    let report = stack
        .executor
        .execute_funded(KEEPER, test_pair(), wad(500), wad(10), &TradePayload::new(0))
        .await
        .unwrap();

    assert_eq!(report.borrowed, wad(500));
    assert_eq!(report.premium, U256::ZERO);
    assert_eq!(report.recovered, wad(515));
    assert_eq!(report.profit, wad(15));
    assert_eq!(report.shares.lp, wad(12));
    assert_eq!(report.shares.executor, wad(3));

    assert_eq!(stack.facility.total_borrowed(base_asset()), U256::ZERO);
    assert_eq!(stack.facility.total_repaid(base_asset()), U256::ZERO);
    assert_eq!(stack.settlement.paid(base_asset(), KEEPER), wad(3));
    assert_eq!(
        stack.ledger.state_of(test_pair(), Utc::now()).await,
        OpportunityState::Executed
    );
}
