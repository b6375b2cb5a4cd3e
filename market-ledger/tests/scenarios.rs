//! End-to-end scenarios through the async ledger

use alloy_primitives::U256;
use market_ledger::external::{
    FixedRate, InMemoryAttestation, InMemoryCustody, ManualClock, StaticOracle,
};
use market_ledger::{
    AccountId, AssetId, Collaborators, Config, Error, Ledger, LedgerEvent, MarketId, MarketParams, OracleId,
    Quantity, RateModelId,
};
use risk_engine::{TierLabel, ORACLE_PRICE_SCALE, WAD};
use std::sync::Arc;

fn units(n: u64) -> U256 {
    U256::from(n) * WAD
}

fn milli(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000_000_000u64)
}

fn price(milli_units: u64) -> U256 {
    ORACLE_PRICE_SCALE / U256::from(1_000u64) * U256::from(milli_units)
}

fn owner() -> AccountId {
    AccountId::new("owner")
}

fn lender() -> AccountId {
    AccountId::new("lender")
}

fn borrower() -> AccountId {
    AccountId::new("borrower")
}

fn liquidator() -> AccountId {
    AccountId::new("liquidator")
}

fn usdc() -> AssetId {
    AssetId::new("USDC")
}

fn weth() -> AssetId {
    AssetId::new("WETH")
}

struct TestBed {
    ledger: Arc<Ledger>,
    attestation: Arc<InMemoryAttestation>,
    custody: Arc<InMemoryCustody>,
    oracle: Arc<StaticOracle>,
    clock: Arc<ManualClock>,
}

fn params() -> MarketParams {
    MarketParams {
        loan_asset: usdc(),
        collateral_asset: weth(),
        oracle: OracleId::new("weth-usdc"),
        rate_model: RateModelId::new("fixed"),
        base_threshold: milli(945),
    }
}

async fn test_bed() -> TestBed {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let attestation = Arc::new(InMemoryAttestation::new(clock.clone()));
    let custody = Arc::new(InMemoryCustody::new());
    let collaborators = Collaborators {
        attestation: attestation.clone(),
        custody: custody.clone(),
        clock: clock.clone(),
    };

    let ledger = Ledger::open(Config::default(), collaborators).await.unwrap();
    ledger
        .enable_rate_model(&owner(), RateModelId::new("fixed"), Arc::new(FixedRate::per_second(U256::ZERO)))
        .unwrap();
    ledger.enable_base_threshold(&owner(), milli(945)).unwrap();

    let oracle = Arc::new(StaticOracle::new("weth-usdc", price(1_000), clock.clone()));
    ledger.register_oracle(OracleId::new("weth-usdc"), oracle.clone());

    for account in [lender(), borrower(), liquidator()] {
        custody.mint(&account, &usdc(), units(10_000));
        custody.mint(&account, &weth(), units(10_000));
    }

    TestBed {
        ledger: Arc::new(ledger),
        attestation,
        custody,
        oracle,
        clock,
    }
}

/// Market with 1000 supplied and 100 collateral pledged by the borrower
async fn funded_market(bed: &TestBed) -> MarketId {
    let market = bed.ledger.create_market(params()).await.unwrap();
    bed.ledger
        .supply(&market, &lender(), Quantity::Assets(units(1_000)), &lender())
        .await
        .unwrap();
    bed.ledger
        .supply_collateral(&market, &borrower(), units(100), &borrower())
        .await
        .unwrap();
    market
}

#[tokio::test]
async fn test_borrow_up_to_base_threshold() {
    let bed = test_bed().await;
    let market = funded_market(&bed).await;

    let rejected = bed
        .ledger
        .borrow(&market, &borrower(), Quantity::Assets(milli(94_510)), &borrower(), &borrower())
        .await;
    assert!(matches!(rejected, Err(Error::InsufficientCollateral(_))));

    bed.ledger
        .borrow(&market, &borrower(), Quantity::Assets(milli(94_500)), &borrower(), &borrower())
        .await
        .unwrap();

    let report = bed.ledger.solvency(&market, &borrower()).await.unwrap();
    assert!(report.healthy);
    assert_eq!(report.borrowed, milli(94_500));
    assert_eq!(report.max_borrow, milli(94_500));

    bed.ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_credit_tier_raises_borrowing_power() {
    let bed = test_bed().await;
    let market = funded_market(&bed).await;
    let tier = TierLabel::new("AAA+").unwrap();

    bed.ledger
        .borrow(&market, &borrower(), Quantity::Assets(milli(94_500)), &borrower(), &borrower())
        .await
        .unwrap();

    bed.ledger
        .set_tier_threshold(&owner(), &market, tier.clone(), milli(1_250))
        .unwrap();
    bed.attestation.set_tier(borrower(), tier);
    bed.attestation
        .grant(borrower(), Config::default().principal, 3_600);
    assert_eq!(
        bed.ledger.effective_threshold(&market, &borrower()).unwrap(),
        milli(1_250)
    );

    bed.ledger
        .borrow(&market, &borrower(), Quantity::Assets(units(29)), &borrower(), &borrower())
        .await
        .unwrap();
    let rejected = bed
        .ledger
        .borrow(&market, &borrower(), Quantity::Assets(milli(5_100)), &borrower(), &borrower())
        .await;
    assert!(matches!(rejected, Err(Error::InsufficientCollateral(_))));

    let report = bed.ledger.solvency(&market, &borrower()).await.unwrap();
    assert_eq!(report.borrowed, milli(123_500));
    assert_eq!(report.max_borrow, units(125));

    // Once the grant lapses the base threshold applies again
    bed.clock.advance(3_600);
    assert_eq!(
        bed.ledger.effective_threshold(&market, &borrower()).unwrap(),
        milli(945)
    );
    assert!(!bed.ledger.solvency(&market, &borrower()).await.unwrap().healthy);

    bed.ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_liquidation_realizes_bad_debt() {
    let bed = test_bed().await;
    let market = funded_market(&bed).await;
    bed.ledger
        .borrow(&market, &borrower(), Quantity::Assets(milli(94_500)), &borrower(), &borrower())
        .await
        .unwrap();

    // Collateral now supports half the debt
    bed.oracle.set_price(price(500));
    let report = bed.ledger.solvency(&market, &borrower()).await.unwrap();
    assert_eq!(report.max_borrow * U256::from(2u8), report.borrowed);

    let mut events = bed.ledger.subscribe();
    let outcome = bed
        .ledger
        .liquidate(&market, &liquidator(), &borrower(), units(100), U256::ZERO)
        .await
        .unwrap();

    assert_eq!(outcome.seized_assets, units(100));
    assert!(outcome.repaid_assets < milli(94_500));
    assert!(outcome.has_bad_debt());
    assert_eq!(outcome.after.borrow_shares, U256::ZERO);
    assert_eq!(outcome.after.collateral, U256::ZERO);

    let snapshot = bed.ledger.snapshot(&market).await.unwrap();
    let shortfall = milli(94_500) - outcome.repaid_assets;
    assert_eq!(outcome.bad_debt_assets, shortfall);
    assert_eq!(snapshot.state.total_supply_assets, units(1_000) - shortfall);
    assert_eq!(snapshot.state.total_borrow_assets, U256::ZERO);
    assert_eq!(snapshot.state.total_borrow_shares, U256::ZERO);

    assert_eq!(
        bed.custody.balance_of(&liquidator(), &weth()),
        units(10_100)
    );
    assert_eq!(
        bed.custody.balance_of(&liquidator(), &usdc()),
        units(10_000) - outcome.repaid_assets
    );

    let envelope = events.recv().await.unwrap();
    assert_eq!(envelope.market_id, Some(market));
    assert!(matches!(envelope.event, LedgerEvent::Liquidated { .. }));

    let second = bed
        .ledger
        .liquidate(&market, &liquidator(), &borrower(), units(1), U256::ZERO)
        .await;
    assert!(matches!(second, Err(Error::PositionHealthy(_))));
    assert_eq!(bed.ledger.metrics().bad_debt.get(), 1);

    bed.ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_partial_liquidation_restores_health() {
    let bed = test_bed().await;
    bed.ledger.enable_base_threshold(&owner(), milli(800)).unwrap();
    let market = bed
        .ledger
        .create_market(MarketParams {
            base_threshold: milli(800),
            ..params()
        })
        .await
        .unwrap();

    bed.oracle.set_price(price(3_000_000));
    bed.ledger
        .supply(&market, &lender(), Quantity::Assets(units(5_000)), &lender())
        .await
        .unwrap();
    bed.ledger
        .supply_collateral(&market, &borrower(), units(1), &borrower())
        .await
        .unwrap();
    bed.ledger
        .borrow(&market, &borrower(), Quantity::Assets(units(2_400)), &borrower(), &borrower())
        .await
        .unwrap();

    bed.oracle.set_price(price(2_900_000));
    assert!(!bed.ledger.solvency(&market, &borrower()).await.unwrap().healthy);

    let outcome = bed
        .ledger
        .liquidate(&market, &liquidator(), &borrower(), milli(500), U256::ZERO)
        .await
        .unwrap();
    assert_eq!(outcome.seized_assets, milli(500));
    assert!(outcome.incentive_factor > WAD);
    assert!(outcome.repaid_assets > units(1_350) && outcome.repaid_assets < units(1_450));
    assert!(!outcome.has_bad_debt());
    assert_eq!(outcome.after.collateral, milli(500));

    let report = bed.ledger.solvency(&market, &borrower()).await.unwrap();
    assert!(report.healthy);
    assert!(report.borrowed < units(1_100));
    assert!(report.borrowed <= report.max_borrow);

    let second = bed
        .ledger
        .liquidate(&market, &liquidator(), &borrower(), milli(100), U256::ZERO)
        .await;
    assert!(matches!(second, Err(Error::PositionHealthy(_))));

    bed.ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delegated_withdrawal() {
    let bed = test_bed().await;
    let market = funded_market(&bed).await;
    let keeper = AccountId::new("keeper");

    let rejected = bed
        .ledger
        .withdraw(&market, &keeper, Quantity::Assets(units(1)), &lender(), &keeper)
        .await;
    assert!(matches!(rejected, Err(Error::Unauthorized(_))));

    bed.ledger.set_authorization(&lender(), &keeper, true);
    bed.ledger
        .withdraw(&market, &keeper, Quantity::Assets(units(1)), &lender(), &keeper)
        .await
        .unwrap();
    assert_eq!(bed.custody.balance_of(&keeper, &usdc()), units(1));

    bed.ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_transfer_changes_nothing() {
    let bed = test_bed().await;
    let market = funded_market(&bed).await;
    let before = bed.ledger.snapshot(&market).await.unwrap();
    let pauper = AccountId::new("pauper");

    let rejected = bed
        .ledger
        .supply(&market, &pauper, Quantity::Assets(units(1)), &pauper)
        .await;
    assert!(matches!(rejected, Err(Error::Custody(_))));

    assert_eq!(bed.ledger.snapshot(&market).await.unwrap(), before);
    assert!(bed.ledger.position(&market, &pauper).await.unwrap().is_empty());

    bed.ledger.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_market_creation() {
    let bed = test_bed().await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&bed.ledger);
            tokio::spawn(async move { ledger.create_market(params()).await })
        })
        .collect();

    let mut created = 0;
    let mut duplicates = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::MarketAlreadyExists(_)) => duplicates += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(bed.ledger.market_ids(), vec![params().id()]);

    bed.ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_operations_on_one_market() {
    let bed = test_bed().await;
    let market = bed.ledger.create_market(params()).await.unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let ledger = Arc::clone(&bed.ledger);
            tokio::spawn(async move {
                ledger
                    .supply(&market, &lender(), Quantity::Assets(units(10)), &lender())
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let snapshot = bed.ledger.snapshot(&market).await.unwrap();
    let position = bed.ledger.position(&market, &lender()).await.unwrap();
    assert_eq!(snapshot.state.total_supply_assets, units(100));
    assert_eq!(position.supply_shares, snapshot.state.total_supply_shares);

    bed.ledger.shutdown().await.unwrap();
}
