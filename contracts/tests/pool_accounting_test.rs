//! Integration tests for pool accounting.
//!
//! The balance-sheet identity, share-price behaviour and value
//! conservation are checked after every step of multi-party histories.

mod common;

use std::sync::Arc;

use common::*;
use microlend_contracts::collateral::{CollateralRegistry, GuaranteeFund};
use microlend_contracts::{CollateralType, ErrorKind, LoanTerms};
use microlend_protocol::identity::{AccountId, Identity};
use microlend_protocol::keys::PoolId;
use microlend_protocol::storage::MemoryStore;

/// Net flows into a pool that the balance-sheet identity is checked against.
#[derive(Default)]
struct Flows {
    deposited: u64,
    withdrawn_principal: u64,
}

fn assert_identity(h: &Harness, pool: &PoolId, flows: &Flows) {
    let p = h.engine.pool(pool).unwrap().unwrap();
    let expected = flows.deposited - flows.withdrawn_principal - p.total_written_off + p.total_recovered;
    assert_eq!(p.net_asset_value().unwrap(), expected, "balance-sheet identity");
    assert_eq!(
        h.engine.balance_of(&h.asset, &p.vault),
        p.available_liquidity,
        "vault balance matches available liquidity"
    );
}

fn share_price_ppm(h: &Harness, pool: &PoolId) -> u128 {
    let p = h.engine.pool(pool).unwrap().unwrap();
    u128::from(p.net_asset_value().unwrap()) * 1_000_000 / u128::from(p.total_shares)
}

// ---------------------------------------------------------------------------
// Deposits & withdrawals
// ---------------------------------------------------------------------------

#[test]
fn deposit_then_full_withdrawal_returns_exact_amount() {
    let h = Harness::new();
    let pool = h.pool();
    let lender = h.lender("lender", &pool, 123_456_789);

    let deposit = h.engine.deposit(&lender, &pool).unwrap().unwrap();
    let out = h.engine.withdraw_from_pool(&lender, &pool, deposit.shares).unwrap();

    assert_eq!(out.redemption, 123_456_789);
    assert_eq!(out.interest, 0);
    assert_eq!(h.balance(&lender), 123_456_789);
    let p = h.engine.pool(&pool).unwrap().unwrap();
    assert_eq!(p.total_shares, 0);
    assert_eq!(p.available_liquidity, 0);
}

#[test]
fn failed_deposit_transfer_changes_nothing() {
    let h = Harness::new();
    let pool = h.pool();
    let poor = Identity::new("poor");
    h.fund(&poor, 10);

    let err = h.engine.deposit_to_pool(&poor, &pool, 11).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert!(h.engine.deposit(&poor, &pool).unwrap().is_none());
    let p = h.engine.pool(&pool).unwrap().unwrap();
    assert_eq!(p.total_shares, 0);
    assert_eq!(p.available_liquidity, 0);
    assert_eq!(h.balance(&poor), 10);
}

#[test]
fn withdraw_share_bounds() {
    let h = Harness::new();
    let pool = h.pool();
    let lender = h.lender("lender", &pool, 1_000);
    for shares in [0, 1_001] {
        assert_eq!(
            h.engine.withdraw_from_pool(&lender, &pool, shares).unwrap_err().kind(),
            ErrorKind::InvalidAmount
        );
    }
    let stranger = Identity::new("stranger");
    assert_eq!(
        h.engine.withdraw_from_pool(&stranger, &pool, 1).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn deployed_capital_cannot_be_recalled() {
    let h = Harness::new();
    let pool = h.pool();
    let lender = h.lender("lender", &pool, 200_000_000);
    let borrower = h.user("borrower");
    h.borrow(&borrower, &pool, 100_000_000, 30);

    let err = h.engine.withdraw_from_pool(&lender, &pool, 150_000_000).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);
    let out = h.engine.withdraw_from_pool(&lender, &pool, 100_000_000).unwrap();
    assert_eq!(out.redemption, 100_000_000);
}

// ---------------------------------------------------------------------------
// Interest distribution
// ---------------------------------------------------------------------------

#[test]
fn interest_is_split_by_shares_at_repayment_time() {
    let h = Harness::new();
    let pool = h.pool();
    let mut flows = Flows::default();

    let a = h.lender("a", &pool, 300_000_000);
    let b = h.lender("b", &pool, 100_000_000);
    flows.deposited = 400_000_000;

    let borrower = h.user("borrower");
    h.borrow(&borrower, &pool, 100_000_000, 60);
    assert_identity(&h, &pool, &flows);

    h.advance_days(60);
    let quote = h.engine.quote_repayment(&borrower, &pool).unwrap();
    h.fund(&borrower, quote.total() - 100_000_000);
    h.engine.repay_loan(&borrower, &pool, quote.total()).unwrap();
    assert_identity(&h, &pool, &flows);

    // A lender arriving after the repayment earns none of it.
    let c = h.lender("c", &pool, 100_000_000);
    flows.deposited += 100_000_000;
    assert_eq!(
        h.engine.claim_interest(&c, &pool).unwrap_err().kind(),
        ErrorKind::NothingToClaim
    );

    let got_a = h.engine.claim_interest(&a, &pool).unwrap();
    let got_b = h.engine.claim_interest(&b, &pool).unwrap();
    assert_eq!(got_a, quote.interest * 3 / 4);
    assert_eq!(got_b, quote.interest / 4);
    assert!(got_a + got_b <= quote.interest);
    assert_identity(&h, &pool, &flows);
}

#[test]
fn withdrawal_settles_pending_interest() {
    let h = Harness::new();
    let pool = h.pool();
    let lender = h.lender("lender", &pool, 500_000_000);
    let borrower = h.user("borrower");
    h.borrow(&borrower, &pool, 100_000_000, 30);
    h.advance_days(30);
    let quote = h.engine.quote_repayment(&borrower, &pool).unwrap();
    h.fund(&borrower, quote.total() - 100_000_000);
    h.engine.repay_loan(&borrower, &pool, quote.total()).unwrap();

    let out = h.engine.withdraw_from_pool(&lender, &pool, 500_000_000).unwrap();
    assert_eq!(out.redemption, 500_000_000);
    assert_eq!(out.interest, quote.interest);
    assert_eq!(h.balance(&lender), 500_000_000 + quote.interest);

    let p = h.engine.pool(&pool).unwrap().unwrap();
    assert_eq!(p.interest_reserve, 0);
    assert_eq!(p.available_liquidity, 0);
}

// ---------------------------------------------------------------------------
// Share price
// ---------------------------------------------------------------------------

#[test]
fn share_price_never_drops_without_liquidation() {
    let h = Harness::new();
    let pool = h.pool();
    let a = h.lender("a", &pool, 250_000_000);
    let mut price = share_price_ppm(&h, &pool);

    let mut check = |h: &Harness| {
        let now = share_price_ppm(h, &pool);
        assert!(now >= price, "share price fell from {price} to {now}");
        price = now;
    };

    let b = h.lender("b", &pool, 77_777_777);
    check(&h);

    let borrowers: Vec<_> = (0..3).map(|i| h.user(&format!("borrower{i}"))).collect();
    for (i, borrower) in borrowers.iter().enumerate() {
        h.borrow(borrower, &pool, 20_000_000 + i as u64 * 5_000_000, 30);
        check(&h);
    }

    h.advance_days(20);
    for borrower in &borrowers {
        let quote = h.engine.quote_repayment(borrower, &pool).unwrap();
        h.fund(borrower, quote.total());
        h.engine.repay_loan(borrower, &pool, quote.total()).unwrap();
        check(&h);
    }

    h.engine.claim_interest(&a, &pool).unwrap();
    check(&h);
    h.engine.withdraw_from_pool(&b, &pool, 50_000_000).unwrap();
    check(&h);
}

// ---------------------------------------------------------------------------
// Liquidation & recovery
// ---------------------------------------------------------------------------

#[test]
fn liquidation_socializes_loss_and_recovery_restores_value() {
    let guarantee = AccountId::new("guarantee-fund");
    let registry = CollateralRegistry::new().with(
        CollateralType::Group,
        Arc::new(GuaranteeFund {
            account: guarantee.clone(),
            coverage_bps: 2_500,
        }),
    );
    let h = Harness::with(Arc::new(MemoryStore::new()), registry);
    h.ledger.mint(&h.asset, &guarantee, 1_000_000_000).unwrap();

    let pool = h.pool();
    let mut flows = Flows::default();
    let lender = h.lender("lender", &pool, 400_000_000);
    flows.deposited = 400_000_000;

    let borrower = h.user("borrower");
    h.engine
        .request_loan(
            &borrower,
            &pool,
            LoanTerms {
                principal: 100_000_000,
                duration_days: 30,
                purpose: "group loan".into(),
                collateral: CollateralType::Group,
            },
        )
        .unwrap();
    h.engine.approve_loan(&h.admin, &borrower, &pool).unwrap();
    h.engine.disburse_loan(&h.admin, &borrower, &pool).unwrap();
    assert_identity(&h, &pool, &flows);

    h.advance_days(37);
    let out = h
        .engine
        .liquidate_loan(&Identity::new("keeper"), &borrower, &pool)
        .unwrap();
    assert_eq!(out.recovered, 25_000_000);
    assert_identity(&h, &pool, &flows);

    // Every share absorbs the net loss.
    assert_eq!(h.nav(&pool), 325_000_000);
    let out = h.engine.withdraw_from_pool(&lender, &pool, 400_000_000).unwrap();
    assert_eq!(out.redemption, 325_000_000);
    flows.withdrawn_principal = 400_000_000;
    let p = h.engine.pool(&pool).unwrap().unwrap();
    assert_eq!(p.total_shares, 0);
    assert_eq!(p.available_liquidity, 0);
}

// ---------------------------------------------------------------------------
// Conservation
// ---------------------------------------------------------------------------

#[test]
fn total_value_is_conserved() {
    let h = Harness::new();
    let pool = h.pool();
    let lender = h.lender("lender", &pool, 300_000_000);
    let borrower = h.user("borrower");
    h.fund(&borrower, 5_000_000);
    let supply = h.ledger.total_supply(&h.asset);

    h.borrow(&borrower, &pool, 100_000_000, 30);
    h.advance_days(15);
    let quote = h.engine.quote_repayment(&borrower, &pool).unwrap();
    h.engine.repay_loan(&borrower, &pool, quote.total()).unwrap();
    h.engine.claim_interest(&lender, &pool).unwrap();
    h.engine.withdraw_from_pool(&lender, &pool, 300_000_000).unwrap();

    assert_eq!(h.ledger.total_supply(&h.asset), supply);
    assert_eq!(
        h.balance(&lender) + h.balance(&borrower) + h.balance(&h.treasury),
        supply as u64
    );
}
