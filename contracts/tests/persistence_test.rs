//! Persistence tests: ledger records written through a sled store survive
//! a close and reopen, and a rejected operation leaves nothing on disk.

mod common;

use std::sync::Arc;

use common::*;
use microlend_contracts::collateral::CollateralRegistry;
use microlend_contracts::{ErrorKind, LendingEngine, LoanStatus};
use microlend_protocol::clock::ManualClock;
use microlend_protocol::identity::Identity;
use microlend_protocol::keys::RecordKind;
use microlend_protocol::ledger::InMemoryLedger;
use microlend_protocol::storage::{RecordStore, SledStore};

fn reopen(path: &std::path::Path) -> LendingEngine {
    let store = SledStore::open(path).expect("reopen store");
    LendingEngine::new(
        Arc::new(store),
        Arc::new(InMemoryLedger::new()),
        Arc::new(ManualClock::new(START + 60 * DAY)),
    )
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let borrower = Identity::new("borrower");

    let pool = {
        let store = SledStore::open(dir.path()).expect("open store");
        let h = Harness::with(Arc::new(store), CollateralRegistry::new());
        let pool = h.pool();
        h.lender("lender", &pool, 500_000_000);
        h.user("borrower");
        h.borrow(&borrower, &pool, 100_000_000, 30);
        pool
    };

    let engine = reopen(dir.path());
    let platform = engine.platform().unwrap().expect("platform persisted");
    assert_eq!(platform.platform_fee_bps, FEE_BPS);
    assert_eq!(platform.stats.total_loans_issued, 1);
    assert_eq!(platform.stats.total_volume, 100_000_000);

    let p = engine.pool(&pool).unwrap().expect("pool persisted");
    assert_eq!(p.name, "Main Pool");
    assert_eq!(p.available_liquidity, 400_000_000);
    assert_eq!(p.total_deployed, 100_000_000);
    assert_eq!(engine.pools().unwrap().len(), 1);

    let loan = engine.loan(&borrower, &pool).unwrap().expect("loan persisted");
    assert_eq!(loan.status, LoanStatus::Disbursed);
    assert_eq!(loan.disbursed_at, Some(START));
    assert_eq!(engine.loans_with_status(LoanStatus::Disbursed).unwrap().len(), 1);

    let profile = engine.profile(&borrower).unwrap().expect("profile persisted");
    assert_eq!(profile.active_loans, 1);
    assert_eq!(profile.total_borrowed, 100_000_000);

    // The platform is a singleton on disk too.
    let err = engine
        .initialize_platform(&Identity::new("admin"), &Identity::new("treasury"), 100, MAX_LOAN, MIN_LOAN)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn rejected_operation_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SledStore::open(dir.path()).expect("open store"));
    let h = Harness::with(store.clone(), CollateralRegistry::new());
    let pool = h.pool();
    let before = store.record_count();

    let poor = Identity::new("poor");
    h.fund(&poor, 5);
    assert_eq!(
        h.engine.deposit_to_pool(&poor, &pool, 6).unwrap_err().kind(),
        ErrorKind::InsufficientFunds
    );
    assert_eq!(store.record_count(), before);
    assert!(store.keys(RecordKind::Deposit).unwrap().is_empty());
}
