//! Shared fixture: an engine over an in-memory store, an in-memory ledger
//! and a manual clock, with the platform already initialized.

#![allow(dead_code)]

use std::sync::Arc;

use microlend_contracts::collateral::CollateralRegistry;
use microlend_contracts::{LendingEngine, LoanTerms, CollateralType};
use microlend_protocol::clock::ManualClock;
use microlend_protocol::identity::{AssetId, Identity};
use microlend_protocol::keys::PoolId;
use microlend_protocol::ledger::InMemoryLedger;
use microlend_protocol::storage::{MemoryStore, RecordStore};

pub const START: i64 = 1_700_000_000;
pub const DAY: i64 = 86_400;

pub const FEE_BPS: u16 = 100;
pub const MIN_LOAN: u64 = 10_000_000;
pub const MAX_LOAN: u64 = 1_000_000_000;

pub struct Harness {
    pub engine: LendingEngine,
    pub ledger: Arc<InMemoryLedger>,
    pub clock: Arc<ManualClock>,
    pub asset: AssetId,
    pub admin: Identity,
    pub treasury: Identity,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Arc::new(MemoryStore::new()), CollateralRegistry::new())
    }

    pub fn with(store: Arc<dyn RecordStore>, collateral: CollateralRegistry) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::new(START));
        let engine = LendingEngine::new(store, ledger.clone(), clock.clone()).with_collateral(collateral);

        let admin = Identity::new("admin");
        let treasury = Identity::new("treasury");
        engine
            .initialize_platform(&admin, &treasury, FEE_BPS, MAX_LOAN, MIN_LOAN)
            .expect("platform init");

        Self {
            engine,
            ledger,
            clock,
            asset: AssetId::new("USDC"),
            admin,
            treasury,
        }
    }

    pub fn fund(&self, who: &Identity, amount: u64) {
        self.ledger.mint(&self.asset, &who.account(), amount).expect("mint");
    }

    pub fn balance(&self, who: &Identity) -> u64 {
        self.engine.balance_of(&self.asset, &who.account())
    }

    pub fn pool(&self) -> PoolId {
        self.engine
            .create_lending_pool(&self.admin, &self.asset, "Main Pool", 500, 365)
            .expect("pool")
    }

    pub fn lender(&self, name: &str, pool: &PoolId, amount: u64) -> Identity {
        let lender = Identity::new(name);
        self.fund(&lender, amount);
        self.engine.deposit_to_pool(&lender, pool, amount).expect("deposit");
        lender
    }

    pub fn user(&self, name: &str) -> Identity {
        let user = Identity::new(name);
        self.engine.initialize_user(&user).expect("profile");
        user
    }

    /// Request, approve and disburse a loan.
    pub fn borrow(&self, borrower: &Identity, pool: &PoolId, amount: u64, days: u32) {
        self.engine
            .request_loan(borrower, pool, terms(amount, days))
            .expect("request");
        self.engine.approve_loan(&self.admin, borrower, pool).expect("approve");
        self.engine.disburse_loan(&self.admin, borrower, pool).expect("disburse");
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance_days(days);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance_secs(secs);
    }

    /// `available + deployed - reserve`, from the stored pool record.
    pub fn nav(&self, pool: &PoolId) -> u64 {
        self.engine
            .pool(pool)
            .unwrap()
            .unwrap()
            .net_asset_value()
            .unwrap()
    }
}

pub fn terms(principal: u64, duration_days: u32) -> LoanTerms {
    LoanTerms {
        principal,
        duration_days,
        purpose: "inventory".into(),
        collateral: CollateralType::None,
    }
}
