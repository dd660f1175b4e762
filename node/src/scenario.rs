//! # Scenario Runner
//!
//! A scenario is a JSON document listing ledger operations in order. Each
//! step names its operation in an `op` field; `advance` moves the simulated
//! clock and `fund` mints test balances into the in-memory value ledger.
//!
//! ```json
//! { "start": 1700000000,
//!   "steps": [
//!     { "op": "initialize_platform", "authority": "admin", "treasury": "treasury",
//!       "fee_bps": 100, "max_loan": 1000000000, "min_loan": 10000000 },
//!     { "op": "advance", "days": 30 },
//!     { "op": "repay_loan", "borrower": "alice", "pool": "Main Pool",
//!       "expect_error": "InvalidState" } ] }
//! ```
//!
//! Pools are referred to by the name they were created with. A step with
//! `expect_error` must fail with that error kind; any other failure aborts
//! the run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, info_span, warn};

use microlend_contracts::{
    AttestationCategory, CollateralType, HistoryEntry, LendingEngine, LendingError, LendingPool,
    LendingResult, Loan, LoanTerms, Platform, TransactionCategory, UserProfile,
};
use microlend_protocol::clock::{format_timestamp, ManualClock};
use microlend_protocol::config::{ProtocolParams, SECONDS_PER_DAY};
use microlend_protocol::identity::{AssetId, Identity};
use microlend_protocol::keys::PoolId;
use microlend_protocol::ledger::InMemoryLedger;
use microlend_protocol::storage::RecordStore;

use crate::metrics::SimulatorMetrics;

/// 2023-11-14T22:13:20Z.
const DEFAULT_START: i64 = 1_700_000_000;

fn default_start() -> i64 {
    DEFAULT_START
}

fn no_collateral() -> CollateralType {
    CollateralType::None
}

// ---------------------------------------------------------------------------
// Scenario document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub description: Option<String>,
    /// Initial value of the simulated clock, UNIX seconds.
    #[serde(default = "default_start")]
    pub start: i64,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid scenario document")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// Error kind this step must fail with, e.g. `"InvalidState"`.
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    InitializePlatform {
        authority: Identity,
        treasury: Identity,
        fee_bps: u16,
        max_loan: u64,
        min_loan: u64,
    },
    SetPlatformActive {
        caller: Identity,
        active: bool,
    },
    UpdateLoanBounds {
        caller: Identity,
        min: u64,
        max: u64,
    },
    UpdatePlatformFee {
        caller: Identity,
        fee_bps: u16,
    },
    CreatePool {
        authority: Identity,
        asset: AssetId,
        name: String,
        base_rate_bps: u16,
        max_duration_days: u32,
    },
    SetPoolActive {
        caller: Identity,
        pool: String,
        active: bool,
    },
    Fund {
        account: Identity,
        asset: AssetId,
        amount: u64,
    },
    InitializeUser {
        user: Identity,
    },
    Deposit {
        lender: Identity,
        pool: String,
        amount: u64,
    },
    Withdraw {
        lender: Identity,
        pool: String,
        shares: u64,
    },
    ClaimInterest {
        lender: Identity,
        pool: String,
    },
    RequestLoan {
        borrower: Identity,
        pool: String,
        principal: u64,
        duration_days: u32,
        #[serde(default)]
        purpose: String,
        #[serde(default = "no_collateral")]
        collateral: CollateralType,
    },
    ApproveLoan {
        caller: Identity,
        borrower: Identity,
        pool: String,
    },
    RejectLoan {
        caller: Identity,
        borrower: Identity,
        pool: String,
    },
    CancelLoan {
        borrower: Identity,
        pool: String,
    },
    DisburseLoan {
        caller: Identity,
        borrower: Identity,
        pool: String,
    },
    /// Repays `amount`, or the current quote when omitted.
    RepayLoan {
        borrower: Identity,
        pool: String,
        #[serde(default)]
        amount: Option<u64>,
    },
    LiquidateLoan {
        caller: Identity,
        borrower: Identity,
        pool: String,
    },
    Attest {
        attester: Identity,
        subject: Identity,
        category: AttestationCategory,
        score: u16,
        #[serde(default)]
        note: String,
        #[serde(default)]
        expires_in_days: Option<i64>,
    },
    RecordHistory {
        caller: Identity,
        subject: Identity,
        category: TransactionCategory,
        amount: u64,
        #[serde(default)]
        counterparty: Option<Identity>,
        frequency_score: u16,
        consistency_score: u16,
    },
    UpdateCreditScore {
        user: Identity,
    },
    Advance {
        #[serde(default)]
        days: i64,
        #[serde(default)]
        secs: i64,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::InitializePlatform { .. } => "initialize_platform",
            Action::SetPlatformActive { .. } => "set_platform_active",
            Action::UpdateLoanBounds { .. } => "update_loan_bounds",
            Action::UpdatePlatformFee { .. } => "update_platform_fee",
            Action::CreatePool { .. } => "create_lending_pool",
            Action::SetPoolActive { .. } => "set_pool_active",
            Action::Fund { .. } => "fund",
            Action::InitializeUser { .. } => "initialize_user",
            Action::Deposit { .. } => "deposit_to_pool",
            Action::Withdraw { .. } => "withdraw_from_pool",
            Action::ClaimInterest { .. } => "claim_interest",
            Action::RequestLoan { .. } => "request_loan",
            Action::ApproveLoan { .. } => "approve_loan",
            Action::RejectLoan { .. } => "reject_loan",
            Action::CancelLoan { .. } => "cancel_loan",
            Action::DisburseLoan { .. } => "disburse_loan",
            Action::RepayLoan { .. } => "repay_loan",
            Action::LiquidateLoan { .. } => "liquidate_loan",
            Action::Attest { .. } => "add_attestation",
            Action::RecordHistory { .. } => "add_transaction_history",
            Action::UpdateCreditScore { .. } => "update_credit_score",
            Action::Advance { .. } => "advance",
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Ledger state after a run, printed as JSON.
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub clock: String,
    pub steps: usize,
    pub expected_failures: usize,
    pub platform: Option<Platform>,
    pub pools: Vec<PoolSnapshot>,
    pub loans: Vec<Loan>,
    pub profiles: Vec<UserProfile>,
    /// asset -> participant -> balance
    pub balances: BTreeMap<String, BTreeMap<String, u64>>,
}

#[derive(Debug, Serialize)]
pub struct PoolSnapshot {
    pub id: String,
    pub net_asset_value: u64,
    pub vault_balance: u64,
    pub pool: LendingPool,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct Runner {
    engine: LendingEngine,
    ledger: Arc<InMemoryLedger>,
    clock: Arc<ManualClock>,
    metrics: Option<SimulatorMetrics>,
    pools: BTreeMap<String, PoolId>,
    assets: BTreeSet<AssetId>,
    participants: BTreeSet<Identity>,
}

impl Runner {
    pub fn new(
        store: Arc<dyn RecordStore>,
        params: ProtocolParams,
        start: i64,
        metrics: Option<SimulatorMetrics>,
    ) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::new(start));
        let engine = LendingEngine::new(store, ledger.clone(), clock.clone()).with_params(params);
        if let Some(m) = &metrics {
            m.clock_seconds.set(start);
        }
        Self {
            engine,
            ledger,
            clock,
            metrics,
            pools: BTreeMap::new(),
            assets: BTreeSet::new(),
            participants: BTreeSet::new(),
        }
    }

    pub fn engine(&self) -> &LendingEngine {
        &self.engine
    }

    pub fn metrics(&self) -> Option<&SimulatorMetrics> {
        self.metrics.as_ref()
    }

    /// Execute every step in order and return the final snapshot.
    pub fn run(&mut self, scenario: &Scenario) -> Result<Snapshot> {
        if let Some(description) = &scenario.description {
            info!(%description, steps = scenario.steps.len(), "scenario started");
        }
        let mut expected_failures = 0;

        for (index, step) in scenario.steps.iter().enumerate() {
            let op = step.action.name();
            let _span = info_span!("step", index, op).entered();

            let started = Instant::now();
            let result = self.apply(&step.action);
            if let Some(m) = &self.metrics {
                let failure = result.as_ref().err().map(|e| e.kind().to_string());
                m.observe(op, started.elapsed().as_secs_f64(), failure.as_deref());
            }

            match (result, &step.expect_error) {
                (Ok(outcome), None) => info!(%outcome, "step ok"),
                (Err(err), Some(expected)) if err.kind().to_string() == *expected => {
                    expected_failures += 1;
                    info!(error = %err, "step failed as expected");
                }
                (Ok(outcome), Some(expected)) => {
                    bail!("step {index} ({op}) succeeded with {outcome}, expected {expected}")
                }
                (Err(err), Some(expected)) => {
                    bail!("step {index} ({op}) failed with {}: {err}, expected {expected}", err.kind())
                }
                (Err(err), None) => {
                    warn!(error = %err, kind = %err.kind(), "step failed");
                    return Err(anyhow::Error::new(err).context(format!("step {index} ({op})")));
                }
            }
        }

        let mut snapshot = self.snapshot()?;
        snapshot.steps = scenario.steps.len();
        snapshot.expected_failures = expected_failures;
        Ok(snapshot)
    }

    fn pool(&self, name: &str) -> LendingResult<PoolId> {
        self.pools
            .get(name)
            .copied()
            .ok_or(LendingError::NotFound("pool"))
    }

    fn touch(&mut self, who: &Identity) {
        self.participants.insert(who.clone());
    }

    fn apply(&mut self, action: &Action) -> LendingResult<Value> {
        let engine = &self.engine;
        match action {
            Action::InitializePlatform {
                authority,
                treasury,
                fee_bps,
                max_loan,
                min_loan,
            } => {
                engine.initialize_platform(authority, treasury, *fee_bps, *max_loan, *min_loan)?;
                self.touch(treasury);
                Ok(Value::Null)
            }
            Action::SetPlatformActive { caller, active } => {
                engine.set_platform_active(caller, *active)?;
                Ok(json!({ "active": active }))
            }
            Action::UpdateLoanBounds { caller, min, max } => {
                engine.update_loan_bounds(caller, *min, *max)?;
                Ok(json!({ "min": min, "max": max }))
            }
            Action::UpdatePlatformFee { caller, fee_bps } => {
                engine.update_platform_fee(caller, *fee_bps)?;
                Ok(json!({ "fee_bps": fee_bps }))
            }
            Action::CreatePool {
                authority,
                asset,
                name,
                base_rate_bps,
                max_duration_days,
            } => {
                if self.pools.contains_key(name) {
                    return Err(LendingError::AlreadyExists("pool name"));
                }
                let id = engine.create_lending_pool(authority, asset, name, *base_rate_bps, *max_duration_days)?;
                self.pools.insert(name.clone(), id);
                self.assets.insert(asset.clone());
                Ok(json!({ "pool": id.to_string() }))
            }
            Action::SetPoolActive { caller, pool, active } => {
                engine.set_pool_active(caller, &self.pool(pool)?, *active)?;
                Ok(json!({ "active": active }))
            }
            Action::Fund { account, asset, amount } => {
                self.ledger.mint(asset, &account.account(), *amount)?;
                self.assets.insert(asset.clone());
                self.touch(account);
                Ok(json!({ "balance": self.engine.balance_of(asset, &account.account()) }))
            }
            Action::InitializeUser { user } => {
                engine.initialize_user(user)?;
                self.touch(user);
                Ok(Value::Null)
            }
            Action::Deposit { lender, pool, amount } => {
                let shares = engine.deposit_to_pool(lender, &self.pool(pool)?, *amount)?;
                self.touch(lender);
                Ok(json!({ "shares": shares }))
            }
            Action::Withdraw { lender, pool, shares } => {
                let out = engine.withdraw_from_pool(lender, &self.pool(pool)?, *shares)?;
                Ok(json!({ "redemption": out.redemption, "interest": out.interest }))
            }
            Action::ClaimInterest { lender, pool } => {
                let paid = engine.claim_interest(lender, &self.pool(pool)?)?;
                Ok(json!({ "interest": paid }))
            }
            Action::RequestLoan {
                borrower,
                pool,
                principal,
                duration_days,
                purpose,
                collateral,
            } => {
                let terms = LoanTerms {
                    principal: *principal,
                    duration_days: *duration_days,
                    purpose: purpose.clone(),
                    collateral: *collateral,
                };
                engine.request_loan(borrower, &self.pool(pool)?, terms)?;
                self.touch(borrower);
                Ok(Value::Null)
            }
            Action::ApproveLoan { caller, borrower, pool } => {
                engine.approve_loan(caller, borrower, &self.pool(pool)?)?;
                Ok(Value::Null)
            }
            Action::RejectLoan { caller, borrower, pool } => {
                engine.reject_loan(caller, borrower, &self.pool(pool)?)?;
                Ok(Value::Null)
            }
            Action::CancelLoan { borrower, pool } => {
                engine.cancel_loan(borrower, &self.pool(pool)?)?;
                Ok(Value::Null)
            }
            Action::DisburseLoan { caller, borrower, pool } => {
                let pool_id = self.pool(pool)?;
                engine.disburse_loan(caller, borrower, &pool_id)?;
                let rate = engine.loan(borrower, &pool_id)?.map(|l| l.interest_rate_bps);
                Ok(json!({ "interest_rate_bps": rate }))
            }
            Action::RepayLoan { borrower, pool, amount } => {
                let pool_id = self.pool(pool)?;
                let amount = match amount {
                    Some(amount) => *amount,
                    None => engine.quote_repayment(borrower, &pool_id)?.total(),
                };
                let quote = engine.repay_loan(borrower, &pool_id, amount)?;
                Ok(json!({
                    "paid": amount,
                    "interest": quote.interest,
                    "late_fee": quote.late_fee,
                    "platform_fee": quote.platform_fee,
                    "late": quote.late,
                }))
            }
            Action::LiquidateLoan { caller, borrower, pool } => {
                let out = engine.liquidate_loan(caller, borrower, &self.pool(pool)?)?;
                Ok(json!({ "written_off": out.written_off, "recovered": out.recovered }))
            }
            Action::Attest {
                attester,
                subject,
                category,
                score,
                note,
                expires_in_days,
            } => {
                let expires_at = expires_in_days.map(|days| self.clock_now() + days * SECONDS_PER_DAY);
                engine.add_attestation(attester, subject, *category, *score, note, expires_at)?;
                Ok(Value::Null)
            }
            Action::RecordHistory {
                caller,
                subject,
                category,
                amount,
                counterparty,
                frequency_score,
                consistency_score,
            } => {
                let entry = HistoryEntry {
                    category: *category,
                    amount: *amount,
                    counterparty: counterparty.clone(),
                    timestamp: self.clock_now(),
                    frequency_score: *frequency_score,
                    consistency_score: *consistency_score,
                };
                let sequence = engine.add_transaction_history(caller, subject, entry)?;
                Ok(json!({ "sequence": sequence }))
            }
            Action::UpdateCreditScore { user } => {
                let score = engine.update_credit_score(user)?;
                Ok(json!({ "credit_score": score }))
            }
            Action::Advance { days, secs } => {
                self.clock.advance_days(*days);
                self.clock.advance_secs(*secs);
                let now = self.clock_now();
                if let Some(m) = &self.metrics {
                    m.clock_seconds.set(now);
                }
                Ok(json!({ "now": format_timestamp(now) }))
            }
        }
    }

    fn clock_now(&self) -> i64 {
        self.engine.now()
    }

    /// Current ledger state for every pool and participant the run touched.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let engine = &self.engine;
        let mut pools = Vec::new();
        let mut loans = Vec::new();

        for id in self.pools.values() {
            let pool = engine
                .pool(id)?
                .with_context(|| format!("pool {id} vanished"))?;
            pools.push(PoolSnapshot {
                id: id.to_string(),
                net_asset_value: pool.net_asset_value()?,
                vault_balance: engine.balance_of(&pool.asset, &pool.vault),
                pool,
            });
            for who in &self.participants {
                loans.extend(engine.loan(who, id)?);
            }
        }

        let mut profiles = Vec::new();
        for who in &self.participants {
            profiles.extend(engine.profile(who)?);
        }

        let balances = self
            .assets
            .iter()
            .map(|asset| {
                let per_account = self
                    .participants
                    .iter()
                    .map(|who| (who.to_string(), engine.balance_of(asset, &who.account())))
                    .collect();
                (asset.to_string(), per_account)
            })
            .collect();

        Ok(Snapshot {
            clock: format_timestamp(self.clock_now()),
            steps: 0,
            expected_failures: 0,
            platform: engine.platform()?,
            pools,
            loans,
            profiles,
            balances,
        })
    }
}
