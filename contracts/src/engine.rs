//! # Lending Engine
//!
//! The transaction layer. Every public operation:
//!
//! 1. declares its record set and takes the record locks in key order,
//! 2. loads the records and runs all validation and state computation in
//!    memory, staging record writes and value transfers,
//! 3. commits: executes the staged transfers, then applies the write batch
//!    atomically.
//!
//! Nothing observable happens before step 3. If a transfer fails, the
//! transfers already executed for the operation are reversed; if the store
//! commit fails, every transfer is reversed. An operation either lands in
//! full or leaves no trace.
//!
//! Transaction-history records are written under their subject's profile
//! lock: the sequence number comes from the locked profile, so no other
//! operation can address the same record concurrently.

use std::sync::Arc;

use microlend_protocol::clock::Clock;
use microlend_protocol::config::ProtocolParams;
use microlend_protocol::identity::{AccountId, AssetId, Identity};
use microlend_protocol::keys::{PoolId, RecordKey, RecordKind};
use microlend_protocol::ledger::ValueLedger;
use microlend_protocol::storage::{decode, RecordStore, WriteBatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::collateral::CollateralRegistry;
use crate::error::{LendingError, LendingResult};
use crate::loan::{Loan, LoanStatus, LoanTerms, RepaymentQuote};
use crate::locks::{LockTable, RecordSet};
use crate::platform::Platform;
use crate::pool::{LenderDeposit, LendingPool, Withdrawal};
use crate::reputation::{
    validate_weight, AttestationCategory, SocialAttestation, TransactionCategory,
    TransactionHistoryRecord, UserProfile,
};

// ---------------------------------------------------------------------------
// Operation inputs and outcomes
// ---------------------------------------------------------------------------

/// An off-platform activity reported by the platform authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub category: TransactionCategory,
    pub amount: u64,
    pub counterparty: Option<Identity>,
    pub timestamp: i64,
    pub frequency_score: u16,
    pub consistency_score: u16,
}

/// Result of a liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liquidation {
    pub written_off: u64,
    pub recovered: u64,
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Transfer {
    asset: AssetId,
    from: AccountId,
    to: AccountId,
    amount: u64,
}

/// Staged effects of one operation.
struct Tx<'a> {
    store: &'a dyn RecordStore,
    now: i64,
    batch: WriteBatch,
    transfers: Vec<Transfer>,
}

impl<'a> Tx<'a> {
    fn load<T: DeserializeOwned>(&self, key: &RecordKey) -> LendingResult<Option<T>> {
        Ok(self.store.get(key)?.map(|bytes| decode(&bytes)).transpose()?)
    }

    fn require<T: DeserializeOwned>(&self, key: &RecordKey, what: &'static str) -> LendingResult<T> {
        self.load(key)?.ok_or(LendingError::NotFound(what))
    }

    fn exists(&self, key: &RecordKey) -> LendingResult<bool> {
        Ok(self.store.get(key)?.is_some())
    }

    fn platform(&self) -> LendingResult<Platform> {
        self.require(&RecordKey::platform(), "platform")
    }

    fn put<T: Serialize>(&mut self, key: RecordKey, value: &T) -> LendingResult<()> {
        self.batch.put_record(key, value)?;
        Ok(())
    }

    fn transfer(&mut self, asset: &AssetId, from: AccountId, to: AccountId, amount: u64) {
        if amount > 0 {
            self.transfers.push(Transfer {
                asset: asset.clone(),
                from,
                to,
                amount,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The micro-lending ledger.
///
/// Cheap to share behind an `Arc`; every operation takes `&self`.
pub struct LendingEngine {
    store: Arc<dyn RecordStore>,
    ledger: Arc<dyn ValueLedger>,
    clock: Arc<dyn Clock>,
    params: ProtocolParams,
    collateral: CollateralRegistry,
    locks: LockTable,
}

impl std::fmt::Debug for LendingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LendingEngine")
            .field("params", &self.params)
            .field("collateral", &self.collateral)
            .field("locked_records", &self.locks.len())
            .finish()
    }
}

impl LendingEngine {
    pub fn new(store: Arc<dyn RecordStore>, ledger: Arc<dyn ValueLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            clock,
            params: ProtocolParams::default(),
            collateral: CollateralRegistry::default(),
            locks: LockTable::new(),
        }
    }

    pub fn with_params(mut self, params: ProtocolParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_collateral(mut self, registry: CollateralRegistry) -> Self {
        self.collateral = registry;
        self
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Run `body` as one atomic operation over `set`.
    fn execute<T>(
        &self,
        op: &'static str,
        set: RecordSet,
        body: impl FnOnce(&mut Tx<'_>) -> LendingResult<T>,
    ) -> LendingResult<T> {
        let span = info_span!("tx", op, id = %Uuid::new_v4());
        let _enter = span.enter();

        let _guards = self.locks.acquire(&set);
        let mut tx = Tx {
            store: self.store.as_ref(),
            now: self.clock.now(),
            batch: WriteBatch::new(),
            transfers: Vec::new(),
        };

        let out = match body(&mut tx) {
            Ok(out) => out,
            Err(e) => {
                debug!(error = %e, kind = %e.kind(), "operation rejected");
                return Err(e);
            }
        };

        let Tx { batch, transfers, .. } = tx;
        self.commit(batch, &transfers)?;
        Ok(out)
    }

    fn commit(&self, batch: WriteBatch, transfers: &[Transfer]) -> LendingResult<()> {
        for (done, t) in transfers.iter().enumerate() {
            if let Err(e) = self.ledger.transfer(&t.asset, &t.from, &t.to, t.amount) {
                warn!(
                    from = %t.from,
                    to = %t.to,
                    amount = t.amount,
                    error = %e,
                    "transfer failed, reversing {done} earlier transfer(s)"
                );
                self.reverse(&transfers[..done]);
                return Err(e.into());
            }
        }

        if let Err(e) = self.store.apply(batch) {
            warn!(error = %e, "commit failed, reversing {} transfer(s)", transfers.len());
            self.reverse(transfers);
            return Err(e.into());
        }
        Ok(())
    }

    fn reverse(&self, executed: &[Transfer]) {
        for t in executed.iter().rev() {
            if let Err(e) = self.ledger.transfer(&t.asset, &t.to, &t.from, t.amount) {
                error!(
                    from = %t.to,
                    to = %t.from,
                    amount = t.amount,
                    error = %e,
                    "compensating transfer failed"
                );
            }
        }
    }

    fn read<T: DeserializeOwned>(&self, key: RecordKey) -> LendingResult<Option<T>> {
        let _guard = self.locks.acquire(&RecordSet::new().read(key));
        self.read_unlocked(&key)
    }

    // -----------------------------------------------------------------------
    // Platform registry
    // -----------------------------------------------------------------------

    /// Create the platform singleton. Exactly once per deployment.
    pub fn initialize_platform(
        &self,
        authority: &Identity,
        treasury: &Identity,
        platform_fee_bps: u16,
        max_loan_amount: u64,
        min_loan_amount: u64,
    ) -> LendingResult<()> {
        let key = RecordKey::platform();
        self.execute("initialize_platform", RecordSet::new().write(key), |tx| {
            if tx.exists(&key)? {
                return Err(LendingError::AlreadyExists("platform"));
            }
            let platform = Platform::new(
                authority.clone(),
                treasury.clone(),
                platform_fee_bps,
                max_loan_amount,
                min_loan_amount,
                tx.now,
            )?;
            tx.put(key, &platform)?;
            info!(
                %authority,
                %treasury,
                fee_bps = platform_fee_bps,
                min_loan_amount,
                max_loan_amount,
                "platform initialized"
            );
            Ok(())
        })
    }

    pub fn set_platform_active(&self, caller: &Identity, active: bool) -> LendingResult<()> {
        self.update_platform("set_platform_active", |p| p.set_active(caller, active))?;
        info!(active, "platform status changed");
        Ok(())
    }

    pub fn update_loan_bounds(&self, caller: &Identity, min: u64, max: u64) -> LendingResult<()> {
        self.update_platform("update_loan_bounds", |p| p.update_loan_bounds(caller, min, max))?;
        info!(min, max, "loan bounds updated");
        Ok(())
    }

    pub fn update_platform_fee(&self, caller: &Identity, fee_bps: u16) -> LendingResult<()> {
        self.update_platform("update_platform_fee", |p| p.update_fee(caller, fee_bps))?;
        info!(fee_bps, "platform fee updated");
        Ok(())
    }

    fn update_platform(
        &self,
        op: &'static str,
        change: impl FnOnce(&mut Platform) -> LendingResult<()>,
    ) -> LendingResult<()> {
        let key = RecordKey::platform();
        self.execute(op, RecordSet::new().write(key), |tx| {
            let mut platform = tx.platform()?;
            change(&mut platform)?;
            tx.put(key, &platform)
        })
    }

    // -----------------------------------------------------------------------
    // Pools
    // -----------------------------------------------------------------------

    /// Open a pool owned by `authority` for `asset`.
    pub fn create_lending_pool(
        &self,
        authority: &Identity,
        asset: &AssetId,
        name: &str,
        base_rate_bps: u16,
        max_duration_days: u32,
    ) -> LendingResult<PoolId> {
        let platform_key = RecordKey::platform();
        let pool_id = RecordKey::pool(authority, asset);
        let set = RecordSet::new().read(platform_key).write(pool_id);

        self.execute("create_lending_pool", set, |tx| {
            tx.platform()?.ensure_active()?;
            if tx.exists(&pool_id)? {
                return Err(LendingError::AlreadyExists("pool"));
            }
            let pool = LendingPool::new(
                authority.clone(),
                asset.clone(),
                name.to_string(),
                base_rate_bps,
                max_duration_days,
                pool_id.vault_account(),
                tx.now,
            )?;
            tx.put(pool_id, &pool)?;
            info!(pool = %pool_id, %authority, %asset, name, base_rate_bps, max_duration_days, "pool created");
            Ok(pool_id)
        })
    }

    pub fn set_pool_active(&self, caller: &Identity, pool_id: &PoolId, active: bool) -> LendingResult<()> {
        let pool_id = *pool_id;
        self.execute("set_pool_active", RecordSet::new().write(pool_id), |tx| {
            let mut pool: LendingPool = tx.require(&pool_id, "pool")?;
            pool.set_active(caller, active)?;
            tx.put(pool_id, &pool)?;
            info!(pool = %pool_id, active, "pool status changed");
            Ok(())
        })
    }

    /// Deposit `amount` and mint shares. Returns the shares minted.
    pub fn deposit_to_pool(&self, lender: &Identity, pool_id: &PoolId, amount: u64) -> LendingResult<u64> {
        let pool_id = *pool_id;
        let deposit_key = RecordKey::deposit(lender, &pool_id);
        let set = RecordSet::new().write(pool_id).write(deposit_key);

        self.execute("deposit_to_pool", set, |tx| {
            let mut pool: LendingPool = tx.require(&pool_id, "pool")?;
            pool.ensure_active()?;
            let mut deposit = tx
                .load::<LenderDeposit>(&deposit_key)?
                .unwrap_or_else(|| LenderDeposit::new(lender.clone(), pool_id, tx.now));

            let minted = pool.deposit(&mut deposit, amount, tx.now)?;
            debug!(minted, total_shares = pool.total_shares, "shares minted");

            tx.transfer(&pool.asset, lender.account(), pool.vault.clone(), amount);
            tx.put(pool_id, &pool)?;
            tx.put(deposit_key, &deposit)?;
            info!(pool = %pool_id, %lender, amount, minted, "deposit");
            Ok(minted)
        })
    }

    /// Burn `shares`, paying out their value plus any pending interest.
    pub fn withdraw_from_pool(&self, lender: &Identity, pool_id: &PoolId, shares: u64) -> LendingResult<Withdrawal> {
        let pool_id = *pool_id;
        let deposit_key = RecordKey::deposit(lender, &pool_id);
        let set = RecordSet::new().write(pool_id).write(deposit_key);

        self.execute("withdraw_from_pool", set, |tx| {
            let mut pool: LendingPool = tx.require(&pool_id, "pool")?;
            let mut deposit: LenderDeposit = tx.require(&deposit_key, "deposit")?;

            let out = pool.withdraw(&mut deposit, shares, tx.now)?;
            debug!(redemption = out.redemption, interest = out.interest, "withdrawal priced");

            tx.transfer(&pool.asset, pool.vault.clone(), lender.account(), out.total());
            tx.put(pool_id, &pool)?;
            tx.put(deposit_key, &deposit)?;
            info!(pool = %pool_id, %lender, shares, paid = out.total(), "withdrawal");
            Ok(out)
        })
    }

    /// Pay out the lender's pending interest. Shares are untouched.
    pub fn claim_interest(&self, lender: &Identity, pool_id: &PoolId) -> LendingResult<u64> {
        let pool_id = *pool_id;
        let deposit_key = RecordKey::deposit(lender, &pool_id);
        let set = RecordSet::new().write(pool_id).write(deposit_key);

        self.execute("claim_interest", set, |tx| {
            let mut pool: LendingPool = tx.require(&pool_id, "pool")?;
            let mut deposit: LenderDeposit = tx.require(&deposit_key, "deposit")?;

            let interest = pool.claim(&mut deposit, tx.now)?;

            tx.transfer(&pool.asset, pool.vault.clone(), lender.account(), interest);
            tx.put(pool_id, &pool)?;
            tx.put(deposit_key, &deposit)?;
            info!(pool = %pool_id, %lender, interest, "interest claimed");
            Ok(interest)
        })
    }

    // -----------------------------------------------------------------------
    // Loans
    // -----------------------------------------------------------------------

    pub fn request_loan(&self, borrower: &Identity, pool_id: &PoolId, terms: LoanTerms) -> LendingResult<()> {
        let pool_id = *pool_id;
        let platform_key = RecordKey::platform();
        let profile_key = RecordKey::profile(borrower);
        let loan_key = RecordKey::loan(borrower, &pool_id);
        let set = RecordSet::new()
            .read(platform_key)
            .read(pool_id)
            .read(profile_key)
            .write(loan_key);

        self.execute("request_loan", set, |tx| {
            let platform = tx.platform()?;
            platform.ensure_active()?;
            let pool: LendingPool = tx.require(&pool_id, "pool")?;
            pool.ensure_active()?;
            let profile: UserProfile = tx.require(&profile_key, "profile")?;

            if let Some(existing) = tx.load::<Loan>(&loan_key)? {
                if !existing.can_be_superseded(tx.now, self.params.request_expiry_secs()) {
                    return Err(LendingError::AlreadyExists("open loan"));
                }
                debug!(previous = %existing.status, "superseding loan record");
            }

            platform.ensure_loan_amount(terms.principal)?;
            let required = self
                .params
                .required_credit_score(terms.principal, platform.max_loan_amount);
            if profile.credit_score < required {
                return Err(LendingError::CreditScoreTooLow {
                    score: profile.credit_score,
                    required,
                });
            }

            let principal = terms.principal;
            let duration = terms.duration_days;
            let loan = Loan::request(
                borrower.clone(),
                pool_id,
                terms,
                pool.max_duration_days,
                self.params.grace_period_days,
                self.params.late_fee_bps,
                tx.now,
            )?;
            tx.put(loan_key, &loan)?;
            info!(pool = %pool_id, %borrower, principal, duration_days = duration, "loan requested");
            Ok(())
        })
    }

    pub fn approve_loan(&self, caller: &Identity, borrower: &Identity, pool_id: &PoolId) -> LendingResult<()> {
        self.review_loan("approve_loan", caller, borrower, pool_id, |loan, now| loan.approve(now))
    }

    pub fn reject_loan(&self, caller: &Identity, borrower: &Identity, pool_id: &PoolId) -> LendingResult<()> {
        self.review_loan("reject_loan", caller, borrower, pool_id, |loan, now| loan.reject(now))
    }

    fn review_loan(
        &self,
        op: &'static str,
        caller: &Identity,
        borrower: &Identity,
        pool_id: &PoolId,
        decide: impl FnOnce(&mut Loan, i64) -> LendingResult<()>,
    ) -> LendingResult<()> {
        let platform_key = RecordKey::platform();
        let loan_key = RecordKey::loan(borrower, pool_id);
        let set = RecordSet::new().read(platform_key).write(loan_key);

        self.execute(op, set, |tx| {
            tx.platform()?.ensure_authority(caller, "review loans")?;
            let mut loan: Loan = tx.require(&loan_key, "loan")?;
            self.ensure_fresh(&loan, tx.now)?;
            decide(&mut loan, tx.now)?;
            tx.put(loan_key, &loan)?;
            info!(pool = %pool_id, %borrower, status = %loan.status, "loan reviewed");
            Ok(())
        })
    }

    /// Withdraw a pending request.
    pub fn cancel_loan(&self, borrower: &Identity, pool_id: &PoolId) -> LendingResult<()> {
        let loan_key = RecordKey::loan(borrower, pool_id);
        self.execute("cancel_loan", RecordSet::new().write(loan_key), |tx| {
            let mut loan: Loan = tx.require(&loan_key, "loan")?;
            loan.cancel(tx.now)?;
            tx.put(loan_key, &loan)?;
            info!(pool = %pool_id, %borrower, "loan cancelled");
            Ok(())
        })
    }

    fn ensure_fresh(&self, loan: &Loan, now: i64) -> LendingResult<()> {
        if loan.status.is_pending() && loan.can_be_superseded(now, self.params.request_expiry_secs()) {
            return Err(LendingError::state("loan", format!("{} (expired)", loan.status), "unexpired request"));
        }
        Ok(())
    }

    /// Fund an approved loan from the pool. The effective rate is fixed here.
    pub fn disburse_loan(&self, caller: &Identity, borrower: &Identity, pool_id: &PoolId) -> LendingResult<()> {
        let pool_id = *pool_id;
        let platform_key = RecordKey::platform();
        let profile_key = RecordKey::profile(borrower);
        let loan_key = RecordKey::loan(borrower, &pool_id);
        let set = RecordSet::new()
            .write(platform_key)
            .write(pool_id)
            .write(profile_key)
            .write(loan_key);

        self.execute("disburse_loan", set, |tx| {
            let mut platform = tx.platform()?;
            platform.ensure_authority(caller, "disburse loans")?;
            platform.ensure_active()?;
            let mut pool: LendingPool = tx.require(&pool_id, "pool")?;
            pool.ensure_active()?;
            let mut loan: Loan = tx.require(&loan_key, "loan")?;
            let mut profile: UserProfile = tx.require(&profile_key, "profile")?;
            self.ensure_fresh(&loan, tx.now)?;

            let rate = self
                .params
                .effective_rate_bps(pool.base_rate_bps, profile.credit_score, loan.duration_days);
            loan.disburse(rate, tx.now)?;
            pool.disburse(loan.principal)?;
            platform.record_disbursement(loan.principal)?;
            profile.record_disbursement(loan.principal, tx.now)?;
            debug!(rate_bps = rate, due_at = ?loan.due_at, "loan priced");

            tx.transfer(&pool.asset, pool.vault.clone(), borrower.account(), loan.principal);
            tx.put(platform_key, &platform)?;
            tx.put(pool_id, &pool)?;
            tx.put(profile_key, &profile)?;
            tx.put(loan_key, &loan)?;
            info!(pool = %pool_id, %borrower, principal = loan.principal, rate_bps = rate, "loan disbursed");
            Ok(())
        })
    }

    /// What it would cost to repay right now.
    pub fn quote_repayment(&self, borrower: &Identity, pool_id: &PoolId) -> LendingResult<RepaymentQuote> {
        let platform_key = RecordKey::platform();
        let loan_key = RecordKey::loan(borrower, pool_id);
        let _guards = self
            .locks
            .acquire(&RecordSet::new().read(platform_key).read(loan_key));

        let platform: Platform = self.read_unlocked(&platform_key)?.ok_or(LendingError::NotFound("platform"))?;
        let loan: Loan = self.read_unlocked(&loan_key)?.ok_or(LendingError::NotFound("loan"))?;
        loan.quote(self.clock.now(), &platform)
    }

    fn read_unlocked<T: DeserializeOwned>(&self, key: &RecordKey) -> LendingResult<Option<T>> {
        Ok(self.store.get(key)?.map(|bytes| decode(&bytes)).transpose()?)
    }

    /// Repay a disbursed loan in full. `amount` must equal the quoted total.
    pub fn repay_loan(&self, borrower: &Identity, pool_id: &PoolId, amount: u64) -> LendingResult<RepaymentQuote> {
        let pool_id = *pool_id;
        let platform_key = RecordKey::platform();
        let profile_key = RecordKey::profile(borrower);
        let loan_key = RecordKey::loan(borrower, &pool_id);
        let set = RecordSet::new()
            .read(platform_key)
            .write(pool_id)
            .write(profile_key)
            .write(loan_key);

        self.execute("repay_loan", set, |tx| {
            let platform = tx.platform()?;
            let mut pool: LendingPool = tx.require(&pool_id, "pool")?;
            let mut loan: Loan = tx.require(&loan_key, "loan")?;
            let mut profile: UserProfile = tx.require(&profile_key, "profile")?;

            let quote = loan.quote(tx.now, &platform)?;
            if amount != quote.total() {
                return Err(LendingError::RepaymentMismatch {
                    owed: quote.total(),
                    offered: amount,
                });
            }
            debug!(
                interest = quote.interest,
                late_fee = quote.late_fee,
                platform_fee = quote.platform_fee,
                "repayment priced"
            );

            pool.repay(quote.principal, quote.earnings())?;
            loan.settle(&quote, tx.now)?;
            profile.record_repayment(quote.total(), quote.late, tx.now)?;

            tx.transfer(&pool.asset, borrower.account(), pool.vault.clone(), quote.to_pool());
            tx.transfer(&pool.asset, borrower.account(), platform.treasury.account(), quote.platform_fee);
            tx.put(pool_id, &pool)?;
            tx.put(profile_key, &profile)?;
            tx.put(loan_key, &loan)?;
            info!(
                pool = %pool_id,
                %borrower,
                total = quote.total(),
                status = %loan.status,
                credit_score = profile.credit_score,
                "loan repaid"
            );
            Ok(quote)
        })
    }

    /// Default a loan whose grace window has passed. Permissionless.
    pub fn liquidate_loan(&self, caller: &Identity, borrower: &Identity, pool_id: &PoolId) -> LendingResult<Liquidation> {
        let pool_id = *pool_id;
        let platform_key = RecordKey::platform();
        let profile_key = RecordKey::profile(borrower);
        let loan_key = RecordKey::loan(borrower, &pool_id);
        let set = RecordSet::new()
            .write(platform_key)
            .write(pool_id)
            .write(profile_key)
            .write(loan_key);

        self.execute("liquidate_loan", set, |tx| {
            let mut platform = tx.platform()?;
            let mut pool: LendingPool = tx.require(&pool_id, "pool")?;
            let mut loan: Loan = tx.require(&loan_key, "loan")?;
            let mut profile: UserProfile = tx.require(&profile_key, "profile")?;

            loan.liquidate(tx.now)?;
            let recovery = self.collateral.recover(&loan, &pool.asset, self.ledger.as_ref());
            let recovered = recovery.as_ref().map_or(0, |r| r.amount);

            pool.write_off(loan.principal, recovered)?;
            profile.record_default(tx.now)?;
            platform.record_default()?;

            if let Some(r) = recovery {
                tx.transfer(&pool.asset, r.source, pool.vault.clone(), r.amount);
            }
            tx.put(platform_key, &platform)?;
            tx.put(pool_id, &pool)?;
            tx.put(profile_key, &profile)?;
            tx.put(loan_key, &loan)?;
            info!(
                pool = %pool_id,
                %borrower,
                %caller,
                written_off = loan.principal,
                recovered,
                credit_score = profile.credit_score,
                "loan liquidated"
            );
            Ok(Liquidation {
                written_off: loan.principal,
                recovered,
            })
        })
    }

    // -----------------------------------------------------------------------
    // Reputation
    // -----------------------------------------------------------------------

    pub fn initialize_user(&self, owner: &Identity) -> LendingResult<()> {
        let key = RecordKey::profile(owner);
        self.execute("initialize_user", RecordSet::new().write(key), |tx| {
            if tx.exists(&key)? {
                return Err(LendingError::AlreadyExists("profile"));
            }
            tx.put(key, &UserProfile::new(owner.clone(), tx.now))?;
            info!(%owner, "profile created");
            Ok(())
        })
    }

    /// Record or replace `attester`'s vouch for `subject`.
    pub fn add_attestation(
        &self,
        attester: &Identity,
        subject: &Identity,
        category: AttestationCategory,
        score: u16,
        note: &str,
        expires_at: Option<i64>,
    ) -> LendingResult<()> {
        let profile_key = RecordKey::profile(subject);
        let attestation_key = RecordKey::attestation(attester, subject);
        let set = RecordSet::new().write(profile_key).write(attestation_key);

        self.execute("add_attestation", set, |tx| {
            let attestation = SocialAttestation::new(
                attester.clone(),
                subject.clone(),
                category,
                score,
                note.to_string(),
                expires_at,
                tx.now,
            )?;
            let mut profile: UserProfile = tx.require(&profile_key, "profile")?;

            let replaced = profile.apply_attestation(attester, score, expires_at, tx.now);
            tx.put(profile_key, &profile)?;
            tx.put(attestation_key, &attestation)?;
            info!(%attester, %subject, ?category, score, replaced, "attestation recorded");
            Ok(())
        })
    }

    /// Append to `subject`'s transaction history. Platform authority only.
    /// Returns the record's sequence number.
    pub fn add_transaction_history(&self, caller: &Identity, subject: &Identity, entry: HistoryEntry) -> LendingResult<u32> {
        let platform_key = RecordKey::platform();
        let profile_key = RecordKey::profile(subject);
        let set = RecordSet::new().read(platform_key).write(profile_key);

        self.execute("add_transaction_history", set, |tx| {
            tx.platform()?.ensure_authority(caller, "record transaction history")?;
            validate_weight("frequency_score", entry.frequency_score)?;
            validate_weight("consistency_score", entry.consistency_score)?;
            let mut profile: UserProfile = tx.require(&profile_key, "profile")?;

            let mut record = TransactionHistoryRecord {
                subject: subject.clone(),
                sequence: 0,
                category: entry.category,
                amount: entry.amount,
                counterparty: entry.counterparty,
                timestamp: entry.timestamp,
                frequency_score: entry.frequency_score,
                consistency_score: entry.consistency_score,
                recorded_at: tx.now,
            };
            let sequence = profile.append_history(record.weight(), tx.now)?;
            record.sequence = sequence;

            tx.put(profile_key, &profile)?;
            tx.put(RecordKey::history(subject, sequence), &record)?;
            info!(%subject, sequence, category = ?record.category, amount = record.amount, "history recorded");
            Ok(sequence)
        })
    }

    /// Recompute `owner`'s credit score from the profile aggregates.
    pub fn update_credit_score(&self, owner: &Identity) -> LendingResult<u16> {
        let key = RecordKey::profile(owner);
        self.execute("update_credit_score", RecordSet::new().write(key), |tx| {
            let mut profile: UserProfile = tx.require(&key, "profile")?;
            let before = profile.credit_score;
            let score = profile.recompute_score(tx.now);
            tx.put(key, &profile)?;
            info!(%owner, before, after = score, "credit score updated");
            Ok(score)
        })
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    pub fn platform(&self) -> LendingResult<Option<Platform>> {
        self.read(RecordKey::platform())
    }

    pub fn pool(&self, pool_id: &PoolId) -> LendingResult<Option<LendingPool>> {
        self.read(*pool_id)
    }

    pub fn deposit(&self, lender: &Identity, pool_id: &PoolId) -> LendingResult<Option<LenderDeposit>> {
        self.read(RecordKey::deposit(lender, pool_id))
    }

    pub fn loan(&self, borrower: &Identity, pool_id: &PoolId) -> LendingResult<Option<Loan>> {
        self.read(RecordKey::loan(borrower, pool_id))
    }

    pub fn profile(&self, owner: &Identity) -> LendingResult<Option<UserProfile>> {
        self.read(RecordKey::profile(owner))
    }

    pub fn attestation(&self, attester: &Identity, subject: &Identity) -> LendingResult<Option<SocialAttestation>> {
        self.read(RecordKey::attestation(attester, subject))
    }

    pub fn history_record(&self, subject: &Identity, sequence: u32) -> LendingResult<Option<TransactionHistoryRecord>> {
        self.read(RecordKey::history(subject, sequence))
    }

    /// Every pool, in key order.
    pub fn pools(&self) -> LendingResult<Vec<(PoolId, LendingPool)>> {
        let mut out = Vec::new();
        for key in self.store.keys(RecordKind::Pool)? {
            if let Some(pool) = self.read(key)? {
                out.push((key, pool));
            }
        }
        Ok(out)
    }

    /// Loans of one status across the whole store. A full scan.
    pub fn loans_with_status(&self, status: LoanStatus) -> LendingResult<Vec<Loan>> {
        let mut out = Vec::new();
        for key in self.store.keys(RecordKind::Loan)? {
            if let Some(loan) = self.read::<Loan>(key)? {
                if loan.status == status {
                    out.push(loan);
                }
            }
        }
        Ok(out)
    }

    /// Balance of `owner`'s account in the value ledger.
    pub fn balance_of(&self, asset: &AssetId, owner: &AccountId) -> u64 {
        self.ledger.balance_of(asset, owner)
    }
}
