// Lending engine benchmarks.
//
// Covers the deposit hot path on the in-memory and sled stores, a full
// request-to-repayment loan cycle, and the pure interest and score math.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use microlend_contracts::loan::simple_interest;
use microlend_contracts::reputation::compute_credit_score;
use microlend_contracts::{CollateralType, LendingEngine, LoanTerms, UserProfile};
use microlend_protocol::clock::ManualClock;
use microlend_protocol::identity::{AssetId, Identity};
use microlend_protocol::keys::PoolId;
use microlend_protocol::ledger::InMemoryLedger;
use microlend_protocol::storage::{MemoryStore, RecordStore, SledStore};

const START: i64 = 1_700_000_000;

struct Fixture {
    engine: LendingEngine,
    ledger: Arc<InMemoryLedger>,
    clock: Arc<ManualClock>,
    asset: AssetId,
    admin: Identity,
    pool: PoolId,
}

fn fixture(store: Arc<dyn RecordStore>) -> Fixture {
    let ledger = Arc::new(InMemoryLedger::new());
    let clock = Arc::new(ManualClock::new(START));
    let engine = LendingEngine::new(store, ledger.clone(), clock.clone());
    let admin = Identity::new("admin");
    let asset = AssetId::new("USDC");
    engine
        .initialize_platform(&admin, &Identity::new("treasury"), 100, 1_000_000_000, 1_000_000)
        .unwrap();
    let pool = engine
        .create_lending_pool(&admin, &asset, "Bench Pool", 800, 365)
        .unwrap();
    Fixture {
        engine,
        ledger,
        clock,
        asset,
        admin,
        pool,
    }
}

fn bench_deposit(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/deposit");
    group.throughput(Throughput::Elements(1));

    let stores: [(&str, Arc<dyn RecordStore>); 2] = [
        ("memory", Arc::new(MemoryStore::new())),
        ("sled", Arc::new(SledStore::open_temporary().unwrap())),
    ];
    for (name, store) in stores {
        let f = fixture(store);
        let lender = Identity::new("lender");
        f.ledger.mint(&f.asset, &lender.account(), u64::MAX / 2).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(name), &f, |b, f| {
            b.iter(|| f.engine.deposit_to_pool(&lender, &f.pool, 1_000_000).unwrap());
        });
    }
    group.finish();
}

fn bench_loan_cycle(c: &mut Criterion) {
    let f = fixture(Arc::new(MemoryStore::new()));
    let lender = Identity::new("lender");
    f.ledger.mint(&f.asset, &lender.account(), 10_000_000_000).unwrap();
    f.engine.deposit_to_pool(&lender, &f.pool, 10_000_000_000).unwrap();

    let borrower = Identity::new("borrower");
    f.engine.initialize_user(&borrower).unwrap();
    let terms = LoanTerms {
        principal: 5_000_000,
        duration_days: 30,
        purpose: "stock".into(),
        collateral: CollateralType::None,
    };

    c.bench_function("engine/loan_cycle", |b| {
        b.iter(|| {
            f.engine.request_loan(&borrower, &f.pool, terms.clone()).unwrap();
            f.engine.approve_loan(&f.admin, &borrower, &f.pool).unwrap();
            f.engine.disburse_loan(&f.admin, &borrower, &f.pool).unwrap();
            f.clock.advance_days(10);
            let quote = f.engine.quote_repayment(&borrower, &f.pool).unwrap();
            f.ledger
                .mint(&f.asset, &borrower.account(), quote.total() - terms.principal)
                .unwrap();
            f.engine.repay_loan(&borrower, &f.pool, quote.total()).unwrap()
        });
    });
}

fn bench_math(c: &mut Criterion) {
    c.bench_function("math/simple_interest", |b| {
        b.iter(|| simple_interest(criterion::black_box(250_000_000), 1_200, 90).unwrap());
    });

    let mut profile = UserProfile::new(Identity::new("user"), START);
    profile.successful_loans = 40;
    profile.late_loans = 5;
    profile.defaulted_loans = 1;
    profile.total_borrowed = 900_000_000;
    profile.total_repaid = 850_000_000;
    profile.attestation_count = 12;
    profile.attestation_score_sum = 9_000;
    c.bench_function("math/credit_score", |b| {
        b.iter(|| compute_credit_score(criterion::black_box(&profile)));
    });
}

criterion_group!(benches, bench_deposit, bench_loan_cycle, bench_math);
criterion_main!(benches);
