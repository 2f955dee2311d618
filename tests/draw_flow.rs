//! End-to-end draw attempts against a SQLite store.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

use prize_draw_backend::draw::{DrawAttempt, DrawService, RollAnimator, RollState};
use prize_draw_backend::models::{DrawRecord, PrizeEntry, PrizeInventory, SpendResult, StoreState};
use prize_draw_backend::settlement::client::civil_now;
use prize_draw_backend::settlement::SpendSource;
use prize_draw_backend::store::{HistoryStore, SqliteLotteryStore, StoreConfigStore};
use prize_draw_backend::LotteryResult;

/// Spend source with canned answers per order id, counting lookups.
struct CannedSpend {
    spend: Option<SpendResult>,
    calls: Mutex<u32>,
}

#[async_trait]
impl SpendSource for CannedSpend {
    async fn net_spend(&self, _order_id: &str) -> LotteryResult<Option<SpendResult>> {
        *self.calls.lock() += 1;
        Ok(self.spend)
    }
}

fn flagship() -> StoreState {
    StoreState {
        id: 3,
        name: "Flagship".to_string(),
        dashboard_title: "Spring Draw".to_string(),
        min_spend: 50.0,
        inventory: PrizeInventory::new(vec![
            PrizeEntry::new("Grand Prize", 0),
            PrizeEntry::new("Tote Bag", 2),
            PrizeEntry::new("Mug", 6),
        ]),
    }
}

async fn setup(spend: Option<SpendResult>) -> (DrawService, Arc<SqliteLotteryStore>, NamedTempFile) {
    let temp = NamedTempFile::new().unwrap();
    let store = Arc::new(SqliteLotteryStore::new(temp.path().to_str().unwrap()).unwrap());
    store.update_store(&flagship()).await.unwrap();

    let spend = Arc::new(CannedSpend {
        spend,
        calls: Mutex::new(0),
    });
    let service = DrawService::with_rng(spend, store.clone(), store.clone(), StdRng::seed_from_u64(11));
    (service, store, temp)
}

#[tokio::test]
async fn test_spend_entitles_three_draws_then_refuses() {
    // Orders 200, refunds 50, 50 per draw.
    let (service, store, _temp) = setup(Some(SpendResult::new(200.0, 50.0))).await;

    let mut prizes = Vec::new();
    for n in 1..=3u32 {
        match service.attempt("RCPT-001", 3).await.unwrap() {
            DrawAttempt::Won(receipt) => {
                assert_eq!(receipt.net_spend, 150.0);
                assert_eq!(receipt.draws_allowed, 3);
                assert_eq!(receipt.draws_used, n);
                assert_eq!(receipt.draws_remaining(), 3 - n);
                assert_ne!(receipt.prize_name, "Grand Prize");
                prizes.push(receipt.prize_name);
            }
            other => panic!("draw {} should win, got {:?}", n, other),
        }
    }

    let before = store.get_store(3).await.unwrap();
    assert_eq!(before.inventory.total(), 5);
    assert_eq!(before.inventory.entries()[0].quantity, 0);

    assert_eq!(
        service.attempt("RCPT-001", 3).await.unwrap(),
        DrawAttempt::AlreadyExhausted {
            net_spend: 150.0,
            allowed: 3,
            used: 3
        }
    );
    // Refusal leaves the pool alone.
    assert_eq!(store.get_store(3).await.unwrap(), before);

    let history = store.get_history("RCPT-001").await.unwrap();
    let recorded: Vec<String> = history.iter().map(|r| r.prize_name.clone()).collect();
    assert_eq!(recorded, prizes);
    assert!(history.iter().all(|r| r.store_name == "Flagship" && r.spent == 150.0));
}

#[tokio::test]
async fn test_prior_history_counts_against_allowance() {
    let (service, store, _temp) = setup(Some(SpendResult::new(200.0, 50.0))).await;

    for _ in 0..3 {
        store
            .post_history(&DrawRecord {
                code: "RCPT-002".to_string(),
                store_id: 3,
                store_name: "Flagship".to_string(),
                prize_name: "Mug".to_string(),
                spent: 150.0,
                created_at: civil_now(),
            })
            .await
            .unwrap();
    }

    let attempt = service.attempt("RCPT-002", 3).await.unwrap();
    assert!(matches!(attempt, DrawAttempt::AlreadyExhausted { allowed: 3, used: 3, .. }));
    assert_eq!(store.get_store(3).await.unwrap().inventory.total(), 8);
}

#[tokio::test]
async fn test_negative_net_spend_gets_no_draws() {
    let (service, _store, _temp) = setup(Some(SpendResult::new(30.0, 80.0))).await;
    assert!(matches!(
        service.attempt("RCPT-003", 3).await.unwrap(),
        DrawAttempt::AlreadyExhausted { allowed: 0, .. }
    ));
}

#[tokio::test]
async fn test_unknown_receipt() {
    let (service, _store, _temp) = setup(None).await;
    assert_eq!(service.attempt("RCPT-404", 3).await.unwrap(), DrawAttempt::NoPurchaseHistory);
}

#[tokio::test]
async fn test_pool_runs_dry() {
    let (service, store, _temp) = setup(Some(SpendResult::new(10_000.0, 0.0))).await;

    let mut wins = 0;
    loop {
        match service.attempt("RCPT-BIG", 3).await.unwrap() {
            DrawAttempt::Won(_) => wins += 1,
            DrawAttempt::PoolExhausted => break,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(wins, 8);
    assert!(store.get_store(3).await.unwrap().inventory.is_exhausted());
    assert_eq!(store.get_history("RCPT-BIG").await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_concurrent_attempts_on_one_store_are_serialized() {
    let (service, store, _temp) = setup(Some(SpendResult::new(10_000.0, 0.0))).await;
    let service = Arc::new(service);

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move { service.attempt(&format!("RCPT-C{}", i), 3).await })
        })
        .collect();

    for handle in handles {
        assert!(matches!(handle.await.unwrap().unwrap(), DrawAttempt::Won(_)));
    }
    // No lost decrements.
    assert_eq!(store.get_store(3).await.unwrap().inventory.total(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_roll_reveals_drawn_prize() {
    let (service, _store, _temp) = setup(Some(SpendResult::new(100.0, 0.0))).await;

    let names = service.candidate_names(3, 10).await.unwrap();
    assert_eq!(names, vec!["Grand Prize", "Tote Bag", "Mug"]);

    let slot: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let poll_slot = slot.clone();
    let started = tokio::time::Instant::now();
    let roll = RollAnimator::new().spawn(names, move || poll_slot.lock().clone(), |_| {}, |_| {});

    let prize = match service.attempt("RCPT-ROLL", 3).await.unwrap() {
        DrawAttempt::Won(receipt) => receipt.prize_name,
        other => panic!("expected a win, got {:?}", other),
    };
    *slot.lock() = Some(prize.clone());

    assert_eq!(roll.finished().await, RollState::Settled(prize));
    assert!(started.elapsed() >= Duration::from_millis(2000));
}
