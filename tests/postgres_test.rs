//! PostgreSQL store tests. They need a reachable server:
//! `DATABASE_URL=postgres://... cargo test --test postgres_test -- --ignored`

mod helpers;

use helpers::*;
use reward_ledger::error::StoreError;
use reward_ledger::models::*;
use reward_ledger::repositories::*;
use reward_ledger::services::*;
use sqlx::{PgPool, Row};
use std::sync::Arc;

fn pg_engine(pool: PgPool, price: &str) -> (Arc<PgLedgerStore>, RewardEngine<PgLedgerStore>) {
    let store = Arc::new(PgLedgerStore::new(pool));
    let engine = RewardEngine::new(store.clone(), Arc::new(FixedPriceOracle::new(price)));
    (store, engine)
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count query")
        .get("n")
}

// ============================================================================
// Migration Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_migrations_ran(pool: PgPool) {
    for table in ["reward_events", "ledger_entries", "holdings_cache", "stock_prices"] {
        let exists: bool = sqlx::query(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap()
        .get(0);
        assert!(exists, "Table {} should exist", table);
    }
}

// ============================================================================
// Reward recording
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_reward_round_trip(pool: PgPool) {
    let (store, engine) = pg_engine(pool.clone(), "130.0000");

    let outcome = engine
        .record_reward(reward_request(USER_A, "ABC", "10", Some("pg-1")))
        .await
        .unwrap();
    let recorded = outcome.recorded().unwrap();
    assert_eq!(recorded.total_outflow.to_string(), "1304.3680");

    assert_balanced_posting(store.as_ref(), recorded.reward_event_id).await;

    let stored = store
        .find_reward_event(recorded.reward_event_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.quantity, money("10"));

    let holding = store.holding(user_id(USER_A), "ABC").await.unwrap().unwrap();
    assert_eq!(holding.quantity, money("10"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_unique_index_rejects_reused_key(pool: PgPool) {
    let (store, engine) = pg_engine(pool.clone(), "130");
    let first = engine
        .record_reward(reward_request(USER_A, "ABC", "1", Some("dup")))
        .await
        .unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .insert_reward_event(&NewRewardEvent {
            user_id: user_id(USER_A),
            symbol: "ABC".to_string(),
            quantity: money("1"),
            rewarded_at: chrono::Utc::now(),
            idempotency_key: Some("dup".to_string()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
    drop(tx);

    let again = engine
        .record_reward(reward_request(USER_A, "ABC", "1", Some("dup")))
        .await
        .unwrap();
    assert_eq!(again.reward_event_id(), first.reward_event_id());
    assert_eq!(count(&pool, "reward_events").await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_dropped_transaction_rolls_back(pool: PgPool) {
    let store = PgLedgerStore::new(pool.clone());
    {
        let mut tx = store.begin().await.unwrap();
        let event = tx
            .insert_reward_event(&NewRewardEvent {
                user_id: user_id(USER_A),
                symbol: "ABC".to_string(),
                quantity: money("1"),
                rewarded_at: chrono::Utc::now(),
                idempotency_key: None,
            })
            .await
            .unwrap();
        tx.insert_ledger_entry(&NewLedgerEntry::fee_expense(event.id, money("0")))
            .await
            .unwrap();
        tx.upsert_holding(user_id(USER_A), "ABC", money("1"))
            .await
            .unwrap();
    }

    assert_eq!(count(&pool, "reward_events").await, 0);
    assert_eq!(count(&pool, "ledger_entries").await, 0);
    assert_eq!(count(&pool, "holdings_cache").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_rewards_sum_holdings(pool: PgPool) {
    let (store, engine) = pg_engine(pool, "50");
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .record_reward(reward_request(USER_A, "INFY", "1.25", Some(format!("c-{}", i).as_str())))
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_recorded());
    }

    let holding = store.holding(user_id(USER_A), "INFY").await.unwrap().unwrap();
    assert_eq!(holding.quantity, money("10"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_price_observations_and_reporting(pool: PgPool) {
    let (store, engine) = pg_engine(pool, "100");
    engine
        .record_reward(reward_request(USER_A, "ABC", "2", None))
        .await
        .unwrap();

    let oracle = Arc::new(SimulatedPriceOracle::new(42, store.clone()));
    let summary = PriceRefresher::new(store.clone(), oracle)
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.refreshed, 1);

    let latest = store.latest_price("ABC").await.unwrap().unwrap();
    let portfolio = ReportingService::new(store.clone())
        .portfolio(user_id(USER_A))
        .await
        .unwrap();
    assert_eq!(portfolio.holdings.len(), 1);
    assert_eq!(portfolio.holdings[0].price, latest.price);
    assert_eq!(portfolio.total_inr, latest.price.checked_mul(money("2")).unwrap().round4());
}
