use crate::common::{load_batch, seed_batch, setup_test_db};
use entity::sea_orm_active_enums::{BatchOrigin, BatchStatus};
use studiova::services::{AllocationService, LedgerService};
use studiova::CoreError;
use time::Duration;
use uuid::Uuid;

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_consume_drains_earliest_expiring_batch_first() {
    let db = setup_test_db().await;
    let ledger = LedgerService::new(db.clone());
    let allocation = AllocationService::new(db.clone());

    let customer_id = Uuid::new_v4();
    let category_id = Uuid::new_v4();

    // Batch A expires in 10 days with 2 credits, batch B in 20 with 3
    let batch_a = ledger
        .purchase(
            customer_id,
            category_id,
            2,
            &format!("txn-{}", Uuid::new_v4()),
            BatchOrigin::Purchase,
            10,
        )
        .await
        .unwrap();
    let batch_b = ledger
        .purchase(
            customer_id,
            category_id,
            3,
            &format!("txn-{}", Uuid::new_v4()),
            BatchOrigin::Purchase,
            20,
        )
        .await
        .unwrap();

    let breakdown = allocation
        .consume(customer_id, category_id, 4)
        .await
        .expect("Failed to consume");

    assert_eq!(breakdown.total, 4);
    assert_eq!(breakdown.draws.len(), 2);
    assert_eq!(breakdown.draws[0].batch_id, batch_a);
    assert_eq!(breakdown.draws[0].amount, 2);
    assert_eq!(breakdown.draws[1].batch_id, batch_b);
    assert_eq!(breakdown.draws[1].amount, 2);

    let a = load_batch(&db, batch_a).await;
    assert_eq!(a.available_credits, 0);
    assert_eq!(a.used_credits, 2);
    assert_eq!(a.status, BatchStatus::Used);

    let b = load_batch(&db, batch_b).await;
    assert_eq!(b.available_credits, 1);
    assert_eq!(b.used_credits, 2);
    assert_eq!(b.status, BatchStatus::Valid);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_consume_breaks_expiry_ties_by_creation_order() {
    let db = setup_test_db().await;
    let allocation = AllocationService::new(db.clone());

    let customer_id = Uuid::new_v4();
    let category_id = Uuid::new_v4();

    // Same expiration; the earlier-created batch has the lower v7 id
    let first = seed_batch(
        &db,
        customer_id,
        category_id,
        3,
        0,
        BatchStatus::Valid,
        Duration::days(15),
    )
    .await;
    let second = seed_batch(
        &db,
        customer_id,
        category_id,
        3,
        0,
        BatchStatus::Valid,
        Duration::days(15),
    )
    .await;

    let breakdown = allocation.consume(customer_id, category_id, 1).await.unwrap();
    assert_eq!(breakdown.draws.len(), 1);
    assert_eq!(breakdown.draws[0].batch_id, first);

    assert_eq!(load_batch(&db, first).await.available_credits, 2);
    assert_eq!(load_batch(&db, second).await.available_credits, 3);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_failed_consume_mutates_no_batch() {
    let db = setup_test_db().await;
    let allocation = AllocationService::new(db.clone());

    let customer_id = Uuid::new_v4();
    let category_id = Uuid::new_v4();

    let batch_a = seed_batch(
        &db,
        customer_id,
        category_id,
        2,
        0,
        BatchStatus::Valid,
        Duration::days(10),
    )
    .await;
    let batch_b = seed_batch(
        &db,
        customer_id,
        category_id,
        3,
        0,
        BatchStatus::Valid,
        Duration::days(20),
    )
    .await;

    let result = allocation.consume(customer_id, category_id, 6).await;
    match result {
        Err(CoreError::InsufficientCredits {
            needed: 6,
            available: 5,
        }) => {}
        other => panic!("Expected InsufficientCredits, got {:?}", other.map(|_| ())),
    }

    // Every candidate batch is untouched
    let a = load_batch(&db, batch_a).await;
    assert_eq!((a.available_credits, a.used_credits), (2, 0));
    let b = load_batch(&db, batch_b).await;
    assert_eq!((b.available_credits, b.used_credits), (3, 0));
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_consume_never_touches_ineligible_batches() {
    let db = setup_test_db().await;
    let allocation = AllocationService::new(db.clone());

    let customer_id = Uuid::new_v4();
    let category_id = Uuid::new_v4();

    // Expired by date but not yet swept, expiring before the live batch:
    // FEFO must still skip it.
    let expired = seed_batch(
        &db,
        customer_id,
        category_id,
        5,
        0,
        BatchStatus::Valid,
        Duration::days(-1),
    )
    .await;
    let other_category = seed_batch(
        &db,
        customer_id,
        Uuid::new_v4(),
        5,
        0,
        BatchStatus::Valid,
        Duration::days(5),
    )
    .await;
    let live = seed_batch(
        &db,
        customer_id,
        category_id,
        5,
        0,
        BatchStatus::Valid,
        Duration::days(30),
    )
    .await;

    let breakdown = allocation.consume(customer_id, category_id, 3).await.unwrap();
    assert_eq!(breakdown.draws.len(), 1);
    assert_eq!(breakdown.draws[0].batch_id, live);

    assert_eq!(load_batch(&db, expired).await.used_credits, 0);
    assert_eq!(load_batch(&db, other_category).await.used_credits, 0);
    assert_eq!(load_batch(&db, live).await.available_credits, 2);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_check_availability_uses_the_consume_predicate() {
    let db = setup_test_db().await;
    let allocation = AllocationService::new(db.clone());

    let customer_id = Uuid::new_v4();
    let category_id = Uuid::new_v4();

    seed_batch(
        &db,
        customer_id,
        category_id,
        2,
        0,
        BatchStatus::Valid,
        Duration::days(10),
    )
    .await;
    // Ineligible credits must not inflate the answer
    seed_batch(
        &db,
        customer_id,
        category_id,
        5,
        0,
        BatchStatus::Valid,
        Duration::days(-1),
    )
    .await;

    assert!(allocation
        .check_availability(customer_id, category_id, 2)
        .await
        .unwrap());
    assert!(!allocation
        .check_availability(customer_id, category_id, 3)
        .await
        .unwrap());
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_revert_is_unsupported() {
    let db = setup_test_db().await;
    let allocation = AllocationService::new(db);

    let result = allocation
        .revert(Uuid::new_v4(), Uuid::new_v4(), 1, Uuid::new_v4())
        .await;

    match result {
        Err(CoreError::ReversalRequiresLedger) => {}
        other => panic!("Expected ReversalRequiresLedger, got {:?}", other.map(|_| ())),
    }
}
