//! Streaming cursors under suspension, failure, kill, and memory pressure

mod common;

use common::{repository, rows};
use quarry_common::{BatchId, Principal};
use quarry_cursor::{
    BatchSink, CursorError, CursorOptions, CursorRepository, DumpState, RepositoryConfig,
};
use quarry_engine::{MockQuery, QueryError, ScriptedStep};
use quarry_shutdown::SoftShutdownFlag;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_fetch_waits_for_suspended_query() {
    let repository = repository();
    let alice = Principal::user("alice");
    let query = MockQuery::new(vec![
        ScriptedStep::Block(vec![json!(1)]),
        ScriptedStep::Suspend,
        ScriptedStep::Block(vec![json!(2), json!(3)]),
    ]);
    let handle = query.handle();
    let options = CursorOptions::default().with_batch_size(3);
    let lease = repository
        .create_from_query(Box::new(query), None, &options, &alice)
        .unwrap();
    let id = lease.id();
    lease.release();

    // The producer side unblocks the query a little later
    let resumer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.resume();
    });

    let batch = repository.fetch_batch(id, None, &alice).await.unwrap();
    assert_eq!(batch.rows, vec![json!(1), json!(2), json!(3)]);
    resumer.await.unwrap();
}

#[tokio::test]
async fn test_exact_multiple_finishes_on_last_full_batch() {
    let repository = repository();
    let alice = Principal::user("alice");
    let query = MockQuery::from_rows(rows(4), 2);
    let options = CursorOptions::default().with_batch_size(2);
    let lease = repository
        .create_from_query(Box::new(query), None, &options, &alice)
        .unwrap();
    let id = lease.id();
    lease.release();

    let first = repository.fetch_batch(id, None, &alice).await.unwrap();
    assert_eq!(first.rows, vec![json!(1), json!(2)]);
    assert!(first.has_more);

    // Two fetches for four rows at batch size two: the second carries
    // the last rows and already says so, with no trailing empty batch
    let last = repository.fetch_batch(id, None, &alice).await.unwrap();
    assert_eq!(last.rows, vec![json!(3), json!(4)]);
    assert!(!last.has_more);

    assert_eq!(repository.count(), 0);
    assert!(matches!(
        repository.fetch_batch(id, None, &alice).await,
        Err(CursorError::NotFound)
    ));
}

#[tokio::test]
async fn test_cancelled_fetch_loses_no_rows() {
    let repository = repository();
    let alice = Principal::user("alice");
    let query = MockQuery::new(vec![
        ScriptedStep::Block(vec![json!(1)]),
        ScriptedStep::Suspend,
        ScriptedStep::Block(vec![json!(2), json!(3)]),
    ]);
    let handle = query.handle();
    let options = CursorOptions::default().with_batch_size(3);
    let lease = repository
        .create_from_query(Box::new(query), None, &options, &alice)
        .unwrap();
    let id = lease.id();
    lease.release();

    // The client gives up while the query is suspended mid-batch
    let timed_out = tokio::time::timeout(
        Duration::from_millis(30),
        repository.fetch_batch(id, None, &alice),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(repository.count(), 1);

    // The abandoned attempt handed its row back: the retry gets every
    // row, under the batch id the cancelled fetch never produced
    handle.resume();
    let batch = repository.fetch_batch(id, None, &alice).await.unwrap();
    assert_eq!(batch.batch_id, BatchId::new(1));
    assert_eq!(batch.rows, vec![json!(1), json!(2), json!(3)]);
    assert!(!batch.has_more);
    assert_eq!(repository.count(), 0);
}

#[tokio::test]
async fn test_poll_style_dump_with_wakeup() {
    let repository = repository();
    let alice = Principal::user("alice");
    let query = MockQuery::new(vec![
        ScriptedStep::Block(vec![json!(1)]),
        ScriptedStep::Suspend,
        ScriptedStep::Block(vec![json!(2)]),
    ]);
    let handle = query.handle();
    let options = CursorOptions::default().with_batch_size(2);
    let mut lease = repository
        .create_from_query(Box::new(query), None, &options, &alice)
        .unwrap();

    let resumer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.resume();
    });

    // A caller that drives suspensions itself instead of using the
    // async dump: poll, and await the wakeup on Waiting
    let wakeup = lease.wakeup().unwrap();
    let mut sink = BatchSink::new();
    let batch = loop {
        // Created before the poll so a resume landing in between counts
        let notified = wakeup.notified();
        match lease.poll_dump(&mut sink).unwrap() {
            DumpState::Done(batch) => break batch,
            DumpState::Waiting => notified.await,
        }
    };

    assert_eq!(batch.rows, vec![json!(1), json!(2)]);
    assert!(!batch.has_more);
    resumer.await.unwrap();
}

#[tokio::test]
async fn test_failed_query_error_sticks() {
    let repository = repository();
    let alice = Principal::user("alice");
    let query = MockQuery::new(vec![
        ScriptedStep::Block(vec![json!(1), json!(2)]),
        ScriptedStep::Block(vec![json!(3)]),
        ScriptedStep::Fail("division by zero".to_string()),
    ]);
    let options = CursorOptions::default().with_batch_size(2);
    let lease = repository
        .create_from_query(Box::new(query), None, &options, &alice)
        .unwrap();
    let id = lease.id();
    lease.release();

    // The first batch was produced before the failure point
    let first = repository.fetch_batch(id, None, &alice).await.unwrap();
    assert_eq!(first.rows, vec![json!(1), json!(2)]);

    let err = repository.fetch_batch(id, None, &alice).await.unwrap_err();
    assert_eq!(
        err,
        CursorError::Execution(QueryError::Execution("division by zero".to_string()))
    );

    // Every later access reports the same failure until disposal
    let again = repository.fetch_batch(id, None, &alice).await.unwrap_err();
    assert_eq!(again, err);

    repository.remove(id, &alice).unwrap();
    assert_eq!(repository.count(), 0);
}

#[tokio::test]
async fn test_failure_at_batch_boundary_preempts_batch() {
    let repository = repository();
    let alice = Principal::user("alice");
    let query = MockQuery::new(vec![
        ScriptedStep::Block(vec![json!(1), json!(2)]),
        ScriptedStep::Fail("conflict".to_string()),
    ]);
    let options = CursorOptions::default().with_batch_size(2);
    let lease = repository
        .create_from_query(Box::new(query), None, &options, &alice)
        .unwrap();
    let id = lease.id();
    lease.release();

    // Deciding has_more for the full batch runs into the failure, and
    // the error wins: the caller sees it on this fetch, not the next
    let err = repository.fetch_batch(id, None, &alice).await.unwrap_err();
    assert_eq!(
        err,
        CursorError::Execution(QueryError::Execution("conflict".to_string()))
    );

    repository.remove(id, &alice).unwrap();
    assert_eq!(repository.count(), 0);
}

#[tokio::test]
async fn test_killed_query_reports_killed() {
    let repository = repository();
    let alice = Principal::user("alice");
    let query = MockQuery::from_rows(rows(4), 2);
    let handle = query.handle();
    let options = CursorOptions::default().with_batch_size(2);
    let mut lease = repository
        .create_from_query(Box::new(query), None, &options, &alice)
        .unwrap();
    let id = lease.id();

    lease.kill();
    assert!(handle.was_killed());

    // The holder and every later request see the kill
    let mut sink = BatchSink::new();
    assert_eq!(lease.dump(&mut sink).await, Err(CursorError::Killed));
    lease.release();

    assert!(matches!(
        repository.fetch_batch(id, None, &alice).await,
        Err(CursorError::Killed)
    ));

    repository.remove(id, &alice).unwrap();
    assert_eq!(repository.count(), 0);
}

#[tokio::test]
async fn test_memory_budget_aborts_batch_not_cursor() {
    let config = RepositoryConfig::default().with_batch_memory_limit(64);
    let repository = CursorRepository::with_config("test", SoftShutdownFlag::new(), config);
    let alice = Principal::user("alice");

    let big = json!("x".repeat(256));
    let query = MockQuery::new(vec![ScriptedStep::Block(vec![big.clone(), big.clone()])]);
    let options = CursorOptions::default().with_batch_size(2);
    let lease = repository
        .create_from_query(Box::new(query), None, &options, &alice)
        .unwrap();
    let id = lease.id();
    lease.release();

    assert!(matches!(
        repository.fetch_batch(id, None, &alice).await,
        Err(CursorError::OutOfMemory)
    ));

    // The batch was aborted but the cursor survives for disposal
    assert_eq!(repository.count(), 1);
    repository.remove(id, &alice).unwrap();
    assert_eq!(repository.count(), 0);
}
