//! End-to-end sync scenarios against the in-memory authority.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use tasksync::core::{ManualClock, SequentialIds, ValidationError};
use tasksync::store::{MemoryStore, SqliteStore, Store};
use tasksync::{
    MemoryAuthority, OperationKind, SyncState, TaskSync, TaskSyncConfig, TaskSyncError, TaskUpdate,
};

type Client<S> = TaskSync<S, Arc<MemoryAuthority>>;

struct Env<S: Store> {
    tasks: Arc<Client<S>>,
    authority: Arc<MemoryAuthority>,
    clock: Arc<ManualClock>,
}

fn env_with<S: Store>(store: S) -> Env<S> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let authority = Arc::new(MemoryAuthority::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let tasks = TaskSync::with_capabilities(
        store,
        Arc::clone(&authority),
        TaskSyncConfig::default(),
        Arc::new(SequentialIds::new("t")),
        clock.clone(),
    )
    .unwrap();

    Env {
        tasks: Arc::new(tasks),
        authority,
        clock,
    }
}

fn env() -> Env<MemoryStore> {
    env_with(MemoryStore::new())
}

#[tokio::test]
async fn create_offline_then_sync() -> Result<()> {
    let env = env();
    env.authority.set_reachable(false).await;

    let task = env.tasks.create_task("A", "").await?;
    assert_eq!(task.sync_state, SyncState::Pending);
    assert_eq!(env.tasks.store().queue_len().await?, 1);

    let offline = env.tasks.sync().await?;
    assert!(!offline.success);
    assert!(!offline.reachable);
    assert_eq!(offline.synced_count, 0);
    assert_eq!(env.tasks.store().queue_len().await?, 1);

    env.authority.set_reachable(true).await;
    env.clock.advance(500);
    let summary = env.tasks.sync().await?;

    assert!(summary.success);
    assert_eq!(summary.synced_count, 1);
    let stored = env.tasks.get_task(&task.id).await?.unwrap();
    assert_eq!(stored.sync_state, SyncState::Synced);
    assert!(stored.remote_id.is_some());
    assert_eq!(stored.last_synced_at, Some(1_500));
    assert_eq!(env.tasks.store().queue_len().await?, 0);
    Ok(())
}

#[tokio::test]
async fn two_updates_survive_a_transport_failure() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "").await?;
    env.tasks.sync().await?;

    env.clock.advance(10);
    env.tasks
        .update_task(&task.id, TaskUpdate::default().title("B"))
        .await?;
    env.clock.advance(1);
    env.tasks
        .update_task(&task.id, TaskUpdate::default().title("C"))
        .await?;

    let queued = env.tasks.store().items_for(&task.id).await?;
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].payload.title, "B");
    assert_eq!(queued[1].payload.title, "C");

    env.authority.fail_next(1).await;
    let failed = env.tasks.sync().await?;

    assert!(!failed.success);
    assert_eq!(failed.failed_count, 2);
    assert_eq!(failed.errors.len(), 2);
    assert!(failed.errors.iter().all(|e| e.operation == OperationKind::Update));

    let queued = env.tasks.store().items_for(&task.id).await?;
    assert_eq!(queued.len(), 2);
    assert!(queued.iter().all(|item| item.attempts == 1));
    assert_eq!(
        env.tasks.get_task(&task.id).await?.unwrap().sync_state,
        SyncState::Error
    );

    let recovered = env.tasks.sync().await?;
    assert!(recovered.success);
    assert_eq!(recovered.synced_count, 2);

    let stored = env.tasks.get_task(&task.id).await?.unwrap();
    assert_eq!(stored.title, "C");
    assert_eq!(stored.sync_state, SyncState::Synced);
    assert_eq!(env.authority.record(&task.id).await.unwrap().title, "C");
    assert_eq!(env.tasks.store().queue_len().await?, 0);
    Ok(())
}

#[tokio::test]
async fn conflict_with_newer_authority_copy() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "local notes").await?;
    env.tasks.sync().await?;

    // Another client edited the record later than our next local edit.
    let mut theirs = env.authority.record(&task.id).await.unwrap();
    theirs.title = "Theirs".into();
    theirs.completed = true;
    theirs.updated_at = 50_000;
    env.authority.seed_record(theirs).await;

    env.clock.advance(100);
    env.tasks
        .update_task(&task.id, TaskUpdate::default().title("Ours"))
        .await?;
    let summary = env.tasks.sync().await?;

    assert!(summary.success);
    assert_eq!(summary.synced_count, 1);

    let stored = env.tasks.get_task(&task.id).await?.unwrap();
    assert_eq!(stored.title, "Theirs");
    assert!(stored.completed);
    assert_eq!(stored.updated_at, 50_000);
    assert_eq!(stored.sync_state, SyncState::Synced);
    assert!(env.tasks.store().items_for(&task.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_pass_is_idempotent() -> Result<()> {
    let env = env();

    for _ in 0..2 {
        let summary = env.tasks.sync().await?;
        assert!(summary.success);
        assert_eq!(summary.synced_count, 0);
        assert_eq!(summary.failed_count, 0);
        assert!(summary.errors.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn three_failures_dead_letter_until_reset() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "").await?;
    env.authority.reject(&task.id, "rejected by policy").await;

    let expected = [SyncState::Error, SyncState::Error, SyncState::Failed];
    for state in expected {
        env.tasks.sync().await?;
        assert_eq!(env.tasks.get_task(&task.id).await?.unwrap().sync_state, state);
    }
    assert_eq!(env.authority.requests().await.len(), 3);

    // No further automatic attempts.
    let idle = env.tasks.sync().await?;
    assert_eq!(idle.skipped_count, 1);
    assert_eq!(env.authority.requests().await.len(), 3);

    let dead = env.tasks.dead_letters().await?;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(dead[0].last_error.as_deref(), Some("rejected by policy"));

    env.authority.clear_rejection(&task.id).await;
    assert_eq!(env.tasks.retry_failed(&task.id).await?, 1);
    assert_eq!(
        env.tasks.get_task(&task.id).await?.unwrap().sync_state,
        SyncState::Pending
    );

    let summary = env.tasks.sync().await?;
    assert!(summary.success);
    assert_eq!(
        env.tasks.get_task(&task.id).await?.unwrap().sync_state,
        SyncState::Synced
    );
    assert!(env.tasks.dead_letters().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn discarding_dead_letters() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "").await?;
    env.authority.reject(&task.id, "nope").await;
    for _ in 0..3 {
        env.tasks.sync().await?;
    }

    assert_eq!(env.tasks.discard_failed(&task.id).await?, 1);
    assert_eq!(env.tasks.store().queue_len().await?, 0);
    assert_eq!(
        env.tasks.get_task(&task.id).await?.unwrap().sync_state,
        SyncState::Error
    );
    assert_eq!(env.tasks.discard_failed(&task.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn later_success_retires_dead_letter() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "").await?;
    env.authority.reject(&task.id, "nope").await;
    for _ in 0..3 {
        env.tasks.sync().await?;
    }

    env.authority.clear_rejection(&task.id).await;
    env.clock.advance(10);
    env.tasks
        .update_task(&task.id, TaskUpdate::default().title("B"))
        .await?;
    let summary = env.tasks.sync().await?;

    assert!(summary.success);
    assert_eq!(summary.skipped_count, 1);
    let stored = env.tasks.get_task(&task.id).await?.unwrap();
    assert_eq!(stored.sync_state, SyncState::Synced);
    assert!(stored.remote_id.is_some());
    assert_eq!(env.tasks.store().queue_len().await?, 0);
    Ok(())
}

#[tokio::test]
async fn invalid_input_is_never_enqueued() -> Result<()> {
    let env = env();

    let err = env.tasks.create_task("   ", "").await.unwrap_err();
    assert!(matches!(
        err,
        TaskSyncError::Validation(ValidationError::EmptyTitle)
    ));

    let long = "x".repeat(300);
    assert!(matches!(
        env.tasks.create_task(&long, "").await,
        Err(TaskSyncError::Validation(ValidationError::TitleTooLong { .. }))
    ));

    let task = env.tasks.create_task("A", "").await?;
    assert!(matches!(
        env.tasks.update_task(&task.id, TaskUpdate::default()).await,
        Err(TaskSyncError::Validation(ValidationError::EmptyUpdate))
    ));

    assert_eq!(env.tasks.store().queue_len().await?, 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_and_missing_ids() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "").await?;

    assert!(matches!(
        env.tasks.create_task_with_id(task.id.clone(), "B", "").await,
        Err(TaskSyncError::TaskExists(_))
    ));

    let ghost = tasksync::RecordId::new("ghost");
    assert!(matches!(
        env.tasks.delete_task(&ghost).await,
        Err(TaskSyncError::TaskNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn delete_is_synced_then_compacted() -> Result<()> {
    let env = env();
    let keep = env.tasks.create_task("keep", "").await?;
    let gone = env.tasks.create_task("gone", "").await?;
    env.tasks.sync().await?;

    env.clock.advance(10);
    env.tasks.delete_task(&gone.id).await?;

    assert!(env.tasks.get_task(&gone.id).await?.is_none());
    let visible: Vec<_> = env.tasks.list_tasks().await?.into_iter().map(|t| t.id).collect();
    assert_eq!(visible, vec![keep.id.clone()]);

    // Still addressable for bookkeeping until reconciled.
    assert!(env.tasks.store().get_task(&gone.id).await?.unwrap().deleted);
    assert!(matches!(
        env.tasks.update_task(&gone.id, TaskUpdate::default().title("x")).await,
        Err(TaskSyncError::TaskNotFound(_))
    ));

    // Nothing to compact while the deletion is unconfirmed.
    assert_eq!(env.tasks.compact().await?, 0);

    env.tasks.sync().await?;
    assert!(env.authority.record(&gone.id).await.unwrap().deleted);
    assert_eq!(
        env.tasks.store().get_task(&gone.id).await?.unwrap().sync_state,
        SyncState::Synced
    );

    assert_eq!(env.tasks.compact().await?, 1);
    assert!(env.tasks.store().get_task(&gone.id).await?.is_none());
    assert!(env.tasks.store().get_task(&keep.id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn update_then_delete_transmits_both_in_order() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "").await?;
    env.clock.advance(1);
    env.tasks
        .update_task(&task.id, TaskUpdate::default().completed(true))
        .await?;
    env.clock.advance(1);
    env.tasks.delete_task(&task.id).await?;

    let summary = env.tasks.sync().await?;
    assert_eq!(summary.synced_count, 3);

    let requests = env.authority.requests().await;
    assert_eq!(requests.len(), 1);
    let ops: Vec<OperationKind> = requests[0].items.iter().map(|i| i.operation).collect();
    assert_eq!(
        ops,
        vec![OperationKind::Create, OperationKind::Update, OperationKind::Delete]
    );
    Ok(())
}

#[tokio::test]
async fn local_edit_during_pass_is_not_downgraded() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "").await?;
    env.tasks.sync().await?;

    env.clock.advance(10);
    env.tasks
        .update_task(&task.id, TaskUpdate::default().title("in flight"))
        .await?;

    env.authority
        .set_send_delay(Some(Duration::from_millis(200)))
        .await;
    let tasks = Arc::clone(&env.tasks);
    let pass = tokio::spawn(async move { tasks.sync().await });

    // Let the pass reach the stalled transport.
    tokio::time::sleep(Duration::from_millis(50)).await;

    env.clock.advance(10);
    tokio::time::timeout(
        Duration::from_millis(100),
        env.tasks
            .update_task(&task.id, TaskUpdate::default().title("newer")),
    )
    .await
    .expect("local mutation blocked by sync pass")?;

    let summary = pass.await??;
    assert_eq!(summary.synced_count, 1);

    let stored = env.tasks.get_task(&task.id).await?.unwrap();
    assert_eq!(stored.title, "newer");
    assert_eq!(stored.sync_state, SyncState::Pending);
    assert_eq!(env.tasks.store().queue_len().await?, 1);

    env.authority.set_send_delay(None).await;
    env.tasks.sync().await?;
    let stored = env.tasks.get_task(&task.id).await?.unwrap();
    assert_eq!(stored.title, "newer");
    assert_eq!(stored.sync_state, SyncState::Synced);
    Ok(())
}

#[tokio::test]
async fn rejected_item_does_not_override_mid_pass_edit() -> Result<()> {
    let env = env();
    let task = env.tasks.create_task("A", "").await?;

    env.authority.reject(&task.id, "rejected").await;
    env.authority
        .set_send_delay(Some(Duration::from_millis(200)))
        .await;
    let tasks = Arc::clone(&env.tasks);
    let pass = tokio::spawn(async move { tasks.sync().await });

    tokio::time::sleep(Duration::from_millis(50)).await;

    env.clock.advance(10);
    tokio::time::timeout(
        Duration::from_millis(100),
        env.tasks
            .update_task(&task.id, TaskUpdate::default().title("fresh")),
    )
    .await
    .expect("local mutation blocked by sync pass")?;

    let summary = pass.await??;
    assert_eq!(summary.failed_count, 1);

    let stored = env.tasks.get_task(&task.id).await?.unwrap();
    assert_eq!(stored.title, "fresh");
    assert_eq!(stored.sync_state, SyncState::Pending);

    let attempts: Vec<u32> = env
        .tasks
        .store()
        .drain()
        .await?
        .iter()
        .map(|item| item.attempts)
        .collect();
    assert_eq!(attempts, vec![1, 0]);
    assert_eq!(env.tasks.status().await?.pending_count, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_passes_do_not_duplicate_transmission() -> Result<()> {
    let env = env();
    env.tasks.create_task("A", "").await?;
    env.authority
        .set_send_delay(Some(Duration::from_millis(50)))
        .await;

    let (first, second) = tokio::join!(env.tasks.sync(), env.tasks.sync());

    assert_eq!(first?.synced_count + second?.synced_count, 1);
    assert_eq!(env.authority.requests().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn status_reflects_queue() -> Result<()> {
    let env = env();
    let a = env.tasks.create_task("A", "").await?;
    env.tasks.create_task("B", "").await?;

    let status = env.tasks.status().await?;
    assert_eq!(status.pending_count, 2);
    assert_eq!(status.queue_size, 2);
    assert_eq!(status.last_sync_timestamp, None);
    assert!(status.is_reachable);

    env.authority.reject(&a.id, "nope").await;
    env.clock.set(7_000);
    env.tasks.sync().await?;

    let status = env.tasks.status().await?;
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.queue_size, 1);
    assert_eq!(status.last_sync_timestamp, Some(7_000));

    env.authority.set_reachable(false).await;
    assert!(!env.tasks.status().await?.is_reachable);
    Ok(())
}

#[tokio::test]
async fn sqlite_state_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tasks.db");

    let pending_id = {
        let env = env_with(SqliteStore::open(&path)?);
        let synced = env.tasks.create_task("synced", "").await?;
        env.tasks.sync().await?;
        let pending = env.tasks.create_task("pending", "").await?;

        assert_eq!(
            env.tasks.get_task(&synced.id).await?.unwrap().sync_state,
            SyncState::Synced
        );
        pending.id
    };

    let env = env_with(SqliteStore::open(&path)?);
    assert_eq!(env.tasks.list_tasks().await?.len(), 2);
    assert_eq!(env.tasks.store().queue_len().await?, 1);
    assert_eq!(
        env.tasks.get_task(&pending_id).await?.unwrap().sync_state,
        SyncState::Pending
    );

    let summary = env.tasks.sync().await?;
    assert_eq!(summary.synced_count, 1);
    Ok(())
}
