//! After any session of offline edits and flaky passes, one clean pass
//! leaves the client and the authority holding the same records.

use proptest::prelude::*;

use tasksync::{SyncConfig, SyncState, TaskSyncConfig, TaskUpdate};
use tasksync_core::RecordId;
use tasksync_testkit::generators::session;
use tasksync_testkit::{Step, TestFixture};

fn pick(ids: &[RecordId], target: usize) -> Option<&RecordId> {
    if ids.is_empty() {
        None
    } else {
        ids.get(target % ids.len())
    }
}

fn run_session(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let fixture = TestFixture::with_config(TaskSyncConfig {
            sync: SyncConfig {
                batch_size: 3,
                max_attempts: 1_000,
                ..SyncConfig::default()
            },
        });
        let client = &fixture.client;
        let mut ids: Vec<RecordId> = Vec::new();

        for step in steps {
            fixture.tick(1);
            match step {
                Step::Create(title) => {
                    ids.push(client.create_task(&title, "").await.unwrap().id);
                }
                Step::Rename { target, title } => {
                    if let Some(id) = pick(&ids, target) {
                        // Deleted tasks reject edits; that is fine here.
                        let _ = client.update_task(id, TaskUpdate::default().title(title)).await;
                    }
                }
                Step::Toggle { target } => {
                    if let Some(id) = pick(&ids, target) {
                        if let Some(task) = client.get_task(id).await.unwrap() {
                            client
                                .update_task(id, TaskUpdate::default().completed(!task.completed))
                                .await
                                .unwrap();
                        }
                    }
                }
                Step::Delete { target } => {
                    if let Some(id) = pick(&ids, target) {
                        let _ = client.delete_task(id).await;
                    }
                }
                Step::Sync => {
                    client.sync().await.unwrap();
                }
                Step::Outage => {
                    fixture.authority.fail_next(1).await;
                }
            }
        }

        fixture.authority.fail_next(0).await;
        fixture.tick(1);
        let summary = client.sync().await.unwrap();

        prop_assert!(summary.success);
        prop_assert!(fixture.queue().await.is_empty());

        for id in &ids {
            let local = fixture.stored(id).await.unwrap();
            prop_assert_eq!(local.sync_state, SyncState::Synced);
            prop_assert!(local.remote_id.is_some());

            let remote = fixture.authority.record(id).await.unwrap();
            prop_assert_eq!(local.snapshot(), remote);
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn clean_pass_converges(steps in session(30)) {
        run_session(steps)?;
    }
}
