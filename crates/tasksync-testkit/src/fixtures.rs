//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a TaskSync client over a
//! fault-injectable memory store, an in-memory authority and a manual clock.

use std::sync::Arc;

use tasksync::{TaskSync, TaskSyncConfig};
use tasksync_core::{ManualClock, QueueItem, RecordId, SequentialIds, Task};
use tasksync_store::{MemoryStore, Store};
use tasksync_sync::MemoryAuthority;

use crate::faulty::{Faults, FaultyStore};

/// Store type used by fixtures.
pub type TestStore = FaultyStore<MemoryStore>;

/// Client type used by fixtures.
pub type TestClient = TaskSync<TestStore, Arc<MemoryAuthority>>;

/// Clock start for every fixture (Unix ms).
pub const START_MILLIS: i64 = 1_000;

/// A client wired to controllable collaborators.
pub struct TestFixture {
    pub client: Arc<TestClient>,
    pub authority: Arc<MemoryAuthority>,
    pub clock: Arc<ManualClock>,
    pub faults: Arc<Faults>,
}

impl TestFixture {
    /// Create a fixture with default configuration.
    pub fn new() -> Self {
        Self::with_config(TaskSyncConfig::default())
    }

    /// Create a fixture with the given configuration.
    ///
    /// Panics if the configuration is invalid.
    pub fn with_config(config: TaskSyncConfig) -> Self {
        init_tracing();

        let faults = Faults::new();
        let authority = Arc::new(MemoryAuthority::new());
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let client = TaskSync::with_capabilities(
            FaultyStore::new(MemoryStore::new(), Arc::clone(&faults)),
            Arc::clone(&authority),
            config,
            Arc::new(SequentialIds::new("t")),
            clock.clone(),
        )
        .expect("invalid fixture configuration");

        Self {
            client: Arc::new(client),
            authority,
            clock,
            faults,
        }
    }

    /// Advance the clock and return the new time.
    pub fn tick(&self, millis: i64) -> i64 {
        self.clock.advance(millis)
    }

    /// The underlying store, bypassing fault injection.
    pub fn raw_store(&self) -> &MemoryStore {
        self.client.store().inner()
    }

    /// A task as stored, including soft-deleted ones.
    pub async fn stored(&self, id: &RecordId) -> Option<Task> {
        self.raw_store().get_task(id).await.ok().flatten()
    }

    /// The full queue in order, bypassing fault injection.
    pub async fn queue(&self) -> Vec<QueueItem> {
        self.raw_store().drain().await.unwrap_or_default()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a test-writer tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
