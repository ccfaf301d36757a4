//! # TaskSync Testkit
//!
//! Testing utilities for TaskSync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a client wired to an in-memory authority, a manual clock
//!   and deterministic ids
//! - **Generators**: Proptest strategies for snapshots, queue plans and
//!   whole client sessions
//! - **Fault injection**: a store wrapper that fails chosen operations
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tasksync_testkit::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let task = fixture.client.create_task("Write tests", "").await.unwrap();
//!     fixture.authority.reject(&task.id, "read-only account").await;
//!
//!     let summary = fixture.client.sync().await.unwrap();
//!     assert_eq!(summary.failed_count, 1);
//! }
//! ```
//!
//! ## Fault Injection
//!
//! ```rust,no_run
//! use tasksync_testkit::{FaultPoint, TestFixture};
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     fixture.faults.fail(FaultPoint::Drain);
//!     assert!(fixture.client.sync().await.is_err());
//! }
//! ```

pub mod faulty;
pub mod fixtures;
pub mod generators;

pub use faulty::{FaultPoint, Faults, FaultyStore};
pub use fixtures::{init_tracing, TestClient, TestFixture, TestStore, START_MILLIS};
pub use generators::{Append, Step};
