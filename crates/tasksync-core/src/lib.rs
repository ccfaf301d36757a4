//! # TaskSync Core
//!
//! Pure primitives for TaskSync: task records, the pending-mutation queue
//! item, batching, and last-write-wins conflict resolution.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! plain computation over the data model, so the sync engine's decisions can
//! be tested without a store or a transport.
//!
//! ## Key Types
//!
//! - [`Task`] - The locally mutable record, with its sync bookkeeping
//! - [`TaskSnapshot`] - The record state captured in a queue item
//! - [`QueueItem`] - One pending create/update/delete awaiting transmission
//! - [`LocalMutation`] - A local edit, resolved against the stored record
//! - [`SyncState`] - `pending`, `synced`, `error` or `failed`
//! - [`AuthorityDecision`] - What the remote authority said about one item
//!
//! ## Algorithms
//!
//! - [`partition`] splits an ordered queue into contiguous batches
//! - [`resolve`] reconciles a local payload with an authority decision

pub mod batch;
pub mod clock;
pub mod error;
pub mod ids;
pub mod mutation;
pub mod queue;
pub mod resolve;
pub mod task;
pub mod validation;

pub use batch::partition;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, ValidationError};
pub use ids::{IdGenerator, QueueItemId, RandomIds, RecordId, RemoteId, SequentialIds};
pub use mutation::LocalMutation;
pub use queue::{OperationKind, QueueItem};
pub use resolve::{last_write_wins, resolve, AuthorityDecision, Resolution, Winner};
pub use task::{SyncState, Task, TaskSnapshot, TaskUpdate};
pub use validation::{validate_new_task, validate_update, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN};
