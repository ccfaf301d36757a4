//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tasksync_core::{OperationKind, RecordId, TaskSnapshot, MAX_TITLE_LEN};

/// Generate a record id.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    "[a-z0-9]{1,12}".prop_map(RecordId::new)
}

/// Generate a valid task title.
pub fn title() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,30}".prop_map(String::from)
}

/// Generate a description, possibly empty.
pub fn description() -> impl Strategy<Value = String> {
    "[ -~]{0,64}".prop_map(String::from)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=1_700_000_000_000i64
}

/// Generate an OperationKind.
pub fn operation_kind() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Create),
        Just(OperationKind::Update),
        Just(OperationKind::Delete),
    ]
}

/// Generate a record snapshot with `updated_at >= created_at`.
pub fn snapshot() -> impl Strategy<Value = TaskSnapshot> {
    (
        record_id(),
        title(),
        description(),
        any::<bool>(),
        timestamp(),
        0i64..=1_000_000,
        any::<bool>(),
    )
        .prop_map(|(id, title, description, completed, created_at, age, deleted)| TaskSnapshot {
            id,
            title,
            description,
            completed,
            created_at,
            updated_at: created_at + age,
            deleted,
        })
}

/// One queue append in a generated plan.
#[derive(Debug, Clone)]
pub struct Append {
    /// Which of a small set of records the item belongs to.
    pub record: usize,
    /// Clock movement before the append; may be negative.
    pub clock_delta: i64,
}

/// Generate a plan of queue appends over `records` distinct records, with
/// a clock that can jump backwards.
pub fn append_plan(records: usize, max_len: usize) -> impl Strategy<Value = Vec<Append>> {
    prop::collection::vec(
        (0..records.max(1), -50i64..=50).prop_map(|(record, clock_delta)| Append {
            record,
            clock_delta,
        }),
        0..=max_len,
    )
}

/// One step of a generated client session.
#[derive(Debug, Clone)]
pub enum Step {
    Create(String),
    Rename { target: usize, title: String },
    Toggle { target: usize },
    Delete { target: usize },
    Sync,
    /// The next batch fails at the transport.
    Outage,
}

/// Generate a session of up to `max_len` steps.
pub fn session(max_len: usize) -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        3 => title().prop_map(Step::Create),
        3 => (any::<usize>(), title()).prop_map(|(target, title)| Step::Rename { target, title }),
        2 => any::<usize>().prop_map(|target| Step::Toggle { target }),
        1 => any::<usize>().prop_map(|target| Step::Delete { target }),
        2 => Just(Step::Sync),
        1 => Just(Step::Outage),
    ];
    prop::collection::vec(step, 0..=max_len)
}
