//! Strong identifier types and the injected identifier generator.
//!
//! All identifiers are newtypes over strings to prevent mixing a record id
//! with a queue item id at compile time. Generation is behind the
//! [`IdGenerator`] trait so tests can supply deterministic ids.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the inner string.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Client-generated, stable identifier of a task record.
    RecordId
);

string_id!(
    /// Identifier of a single queue item.
    QueueItemId
);

string_id!(
    /// Identifier assigned by the remote authority on first successful create.
    RemoteId
);

/// Source of fresh identifiers.
///
/// Implementations must never return the same id twice for one generator.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh identifier string.
    fn next_id(&self) -> String;

    /// Produce a fresh record id.
    fn record_id(&self) -> RecordId {
        RecordId(self.next_id())
    }

    /// Produce a fresh queue item id.
    fn queue_item_id(&self) -> QueueItemId {
        QueueItemId(self.next_id())
    }
}

/// Random 128-bit identifiers, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        hex::encode(bytes)
    }
}

/// Deterministic identifiers: `{prefix}-1`, `{prefix}-2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Create a generator whose ids start at `{prefix}-1`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_are_hex_and_distinct() {
        let ids = RandomIds;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new("q");
        assert_eq!(ids.queue_item_id(), QueueItemId::new("q-1"));
        assert_eq!(ids.record_id(), RecordId::new("q-2"));
    }

    #[test]
    fn test_record_id_serializes_as_plain_string() {
        let id = RecordId::new("task-7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"task-7\"");
        assert_eq!(format!("{:?}", id), "RecordId(task-7)");
    }
}
