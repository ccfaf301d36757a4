//! Conflict resolver: last-write-wins on the modification timestamp.
//!
//! The side with the strictly later `updated_at` wins wholesale. On an exact
//! tie the authority wins, so replicas converge on the authority's copy.
//! An authority-reported error is never reconciled; the item is retried.

use crate::ids::RemoteId;
use crate::task::TaskSnapshot;

/// Which side's snapshot becomes the reconciled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Authority,
}

/// The authority's verdict on one transmitted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityDecision {
    /// The authority applied the local operation.
    Accepted {
        /// Present on the first successful create.
        remote_id: Option<RemoteId>,
    },
    /// The authority holds its own version of the record.
    Conflict {
        remote_id: Option<RemoteId>,
        /// The authority's reconciled field values and modification time.
        authority: TaskSnapshot,
    },
    /// The authority refused or failed to process the item.
    Rejected { message: String },
}

/// The reconciled record state for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub winner: Winner,
    /// The full record state to keep locally.
    pub snapshot: TaskSnapshot,
    pub remote_id: Option<RemoteId>,
}

/// Compare two modification timestamps.
///
/// Local wins only when strictly later; ties go to the authority.
pub fn last_write_wins(local_updated_at: i64, authority_updated_at: i64) -> Winner {
    if local_updated_at > authority_updated_at {
        Winner::Local
    } else {
        Winner::Authority
    }
}

/// Reconcile a local payload with the authority's decision.
///
/// Returns `None` for [`AuthorityDecision::Rejected`]: the item is left for
/// the retry policy, never given a fabricated winner.
pub fn resolve(local: &TaskSnapshot, decision: &AuthorityDecision) -> Option<Resolution> {
    match decision {
        AuthorityDecision::Accepted { remote_id } => Some(Resolution {
            winner: Winner::Local,
            snapshot: local.clone(),
            remote_id: remote_id.clone(),
        }),
        AuthorityDecision::Conflict {
            remote_id,
            authority,
        } => {
            let winner = last_write_wins(local.updated_at, authority.updated_at);
            let snapshot = match winner {
                Winner::Local => local.clone(),
                Winner::Authority => TaskSnapshot {
                    // The record keeps its client-side key.
                    id: local.id.clone(),
                    ..authority.clone()
                },
            };
            Some(Resolution {
                winner,
                snapshot,
                remote_id: remote_id.clone(),
            })
        }
        AuthorityDecision::Rejected { .. } => None,
    }
}
