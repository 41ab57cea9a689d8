// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The transaction boundary toward the southbound pipeline programmer.

use crate::EntryEdit;
use std::future::Future;

/// Errors surfaced by a [`PipelineProgrammer`] transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    /// The transaction failed in a way which may succeed on retry (for example an
    /// optimistic-lock conflict in the southbound store).
    #[error("transient pipeline programming failure: {0}")]
    Transient(String),
    /// The transaction failed in a way retrying will not fix.
    #[error("fatal pipeline programming failure: {0}")]
    Fatal(String),
}

impl ProgramError {
    /// True if retrying the transaction may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, ProgramError::Transient(_))
    }
}

/// Applies batches of dispatch-entry edits to the forwarding pipeline.
///
/// # Contract
///
/// All edits of one `apply` call commit or fail as a single atomic transaction: a chain is never
/// left with a dangling next-index pointer because one half of a predecessor/successor pair
/// landed and the other did not.
///
/// Individual edits must be idempotent: installing over an occupied (table, port, key) replaces
/// the occupant, and deleting an absent key succeeds.  Whole-transaction retries after a
/// transient failure depend on this.
pub trait PipelineProgrammer {
    /// Apply the given edits as one atomic transaction.
    fn apply(
        &self,
        edits: &[EntryEdit],
    ) -> impl Future<Output = Result<(), ProgramError>> + Send;
}
