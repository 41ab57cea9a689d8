// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Testing utilities for the chain manager.
//!
//! The centerpiece is [`FakeProgrammer`]: an in-memory stand-in for the southbound pipeline
//! programmer which honors the real transaction contract (all-or-nothing batches, idempotent
//! edits), journals every committed transaction, and can inject transient or fatal failures on
//! demand.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use chain::TableImage;
use pipeline::{DispatchEntry, DispatchKey, EntryEdit, PipelineProgrammer, ProgramError, TableId};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::trace;
use types::PortId;

#[derive(Debug, Default)]
struct FakeState {
    entries: BTreeMap<(TableId, PortId, DispatchKey), DispatchEntry>,
    journal: Vec<Vec<EntryEdit>>,
    fail_next: usize,
    fail_fatal: bool,
    poisoned_ports: BTreeSet<PortId>,
}

/// An in-memory pipeline programmer for tests.
#[derive(Debug, Default)]
pub struct FakeProgrammer {
    state: Mutex<FakeState>,
}

impl FakeProgrammer {
    /// A programmer with empty tables and no injected failures.
    #[must_use]
    pub fn new() -> FakeProgrammer {
        FakeProgrammer::default()
    }

    /// Fail the next `count` transactions with a transient error.
    pub async fn fail_next_transient(&self, count: usize) {
        self.state.lock().await.fail_next = count;
    }

    /// Fail every transaction from now on with a fatal error.
    pub async fn fail_fatal(&self, enabled: bool) {
        self.state.lock().await.fail_fatal = enabled;
    }

    /// Fail every transaction touching `port` with a fatal error, leaving other ports healthy.
    pub async fn fail_fatal_for_port(&self, port: PortId) {
        self.state.lock().await.poisoned_ports.insert(port);
    }

    /// The number of committed transactions.
    pub async fn transactions(&self) -> usize {
        self.state.lock().await.journal.len()
    }

    /// Every committed transaction, in commit order.
    pub async fn journal(&self) -> Vec<Vec<EntryEdit>> {
        self.state.lock().await.journal.clone()
    }

    /// The entry at the given location, if any.
    pub async fn entry(
        &self,
        table: TableId,
        port: PortId,
        key: DispatchKey,
    ) -> Option<DispatchEntry> {
        self.state
            .lock()
            .await
            .entries
            .get(&(table, port, key))
            .cloned()
    }

    /// The number of entries currently materialized for `port`.
    pub async fn entry_count_for_port(&self, port: PortId) -> usize {
        self.state
            .lock()
            .await
            .entries
            .keys()
            .filter(|(_, p, _)| *p == port)
            .count()
    }

    /// The total number of entries across all ports.
    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// A walkable image of `port`'s entries, for chain-invariant assertions.
    pub async fn image_for_port(&self, port: PortId) -> TableImage {
        let state = self.state.lock().await;
        let mut image = TableImage::new();
        for ((table, entry_port, key), entry) in &state.entries {
            if *entry_port == port {
                image.install_raw(*table, *key, entry.service.clone(), entry.next);
            }
        }
        image
    }
}

impl PipelineProgrammer for FakeProgrammer {
    async fn apply(&self, edits: &[EntryEdit]) -> Result<(), ProgramError> {
        let mut state = self.state.lock().await;
        if state.fail_fatal {
            return Err(ProgramError::Fatal("injected fatal failure".to_string()));
        }
        if let Some(port) = edits
            .iter()
            .map(EntryEdit::port)
            .find(|port| state.poisoned_ports.contains(port))
        {
            return Err(ProgramError::Fatal(format!("injected fatal failure on port {port}")));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ProgramError::Transient(
                "injected transient failure".to_string(),
            ));
        }
        for edit in edits {
            trace!("committing {edit}");
            match edit {
                EntryEdit::Install(entry) => {
                    state
                        .entries
                        .insert((entry.table, entry.port, entry.key), entry.clone());
                }
                EntryEdit::Delete { table, port, key } => {
                    state.entries.remove(&(*table, *port, *key));
                }
            }
        }
        state.journal.push(edits.to_vec());
        Ok(())
    }
}
