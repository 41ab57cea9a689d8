// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Dispatch entries and the edits which install or remove them.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use types::{Direction, PortId, ServiceName, ServicePriority};

/// The reserved pipeline index through which the chain head is always reachable.
///
/// This index is independent of the head service's own priority: whichever service currently
/// executes first owns the entry keyed here.
pub const DEFAULT_INDEX: u16 = 0;

/// The pipeline table a dispatch entry lives in.
#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum TableId {
    /// The per-port physical classification table.  Only the single-service tunnel ingress fast
    /// path places a dispatch entry directly here.
    PhysicalIngress,
    /// The ingress service dispatch table.
    IngressDispatch,
    /// The egress service dispatch table.
    EgressDispatch,
}

impl TableId {
    /// The dispatch table serving the given direction.
    #[must_use]
    pub const fn dispatch(direction: Direction) -> TableId {
        match direction {
            Direction::Ingress => TableId::IngressDispatch,
            Direction::Egress => TableId::EgressDispatch,
        }
    }

    /// The wire table number of this table in the shared pipeline layout.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            TableId::PhysicalIngress => 0,
            TableId::IngressDispatch => 17,
            TableId::EgressDispatch => 220,
        }
    }
}

/// The match key of a dispatch entry: the value of the "current service index" metadata field the
/// entry fires on.
#[derive(Copy, Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum DispatchKey {
    /// The reserved [`DEFAULT_INDEX`].  Exactly one chain member (the head) is keyed here.
    Default,
    /// A non-head member's key: its own priority, reused as pipeline index.
    Index(ServicePriority),
}

impl DispatchKey {
    /// The raw index value this key matches on.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        match self {
            DispatchKey::Default => DEFAULT_INDEX,
            DispatchKey::Index(priority) => priority.to_u16(),
        }
    }
}

impl Display for DispatchKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchKey::Default => write!(f, "default"),
            DispatchKey::Index(priority) => write!(f, "{priority}"),
        }
    }
}

impl From<ServicePriority> for DispatchKey {
    fn from(priority: ServicePriority) -> Self {
        DispatchKey::Index(priority)
    }
}

/// The next-index value a dispatch entry writes back into the metadata field.
#[derive(Copy, Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
pub enum NextIndex {
    /// Continue with the chain member keyed at the given priority.
    Index(ServicePriority),
    /// No further service: resume default pipeline processing.
    Terminal,
}

impl Display for NextIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NextIndex::Index(priority) => write!(f, "{priority}"),
            NextIndex::Terminal => write!(f, "terminal"),
        }
    }
}

impl From<Option<ServicePriority>> for NextIndex {
    fn from(successor: Option<ServicePriority>) -> Self {
        match successor {
            Some(priority) => NextIndex::Index(priority),
            None => NextIndex::Terminal,
        }
    }
}

/// One materialized dispatch entry on one port.
///
/// Match: metadata "current service index" == `key`.
/// Actions: invoke `service`, write `next` back into the metadata field, goto the service's own
/// processing table.
#[derive(Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct DispatchEntry {
    /// The table the entry lives in.
    pub table: TableId,
    /// The port the entry is scoped to.
    pub port: PortId,
    /// The match key.
    pub key: DispatchKey,
    /// The service the entry invokes.
    pub service: ServiceName,
    /// The index written back for the next chain member.
    pub next: NextIndex,
}

impl Display for DispatchEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{table}[port {port}, key {key}] -> {service}, next {next}",
            table = self.table,
            port = self.port,
            key = self.key,
            service = self.service,
            next = self.next,
        )
    }
}

/// A port-agnostic dispatch entry edit, as planned by the chain editor.
///
/// A plan is computed once per chain operation and then stamped onto each affected port (one port
/// for port-scoped chains, every port of the medium for port-type-scoped chains).
#[derive(Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub enum PlannedEdit {
    /// Install the described entry.  Installing over an occupied (table, key) replaces it.
    Install {
        /// The table to install into.
        table: TableId,
        /// The match key to install at.
        key: DispatchKey,
        /// The service the entry invokes.
        service: ServiceName,
        /// The next-index the entry writes.
        next: NextIndex,
    },
    /// Remove the entry at the given (table, key), if present.
    Delete {
        /// The table to delete from.
        table: TableId,
        /// The match key to delete at.
        key: DispatchKey,
    },
}

impl PlannedEdit {
    /// Stamp this planned edit onto a concrete port.
    #[must_use]
    pub fn bind_to(&self, port: PortId) -> EntryEdit {
        match self {
            PlannedEdit::Install {
                table,
                key,
                service,
                next,
            } => EntryEdit::Install(DispatchEntry {
                table: *table,
                port,
                key: *key,
                service: service.clone(),
                next: *next,
            }),
            PlannedEdit::Delete { table, key } => EntryEdit::Delete {
                table: *table,
                port,
                key: *key,
            },
        }
    }
}

impl Display for PlannedEdit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannedEdit::Install {
                table,
                key,
                service,
                next,
            } => {
                write!(f, "install {table}[key {key}] -> {service}, next {next}")
            }
            PlannedEdit::Delete { table, key } => write!(f, "delete {table}[key {key}]"),
        }
    }
}

/// One port-stamped dispatch entry edit, ready for the programmer.
#[derive(Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub enum EntryEdit {
    /// Install the entry.  Installing over an occupied (table, port, key) replaces it.
    Install(DispatchEntry),
    /// Remove the entry at the given location, if present.
    Delete {
        /// The table to delete from.
        table: TableId,
        /// The port the entry is scoped to.
        port: PortId,
        /// The match key to delete at.
        key: DispatchKey,
    },
}

impl EntryEdit {
    /// The port this edit targets.
    #[must_use]
    pub const fn port(&self) -> PortId {
        match self {
            EntryEdit::Install(entry) => entry.port,
            EntryEdit::Delete { port, .. } => *port,
        }
    }
}

impl Display for EntryEdit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryEdit::Install(entry) => write!(f, "install {entry}"),
            EntryEdit::Delete { table, port, key } => {
                write!(f, "delete {table}[port {port}, key {key}]")
            }
        }
    }
}
