// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Maintenance of priority-ordered service dispatch chains.
//!
//! A chain is the set of services bound to one (scope, direction) pair, ordered by priority.
//! It is materialized in the pipeline as a singly-linked set of dispatch entries: the head is
//! keyed at the reserved default index, every other member at its own priority, and each entry
//! names its successor's key as the next index.
//!
//! The editor in this crate turns a bind or unbind against the current chain image into the
//! minimal ordered batch of entry edits — at most the new or removed member's own entry plus a
//! rekey of its immediate predecessor, never a full chain rebuild.  Everything here is pure:
//! applying the edits to the pipeline and persisting the resulting membership belong to the
//! caller.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod editor;
mod membership;
mod position;
mod verify;

#[allow(unused_imports)] // re-export
pub use editor::*;
#[allow(unused_imports)] // re-export
pub use membership::*;
#[allow(unused_imports)] // re-export
pub use position::*;
#[allow(unused_imports)] // re-export
pub use verify::*;
