// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The dispatch-entry model of the shared per-port forwarding pipeline.
//!
//! A chain of bound services is materialized in the pipeline as a singly-linked set of dispatch
//! entries: each entry matches on the "current service index" metadata field, invokes one
//! service, and writes the index of the next service back into the metadata before resubmitting.
//! The head of the chain is always reachable through the reserved default index.
//!
//! This crate models those entries and the transaction boundary toward whatever programs them
//! into the switch.  The concrete wire encoding of match fields and actions lives with the
//! southbound programmer and is out of scope here.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod entry;
mod programmer;

#[allow(unused_imports)] // re-export
pub use entry::*;
#[allow(unused_imports)] // re-export
pub use programmer::*;
