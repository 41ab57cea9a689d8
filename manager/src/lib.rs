// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Orchestration of chain maintenance.
//!
//! The [`BindingManager`] ties the pieces together: membership is read from the store, the chain
//! editor plans the minimal entry edits, the plan is stamped onto every affected port and
//! committed through the pipeline programmer, and the store is updated to the new membership.
//! All work on one chain key runs serialized; work on different keys runs concurrently.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod binder;
mod registry;

#[allow(unused_imports)] // re-export
pub use binder::*;
#[allow(unused_imports)] // re-export
pub use registry::*;
