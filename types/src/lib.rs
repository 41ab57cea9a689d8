// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Shared vocabulary for the service dispatch chain manager.
//!
//! The types in this crate name the things every other crate talks about:
//! services, priorities, ports, binding scopes, and chain keys.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod scope;
mod service;

#[allow(unused_imports)] // re-export
pub use scope::*;
#[allow(unused_imports)] // re-export
pub use service::*;
