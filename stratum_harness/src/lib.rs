// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test support for stratum compositors.
//!
//! - [`ledger::FenceLedger`]: a fence driver that accounts for every open,
//!   dup, and close.
//! - [`mock`]: plane committer, scaler engine, and buffer allocator doubles
//!   with fault injection.
//! - [`invariants`]: structural checks for assignment plans.
//! - [`rig::Rig`]: a compositor wired to all of the above.

pub mod invariants;
pub mod ledger;
pub mod mock;
pub mod rig;
