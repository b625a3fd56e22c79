// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Interaction invariant inference
//!
//! Learns, for every location a program reaches, a small formula over its
//! configuration variables that says which configurations reach it. The
//! program is treated as a black-box [`basics::Oracle`]; new configurations
//! come from solver-guided counterexample search ([`cex`]) and, for
//! locations that search never reaches, from an evolutionary search
//! ([`evolve`]).

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![deny(clippy::uninlined_format_args)]
#![allow(clippy::len_without_is_empty)]
// documentation-related lints (only checked when running rustdoc)
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod basics;
pub mod cex;
pub mod context;
pub mod evolve;
pub mod infer;
pub mod learn;
pub mod pncore;
pub mod results;
