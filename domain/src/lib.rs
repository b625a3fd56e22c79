// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration spaces of a program under test: variables and their
//! values, configurations, cores, and the record of what each evaluated
//! configuration covered.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod concrete;
pub mod coverage;
pub mod generate;
pub mod hashmap;
pub mod parser;
pub mod syntax;
