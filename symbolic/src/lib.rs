// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Symbolic reasoning over configuration spaces: validity, implication and
//! equivalence of formulas over configuration settings, and enumeration of
//! satisfying configurations.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::type_complexity)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bdd;
pub mod sample;
pub mod timing;
