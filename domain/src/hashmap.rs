// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Map and set aliases with deterministic (insertion-ordered) iteration.
//!
//! Learning runs must be reproducible from a seed, so nothing in the
//! workspace iterates a `std::collections::HashMap`.

use fxhash::FxBuildHasher;

/// Insertion-ordered hash map
pub type HashMap<K, V> = indexmap::IndexMap<K, V, FxBuildHasher>;
/// Insertion-ordered hash set
pub type HashSet<K> = indexmap::IndexSet<K, FxBuildHasher>;

