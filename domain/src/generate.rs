// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Domain-only configuration generators.

use crate::hashmap::HashSet;
use crate::syntax::{Config, Domain, DomainError, Val};
use itertools::Itertools;
use rand::Rng;

impl Domain {
    /// Every configuration, in lexicographic order of value indices. Only
    /// sensible for small domains.
    pub fn gen_full(&self) -> Vec<Config> {
        self.vars()
            .iter()
            .map(|v| 0..v.cardinality())
            .multi_cartesian_product()
            .map(Config::from_values)
            .collect()
    }

    /// A 1-way covering array: every value of every variable appears in at
    /// least one configuration. Values are drawn without replacement, and
    /// variables that run out early are padded with random values.
    pub fn gen_tcover1<R: Rng>(&self, rng: &mut R) -> Vec<Config> {
        let mut unused: Vec<Vec<Val>> = self
            .vars()
            .iter()
            .map(|v| (0..v.cardinality()).collect())
            .collect();
        let mut configs = vec![];
        while unused.iter().any(|vals| !vals.is_empty()) {
            let values = unused
                .iter_mut()
                .zip(self.vars())
                .map(|(vals, v)| {
                    if vals.is_empty() {
                        rng.gen_range(0..v.cardinality())
                    } else {
                        vals.swap_remove(rng.gen_range(0..vals.len()))
                    }
                })
                .collect();
            configs.push(Config::from_values(values));
        }
        configs
    }

    /// A uniformly random configuration.
    pub fn gen_one<R: Rng>(&self, rng: &mut R) -> Config {
        Config::from_values(
            self.vars()
                .iter()
                .map(|v| rng.gen_range(0..v.cardinality()))
                .collect(),
        )
    }

    /// `n` distinct random configurations.
    pub fn gen_rand<R: Rng>(&self, n: usize, rng: &mut R) -> Result<Vec<Config>, DomainError> {
        if n as u128 > self.size() {
            return Err(DomainError::Exhausted {
                requested: n,
                available: self.size(),
            });
        }
        let mut configs: HashSet<Config> = HashSet::default();
        while configs.len() < n {
            configs.insert(self.gen_one(rng));
        }
        Ok(configs.into_iter().collect())
    }
}
