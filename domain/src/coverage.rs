// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! What each evaluated configuration covered, indexed both ways.

use crate::hashmap::{HashMap, HashSet};
use crate::syntax::{Config, Domain, Loc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The locations covered by one run.
pub type Cov = BTreeSet<Loc>;

/// Configuration to covered locations, in evaluation order. Entries are
/// never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCovs(HashMap<Config, Cov>);

impl ConfigCovs {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run. Returns false, leaving the map unchanged, if the
    /// configuration was already recorded.
    pub fn insert(&mut self, config: Config, cov: Cov) -> bool {
        if self.0.contains_key(&config) {
            return false;
        }
        self.0.insert(config, cov);
        true
    }

    /// Coverage of a configuration
    pub fn get(&self, config: &Config) -> Option<&Cov> {
        self.0.get(config)
    }

    /// Has this configuration been recorded?
    pub fn contains(&self, config: &Config) -> bool {
        self.0.contains_key(config)
    }

    /// Recorded configurations, in evaluation order.
    pub fn configs(&self) -> impl Iterator<Item = &Config> + '_ {
        self.0.keys()
    }

    /// Runs in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (&Config, &Cov)> + '_ {
        self.0.iter()
    }

    /// Number of runs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No runs
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All locations covered by some run.
    pub fn locations(&self) -> Cov {
        self.0.values().flatten().cloned().collect()
    }

    /// Render one line per run, `1. x=1 y=0: (2) L1,L2`.
    pub fn display<'a>(&'a self, dom: &'a Domain) -> impl fmt::Display + 'a {
        DisplayCovs { covs: self, dom }
    }
}

impl FromIterator<(Config, Cov)> for ConfigCovs {
    fn from_iter<T: IntoIterator<Item = (Config, Cov)>>(iter: T) -> Self {
        let mut covs = ConfigCovs::new();
        for (config, cov) in iter {
            covs.insert(config, cov);
        }
        covs
    }
}

struct DisplayCovs<'a> {
    covs: &'a ConfigCovs,
    dom: &'a Domain,
}

impl fmt::Display for DisplayCovs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (config, cov)) in self.covs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "{}. {}: ({}) {}",
                i + 1,
                config.display(self.dom),
                cov.len(),
                cov.iter().join(",")
            )?;
        }
        Ok(())
    }
}

/// Every run of a learning session: configuration to coverage, and
/// location to the configurations covering it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageStore {
    configs: ConfigCovs,
    locs: HashMap<Loc, HashSet<Config>>,
}

impl CoverageStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run in both indexes. Returns false if the configuration
    /// was already recorded.
    pub fn insert(&mut self, config: Config, cov: Cov) -> bool {
        if self.configs.contains(&config) {
            return false;
        }
        for loc in &cov {
            self.locs
                .entry(loc.clone())
                .or_default()
                .insert(config.clone());
        }
        self.configs.insert(config, cov)
    }

    /// The configuration-indexed view.
    pub fn configs(&self) -> &ConfigCovs {
        &self.configs
    }

    /// Has this configuration been evaluated?
    pub fn contains(&self, config: &Config) -> bool {
        self.configs.contains(config)
    }

    /// Coverage of a configuration
    pub fn cov(&self, config: &Config) -> Option<&Cov> {
        self.configs.get(config)
    }

    /// Configurations covering a location; empty if none do.
    pub fn covering(&self, loc: &str) -> impl Iterator<Item = &Config> + '_ {
        self.locs.get(loc).into_iter().flatten()
    }

    /// Number of configurations covering a location.
    pub fn num_covering(&self, loc: &str) -> usize {
        self.locs.get(loc).map_or(0, |configs| configs.len())
    }

    /// Covered locations, in order of first coverage.
    pub fn locations(&self) -> impl Iterator<Item = &Loc> + '_ {
        self.locs.keys()
    }

    /// Number of covered locations
    pub fn num_locations(&self) -> usize {
        self.locs.len()
    }

    /// Number of evaluated configurations
    pub fn num_configs(&self) -> usize {
        self.configs.len()
    }
}
