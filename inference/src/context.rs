// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! State threaded through one learning run: the symbolic encoding of the
//! domain, memo tables keyed by value, and the run's random source.

use crate::{
    basics::{LearnError, Oracle},
    pncore::{Interaction, PNCore},
};
use domain::{
    coverage::ConfigCovs,
    hashmap::HashMap,
    syntax::{Config, Core, Domain},
};
use rand::{rngs::StdRng, SeedableRng};
use symbolic::bdd::SymbolicDomain;

/// Everything one run needs besides its evidence.
pub struct Context {
    pub dom: Domain,
    pub sym: SymbolicDomain,
    pub rng: StdRng,
    neg_cache: HashMap<Core, Core>,
    infer_cache: HashMap<(Option<Core>, Vec<Config>), Core>,
    pub(crate) verify_cache: HashMap<(PNCore, Vec<Config>), PNCore>,
    pub(crate) simplify_cache: HashMap<PNCore, Interaction>,
}

impl Context {
    /// A fresh context for `dom`, seeding the random source.
    pub fn new(dom: &Domain, seed: u64) -> Result<Self, LearnError> {
        Ok(Context {
            dom: dom.clone(),
            sym: SymbolicDomain::new(dom)?,
            rng: StdRng::seed_from_u64(seed),
            neg_cache: HashMap::default(),
            infer_cache: HashMap::default(),
            verify_cache: HashMap::default(),
            simplify_cache: HashMap::default(),
        })
    }

    /// Bound the size of model queries.
    pub fn with_node_limit(mut self, limit: Option<usize>) -> Self {
        self.sym = self.sym.with_node_limit(limit);
        self
    }

    /// Negation of a core relative to the domain. Memoized.
    pub fn neg(&mut self, core: &Core) -> Core {
        if let Some(n) = self.neg_cache.get(core) {
            return n.clone();
        }
        let n = core.neg(&self.dom);
        self.neg_cache.insert(core.clone(), n.clone());
        n
    }

    /// [`infer`](crate::infer::infer), memoized on the core and the set of
    /// configurations.
    pub fn infer(&mut self, core: Option<&Core>, configs: &[Config]) -> Core {
        let mut key_configs = configs.to_vec();
        key_configs.sort();
        key_configs.dedup();
        let key = (core.cloned(), key_configs);
        if let Some(c) = self.infer_cache.get(&key) {
            return c.clone();
        }
        let c = crate::infer::infer(&key.1, core, &self.dom);
        self.infer_cache.insert(key, c.clone());
        c
    }

    /// Run configurations through the oracle. Symbolic values are
    /// concretized with the run's random source.
    pub fn evaluate<O: Oracle + ?Sized>(&mut self, oracle: &mut O, configs: &[Config]) -> ConfigCovs {
        let mut results = ConfigCovs::new();
        for config in configs {
            if results.contains(config) {
                continue;
            }
            let concrete = config.to_concrete(&self.dom, &mut self.rng);
            let eval = oracle.evaluate(&concrete);
            if eval.cov.is_empty() {
                log::warn!("'{concrete}' produces nothing");
            }
            log::trace!("{concrete}: {} locations", eval.cov.len());
            results.insert(config.clone(), eval.cov);
        }
        results
    }
}
