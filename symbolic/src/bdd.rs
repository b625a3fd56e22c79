// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Boolean encoding of a configuration space using BDDs.
//!
//! Every `(variable, value)` pair is one boolean atom. A well-formedness
//! constraint says each variable takes exactly one value, and validity and
//! model enumeration are both taken relative to it.

use crate::timing::{self, TimeType};
use biodivine_lib_bdd::{Bdd, BddValuation, BddVariable, BddVariableSet};
use domain::{
    hashmap::HashMap,
    syntax::{Config, Core, Domain, DomainError, Val, Var},
};
use thiserror::Error;

/// How the literals of a [`Core`] are combined.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Connective {
    /// Every literal holds
    And,
    /// Some literal holds
    Or,
}

/// Failures of symbolic queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query could not be decided within its resource budget.
    #[error("query gave up: {0}")]
    Unknown(String),
    /// The domain is too large to encode.
    #[error("domain needs {0} boolean atoms, more than the backend supports")]
    TooManyAtoms(usize),
    /// A request that the domain cannot satisfy.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// A [`Domain`] together with its boolean encoding and memoized
/// expressions for configurations and cores.
pub struct SymbolicDomain {
    dom: Domain,
    bdds: BddVariableSet,
    atoms: Vec<Vec<BddVariable>>,
    well_formed: Bdd,
    node_limit: Option<usize>,
    config_exprs: HashMap<Config, Bdd>,
    core_exprs: HashMap<(Core, Connective), Bdd>,
}

impl SymbolicDomain {
    /// Encode a domain.
    pub fn new(dom: &Domain) -> Result<Self, QueryError> {
        let num_atoms: usize = dom.vars().iter().map(|v| v.cardinality()).sum();
        let count = u16::try_from(num_atoms).map_err(|_| QueryError::TooManyAtoms(num_atoms))?;
        let bdds = BddVariableSet::new_anonymous(count);
        let all = bdds.variables();

        let mut atoms = Vec::with_capacity(dom.len());
        let mut next = 0;
        for v in dom.vars() {
            atoms.push(all[next..next + v.cardinality()].to_vec());
            next += v.cardinality();
        }

        let mut sym = SymbolicDomain {
            dom: dom.clone(),
            well_formed: bdds.mk_true(),
            bdds,
            atoms,
            node_limit: None,
            config_exprs: HashMap::default(),
            core_exprs: HashMap::default(),
        };
        sym.well_formed = sym.mk_and(sym.atoms.iter().map(|row| sym.exactly_one(row)));
        log::debug!(
            "encoded {} variables with {num_atoms} atoms",
            sym.dom.len()
        );
        Ok(sym)
    }

    /// Give up on model queries whose BDD grows past `limit` nodes.
    pub fn with_node_limit(mut self, limit: Option<usize>) -> Self {
        self.node_limit = limit;
        self
    }

    /// The encoded domain.
    pub fn domain(&self) -> &Domain {
        &self.dom
    }

    fn exactly_one(&self, row: &[BddVariable]) -> Bdd {
        let some = self.mk_or(row.iter().map(|&x| self.bdds.mk_var(x)));
        let mut at_most_one = self.bdds.mk_true();
        for (i, &x) in row.iter().enumerate() {
            for &y in &row[i + 1..] {
                let both = self.bdds.mk_var(x).and(&self.bdds.mk_var(y));
                at_most_one = at_most_one.and(&both.not());
            }
        }
        some.and(&at_most_one)
    }

    /// The constant true
    pub fn mk_true(&self) -> Bdd {
        self.bdds.mk_true()
    }

    /// The constant false
    pub fn mk_false(&self) -> Bdd {
        self.bdds.mk_false()
    }

    /// Conjunction; true when empty.
    pub fn mk_and(&self, bdds: impl IntoIterator<Item = Bdd>) -> Bdd {
        bdds.into_iter()
            .fold(self.bdds.mk_true(), |acc, term| acc.and(&term))
    }

    /// Disjunction; false when empty.
    pub fn mk_or(&self, bdds: impl IntoIterator<Item = Bdd>) -> Bdd {
        bdds.into_iter()
            .fold(self.bdds.mk_false(), |acc, term| acc.or(&term))
    }

    /// The atom `var = val`.
    pub fn atom(&self, var: Var, val: Val) -> Bdd {
        self.bdds.mk_var(self.atoms[var][val])
    }

    /// The configuration as a conjunction of its settings. Memoized.
    pub fn config_expr(&mut self, config: &Config) -> Bdd {
        if let Some(e) = self.config_exprs.get(config) {
            return e.clone();
        }
        let e = self.mk_and(
            config
                .values()
                .iter()
                .enumerate()
                .map(|(var, &val)| self.atom(var, val)),
        );
        self.config_exprs.insert(config.clone(), e.clone());
        e
    }

    /// A core under the given connective. Each literal is the disjunction
    /// of its allowed values. Memoized.
    pub fn core_expr(&mut self, core: &Core, conn: Connective) -> Bdd {
        let key = (core.clone(), conn);
        if let Some(e) = self.core_exprs.get(&key) {
            return e.clone();
        }
        let literals = core
            .iter()
            .map(|(var, vals)| self.mk_or(vals.iter().map(|&val| self.atom(var, val))))
            .collect::<Vec<_>>();
        let e = match conn {
            Connective::And => self.mk_and(literals),
            Connective::Or => self.mk_or(literals),
        };
        self.core_exprs.insert(key, e.clone());
        e
    }

    /// Conjunction of the negations of the given configurations.
    pub fn exclude<'a>(&mut self, configs: impl IntoIterator<Item = &'a Config>) -> Bdd {
        let mut e = self.mk_true();
        for c in configs {
            e = e.and(&self.config_expr(c).not());
        }
        e
    }

    /// Does `f` hold in every well-formed configuration?
    pub fn is_tautology(&self, f: &Bdd) -> bool {
        let start = timing::start();
        let valid = self.well_formed.imp(f).is_true();
        timing::elapsed(TimeType::Tautology { valid }, start);
        valid
    }

    /// Is `a ⇒ b` valid?
    pub fn implies(&self, a: &Bdd, b: &Bdd) -> bool {
        self.is_tautology(&a.imp(b))
    }

    /// Is `a ⇔ b` valid?
    pub fn equivalent(&self, a: &Bdd, b: &Bdd) -> bool {
        self.is_tautology(&a.iff(b))
    }

    /// Up to `k` distinct configurations satisfying `f`. An empty result
    /// means `f` has no (more) models; an error means the query gave up.
    pub fn models(&mut self, f: &Bdd, k: usize) -> Result<Vec<Config>, QueryError> {
        let start = timing::start();
        let mut g = self.well_formed.and(f);
        if let Some(limit) = self.node_limit {
            if g.size() > limit {
                timing::elapsed(TimeType::Models { found: false }, start);
                return Err(QueryError::Unknown(format!(
                    "{} nodes exceeds the limit of {limit}",
                    g.size()
                )));
            }
        }
        let mut found = vec![];
        while found.len() < k {
            let Some(valuation) = g.sat_witness() else {
                break;
            };
            let config = self.decode(&valuation).ok_or_else(|| {
                QueryError::Unknown("model does not assign every variable".to_string())
            })?;
            g = g.and(&self.config_expr(&config).not());
            found.push(config);
        }
        timing::elapsed(
            TimeType::Models {
                found: !found.is_empty(),
            },
            start,
        );
        Ok(found)
    }

    /// Up to `k` configurations satisfying every formula in `yes` and none
    /// in `no`.
    pub fn models_of(&mut self, yes: &[Bdd], no: &[Bdd], k: usize) -> Result<Vec<Config>, QueryError> {
        let f = self.mk_and(
            yes.iter()
                .cloned()
                .chain(no.iter().map(|e| e.not())),
        );
        self.models(&f, k)
    }

    fn decode(&self, valuation: &BddValuation) -> Option<Config> {
        let values = self
            .atoms
            .iter()
            .map(|row| row.iter().position(|&x| valuation.value(x)))
            .collect::<Option<Vec<_>>>()?;
        Some(Config::from_values(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn dom() -> Domain {
        Domain::from_strs(&[("a", &["0", "1"]), ("b", &["0", "1"]), ("c", &["0", "1", "2"])])
            .unwrap()
    }

    #[test]
    fn test_well_formed_models() -> Result<(), QueryError> {
        let dom = dom();
        let mut sym = SymbolicDomain::new(&dom)?;
        let all = sym.models(&sym.mk_true(), 100)?;
        assert_eq!(all.len(), 12);
        let mut sorted = all.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, dom.gen_full());
        Ok(())
    }

    #[test]
    fn test_core_exprs() -> Result<(), QueryError> {
        let dom = dom();
        let mut sym = SymbolicDomain::new(&dom)?;
        let core = Core::from_strs(&dom, &[("a", &["1"]), ("c", &["0", "2"])])?;
        let conj = sym.core_expr(&core, Connective::And);
        let disj = sym.core_expr(&core, Connective::Or);
        assert!(sym.implies(&conj, &disj));
        assert!(!sym.implies(&disj, &conj));

        // a config satisfies the conjunction exactly when it implies it
        for c in dom.gen_full() {
            let e = sym.config_expr(&c);
            assert_eq!(sym.implies(&e, &conj), c.implies_conj(&core));
            assert_eq!(sym.implies(&e, &disj), c.implies_disj(&core));
        }

        // the negated core, read as a disjunction, is the complement
        let neg = sym.core_expr(&core.neg(&dom), Connective::Or);
        assert!(sym.equivalent(&neg, &conj.not()));

        let empty_conj = sym.core_expr(&Core::new(), Connective::And);
        assert!(sym.is_tautology(&empty_conj));
        assert!(sym.core_expr(&Core::new(), Connective::Or).is_false());
        Ok(())
    }

    #[test]
    fn test_models_exclusion() -> Result<(), QueryError> {
        let dom = dom();
        let mut sym = SymbolicDomain::new(&dom)?;
        let all = dom.gen_full();
        let seen = &all[..11];
        let f = sym.exclude(seen);
        let rest = sym.models(&f, 5)?;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].display(&dom).to_string(), "a=1 b=1 c=2");

        let none = sym.exclude(&all);
        assert!(sym.models(&none, 1)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_config_expr_has_one_model() -> Result<(), QueryError> {
        let dom = dom();
        let mut sym = SymbolicDomain::new(&dom)?;
        for c in dom.gen_full() {
            let e = sym.config_expr(&c);
            assert_eq!(sym.models(&e, 2)?, vec![c]);
        }
        Ok(())
    }

    #[test]
    fn test_node_limit() -> Result<(), QueryError> {
        let dom = dom();
        let mut sym = SymbolicDomain::new(&dom)?.with_node_limit(Some(1));
        assert!(matches!(
            sym.models(&sym.mk_true(), 1),
            Err(QueryError::Unknown(_))
        ));
        Ok(())
    }
}
