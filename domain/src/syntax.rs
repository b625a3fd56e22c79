// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The configuration space: variables, domains, configurations and cores.

use crate::concrete;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Index of a variable in its [`Domain`].
pub type Var = usize;
/// Index of a value in its variable's sorted value list.
pub type Val = usize;
/// A set of values for one variable.
pub type ValSet = BTreeSet<Val>;
/// Identifier of a location of interest in the program under test.
pub type Loc = String;

/// Errors from building domains, parsing domain files, and generating
/// configurations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum DomainError {
    #[error("domain has no variables")]
    NoVariables,
    #[error("variable {0} has no values")]
    EmptyValues(String),
    #[error("variable {0} is declared more than once")]
    DuplicateVariable(String),
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    #[error("unknown value {value} for variable {var}")]
    UnknownValue { var: String, value: String },
    #[error("no value given for variable {0}")]
    MissingVariable(String),
    #[error("requested {requested} distinct configurations but the domain only has {available}")]
    Exhausted { requested: usize, available: u128 },
    #[error("line {line}: {msg}")]
    Parse {
        line: usize,
        offset: usize,
        msg: String,
    },
}

/// A named configuration option with its finite set of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    /// Option name, unique in its domain
    pub name: String,
    /// Values in sorted order; a [`Val`] indexes into this list
    pub values: Vec<String>,
    /// Whether the values are abstract tokens (see [`concrete`])
    pub symbolic: bool,
}

impl Variable {
    /// Build a variable from raw value strings. Repeated values collapse,
    /// and the single value `inf` or `type` expands to its symbolic tokens.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        let mut symbolic = false;
        if let [v] = &values[..] {
            if let Some(tokens) = concrete::expand_keyword(v) {
                values = tokens.iter().map(|t| t.to_string()).collect();
                symbolic = true;
            }
        }
        if values.is_empty() {
            return Err(DomainError::EmptyValues(name));
        }
        values.sort();
        values.dedup();
        Ok(Variable {
            name,
            values,
            symbolic,
        })
    }

    /// Number of values
    pub fn cardinality(&self) -> usize {
        self.values.len()
    }

    /// Index of a value by its string, if present.
    pub fn value_index(&self, value: &str) -> Option<Val> {
        self.values.binary_search_by(|v| v.as_str().cmp(value)).ok()
    }

    /// The set of all value indices.
    pub fn all_values(&self) -> ValSet {
        (0..self.values.len()).collect()
    }
}

/// The configuration space: an ordered list of variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain {
    vars: Vec<Variable>,
}

impl Domain {
    /// Build a domain, rejecting empty and duplicated variables.
    pub fn new(vars: Vec<Variable>) -> Result<Self, DomainError> {
        if vars.is_empty() {
            return Err(DomainError::NoVariables);
        }
        for (i, v) in vars.iter().enumerate() {
            if v.values.is_empty() {
                return Err(DomainError::EmptyValues(v.name.clone()));
            }
            if vars[..i].iter().any(|w| w.name == v.name) {
                return Err(DomainError::DuplicateVariable(v.name.clone()));
            }
        }
        Ok(Domain { vars })
    }

    /// Convenience constructor from `(name, values)` pairs.
    pub fn from_strs(vars: &[(&str, &[&str])]) -> Result<Self, DomainError> {
        let vars = vars
            .iter()
            .map(|(name, values)| Variable::new(*name, values.iter().copied()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(vars)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Always false for a constructed domain
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// The variables in domain order.
    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }

    /// A variable by index.
    pub fn var(&self, var: Var) -> &Variable {
        &self.vars[var]
    }

    /// Index of a variable by name.
    pub fn var_index(&self, name: &str) -> Option<Var> {
        self.vars.iter().position(|v| v.name == name)
    }

    /// Resolve a `(name, value)` pair to indices.
    pub fn setting(&self, name: &str, value: &str) -> Result<(Var, Val), DomainError> {
        let var = self
            .var_index(name)
            .ok_or_else(|| DomainError::UnknownVariable(name.to_string()))?;
        let val = self.vars[var]
            .value_index(value)
            .ok_or_else(|| DomainError::UnknownValue {
                var: name.to_string(),
                value: value.to_string(),
            })?;
        Ok((var, val))
    }

    /// Number of configurations in the domain, saturating at `u128::MAX`.
    pub fn size(&self) -> u128 {
        self.vars.iter().fold(1u128, |acc, v| {
            acc.saturating_mul(v.cardinality() as u128)
        })
    }

    /// Largest cardinality of any variable.
    pub fn max_cardinality(&self) -> usize {
        self.vars.iter().map(Variable::cardinality).max().unwrap_or(0)
    }

    /// Whether any variable has symbolic values.
    pub fn has_symbolic(&self) -> bool {
        self.vars.iter().any(|v| v.symbolic)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vars and {} pos configs", self.len(), self.size())?;
        for (i, v) in self.vars.iter().enumerate() {
            write!(
                f,
                "\n{}. {}: ({}) {}",
                i + 1,
                v.name,
                v.cardinality(),
                v.values.join(",")
            )?;
        }
        Ok(())
    }
}

/// A total assignment of one value to every variable of a domain, in
/// domain order. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Config(Arc<[Val]>);

impl Config {
    /// Wrap value indices. The caller guarantees they are in range for the
    /// domain the configuration is used with.
    pub fn from_values(values: Vec<Val>) -> Self {
        Config(values.into())
    }

    /// Build a configuration from `(name, value)` pairs covering every
    /// variable of the domain.
    pub fn from_strs(dom: &Domain, settings: &[(&str, &str)]) -> Result<Self, DomainError> {
        let mut values: Vec<Option<Val>> = vec![None; dom.len()];
        for (name, value) in settings {
            let (var, val) = dom.setting(name, value)?;
            values[var] = Some(val);
        }
        let values = values
            .into_iter()
            .enumerate()
            .map(|(var, val)| {
                val.ok_or_else(|| DomainError::MissingVariable(dom.var(var).name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_values(values))
    }

    /// Parse the rendering produced by [`Config::display`], e.g. `x=1 y=0`.
    pub fn parse(dom: &Domain, s: &str) -> Result<Self, DomainError> {
        let settings = s
            .split_whitespace()
            .map(|kv| {
                kv.split_once('=').ok_or_else(|| DomainError::Parse {
                    line: 1,
                    offset: 0,
                    msg: format!("expected name=value, got {kv}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_strs(dom, &settings)
    }

    /// The value of a variable.
    pub fn get(&self, var: Var) -> Val {
        self.0[var]
    }

    /// All value indices in domain order.
    pub fn values(&self) -> &[Val] {
        &self.0
    }

    /// Copy of this configuration with one variable changed.
    pub fn with(&self, var: Var, val: Val) -> Self {
        let mut values = self.0.to_vec();
        values[var] = val;
        Self::from_values(values)
    }

    /// Does this configuration satisfy every literal of `core`? The empty
    /// core is satisfied by everything.
    pub fn implies_conj(&self, core: &Core) -> bool {
        core.iter().all(|(var, vals)| vals.contains(&self.get(var)))
    }

    /// Does this configuration satisfy some literal of `core`? The empty
    /// core is taken as trivially satisfied.
    pub fn implies_disj(&self, core: &Core) -> bool {
        core.is_empty() || core.iter().any(|(var, vals)| vals.contains(&self.get(var)))
    }

    /// Render as `x=1 y=0`.
    pub fn display<'a>(&'a self, dom: &'a Domain) -> impl fmt::Display + 'a {
        DisplayConfig { config: self, dom }
    }
}

struct DisplayConfig<'a> {
    config: &'a Config,
    dom: &'a Domain,
}

impl fmt::Display for DisplayConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self
            .config
            .values()
            .iter()
            .enumerate()
            .map(|(var, &val)| format!("{}={}", self.dom.var(var).name, self.dom.var(var).values[val]))
            .join(" ");
        write!(f, "{s}")
    }
}

/// A partial assignment of a set of allowed values to some variables.
///
/// The same data is read as a conjunction (every listed variable takes one
/// of its values) or a disjunction (some listed variable does), depending
/// on where it appears. Value sets are never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Core(BTreeMap<Var, ValSet>);

impl Core {
    /// The empty core
    pub fn new() -> Self {
        Core(BTreeMap::new())
    }

    /// The exact settings of one configuration.
    pub fn from_config(config: &Config) -> Self {
        Core(
            config
                .values()
                .iter()
                .enumerate()
                .map(|(var, &val)| (var, ValSet::from([val])))
                .collect(),
        )
    }

    /// Build from `(name, values)` pairs.
    pub fn from_strs(dom: &Domain, settings: &[(&str, &[&str])]) -> Result<Self, DomainError> {
        let mut core = Core::new();
        for (name, values) in settings {
            let var = dom
                .var_index(name)
                .ok_or_else(|| DomainError::UnknownVariable(name.to_string()))?;
            let vals = values
                .iter()
                .map(|value| dom.setting(name, value).map(|(_, val)| val))
                .collect::<Result<ValSet, _>>()?;
            if vals.is_empty() {
                return Err(DomainError::EmptyValues(name.to_string()));
            }
            core.insert(var, vals);
        }
        Ok(core)
    }

    /// Set the allowed values of a variable. Panics on an empty set.
    pub fn insert(&mut self, var: Var, vals: ValSet) {
        assert!(!vals.is_empty(), "core literal with no values");
        self.0.insert(var, vals);
    }

    /// Drop a variable.
    pub fn remove(&mut self, var: Var) -> Option<ValSet> {
        self.0.remove(&var)
    }

    /// Allowed values of a variable, if constrained.
    pub fn get(&self, var: Var) -> Option<&ValSet> {
        self.0.get(&var)
    }

    /// Is the variable constrained?
    pub fn contains_var(&self, var: Var) -> bool {
        self.0.contains_key(&var)
    }

    /// Constrained variables with their values, in variable order.
    pub fn iter(&self) -> impl Iterator<Item = (Var, &ValSet)> + '_ {
        self.0.iter().map(|(&var, vals)| (var, vals))
    }

    /// Constrained variables
    pub fn vars(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.keys().copied()
    }

    /// Number of constrained variables
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No constrained variables
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every `(var, val)` literal, in order.
    pub fn settings(&self) -> impl Iterator<Item = (Var, Val)> + '_ {
        self.0
            .iter()
            .flat_map(|(&var, vals)| vals.iter().map(move |&val| (var, val)))
    }

    /// Complement every value set with respect to the domain. Variables
    /// whose complement is empty are dropped.
    pub fn neg(&self, dom: &Domain) -> Core {
        Core(
            self.0
                .iter()
                .filter_map(|(&var, vals)| {
                    let rest: ValSet = dom.var(var).all_values().difference(vals).copied().collect();
                    (!rest.is_empty()).then_some((var, rest))
                })
                .collect(),
        )
    }

    /// Render literals joined by `sep`, e.g. `x=1 & y=0,1`; the empty core
    /// renders as `true`.
    pub fn render(&self, dom: &Domain, sep: &str) -> String {
        if self.is_empty() {
            return "true".to_string();
        }
        self.0
            .iter()
            .map(|(&var, vals)| {
                let v = dom.var(var);
                format!("{}={}", v.name, vals.iter().map(|&val| &v.values[val]).join(","))
            })
            .join(sep)
    }

    /// Render with spaces, e.g. `x=1 y=0,1`.
    pub fn display<'a>(&'a self, dom: &'a Domain) -> impl fmt::Display + 'a {
        DisplayCore { core: self, dom }
    }
}

impl FromIterator<(Var, ValSet)> for Core {
    fn from_iter<T: IntoIterator<Item = (Var, ValSet)>>(iter: T) -> Self {
        let mut core = Core::new();
        for (var, vals) in iter {
            core.insert(var, vals);
        }
        core
    }
}

struct DisplayCore<'a> {
    core: &'a Core,
    dom: &'a Domain,
}

impl fmt::Display for DisplayCore<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.core.render(self.dom, " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dom() -> Domain {
        Domain::from_strs(&[("x", &["2", "1", "0"]), ("y", &["1", "0"]), ("z", &["0", "1"])])
            .unwrap()
    }

    #[test]
    fn test_domain_display() {
        let dom = dom();
        assert_eq!(dom.size(), 12);
        assert_eq!(
            dom.to_string(),
            "3 vars and 12 pos configs\n1. x: (3) 0,1,2\n2. y: (2) 0,1\n3. z: (2) 0,1"
        );
    }

    #[test]
    fn test_domain_errors() {
        assert_eq!(
            Domain::from_strs(&[("x", &[])]),
            Err(DomainError::EmptyValues("x".to_string()))
        );
        assert_eq!(
            Domain::from_strs(&[("x", &["0"]), ("x", &["1"])]),
            Err(DomainError::DuplicateVariable("x".to_string()))
        );
        assert_eq!(Domain::from_strs(&[]), Err(DomainError::NoVariables));
        // repeated values collapse
        let dom = Domain::from_strs(&[("x", &["1", "1", "0"])]).unwrap();
        assert_eq!(dom.var(0).values, vec!["0", "1"]);
    }

    #[test]
    fn test_symbolic_keywords() {
        let dom = Domain::from_strs(&[("n", &["inf"]), ("t", &["type"]), ("b", &["0", "1"])]).unwrap();
        assert_eq!(dom.var(0).values, vec!["Eq0", "Gt0", "Lt0"]);
        assert_eq!(dom.var(1).values, vec!["TFloat", "TInt", "TStr"]);
        assert!(dom.var(0).symbolic && !dom.var(2).symbolic);
        assert!(dom.has_symbolic());
    }

    #[test]
    fn test_config_implies() {
        let dom = dom();
        let c = Config::parse(&dom, "x=2 y=1 z=0").unwrap();
        assert_eq!(c.display(&dom).to_string(), "x=2 y=1 z=0");

        let core = Core::from_strs(&dom, &[("x", &["2"]), ("z", &["0", "1"])]).unwrap();
        assert!(c.implies_conj(&core));
        assert!(c.implies_disj(&core));

        let other = Core::from_strs(&dom, &[("x", &["0"]), ("y", &["1"])]).unwrap();
        assert!(!c.implies_conj(&other));
        assert!(c.implies_disj(&other));

        assert!(c.implies_conj(&Core::new()));
        assert!(c.implies_disj(&Core::new()));
    }

    #[test]
    fn test_core_render_and_neg() {
        let dom = dom();
        let core = Core::from_strs(&dom, &[("x", &["2"]), ("y", &["1"]), ("z", &["0", "1"])]).unwrap();
        assert_eq!(core.display(&dom).to_string(), "x=2 y=1 z=0,1");
        assert_eq!(core.render(&dom, " & "), "x=2 & y=1 & z=0,1");
        // z has no values left, so it disappears
        assert_eq!(core.neg(&dom).display(&dom).to_string(), "x=0,1 y=0");
        assert_eq!(Core::new().display(&dom).to_string(), "true");
    }

    #[test]
    fn test_neg_involution() {
        let dom = dom();
        let cores = [
            Core::from_strs(&dom, &[("x", &["2"]), ("y", &["1"])]).unwrap(),
            Core::from_strs(&dom, &[("x", &["0", "1"]), ("z", &["0"])]).unwrap(),
            Core::new(),
        ];
        for core in cores {
            assert_eq!(core.neg(&dom).neg(&dom), core);
        }
    }

    #[test]
    fn test_config_errors() {
        let dom = dom();
        assert_eq!(
            Config::parse(&dom, "x=2 y=1"),
            Err(DomainError::MissingVariable("z".to_string()))
        );
        assert_eq!(
            Config::parse(&dom, "x=3 y=1 z=0"),
            Err(DomainError::UnknownValue {
                var: "x".to_string(),
                value: "3".to_string()
            })
        );
        assert_eq!(
            Config::parse(&dom, "w=3"),
            Err(DomainError::UnknownVariable("w".to_string()))
        );
    }

    #[test]
    fn test_config_serde() {
        let dom = dom();
        let c = Config::parse(&dom, "x=1 y=0 z=1").unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "[1,0,1]");
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
