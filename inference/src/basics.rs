// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Shared definitions for learning: run configuration, the oracle and path
//! collaborators, and errors.

use std::collections::BTreeSet;

use domain::{
    concrete::ConcreteConfig,
    coverage::Cov,
    hashmap::HashMap,
    syntax::{DomainError, Loc},
};
use serde::{Deserialize, Serialize};
use symbolic::bdd::QueryError;
use thiserror::Error;

/// How the first batch of configurations is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialStrategy {
    /// Only the caller-supplied seeds
    Given,
    /// A 1-way covering array
    Tcover1,
    /// This many distinct random configurations
    Random(usize),
    /// The whole domain
    Full,
}

impl Default for InitialStrategy {
    fn default() -> Self {
        Self::Tcover1
    }
}

/// Knobs of the solver-guided learning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnConfig {
    /// Seed of the run's random number generator
    pub seed: u64,
    /// Initial configurations, in addition to the seeds
    pub initial: InitialStrategy,
    /// Stop after more than this many iterations without progress
    pub max_stuck: usize,
    /// Stop after this many iterations
    pub max_iters: Option<usize>,
    /// Give up on model queries past this many BDD nodes
    pub node_limit: Option<usize>,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            initial: InitialStrategy::default(),
            max_stuck: 3,
            max_iters: None,
            node_limit: None,
        }
    }
}

/// How well a run's coverage matches a path signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitnessKind {
    /// Fraction of the path covered
    Recall,
    /// Harmonic mean of precision and recall
    FScore,
}

/// Knobs of the evolutionary search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolveConfig {
    /// Path signatures requested per location
    pub max_paths: usize,
    /// Abandon a location after more than this many generations without
    /// progress
    pub max_stuck: usize,
    /// Fitness function
    pub fitness: FitnessKind,
    /// Count a better average fitness as progress
    pub avg_fitness_progress: bool,
    /// Only consider location ids from the target's own file
    pub scope_to_file: bool,
}

impl Default for EvolveConfig {
    fn default() -> Self {
        Self {
            max_paths: 100,
            max_stuck: 3,
            fitness: FitnessKind::Recall,
            avg_fitness_progress: false,
            scope_to_file: false,
        }
    }
}

/// The result of running the program under test on one configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Locations reached
    pub cov: Cov,
    /// Raw program output
    pub output: String,
}

/// The program under test.
pub trait Oracle {
    /// Run one configuration.
    fn evaluate(&mut self, config: &ConcreteConfig) -> Evaluation;
}

impl<F> Oracle for F
where
    F: FnMut(&ConcreteConfig) -> Cov,
{
    fn evaluate(&mut self, config: &ConcreteConfig) -> Evaluation {
        Evaluation {
            cov: self(config),
            output: String::new(),
        }
    }
}

/// Control-flow knowledge about the program under test.
pub trait PathProvider {
    /// Up to `max` path signatures leading to `loc`, or `None` if the
    /// location is unknown.
    fn get_paths(&self, loc: &str, max: usize) -> Option<Vec<Cov>>;
}

impl PathProvider for HashMap<Loc, Vec<Cov>> {
    fn get_paths(&self, loc: &str, max: usize) -> Option<Vec<Cov>> {
        self.get(loc)
            .map(|paths| paths.iter().take(max).cloned().collect())
    }
}

/// A broken internal contract. These abort the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("exception core pd = {pd} is defined without a negative core")]
    ExceptionWithoutCore { pd: String },
    #[error("selection has an empty main core")]
    EmptyMainCore,
    #[error("variable {var} is in both main core {main} and satisfied core {sat}")]
    SharedVariable {
        var: String,
        main: String,
        sat: String,
    },
    #[error("probe {probe} does not imply its target core {core}")]
    ProbeOutsideCore { probe: String, core: String },
    #[error("probe {probe} duplicates a configuration already seen")]
    DuplicateProbe { probe: String },
    #[error("configuration {config} was already evaluated")]
    Reevaluated { config: String },
    #[error("covering configuration {config} does not imply positive core {pc}")]
    PositiveOutsideCore { config: String, pc: String },
    #[error("no positive core")]
    MissingPositiveCore,
}

impl InvariantViolation {
    /// Attach the location being processed.
    pub fn at(self, loc: &str) -> LearnError {
        LearnError::Invariant {
            loc: Some(loc.to_string()),
            violation: self,
        }
    }
}

fn at_loc(loc: &Option<Loc>) -> String {
    match loc {
        Some(loc) => format!(" at {loc}"),
        None => String::new(),
    }
}

/// Errors that abort a learning run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LearnError {
    #[error("invariant violated{}: {violation}", at_loc(.loc))]
    Invariant {
        loc: Option<Loc>,
        violation: InvariantViolation,
    },
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<InvariantViolation> for LearnError {
    fn from(violation: InvariantViolation) -> Self {
        LearnError::Invariant {
            loc: None,
            violation,
        }
    }
}

/// Locations that are new, and locations whose core changed, after a
/// batch of evaluations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub new_locs: BTreeSet<Loc>,
    pub updated: BTreeSet<Loc>,
}

impl Progress {
    /// Did anything change?
    pub fn made(&self) -> bool {
        !self.new_locs.is_empty() || !self.updated.is_empty()
    }
}
