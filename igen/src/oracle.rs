// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! An oracle that replays recorded runs instead of running a program.
//!
//! Each record is one line, `x=1 y=0: L1,L2`, giving a configuration and
//! the locations it covered. Blank lines and `#` comments are skipped.

use domain::{
    concrete::ConcreteConfig,
    coverage::Cov,
    hashmap::HashMap,
    syntax::{Config, Domain, DomainError},
};
use inference::basics::{Evaluation, Oracle};
use thiserror::Error;

/// A malformed record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {msg}")]
pub struct ReplayError {
    /// 1-based line number
    pub line: usize,
    /// What went wrong
    pub msg: String,
}

/// The part of a line before a `#` that starts a word. A `#` inside a
/// location id is kept.
fn strip_comment(line: &str) -> &str {
    let mut prev = ' ';
    for (i, ch) in line.char_indices() {
        if ch == '#' && prev.is_whitespace() {
            return &line[..i];
        }
        prev = ch;
    }
    line
}

/// Recorded coverage, looked up by the configuration's rendering.
/// Configurations without a record cover nothing.
#[derive(Debug, Default)]
pub struct ReplayOracle {
    runs: HashMap<String, Cov>,
    misses: usize,
}

impl ReplayOracle {
    /// Parse recorded runs, checking each configuration against `dom`.
    pub fn parse(dom: &Domain, s: &str) -> Result<Self, ReplayError> {
        let mut runs = HashMap::default();
        for (i, line) in s.lines().enumerate() {
            let err = |msg: String| ReplayError { line: i + 1, msg };
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((config, locs)) = line.split_once(':') else {
                return Err(err("expected `settings: locations`".to_string()));
            };
            let config = Config::parse(dom, config.trim()).map_err(|e: DomainError| err(e.to_string()))?;
            let cov: Cov = locs
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            let key = config.display(dom).to_string();
            if runs.insert(key.clone(), cov).is_some() {
                return Err(err(format!("{key} is recorded twice")));
            }
        }
        Ok(ReplayOracle { runs, misses: 0 })
    }

    /// Number of recorded runs
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// No recorded runs
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Evaluations that found no record
    pub fn misses(&self) -> usize {
        self.misses
    }
}

impl Oracle for ReplayOracle {
    fn evaluate(&mut self, config: &ConcreteConfig) -> Evaluation {
        match self.runs.get(&config.to_string()) {
            Some(cov) => Evaluation {
                cov: cov.clone(),
                output: String::new(),
            },
            None => {
                log::debug!("no record for {config}");
                self.misses += 1;
                Evaluation::default()
            }
        }
    }
}
