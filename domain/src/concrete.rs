// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Symbolic value tokens and their concretization into program inputs.
//!
//! A variable declared with the single value `inf` ranges over the signs of
//! an integer, and one declared with `type` ranges over primitive types.
//! Before a configuration is handed to a program, each token is replaced by
//! a random concrete representative.

use crate::syntax::{Config, Domain};
use rand::Rng;
use std::fmt;

/// Integers equal to zero
pub const EQ0: &str = "Eq0";
/// Strictly positive integers
pub const GT0: &str = "Gt0";
/// Strictly negative integers
pub const LT0: &str = "Lt0";
/// Floating point values
pub const TFLOAT: &str = "TFloat";
/// Integer values
pub const TINT: &str = "TInt";
/// Single-character strings
pub const TSTR: &str = "TStr";

static INF_TOKENS: [&str; 3] = [EQ0, GT0, LT0];
static TYPE_TOKENS: [&str; 3] = [TFLOAT, TINT, TSTR];
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// The tokens a domain-file keyword stands for, if it is one.
pub fn expand_keyword(value: &str) -> Option<&'static [&'static str]> {
    match value {
        "inf" => Some(&INF_TOKENS[..]),
        "type" => Some(&TYPE_TOKENS[..]),
        _ => None,
    }
}

/// Pick a concrete representative for a token. Non-token values are
/// returned as they are.
pub fn concretize_value<R: Rng>(value: &str, rng: &mut R) -> String {
    match value {
        EQ0 => "0".to_string(),
        GT0 => rng.gen_range(1..=1000).to_string(),
        LT0 => (-rng.gen_range(1..=1000)).to_string(),
        TINT => rng.gen_range(-100..=100).to_string(),
        TFLOAT => rng.gen::<f64>().to_string(),
        TSTR => format!("'{}'", LETTERS[rng.gen_range(0..LETTERS.len())] as char),
        _ => value.to_string(),
    }
}

/// A configuration as `name=value` strings, ready to be passed to a
/// program under test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcreteConfig {
    settings: Vec<(String, String)>,
}

impl ConcreteConfig {
    /// The value bound to a name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.settings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All settings in domain order.
    pub fn settings(&self) -> &[(String, String)] {
        &self.settings
    }
}

impl fmt::Display for ConcreteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.settings.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl Config {
    /// Replace every value by its string, concretizing symbolic tokens.
    pub fn to_concrete<R: Rng>(&self, dom: &Domain, rng: &mut R) -> ConcreteConfig {
        let settings = self
            .values()
            .iter()
            .enumerate()
            .map(|(var, &val)| {
                let v = dom.var(var);
                let value = if v.symbolic {
                    concretize_value(&v.values[val], rng)
                } else {
                    v.values[val].clone()
                };
                (v.name.clone(), value)
            })
            .collect();
        ConcreteConfig { settings }
    }
}
