// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Final results: verified and simplified per-location interactions, and
//! locations grouped by equivalent interactions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use domain::{
    coverage::CoverageStore,
    hashmap::HashMap,
    syntax::{Config, Loc},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    basics::LearnError,
    context::Context,
    infer::Cores,
    pncore::{Interaction, MCore, Shape},
};

/// Verify every location's hypothesis against the configurations covering
/// it, when coverage is supplied, and simplify it.
pub fn analyze(
    ctx: &mut Context,
    cores: &Cores,
    store: Option<&CoverageStore>,
) -> Result<BTreeMap<Loc, Interaction>, LearnError> {
    let mut results = BTreeMap::new();
    for (loc, core) in cores {
        let core = match store {
            Some(store) => {
                let mut configs: Vec<Config> = store.covering(loc).cloned().collect();
                configs.sort();
                let key = (core.clone(), configs);
                match ctx.verify_cache.get(&key) {
                    Some(v) => v.clone(),
                    None => {
                        let v = core.verify(&key.1, ctx).map_err(|e| e.at(loc))?;
                        if &v != core {
                            log::debug!("{loc}: verified to {}", v.display(&ctx.dom));
                        }
                        ctx.verify_cache.insert(key, v.clone());
                        v
                    }
                }
            }
            None => core.clone(),
        };
        results.insert(loc.clone(), core.simplify(ctx));
    }
    Ok(results)
}

/// Locations sharing one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedClass {
    pub interaction: Interaction,
    pub locs: BTreeSet<Loc>,
}

/// Locations grouped by logically equivalent interactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedCores {
    classes: Vec<MergedClass>,
}

impl MergedCores {
    /// Group locations by rendered interaction, then fold together groups
    /// whose interactions are equivalent.
    pub fn merge(ctx: &mut Context, results: &BTreeMap<Loc, Interaction>) -> Self {
        let mut groups: HashMap<&str, MergedClass> = HashMap::default();
        for (loc, interaction) in results {
            groups
                .entry(interaction.rendered.as_str())
                .or_insert_with(|| MergedClass {
                    interaction: interaction.clone(),
                    locs: BTreeSet::new(),
                })
                .locs
                .insert(loc.clone());
        }
        let mut merged = MergedCores {
            classes: groups.into_values().collect(),
        };
        merged.fix_duplicates(ctx);
        merged
    }

    /// Fold each class into the first earlier class with an equivalent
    /// interaction.
    pub fn fix_duplicates(&mut self, ctx: &mut Context) {
        let mut classes: Vec<MergedClass> = vec![];
        let mut exprs = vec![];
        for class in std::mem::take(&mut self.classes) {
            let e = class.interaction.expr(ctx);
            match exprs.iter().position(|x| ctx.sym.equivalent(x, &e)) {
                Some(i) => {
                    log::debug!(
                        "merging {} into {}",
                        class.interaction,
                        classes[i].interaction
                    );
                    classes[i].locs.extend(class.locs);
                }
                None => {
                    exprs.push(e);
                    classes.push(class);
                }
            }
        }
        self.classes = classes;
    }

    pub fn classes(&self) -> &[MergedClass] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Per strength: the number of interactions and of locations.
    pub fn strens(&self) -> Vec<(usize, usize, usize)> {
        let mut by_strength: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
        for class in &self.classes {
            let entry = by_strength.entry(class.interaction.strength()).or_default();
            entry.0 += 1;
            entry.1 += class.locs.len();
        }
        by_strength
            .into_iter()
            .map(|(s, (nformulas, nlocs))| (s, nformulas, nlocs))
            .collect()
    }

    /// [`strens`](Self::strens) as `(s, n, m), ...`.
    pub fn strens_str(&self) -> String {
        self.strens()
            .iter()
            .map(|(s, n, m)| format!("({s}, {n}, {m})"))
            .join(", ")
    }

    /// Number of conjunctive, disjunctive and mixed interactions.
    pub fn shapes(&self) -> (usize, usize, usize) {
        let count = |shape: Shape| {
            self.classes
                .iter()
                .filter(|c| c.interaction.shape == shape)
                .count()
        };
        (count(Shape::Conj), count(Shape::Disj), count(Shape::Mix))
    }
}

impl fmt::Display for MergedCores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sorted = self.classes.iter().sorted_by_key(|c| {
            (
                c.interaction.settings(),
                c.interaction.value_strength(),
                c.locs.len(),
            )
        });
        for (i, class) in sorted.enumerate() {
            writeln!(
                f,
                "{}. ({}) {}: ({}) {}",
                i + 1,
                class.interaction.strength(),
                class.interaction,
                class.locs.len(),
                class.locs.iter().join(",")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pncore::PNCore;
    use domain::syntax::{Core, Domain};

    fn core(dom: &Domain, settings: &[(&str, &[&str])]) -> Option<Core> {
        Some(Core::from_strs(dom, settings).unwrap())
    }

    #[test]
    fn test_merge_equivalent_cores() -> Result<(), LearnError> {
        let dom = Domain::from_strs(&[("a", &["0", "1"]), ("b", &["0", "1"])])?;
        let mut ctx = Context::new(&dom, 0)?;
        let mut cores = Cores::new();
        cores.insert(
            "L1".to_string(),
            PNCore::new(
                &dom,
                core(&dom, &[("a", &["1"])]),
                core(&dom, &[("b", &["0"])]),
                Some(Core::new()),
                Some(Core::new()),
            )?,
        );
        cores.insert(
            "L2".to_string(),
            PNCore::new(
                &dom,
                core(&dom, &[("b", &["1"])]),
                core(&dom, &[("a", &["0"])]),
                Some(Core::new()),
                Some(Core::new()),
            )?,
        );
        cores.insert(
            "L3".to_string(),
            PNCore::new(&dom, core(&dom, &[("a", &["1"]), ("b", &["1"])]), None, None, None)?,
        );
        cores.insert("L4".to_string(), PNCore::new(&dom, Some(Core::new()), None, None, None)?);

        let results = analyze(&mut ctx, &cores, None)?;
        assert_eq!(results["L1"].to_string(), "a=1 & b=1 (conj)");
        let merged = MergedCores::merge(&mut ctx, &results);
        assert_eq!(merged.len(), 2);
        insta::assert_display_snapshot!(merged, @r###"
        1. (0) true (conj): (1) L4
        2. (2) a=1 & b=1 (conj): (3) L1,L2,L3
        "###);
        assert_eq!(merged.strens(), vec![(0, 1, 1), (2, 1, 3)]);
        assert_eq!(merged.strens_str(), "(0, 1, 1), (2, 1, 3)");
        assert_eq!(merged.shapes(), (2, 0, 0));
        Ok(())
    }

    #[test]
    fn test_fix_duplicates_folds_renderings() -> Result<(), LearnError> {
        let dom = Domain::from_strs(&[("a", &["0", "1"]), ("b", &["0", "1"]), ("c", &["0"])])?;
        let mut ctx = Context::new(&dom, 0)?;
        let mut cores = Cores::new();
        cores.insert(
            "L1".to_string(),
            PNCore::new(&dom, core(&dom, &[("a", &["1"])]), None, None, None)?,
        );
        cores.insert(
            "L2".to_string(),
            PNCore::new(&dom, core(&dom, &[("a", &["1"]), ("c", &["0"])]), None, None, None)?,
        );
        cores.insert(
            "L3".to_string(),
            PNCore::new(&dom, core(&dom, &[("b", &["1"])]), None, None, None)?,
        );
        let results = analyze(&mut ctx, &cores, None)?;
        assert_ne!(results["L1"].rendered, results["L2"].rendered);

        let merged = MergedCores::merge(&mut ctx, &results);
        assert_eq!(merged.len(), 2);
        let first = &merged.classes()[0];
        assert_eq!(first.interaction.rendered, "a=1");
        assert_eq!(
            first.locs,
            ["L1", "L2"].iter().map(|l| l.to_string()).collect::<BTreeSet<_>>()
        );
        Ok(())
    }

    #[test]
    fn test_analyze_verifies_against_coverage() -> Result<(), LearnError> {
        let dom = Domain::from_strs(&[("a", &["0", "1"]), ("b", &["0", "1"])])?;
        let mut ctx = Context::new(&dom, 0)?;
        let mut store = CoverageStore::new();
        for c in ["a=1 b=1", "a=1 b=0"] {
            store.insert(Config::parse(&dom, c)?, ["L".to_string()].into());
        }
        let mut cores = Cores::new();
        // pd claims b=0 never covers L, which a=1 b=0 contradicts
        cores.insert(
            "L".to_string(),
            PNCore::new(
                &dom,
                core(&dom, &[("a", &["1"])]),
                core(&dom, &[("b", &["0"])]),
                Some(Core::new()),
                None,
            )?,
        );
        assert_eq!(analyze(&mut ctx, &cores, None)?["L"].rendered, "a=1 & b=1");
        assert_eq!(analyze(&mut ctx, &cores, Some(&store))?["L"].rendered, "a=1");
        Ok(())
    }
}
