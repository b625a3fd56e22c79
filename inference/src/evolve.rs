// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Evolutionary search for configurations reaching locations the learning
//! loop never covered, guided by how much of a known path to the location
//! each configuration's coverage follows.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use domain::{
    coverage::{Cov, CoverageStore},
    hashmap::{HashMap, HashSet},
    syntax::{Config, Loc},
};
use rand::seq::SliceRandom;
use serde::Serialize;
use symbolic::sample::sample_fresh;

use crate::{
    basics::{EvolveConfig, FitnessKind, LearnError, Oracle, PathProvider},
    context::Context,
};

/// How a multi-location search ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvolveResult {
    /// A covering configuration for each location reached
    pub found: BTreeMap<Loc, Config>,
    /// Locations abandoned after stagnating or for lack of path information
    pub unresolved: BTreeSet<Loc>,
    /// Locations the path provider does not know
    pub skipped: BTreeSet<Loc>,
    /// Every location first covered during the search
    pub covered: BTreeSet<Loc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Found(Config),
    Stuck,
    Degenerate,
}

/// `|cov ∩ path| / |path|`, or 1 on an exact match.
pub fn recall(cov: &Cov, path: &Cov) -> f64 {
    if cov == path {
        return 1.0;
    }
    if path.is_empty() {
        return 0.0;
    }
    cov.intersection(path).count() as f64 / path.len() as f64
}

/// Harmonic mean of the precision and recall of `cov` against `path`.
pub fn fscore(cov: &Cov, path: &Cov) -> f64 {
    let tp = cov.intersection(path).count() as f64;
    let fp = cov.difference(path).count() as f64;
    let fn_ = path.difference(cov).count() as f64;
    if tp + fp + fn_ == 0.0 {
        return 1.0;
    }
    let p = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let r = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
    if p + r > 0.0 {
        2.0 * p * r / (p + r)
    } else {
        0.0
    }
}

/// The file component of a location id: the basename of what precedes
/// the first `:`.
fn file_of(loc: &str) -> &str {
    let file = loc.split(':').next().unwrap_or(loc);
    Path::new(file)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(file)
}

/// Evaluate the configurations not yet in `store` one at a time, recording
/// each, and stop at the first one that covers `loc`.
fn run<O: Oracle + ?Sized>(
    ctx: &mut Context,
    oracle: &mut O,
    store: &mut CoverageStore,
    configs: &[Config],
    loc: &str,
) -> Option<Config> {
    for config in configs {
        if store.contains(config) {
            continue;
        }
        for (c, cov) in ctx.evaluate(oracle, std::slice::from_ref(config)).iter() {
            store.insert(c.clone(), cov.clone());
        }
        if store.cov(config).map_or(false, |cov| cov.contains(loc)) {
            return Some(config.clone());
        }
    }
    None
}

/// Re-insert the previous best individual into `scored` when this
/// generation's best fitness fell below it. Returns the best fitness after
/// that.
fn keep_elite(scored: &mut Vec<(f64, Config)>, prev_best: Option<&(f64, Config)>) -> f64 {
    let best = scored.iter().map(|(f, _)| *f).fold(f64::NEG_INFINITY, f64::max);
    match prev_best {
        Some((f, c)) if best < *f => {
            scored.push((*f, c.clone()));
            *f
        }
        _ => best,
    }
}

struct Search<'a> {
    loc: &'a str,
    cfg: &'a EvolveConfig,
    paths: Vec<Cov>,
    scope: Option<String>,
    fitness: HashMap<Config, f64>,
}

impl<'a> Search<'a> {
    fn new(loc: &'a str, cfg: &'a EvolveConfig, paths: Vec<Cov>) -> Self {
        let scope = cfg.scope_to_file.then(|| file_of(loc).to_string());
        let paths = paths
            .into_iter()
            .map(|p| match &scope {
                Some(s) => p.into_iter().filter(|l| l.contains(s.as_str())).collect::<Cov>(),
                None => p,
            })
            .filter(|p: &Cov| !p.is_empty())
            .collect();
        Search {
            loc,
            cfg,
            paths,
            scope,
            fitness: HashMap::default(),
        }
    }

    fn is_degenerate(&self) -> bool {
        self.paths.iter().all(|p| p.len() <= 1)
    }

    fn fitness(&mut self, store: &CoverageStore, config: &Config) -> f64 {
        if let Some(f) = self.fitness.get(config) {
            return *f;
        }
        let cov = store.cov(config).cloned().unwrap_or_default();
        let cov: Cov = match &self.scope {
            Some(s) => cov.into_iter().filter(|l| l.contains(s.as_str())).collect(),
            None => cov,
        };
        let f = self
            .paths
            .iter()
            .map(|p| match self.cfg.fitness {
                FitnessKind::Recall => recall(&cov, p),
                FitnessKind::FScore => fscore(&cov, p),
            })
            .fold(0.0, f64::max);
        self.fitness.insert(config.clone(), f);
        f
    }

    /// Single-variable changes of `config` not evaluated yet.
    fn neighbors(ctx: &Context, store: &CoverageStore, config: &Config) -> Vec<Config> {
        let mut neighbors = vec![];
        for var in 0..ctx.dom.len() {
            for val in ctx.dom.var(var).all_values() {
                if val == config.get(var) {
                    continue;
                }
                let n = config.with(var, val);
                if !store.contains(&n) {
                    neighbors.push(n);
                }
            }
        }
        neighbors
    }

    /// Evolve from `pop`, the initial population.
    fn go<O: Oracle + ?Sized>(
        &mut self,
        ctx: &mut Context,
        oracle: &mut O,
        store: &mut CoverageStore,
        mut pop: Vec<Config>,
    ) -> Result<Outcome, LearnError> {
        if let Some(c) = run(ctx, oracle, store, &pop, self.loc) {
            return Ok(Outcome::Found(c));
        }
        if self.is_degenerate() {
            log::warn!("{}: degenerate paths, giving up", self.loc);
            return Ok(Outcome::Degenerate);
        }

        let pop_size = ctx.dom.len().max(ctx.dom.max_cardinality());
        let max_fresh = usize::try_from(ctx.dom.size()).unwrap_or(usize::MAX);
        let mut prev_best: Option<(f64, Config)> = None;
        let mut best_ever = f64::NEG_INFINITY;
        let mut all_bests: HashSet<Config> = HashSet::default();
        let mut nlocs = store.num_locations();
        let mut prev_avg = f64::NEG_INFINITY;
        let mut stuck = 0;
        let mut generation = 0;
        loop {
            generation += 1;
            let mut scored = pop
                .iter()
                .map(|c| (self.fitness(store, c), c.clone()))
                .collect::<Vec<_>>();
            let best_fit = keep_elite(&mut scored, prev_best.as_ref());
            let bests = scored
                .iter()
                .filter(|(f, _)| *f == best_fit)
                .map(|(_, c)| c.clone())
                .collect::<Vec<_>>();
            let avg = if scored.is_empty() {
                0.0
            } else {
                scored.iter().map(|(f, _)| f).sum::<f64>() / scored.len() as f64
            };

            let cov_grew = store.num_locations() > nlocs;
            let better = best_fit > best_ever;
            let nbests = all_bests.len();
            all_bests.extend(bests.iter().cloned());
            let more_bests = all_bests.len() > nbests;
            let avg_better = self.cfg.avg_fitness_progress && avg > prev_avg;
            if cov_grew || better || more_bests || avg_better {
                stuck = 0;
            } else {
                stuck += 1;
            }
            nlocs = store.num_locations();
            best_ever = best_ever.max(best_fit);
            prev_avg = avg;
            log::debug!(
                "{} gen {generation}: pop {}, best {best_fit:.3} ({} ties), avg {avg:.3}, stuck {stuck}",
                self.loc,
                scored.len(),
                bests.len()
            );
            if stuck > self.cfg.max_stuck {
                log::debug!("{}: stuck after {generation} generations", self.loc);
                return Ok(Outcome::Stuck);
            }

            let Some(chosen) = bests.choose(&mut ctx.rng).cloned() else {
                return Ok(Outcome::Stuck);
            };
            prev_best = Some((best_fit, chosen.clone()));

            pop = Self::neighbors(ctx, store, &chosen);
            if pop.len() < pop_size {
                let n = (pop_size - pop.len()).min(max_fresh);
                let seen = store.configs().configs().chain(pop.iter());
                let padding = sample_fresh(&mut ctx.sym, n, seen, &mut ctx.rng)?;
                pop.extend(padding);
            }
            if let Some(c) = run(ctx, oracle, store, &pop, self.loc) {
                log::debug!("{}: found in generation {generation}", self.loc);
                return Ok(Outcome::Found(c));
            }
        }
    }
}

/// Search for configurations covering each of `targets` in turn, sharing
/// `store` with the caller. Targets covered along the way are not searched
/// for.
pub fn evolve<O: Oracle + ?Sized, P: PathProvider + ?Sized>(
    ctx: &mut Context,
    oracle: &mut O,
    paths: &P,
    store: &mut CoverageStore,
    targets: &BTreeSet<Loc>,
    cfg: &EvolveConfig,
) -> Result<EvolveResult, LearnError> {
    let before: BTreeSet<Loc> = store.locations().cloned().collect();
    let mut result = EvolveResult::default();
    let mut remaining = targets.clone();
    while let Some(loc) = remaining.pop_first() {
        if let Some(c) = store.covering(&loc).next() {
            result.found.insert(loc.clone(), c.clone());
            continue;
        }
        let Some(loc_paths) = paths.get_paths(&loc, cfg.max_paths) else {
            log::warn!("{loc}: no path information");
            result.skipped.insert(loc);
            continue;
        };
        let mut search = Search::new(&loc, cfg, loc_paths);
        let pop = ctx.dom.gen_tcover1(&mut ctx.rng);
        match search.go(ctx, oracle, store, pop)? {
            Outcome::Found(c) => {
                log::info!("{loc}: found {}", c.display(&ctx.dom));
                result.found.insert(loc.clone(), c);
            }
            Outcome::Stuck | Outcome::Degenerate => {
                result.unresolved.insert(loc.clone());
            }
        }
        remaining.retain(|l| match store.covering(l).next() {
            Some(c) => {
                log::debug!("{l}: covered while searching for {loc}");
                result.found.insert(l.clone(), c.clone());
                false
            }
            None => true,
        });
    }
    // later searches may have reached locations given up on earlier
    result.unresolved.retain(|l| match store.covering(l).next() {
        Some(c) => {
            log::debug!("{l}: covered after being abandoned");
            result.found.insert(l.clone(), c.clone());
            false
        }
        None => true,
    });
    result.covered = store
        .locations()
        .filter(|l| !before.contains(*l))
        .cloned()
        .collect();
    log::info!(
        "{} found, {} unresolved, {} skipped, {} newly covered",
        result.found.len(),
        result.unresolved.len(),
        result.skipped.len(),
        result.covered.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{concrete::ConcreteConfig, syntax::Domain};
    use test_log::test;

    fn cov(locs: &[&str]) -> Cov {
        locs.iter().map(|l| l.to_string()).collect()
    }

    fn dom() -> Domain {
        Domain::from_strs(&[("a", &["0", "1", "2"]), ("b", &["0", "1", "2"]), ("c", &["0", "1", "2"])])
            .unwrap()
    }

    fn oracle(config: &ConcreteConfig) -> Cov {
        let mut c = cov(&["main"]);
        let a2 = config.get("a") == Some("2");
        let b2 = config.get("b") == Some("2");
        if a2 {
            c.insert("f.c:A2".to_string());
        }
        if b2 {
            c.insert("f.c:B2".to_string());
        }
        if a2 && b2 {
            c.insert("f.c:T".to_string());
        }
        c
    }

    #[test]
    fn test_fitness() {
        let path = cov(&["x", "y", "t"]);
        assert_eq!(recall(&cov(&["x"]), &path), 1.0 / 3.0);
        assert_eq!(recall(&path, &path), 1.0);
        assert_eq!(recall(&cov(&["z"]), &path), 0.0);
        assert_eq!(fscore(&cov(&[]), &cov(&[])), 1.0);
        // precision 1/2, recall 1/3
        assert!((fscore(&cov(&["x", "z"]), &path) - 0.4).abs() < 1e-9);
        assert_eq!(file_of("src/f.c:12"), "f.c");
        assert_eq!(file_of("g.c"), "g.c");
    }

    #[test]
    fn test_finds_two_variable_combination() -> Result<(), LearnError> {
        let dom = dom();
        let mut ctx = Context::new(&dom, 5)?;
        let mut store = CoverageStore::new();
        let mut paths: HashMap<Loc, Vec<Cov>> = HashMap::default();
        paths.insert(
            "f.c:T".to_string(),
            vec![cov(&["main", "f.c:A2", "f.c:B2", "f.c:T"])],
        );
        let targets = cov(&["f.c:T"]);
        let mut oracle = oracle;
        let result = evolve(
            &mut ctx,
            &mut oracle,
            &paths,
            &mut store,
            &targets,
            &EvolveConfig::default(),
        )?;
        let found = &result.found["f.c:T"];
        assert_eq!(found.get(0), 2);
        assert_eq!(found.get(1), 2);
        assert!(result.unresolved.is_empty());
        assert!(result.covered.contains("f.c:T"));
        assert!(store.num_configs() < 27);
        Ok(())
    }

    #[test]
    fn test_combination_beyond_one_change() -> Result<(), LearnError> {
        let dom = dom();
        let mut ctx = Context::new(&dom, 5)?;
        let mut store = CoverageStore::new();
        let seeds = ["a=0 b=0 c=0", "a=1 b=1 c=1"]
            .iter()
            .map(|c| Config::parse(&dom, c))
            .collect::<Result<Vec<_>, _>>()?;
        // no single-variable change of a seed reaches the target
        for seed in &seeds {
            for var in 0..dom.len() {
                for val in dom.var(var).all_values() {
                    let concrete = seed.with(var, val).to_concrete(&dom, &mut ctx.rng);
                    assert!(!oracle(&concrete).contains("f.c:T"));
                }
            }
        }

        let loc = "f.c:T".to_string();
        let cfg = EvolveConfig::default();
        let paths = vec![cov(&["main", "f.c:A2", "f.c:B2", "f.c:T"])];
        let mut search = Search::new(&loc, &cfg, paths);
        let mut oracle = oracle;
        let outcome = search.go(&mut ctx, &mut oracle, &mut store, seeds.clone())?;
        let Outcome::Found(found) = outcome else {
            panic!("target not reached: {outcome:?}");
        };
        assert_eq!((found.get(0), found.get(1)), (2, 2));
        for seed in &seeds {
            let changed = (0..dom.len()).filter(|&v| seed.get(v) != found.get(v)).count();
            assert!(changed >= 2);
        }
        Ok(())
    }

    #[test]
    fn test_stops_at_first_hit() -> Result<(), LearnError> {
        let dom = Domain::from_strs(&[("a", &["0", "1", "2", "3", "4"]), ("b", &["0", "1"])])?;
        let mut ctx = Context::new(&dom, 0)?;
        let mut store = CoverageStore::new();
        let mut paths: HashMap<Loc, Vec<Cov>> = HashMap::default();
        paths.insert("T".to_string(), vec![cov(&["main", "T"])]);
        let mut calls = 0;
        let mut oracle = |_: &ConcreteConfig| {
            calls += 1;
            cov(&["main", "T"])
        };
        let result = evolve(
            &mut ctx,
            &mut oracle,
            &paths,
            &mut store,
            &cov(&["T"]),
            &EvolveConfig::default(),
        )?;
        assert!(result.found.contains_key("T"));
        assert_eq!(calls, 1);
        assert_eq!(store.num_configs(), 1);
        Ok(())
    }

    #[test]
    fn test_elitism() -> Result<(), LearnError> {
        let dom = dom();
        let elite = Config::parse(&dom, "a=2 b=2 c=0")?;
        let other = Config::parse(&dom, "a=0 b=0 c=0")?;
        let prev = (0.75, elite.clone());

        // a regressed generation gets the previous best back
        let mut scored = vec![(0.25, other.clone())];
        assert_eq!(keep_elite(&mut scored, Some(&prev)), 0.75);
        assert_eq!(scored, vec![(0.25, other.clone()), (0.75, elite)]);

        let mut scored = vec![(0.75, other)];
        assert_eq!(keep_elite(&mut scored, Some(&prev)), 0.75);
        assert_eq!(scored.len(), 1);

        let mut empty = vec![];
        assert_eq!(keep_elite(&mut empty, Some(&prev)), 0.75);
        assert_eq!(empty.len(), 1);
        assert_eq!(keep_elite(&mut vec![], None), f64::NEG_INFINITY);
        Ok(())
    }

    #[test]
    fn test_scoped_search() -> Result<(), LearnError> {
        let dom = dom();
        let mut ctx = Context::new(&dom, 9)?;
        let mut store = CoverageStore::new();
        let mut paths: HashMap<Loc, Vec<Cov>> = HashMap::default();
        paths.insert(
            "f.c:T".to_string(),
            vec![cov(&["main", "f.c:A2", "f.c:B2", "f.c:T"])],
        );
        let cfg = EvolveConfig {
            scope_to_file: true,
            fitness: FitnessKind::FScore,
            ..EvolveConfig::default()
        };
        let mut oracle = oracle;
        let result = evolve(&mut ctx, &mut oracle, &paths, &mut store, &cov(&["f.c:T"]), &cfg)?;
        assert!(result.found.contains_key("f.c:T"));
        Ok(())
    }

    #[test]
    fn test_degenerate_and_unknown() -> Result<(), LearnError> {
        let dom = dom();
        let mut ctx = Context::new(&dom, 0)?;
        let mut store = CoverageStore::new();
        let mut paths: HashMap<Loc, Vec<Cov>> = HashMap::default();
        paths.insert("never".to_string(), vec![cov(&["never"])]);
        let mut oracle = oracle;
        let result = evolve(
            &mut ctx,
            &mut oracle,
            &paths,
            &mut store,
            &cov(&["never", "nowhere"]),
            &EvolveConfig::default(),
        )?;
        assert!(result.found.is_empty());
        assert_eq!(result.unresolved, cov(&["never"]));
        assert_eq!(result.skipped, cov(&["nowhere"]));
        Ok(())
    }

    #[test]
    fn test_stuck_without_progress() -> Result<(), LearnError> {
        let dom = dom();
        let mut ctx = Context::new(&dom, 1)?;
        let mut store = CoverageStore::new();
        let mut paths: HashMap<Loc, Vec<Cov>> = HashMap::default();
        paths.insert("never".to_string(), vec![cov(&["main", "never"])]);
        let mut oracle = oracle;
        let result = evolve(
            &mut ctx,
            &mut oracle,
            &paths,
            &mut store,
            &cov(&["never"]),
            &EvolveConfig::default(),
        )?;
        assert_eq!(result.unresolved, cov(&["never"]));
        Ok(())
    }
}
