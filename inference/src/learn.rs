// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The learning loop: pick the hypothesis most worth falsifying, probe it
//! with fresh configurations, and refine every location's hypothesis with
//! the results until nothing changes.

use std::collections::BTreeMap;

use domain::{
    coverage::CoverageStore,
    hashmap::HashSet,
    syntax::{Config, Core, Domain, Loc},
};
use serde::Serialize;

use crate::{
    basics::{InitialStrategy, LearnConfig, LearnError, Oracle, Progress},
    cex::gen_configs_cex,
    context::Context,
    infer::{infer_covs, Cores},
    pncore::{Interaction, MCore, PNCore, SCore},
    results::{analyze, MergedCores},
};

/// Selections already used to generate probes, as `(main, sat)`.
pub type Tried = HashSet<(Core, Option<Core>)>;

/// The untried selection for one side of a hypothesis: the main core `c`
/// itself (also probing `c` unchanged when the exception `d` exists), or
/// else the exception `d` with `c` kept satisfied.
fn propose(
    dom: &Domain,
    c: Option<&Core>,
    d: Option<&Core>,
    tried: &Tried,
) -> Result<Option<SCore>, LearnError> {
    let c = c.filter(|c| !c.is_empty());
    let d = d.filter(|d| !d.is_empty());
    if let Some(c) = c {
        if !tried.contains(&(c.clone(), None)) {
            let score = SCore::new(dom, c.clone(), None)?;
            return Ok(Some(if d.is_some() { score.with_keep() } else { score }));
        }
    }
    if let Some(d) = d {
        if !tried.contains(&(d.clone(), c.cloned())) {
            return Ok(Some(SCore::new(dom, d.clone(), c.cloned())?));
        }
    }
    Ok(None)
}

/// Pick the strongest untried selection over all distinct hypotheses,
/// ranked by `(settings, value_strength)` with the first one winning ties,
/// and mark it tried.
pub fn select_core(
    dom: &Domain,
    cores: &Cores,
    tried: &mut Tried,
) -> Result<Option<SCore>, LearnError> {
    let mut distinct: HashSet<&PNCore> = HashSet::default();
    let mut best: Option<((usize, usize), SCore)> = None;
    for (loc, core) in cores {
        if !distinct.insert(core) {
            continue;
        }
        let sides = [
            propose(dom, core.pc(), core.pd(), tried),
            propose(dom, core.nc(), core.nd(), tried),
        ];
        for side in sides {
            let Some(score) = side.map_err(|e| at_loc(e, loc))? else {
                continue;
            };
            let key = (score.settings(), score.value_strength());
            if best.as_ref().map_or(true, |(k, _)| key > *k) {
                best = Some((key, score));
            }
        }
    }
    Ok(best.map(|(_, score)| {
        tried.insert((score.main().clone(), score.sat().cloned()));
        score
    }))
}

fn at_loc(e: LearnError, loc: &str) -> LearnError {
    match e {
        LearnError::Invariant { loc: None, violation } => violation.at(loc),
        e => e,
    }
}

/// One iteration of the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterStats {
    pub iteration: usize,
    /// Configurations evaluated so far
    pub nconfigs: usize,
    /// Locations covered so far
    pub nlocs: usize,
    /// Distinct hypotheses
    pub ncores: usize,
    pub new_configs: usize,
    pub new_locs: usize,
    pub updated: usize,
    /// The selection probed, rendered
    pub selected: Option<String>,
}

impl IterStats {
    fn new(
        iteration: usize,
        new_configs: usize,
        progress: &Progress,
        store: &CoverageStore,
        cores: &Cores,
        selected: Option<String>,
    ) -> Self {
        IterStats {
            iteration,
            nconfigs: store.num_configs(),
            nlocs: store.num_locations(),
            ncores: cores.values().collect::<HashSet<_>>().len(),
            new_configs,
            new_locs: progress.new_locs.len(),
            updated: progress.updated.len(),
            selected,
        }
    }
}

/// Everything a run learned.
#[derive(Debug, Clone, Serialize)]
pub struct LearnResult {
    #[serde(skip)]
    pub store: CoverageStore,
    pub cores: Cores,
    pub results: BTreeMap<Loc, Interaction>,
    pub merged: MergedCores,
    pub history: Vec<IterStats>,
}

fn initial_configs(ctx: &mut Context, cfg: &LearnConfig, seeds: &[Config]) -> Result<Vec<Config>, LearnError> {
    let generated = match cfg.initial {
        InitialStrategy::Given => vec![],
        InitialStrategy::Tcover1 => ctx.dom.gen_tcover1(&mut ctx.rng),
        InitialStrategy::Random(n) => ctx.dom.gen_rand(n, &mut ctx.rng)?,
        InitialStrategy::Full => ctx.dom.gen_full(),
    };
    let mut seen = HashSet::default();
    Ok(generated
        .into_iter()
        .chain(seeds.iter().cloned())
        .filter(|c| seen.insert(c.clone()))
        .collect())
}

/// Learn an interaction invariant for every location `oracle` reaches,
/// starting from the configured initial configurations plus `seeds`.
pub fn learn<O: Oracle + ?Sized>(
    dom: &Domain,
    oracle: &mut O,
    cfg: &LearnConfig,
    seeds: &[Config],
) -> Result<LearnResult, LearnError> {
    let mut ctx = Context::new(dom, cfg.seed)?.with_node_limit(cfg.node_limit);
    let ctx = &mut ctx;
    let mut store = CoverageStore::new();
    let mut cores = Cores::new();
    let mut history = vec![];

    let initial = initial_configs(ctx, cfg, seeds)?;
    log::info!("{dom}");
    log::info!("{} initial configurations", initial.len());
    let covs = ctx.evaluate(oracle, &initial);
    let progress = infer_covs(ctx, &mut cores, &covs, &mut store, None)?;
    history.push(IterStats::new(0, covs.len(), &progress, &store, &cores, None));

    let mut tried = Tried::default();
    let mut stuck = 0;
    let mut iteration = 0;
    loop {
        if cfg.max_iters.map_or(false, |max| iteration >= max) {
            log::info!("stopping after {iteration} iterations");
            break;
        }
        iteration += 1;

        let mut selected = None;
        while let Some(score) = select_core(&ctx.dom, &cores, &mut tried)? {
            let probes = gen_configs_cex(ctx, &score, store.configs())?;
            if !probes.is_empty() {
                selected = Some((score, probes));
                break;
            }
            log::debug!("no probes for {}", score.display(&ctx.dom));
        }
        let Some((score, probes)) = selected else {
            log::info!("iter {iteration}: no selection left to probe");
            break;
        };

        let covs = ctx.evaluate(oracle, &probes);
        let progress = infer_covs(ctx, &mut cores, &covs, &mut store, None)?;
        let stat = IterStats::new(
            iteration,
            covs.len(),
            &progress,
            &store,
            &cores,
            Some(score.display(&ctx.dom)),
        );
        log::debug!(
            "iter {iteration}: {}, {} probes, {} new locations, {} updated",
            score.display(&ctx.dom),
            stat.new_configs,
            stat.new_locs,
            stat.updated
        );
        history.push(stat);

        if progress.made() {
            stuck = 0;
        } else {
            stuck += 1;
            if stuck > cfg.max_stuck {
                log::info!("iter {iteration}: no progress in {stuck} iterations");
                break;
            }
        }
    }

    let results = analyze(ctx, &cores, Some(&store))?;
    let merged = MergedCores::merge(ctx, &results);
    log::info!(
        "{} configurations, {} locations, {} interactions; strengths {}",
        store.num_configs(),
        store.num_locations(),
        merged.len(),
        merged.strens_str()
    );
    Ok(LearnResult {
        store,
        cores,
        results,
        merged,
        history,
    })
}
