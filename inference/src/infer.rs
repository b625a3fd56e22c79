// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Generalizing cores from evidence, per location and per batch of runs.

use std::collections::{BTreeMap, BTreeSet};

use domain::{
    coverage::{ConfigCovs, CoverageStore},
    syntax::{Config, Core, Domain, Loc, ValSet},
};

use crate::{
    basics::{InvariantViolation, LearnError, Progress},
    context::Context,
    pncore::PNCore,
};

/// The current hypothesis of every location seen so far.
pub type Cores = BTreeMap<Loc, PNCore>;

/// The most specific core satisfied by every one of `configs`, starting
/// from `core` (or from the smallest configuration when there is none).
/// A variable whose observed values cover its whole domain is dropped.
pub fn infer(configs: &[Config], core: Option<&Core>, dom: &Domain) -> Core {
    let seed = match core {
        Some(core) => core.clone(),
        None => match configs.iter().min() {
            Some(min) => Core::from_config(min),
            None => return Core::new(),
        },
    };
    seed.iter()
        .filter_map(|(var, vals)| {
            let mut union: ValSet = vals.clone();
            union.extend(configs.iter().map(|c| c.get(var)));
            (union.len() < dom.var(var).cardinality()).then_some((var, union))
        })
        .collect()
}

/// Which label a core describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Configurations covering the location
    Positive,
    /// Configurations not covering the location
    Negative,
}

/// Tighten one side of a hypothesis. `configs` are the new configurations
/// with this side's label and `others` those with the opposite label. The
/// exception core is learned from the opposite-label configurations that
/// nonetheless satisfy the main core, minus the main core's variables.
fn tighten(
    ctx: &mut Context,
    polarity: Polarity,
    configs: &[Config],
    others: &[Config],
    core: Option<&Core>,
    exc: Option<&Core>,
) -> (Option<Core>, Option<Core>) {
    let base = if configs.is_empty() {
        core.cloned()
    } else {
        Some(ctx.infer(core, configs))
    };
    let mut new_exc = exc.cloned();
    if let Some(base) = base.as_ref().filter(|b| !b.is_empty()) {
        let inside = others
            .iter()
            .filter(|c| c.implies_conj(base))
            .cloned()
            .collect::<Vec<_>>();
        if !inside.is_empty() {
            let e = ctx.infer(exc, &inside);
            new_exc = Some(
                e.iter()
                    .filter(|(var, _)| !base.contains_var(*var))
                    .map(|(var, vals)| (var, vals.clone()))
                    .collect(),
            );
            log::trace!(
                "{polarity:?} exception from {} configurations: {}",
                inside.len(),
                new_exc.as_ref().map_or(String::new(), |e| e.display(&ctx.dom).to_string())
            );
        }
    }
    (base, new_exc)
}

/// Update one location's hypothesis after `batch` was added to `store`.
///
/// The positive core is refined with the new covering configurations. The
/// negative core is refined with every non-covering configuration the
/// first time it is established, and with only the new ones afterwards.
pub fn infer_sid(
    ctx: &mut Context,
    loc: &str,
    core: &PNCore,
    batch: &ConfigCovs,
    store: &CoverageStore,
) -> Result<PNCore, LearnError> {
    let pconfigs = batch
        .iter()
        .filter(|(_, cov)| cov.contains(loc))
        .map(|(c, _)| c.clone())
        .collect::<Vec<_>>();
    let misses = |covs: &ConfigCovs| {
        covs.iter()
            .filter(|(_, cov)| !cov.contains(loc))
            .map(|(c, _)| c.clone())
            .collect::<Vec<_>>()
    };
    let all_misses = misses(store.configs());
    let nconfigs = match core.nc() {
        None => all_misses.clone(),
        Some(_) => misses(batch),
    };
    let hits = store.covering(loc).cloned().collect::<Vec<_>>();

    let (pc, pd) = tighten(
        ctx,
        Polarity::Positive,
        &pconfigs,
        &all_misses,
        core.pc(),
        core.pd(),
    );
    let (nc, nd) = tighten(
        ctx,
        Polarity::Negative,
        &nconfigs,
        &hits,
        core.nc(),
        core.nd(),
    );
    PNCore::new(&ctx.dom, pc, pd, nc, nd).map_err(|e| e.at(loc))
}

/// Record a batch of runs and update every affected location: those
/// already known plus those the batch covers, restricted to `targets` when
/// given. Locations are processed in sorted order.
pub fn infer_covs(
    ctx: &mut Context,
    cores: &mut Cores,
    batch: &ConfigCovs,
    store: &mut CoverageStore,
    targets: Option<&BTreeSet<Loc>>,
) -> Result<Progress, LearnError> {
    for (config, cov) in batch.iter() {
        if !store.insert(config.clone(), cov.clone()) {
            return Err(InvariantViolation::Reevaluated {
                config: config.display(&ctx.dom).to_string(),
            }
            .into());
        }
    }

    let mut locs: BTreeSet<Loc> = cores.keys().cloned().collect();
    locs.extend(batch.locations());
    if let Some(targets) = targets {
        locs.retain(|l| targets.contains(l));
    }

    let mut progress = Progress::default();
    for loc in locs {
        let core = match cores.get(&loc) {
            Some(core) => core.clone(),
            None => {
                progress.new_locs.insert(loc.clone());
                PNCore::default()
            }
        };
        let updated = infer_sid(ctx, &loc, &core, batch, store)?;
        if updated != core {
            log::trace!("{loc}: {}", updated.display(&ctx.dom));
            progress.updated.insert(loc.clone());
            cores.insert(loc, updated);
        }
    }
    log::debug!(
        "{} new locations, {} updated",
        progress.new_locs.len(),
        progress.updated.len()
    );
    Ok(progress)
}
