// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Solver-guided counterexample search: fresh configurations that each
//! change one literal of a selected core.

use domain::{
    coverage::ConfigCovs,
    syntax::{Config, Core, ValSet},
};
use symbolic::bdd::Connective;

use crate::{
    basics::{InvariantViolation, LearnError},
    context::Context,
    pncore::{shared_variable, SCore},
};

/// The cores probes are drawn from: the main core itself when `keep` is
/// set and it leaves some variable free, then one core per unused value of
/// each main-core variable, each extended with the satisfied core.
fn candidates(ctx: &Context, score: &SCore) -> Result<Vec<Core>, InvariantViolation> {
    let main = score.main();
    let mut cores = vec![];
    if score.keep() && ctx.dom.len() > main.len() {
        cores.push(main.clone());
    }
    for (var, vals) in main.iter() {
        for val in ctx.dom.var(var).all_values().difference(vals) {
            let mut core = main.clone();
            core.insert(var, ValSet::from([*val]));
            cores.push(core);
        }
    }
    if let Some(sat) = score.sat() {
        for core in &mut cores {
            for (var, vals) in sat.iter() {
                if core.contains_var(var) {
                    return Err(shared_variable(&ctx.dom, var, main, sat));
                }
                core.insert(var, vals.clone());
            }
        }
    }
    Ok(cores)
}

/// New configurations probing `score`, none of them in `existing` and no
/// two alike. Candidates the solver finds unsatisfiable are skipped, so an
/// empty result means the core cannot be falsified any further.
pub fn gen_configs_cex(
    ctx: &mut Context,
    score: &SCore,
    existing: &ConfigCovs,
) -> Result<Vec<Config>, LearnError> {
    let cores = candidates(ctx, score)?;
    let mut blocked = ctx.sym.exclude(existing.configs());
    let mut probes: Vec<Config> = vec![];
    for core in cores {
        let expr = ctx.sym.core_expr(&core, Connective::And);
        let Some(probe) = ctx.sym.models_of(&[expr, blocked.clone()], &[], 1)?.pop() else {
            log::trace!("no fresh configuration for {}", core.display(&ctx.dom));
            continue;
        };
        if !probe.implies_conj(&core) {
            return Err(InvariantViolation::ProbeOutsideCore {
                probe: probe.display(&ctx.dom).to_string(),
                core: core.display(&ctx.dom).to_string(),
            }
            .into());
        }
        if existing.contains(&probe) || probes.contains(&probe) {
            return Err(InvariantViolation::DuplicateProbe {
                probe: probe.display(&ctx.dom).to_string(),
            }
            .into());
        }
        blocked = blocked.and(&ctx.sym.config_expr(&probe).not());
        probes.push(probe);
    }
    log::debug!(
        "{} probes for {}",
        probes.len(),
        score.display(&ctx.dom)
    );
    Ok(probes)
}
