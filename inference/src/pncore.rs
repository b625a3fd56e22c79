// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Hypotheses built from cores: the four-part [`PNCore`] learned per
//! location, the [`SCore`] selected to drive counterexample search, and the
//! simplified [`Interaction`] reported at the end.

use std::collections::BTreeSet;
use std::fmt;

use biodivine_lib_bdd::Bdd;
use domain::syntax::{Config, Core, Domain, Var};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use symbolic::bdd::Connective;

use crate::{basics::InvariantViolation, context::Context};

/// A core that is present and constrains something.
pub(crate) fn populated(core: &Option<Core>) -> Option<&Core> {
    core.as_ref().filter(|c| !c.is_empty())
}

/// Size measures over a group of cores, used to rank hypotheses.
pub trait MCore {
    /// The populated cores.
    fn cores(&self) -> Vec<&Core>;

    /// Number of distinct `(variable, allowed values)` pairs.
    fn settings(&self) -> usize {
        self.cores()
            .into_iter()
            .flat_map(|c| c.iter())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Number of distinct `(variable, value)` literals.
    fn strength(&self) -> usize {
        self.cores()
            .into_iter()
            .flat_map(|c| c.settings())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Total size of the distinct allowed-value sets.
    fn value_strength(&self) -> usize {
        self.cores()
            .into_iter()
            .flat_map(|c| c.iter())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|(_, vals)| vals.len())
            .sum()
    }
}

/// What one location's evidence says: covering configurations satisfy
/// `pc ∧ ¬pd`, and the others satisfy `nc ∧ ¬nd`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PNCore {
    pc: Option<Core>,
    pd: Option<Core>,
    nc: Option<Core>,
    nd: Option<Core>,
}

impl PNCore {
    /// Build a hypothesis. An exception `pd` only makes sense once the
    /// negative core `nc` exists.
    pub fn new(
        dom: &Domain,
        pc: Option<Core>,
        pd: Option<Core>,
        nc: Option<Core>,
        nd: Option<Core>,
    ) -> Result<Self, InvariantViolation> {
        if let (Some(pd), None) = (&pd, &nc) {
            return Err(InvariantViolation::ExceptionWithoutCore {
                pd: pd.display(dom).to_string(),
            });
        }
        Ok(PNCore { pc, pd, nc, nd })
    }

    pub fn pc(&self) -> Option<&Core> {
        self.pc.as_ref()
    }

    pub fn pd(&self) -> Option<&Core> {
        self.pd.as_ref()
    }

    pub fn nc(&self) -> Option<&Core> {
        self.nc.as_ref()
    }

    pub fn nd(&self) -> Option<&Core> {
        self.nd.as_ref()
    }

    /// Has one of the two rules been dropped?
    pub fn is_simplified(&self) -> bool {
        (self.pc.is_none() && self.pd.is_none()) || (self.nc.is_none() && self.nd.is_none())
    }

    /// Render as `pc: ...; nc: ...`, listing only the cores present.
    pub fn display<'a>(&'a self, dom: &'a Domain) -> impl fmt::Display + 'a {
        DisplayPNCore { core: self, dom }
    }

    /// Check the hypothesis against all configurations known to cover the
    /// location, discarding the parts they contradict. Never strengthens.
    pub fn verify(&self, configs: &[Config], ctx: &mut Context) -> Result<PNCore, InvariantViolation> {
        let pc = self.pc.clone().ok_or(InvariantViolation::MissingPositiveCore)?;
        if let Some(c) = configs.iter().find(|c| !c.implies_conj(&pc)) {
            return Err(InvariantViolation::PositiveOutsideCore {
                config: c.display(&ctx.dom).to_string(),
                pc: pc.display(&ctx.dom).to_string(),
            });
        }

        let mut pd = self.pd.clone();
        if let Some(d) = populated(&self.pd) {
            let neg = ctx.neg(d);
            if !configs.iter().all(|c| c.implies_disj(&neg)) {
                log::debug!("pd {} invalid", d.display(&ctx.dom));
                pd = None;
            }
        }

        // covering configurations satisfy nd ∨ ¬nc
        let (mut nc, mut nd) = (self.nc.clone(), self.nd.clone());
        match (populated(&self.nc), populated(&self.nd)) {
            (Some(c), None) => {
                let neg = ctx.neg(c);
                if !configs.iter().all(|x| x.implies_disj(&neg)) {
                    log::debug!("nc {} invalid", c.display(&ctx.dom));
                    nc = None;
                }
            }
            (None, Some(d)) => {
                if !configs.iter().all(|x| x.implies_conj(d)) {
                    log::debug!("nd {} invalid", d.display(&ctx.dom));
                    nd = None;
                }
            }
            (Some(c), Some(d)) => {
                let neg = ctx.neg(c);
                if !configs
                    .iter()
                    .all(|x| x.implies_conj(d) || x.implies_disj(&neg))
                {
                    log::debug!(
                        "nc {} & nd {} invalid",
                        c.display(&ctx.dom),
                        d.display(&ctx.dom)
                    );
                    nc = None;
                    nd = None;
                }
            }
            (None, None) => (),
        }
        // a discarded nc that still anchors pd becomes the empty core,
        // which every later step treats as absent
        if nc.is_none() && pd.is_some() {
            nc = Some(Core::new());
        }
        PNCore::new(&ctx.dom, Some(pc), pd, nc, nd)
    }

    /// Keep whichever of the two rules implies the other, and render it.
    /// Memoized per hypothesis.
    pub fn simplify(&self, ctx: &mut Context) -> Interaction {
        if let Some(i) = ctx.simplify_cache.get(self) {
            return i.clone();
        }
        let pc = populated(&self.pc).cloned();
        let pd = populated(&self.pd).cloned();
        let nc = populated(&self.nc).cloned();
        let nd = populated(&self.nd).cloned();

        let (formula, rendered) = if pc.is_none() && pd.is_none() {
            let (_, s) = rule(ctx, nd.as_ref(), nc.as_ref(), Connective::Or);
            (Formula::Negative { nc, nd }, s)
        } else if nc.is_none() && nd.is_none() {
            let (_, s) = rule(ctx, pc.as_ref(), pd.as_ref(), Connective::And);
            (Formula::Positive { pc, pd }, s)
        } else {
            let (pexpr, ps) = rule(ctx, pc.as_ref(), pd.as_ref(), Connective::And);
            let (nexpr, ns) = rule(ctx, nd.as_ref(), nc.as_ref(), Connective::Or);
            if ctx.sym.implies(&pexpr, &nexpr) {
                (Formula::Positive { pc, pd }, ps)
            } else if ctx.sym.implies(&nexpr, &pexpr) {
                (Formula::Negative { nc, nd }, ns)
            } else {
                log::warn!("inconsistent? {}\npf: {ps} ?? nf: {ns}", self.display(&ctx.dom));
                (Formula::Inconsistent { pc, pd, nc, nd }, format!("{ps},{ns}***"))
            }
        };
        let interaction = Interaction {
            shape: Shape::of(&rendered),
            formula,
            rendered,
        };
        ctx.simplify_cache.insert(self.clone(), interaction.clone());
        interaction
    }
}

impl MCore for PNCore {
    fn cores(&self) -> Vec<&Core> {
        [&self.pc, &self.pd, &self.nc, &self.nd]
            .into_iter()
            .filter_map(populated)
            .collect()
    }
}

struct DisplayPNCore<'a> {
    core: &'a PNCore,
    dom: &'a Domain,
}

impl fmt::Display for DisplayPNCore<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.core;
        let s = [("pc", &c.pc), ("pd", &c.pd), ("nc", &c.nc), ("nd", &c.nd)]
            .into_iter()
            .filter_map(|(name, core)| {
                core.as_ref()
                    .map(|core| format!("{name}: {}", core.display(self.dom)))
            })
            .join("; ");
        write!(f, "{s}")
    }
}

/// One rule as a formula and a string. `cc` contributes its conjunction and
/// `cd` the disjunction of its negation; the parts are joined by `conn`.
/// With no parts the rule is `true`.
fn rule(ctx: &mut Context, cc: Option<&Core>, cd: Option<&Core>, conn: Connective) -> (Bdd, String) {
    let neg;
    let mut parts: Vec<(Bdd, &Core, &str)> = vec![];
    if let Some(cc) = cc {
        parts.push((ctx.sym.core_expr(cc, Connective::And), cc, " & "));
    }
    if let Some(cd) = cd {
        neg = ctx.neg(cd);
        if !neg.is_empty() {
            parts.push((ctx.sym.core_expr(&neg, Connective::Or), &neg, " | "));
        }
    }
    if parts.is_empty() {
        return (ctx.sym.mk_true(), "true".to_string());
    }

    let grouped = parts.len() > 1;
    let strs = parts
        .iter()
        .map(|(_, core, sep)| {
            let s = core.render(&ctx.dom, sep);
            if grouped && core.len() > 1 {
                format!("({s})")
            } else {
                s
            }
        })
        .sorted()
        .collect::<Vec<_>>();
    let exprs = parts.into_iter().map(|(e, _, _)| e);
    match conn {
        Connective::And => (ctx.sym.mk_and(exprs), strs.join(" & ")),
        Connective::Or => (ctx.sym.mk_or(exprs), strs.join(" | ")),
    }
}

/// The connective structure of a rendered formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shape {
    Conj,
    Disj,
    Mix,
}

impl Shape {
    /// Classify a rendered formula by the connectives it uses.
    pub fn of(rendered: &str) -> Self {
        match (rendered.contains(" & "), rendered.contains(" | ")) {
            (true, true) => Shape::Mix,
            (false, true) => Shape::Disj,
            _ => Shape::Conj,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Shape::Conj => "conj",
            Shape::Disj => "disj",
            Shape::Mix => "mix",
        };
        write!(f, "{s}")
    }
}

/// The rule kept by simplification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Formula {
    /// `pc ∧ ¬pd`
    Positive { pc: Option<Core>, pd: Option<Core> },
    /// `nd ∨ ¬nc`
    Negative { nc: Option<Core>, nd: Option<Core> },
    /// Both rules, when neither implies the other
    Inconsistent {
        pc: Option<Core>,
        pd: Option<Core>,
        nc: Option<Core>,
        nd: Option<Core>,
    },
}

/// A simplified, rendered interaction invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interaction {
    pub formula: Formula,
    pub rendered: String,
    pub shape: Shape,
}

impl Interaction {
    /// Were the two rules mutually non-implying?
    pub fn is_consistent(&self) -> bool {
        !matches!(self.formula, Formula::Inconsistent { .. })
    }

    /// The formula as a BDD.
    pub fn expr(&self, ctx: &mut Context) -> Bdd {
        match &self.formula {
            Formula::Positive { pc, pd } => rule(ctx, pc.as_ref(), pd.as_ref(), Connective::And).0,
            Formula::Negative { nc, nd } => rule(ctx, nd.as_ref(), nc.as_ref(), Connective::Or).0,
            Formula::Inconsistent { pc, pd, nc, nd } => {
                let p = rule(ctx, pc.as_ref(), pd.as_ref(), Connective::And).0;
                let n = rule(ctx, nd.as_ref(), nc.as_ref(), Connective::Or).0;
                p.and(&n)
            }
        }
    }
}

impl MCore for Interaction {
    fn cores(&self) -> Vec<&Core> {
        let cores: Vec<&Option<Core>> = match &self.formula {
            Formula::Positive { pc, pd } => vec![pc, pd],
            Formula::Negative { nc, nd } => vec![nc, nd],
            Formula::Inconsistent { pc, pd, nc, nd } => vec![pc, pd, nc, nd],
        };
        cores.into_iter().filter_map(populated).collect()
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.rendered, self.shape)
    }
}

/// A core selected for counterexample search: probes change one literal
/// of `main` at a time while still satisfying `sat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SCore {
    main: Core,
    sat: Option<Core>,
    keep: bool,
}

impl SCore {
    /// `main` must be non-empty and share no variable with `sat`.
    pub fn new(dom: &Domain, main: Core, sat: Option<Core>) -> Result<Self, InvariantViolation> {
        if main.is_empty() {
            return Err(InvariantViolation::EmptyMainCore);
        }
        let sat = sat.filter(|s| !s.is_empty());
        if let Some(s) = &sat {
            if let Some(var) = s.vars().find(|&v| main.contains_var(v)) {
                return Err(shared_variable(dom, var, &main, s));
            }
        }
        Ok(SCore {
            main,
            sat,
            keep: false,
        })
    }

    /// Also probe the main core itself.
    pub fn with_keep(mut self) -> Self {
        self.keep = true;
        self
    }

    pub fn main(&self) -> &Core {
        &self.main
    }

    pub fn sat(&self) -> Option<&Core> {
        self.sat.as_ref()
    }

    pub fn keep(&self) -> bool {
        self.keep
    }

    /// Render as `mc(keep): x=1; sc: y=0`.
    pub fn display(&self, dom: &Domain) -> String {
        let mut s = format!(
            "mc{}: {}",
            if self.keep { "(keep)" } else { "" },
            self.main.display(dom)
        );
        if let Some(sat) = &self.sat {
            s.push_str(&format!("; sc: {}", sat.display(dom)));
        }
        s
    }
}

pub(crate) fn shared_variable(dom: &Domain, var: Var, main: &Core, sat: &Core) -> InvariantViolation {
    InvariantViolation::SharedVariable {
        var: dom.var(var).name.clone(),
        main: main.display(dom).to_string(),
        sat: sat.display(dom).to_string(),
    }
}

impl MCore for SCore {
    fn cores(&self) -> Vec<&Core> {
        std::iter::once(&self.main).chain(self.sat.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::LearnError;

    fn ctx(vars: &[(&str, &[&str])]) -> Context {
        Context::new(&Domain::from_strs(vars).unwrap(), 0).unwrap()
    }

    fn core(ctx: &Context, settings: &[(&str, &[&str])]) -> Core {
        Core::from_strs(&ctx.dom, settings).unwrap()
    }

    #[test]
    fn test_rendering() -> Result<(), LearnError> {
        let mut ctx = ctx(&[
            ("x", &["0", "1", "2"]),
            ("y", &["0", "1"]),
            ("z", &["0", "1"]),
            ("w", &["0", "1"]),
        ]);
        let pc = core(&ctx, &[("x", &["0", "1"]), ("y", &["1"])]);
        let nc = core(&ctx, &[("z", &["1"])]);
        let pn = PNCore::new(&ctx.dom, Some(pc.clone()), None, Some(nc.clone()), None)?;
        assert_eq!(pn.display(&ctx.dom).to_string(), "pc: x=0,1 y=1; nc: z=1");

        let (_, s) = rule(&mut ctx, Some(&pc), None, Connective::And);
        assert_eq!(s, "x=0,1 & y=1");
        let (_, s) = rule(&mut ctx, None, Some(&nc), Connective::Or);
        assert_eq!(s, "z=0");
        let (_, s) = rule(&mut ctx, Some(&nc), Some(&pc), Connective::Or);
        assert_eq!(s, "(x=2 | y=0) | z=1");
        let (e, s) = rule(&mut ctx, None, None, Connective::Or);
        assert_eq!(s, "true");
        assert!(ctx.sym.is_tautology(&e));
        Ok(())
    }

    #[test]
    fn test_exception_needs_negative_core() {
        let ctx = ctx(&[("a", &["0", "1"]), ("b", &["0", "1"])]);
        let pd = core(&ctx, &[("b", &["0"])]);
        let e = PNCore::new(&ctx.dom, None, Some(pd), None, None).unwrap_err();
        assert_eq!(
            e.to_string(),
            "exception core pd = b=0 is defined without a negative core"
        );
        assert_eq!(
            e.at("L").to_string(),
            "invariant violated at L: exception core pd = b=0 is defined without a negative core"
        );
    }

    #[test]
    fn test_strength() -> Result<(), LearnError> {
        let ctx = ctx(&[("a", &["0", "1", "2"]), ("b", &["0", "1"])]);
        let pc = core(&ctx, &[("a", &["1", "2"]), ("b", &["1"])]);
        let nd = core(&ctx, &[("a", &["1", "2"])]);
        let pn = PNCore::new(&ctx.dom, Some(pc), None, Some(Core::new()), Some(nd))?;
        assert_eq!(pn.settings(), 2);
        assert_eq!(pn.strength(), 3);
        assert_eq!(pn.value_strength(), 3);
        Ok(())
    }

    #[test]
    fn test_simplify_keeps_implying_rule() -> Result<(), LearnError> {
        let mut ctx = ctx(&[("a", &["0", "1"]), ("b", &["0", "1"])]);
        // pc: a=1, pd: b=0 is a=1 & b=1; nc: true, nd: true is dropped
        let pn = PNCore::new(
            &ctx.dom,
            Some(core(&ctx, &[("a", &["1"])])),
            Some(core(&ctx, &[("b", &["0"])])),
            Some(Core::new()),
            Some(Core::new()),
        )?;
        let i = pn.simplify(&mut ctx);
        assert_eq!(i.to_string(), "a=1 & b=1 (conj)");
        assert!(matches!(i.formula, Formula::Positive { .. }));

        // positive rule a=1, negative rule a=1 | b=1: keep the positive one
        let pn = PNCore::new(
            &ctx.dom,
            Some(core(&ctx, &[("a", &["1"])])),
            None,
            Some(core(&ctx, &[("a", &["0"])])),
            Some(core(&ctx, &[("b", &["1"])])),
        )?;
        let i = pn.simplify(&mut ctx);
        assert_eq!(i.rendered, "a=1");
        assert!(i.is_consistent());

        // positive rule true, negative rule b=1: keep the negative one
        let pn = PNCore::new(
            &ctx.dom,
            Some(Core::new()),
            None,
            Some(core(&ctx, &[("b", &["0"])])),
            None,
        )?;
        let i = pn.simplify(&mut ctx);
        assert_eq!(i.rendered, "b=1");
        assert!(matches!(i.formula, Formula::Negative { .. }));
        Ok(())
    }

    #[test]
    fn test_simplify_inconsistent() -> Result<(), LearnError> {
        let mut ctx = ctx(&[("a", &["0", "1"]), ("b", &["0", "1"])]);
        let pn = PNCore::new(
            &ctx.dom,
            Some(core(&ctx, &[("a", &["1"])])),
            None,
            Some(core(&ctx, &[("b", &["1"])])),
            None,
        )?;
        let i = pn.simplify(&mut ctx);
        assert!(!i.is_consistent());
        assert_eq!(i.rendered, "a=1,b=0***");
        let e = i.expr(&mut ctx);
        let a1b0 = Config::parse(&ctx.dom, "a=1 b=0")?;
        let ce = ctx.sym.config_expr(&a1b0);
        assert!(ctx.sym.equivalent(&e, &ce));
        Ok(())
    }

    #[test]
    fn test_verify_discards_contradicted_parts() -> Result<(), LearnError> {
        let mut ctx = ctx(&[("a", &["0", "1"]), ("b", &["0", "1"]), ("c", &["0", "1"])]);
        let pn = PNCore::new(
            &ctx.dom,
            Some(core(&ctx, &[("a", &["1"])])),
            Some(core(&ctx, &[("b", &["0"])])),
            Some(core(&ctx, &[("c", &["0"])])),
            None,
        )?;
        let configs = vec![
            Config::parse(&ctx.dom, "a=1 b=1 c=1")?,
            Config::parse(&ctx.dom, "a=1 b=0 c=1")?,
        ];
        let v = pn.verify(&configs, &mut ctx)?;
        // a covering config has b=0, so pd goes; both have c=1, so nc stays
        assert_eq!(v.pd(), None);
        assert_eq!(v.nc(), pn.nc());

        let configs = vec![Config::parse(&ctx.dom, "a=1 b=1 c=0")?];
        let v = pn.verify(&configs, &mut ctx)?;
        assert_eq!(v.pd(), pn.pd());
        assert_eq!(v.nc(), Some(&Core::new()));

        let outside = vec![Config::parse(&ctx.dom, "a=0 b=1 c=0")?];
        assert!(matches!(
            pn.verify(&outside, &mut ctx),
            Err(InvariantViolation::PositiveOutsideCore { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_score() {
        let ctx = ctx(&[("a", &["0", "1"]), ("b", &["0", "1"])]);
        let a1 = core(&ctx, &[("a", &["1"])]);
        let s = SCore::new(&ctx.dom, a1.clone(), Some(core(&ctx, &[("b", &["0"])])))
            .unwrap()
            .with_keep();
        assert_eq!(s.display(&ctx.dom), "mc(keep): a=1; sc: b=0");
        assert_eq!(s.settings(), 2);
        assert!(matches!(
            SCore::new(&ctx.dom, Core::new(), None),
            Err(InvariantViolation::EmptyMainCore)
        ));
        let main = core(&ctx, &[("a", &["1"]), ("b", &["0", "1"])]);
        assert_eq!(
            SCore::new(&ctx.dom, main, Some(a1)),
            Err(InvariantViolation::SharedVariable {
                var: "a".to_string(),
                main: "a=1 b=0,1".to_string(),
                sat: "a=1".to_string(),
            })
        );
    }

    #[test]
    fn test_shape() {
        assert_eq!(Shape::of("a=1 & b=1"), Shape::Conj);
        assert_eq!(Shape::of("a=1 | b=1"), Shape::Disj);
        assert_eq!(Shape::of("(a=1 & b=1) | c=0"), Shape::Mix);
        assert_eq!(Shape::of("true"), Shape::Conj);
    }
}
