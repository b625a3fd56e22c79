// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Sampling fresh configurations, falling back to the solver once random
//! draws keep landing on configurations already seen.

use crate::bdd::{QueryError, SymbolicDomain};
use domain::{
    hashmap::HashSet,
    syntax::{Config, DomainError},
};
use rand::Rng;

/// Random draws to try before asking the solver for a fresh model.
const RANDOM_TRIES: usize = 8;

/// Up to `n` distinct configurations, none of them in `existing`. Fewer are
/// returned when the domain runs out of unseen configurations.
pub fn sample_fresh<'a, R: Rng>(
    sym: &mut SymbolicDomain,
    n: usize,
    existing: impl IntoIterator<Item = &'a Config>,
    rng: &mut R,
) -> Result<Vec<Config>, QueryError> {
    let size = sym.domain().size();
    if n as u128 > size {
        return Err(DomainError::Exhausted {
            requested: n,
            available: size,
        }
        .into());
    }

    let mut seen: HashSet<Config> = existing.into_iter().cloned().collect();
    let mut blocked = None;
    let mut sampled = vec![];
    while sampled.len() < n {
        let drawn = (0..RANDOM_TRIES)
            .map(|_| sym.domain().gen_one(rng))
            .find(|c| !seen.contains(c));
        let config = match drawn {
            Some(c) => c,
            None => {
                let excluded = match blocked.take() {
                    Some(e) => e,
                    None => sym.exclude(&seen),
                };
                let found = sym.models(&excluded, 1)?;
                blocked = Some(excluded);
                match found.into_iter().next() {
                    Some(c) => c,
                    None => {
                        log::debug!("sampled {} of {n}: no unseen configurations left", sampled.len());
                        break;
                    }
                }
            }
        };
        if let Some(e) = blocked.as_mut() {
            *e = e.and(&sym.config_expr(&config).not());
        }
        seen.insert(config.clone());
        sampled.push(config);
    }
    Ok(sampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::syntax::Domain;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::BTreeSet;

    fn dom() -> Domain {
        Domain::from_strs(&[("a", &["0", "1"]), ("b", &["0", "1"]), ("c", &["0", "1", "2"])])
            .unwrap()
    }

    #[test]
    fn test_sample_fresh() -> Result<(), QueryError> {
        let dom = dom();
        let mut sym = SymbolicDomain::new(&dom)?;
        let mut rng = StdRng::seed_from_u64(3);
        let existing = dom.gen_full()[..4].to_vec();
        let sampled = sample_fresh(&mut sym, 8, &existing, &mut rng)?;
        assert_eq!(sampled.len(), 8);
        let distinct: BTreeSet<_> = sampled.iter().collect();
        assert_eq!(distinct.len(), 8);
        assert!(sampled.iter().all(|c| !existing.contains(c)));
        Ok(())
    }

    #[test]
    fn test_sample_runs_out() -> Result<(), QueryError> {
        let dom = dom();
        let mut sym = SymbolicDomain::new(&dom)?;
        let mut rng = StdRng::seed_from_u64(4);
        let all = dom.gen_full();
        let sampled = sample_fresh(&mut sym, 3, &all[..11], &mut rng)?;
        assert_eq!(sampled.len(), 1);
        assert_eq!(sampled[0].display(&dom).to_string(), "a=1 b=1 c=2");

        assert!(matches!(
            sample_fresh(&mut sym, 13, &all[..0], &mut rng),
            Err(QueryError::Domain(DomainError::Exhausted { .. }))
        ));
        Ok(())
    }
}
