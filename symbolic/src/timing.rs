// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Time spent in symbolic queries, reported at the end of a run.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use itertools::Itertools;
use lazy_static::lazy_static;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TimeType {
    Tautology { valid: bool },
    Models { found: bool },
}

impl TimeType {
    fn name(&self) -> &'static str {
        match self {
            TimeType::Tautology { valid: true } => "tautology (valid)",
            TimeType::Tautology { valid: false } => "tautology (refuted)",
            TimeType::Models { found: true } => "models (sat)",
            TimeType::Models { found: false } => "models (unsat)",
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct TimeInfo {
    typ: TimeType,
    dur: Duration,
}

/// A record of timing measurements, safe to share between threads.
pub struct Timings(Mutex<Vec<TimeInfo>>, Instant);

impl Timings {
    #[allow(clippy::new_without_default)]
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Timings(Mutex::new(vec![]), Instant::now())
    }

    /// Record a timing elapsed since `start`.
    pub fn elapsed(&self, typ: TimeType, start: Instant) {
        let dur = start.elapsed();
        if let Ok(mut times) = self.0.lock() {
            times.push(TimeInfo { typ, dur });
        }
    }

    /// Print a full timing report to stdout.
    pub fn report(&self) {
        let total_time = self.1.elapsed().as_secs_f64();
        println!("{:<22}: {total_time:.1}s", "total");

        let times = match self.0.lock() {
            Ok(times) => times.clone(),
            Err(_) => return,
        };
        let query_total = times
            .iter()
            .map(|info| info.dur)
            .sum::<Duration>()
            .as_secs_f64();
        println!("  {:<20}: {:.1}s", "non-query", total_time - query_total);
        println!(
            "  {:<20}: {query_total:.1}s {:>6} calls",
            "query total",
            times.len()
        );

        let totals = times
            .iter()
            .into_grouping_map_by(|info| info.typ)
            .fold((Duration::ZERO, 0), |(dur, count), _key, t| {
                (dur + t.dur, count + 1)
            });
        for typ in [
            TimeType::Tautology { valid: true },
            TimeType::Tautology { valid: false },
            TimeType::Models { found: true },
            TimeType::Models { found: false },
        ] {
            let (time, count) = totals.get(&typ).unwrap_or(&(Duration::ZERO, 0));
            if *count > 0 {
                println!(
                    "    {:<18}: {:.1}s {count:>6} calls",
                    typ.name(),
                    time.as_secs_f64()
                );
            }
        }
    }
}

lazy_static! {
    /// Process-wide timings
    pub static ref TIMES: Timings = Timings::new();
}

/// Start the process-wide clock.
pub fn init() {
    lazy_static::initialize(&TIMES);
}

/// Start a measurement.
pub fn start() -> Instant {
    Instant::now()
}

/// Finish a measurement started with [`start`].
pub fn elapsed(typ: TimeType, start: Instant) {
    TIMES.elapsed(typ, start)
}

/// Print the process-wide report.
pub fn report() {
    TIMES.report()
}
