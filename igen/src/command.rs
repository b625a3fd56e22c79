// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The igen binary's command-line interface.

use std::path::Path;
use std::{fs, process};

use clap::Args;
use codespan_reporting::{
    files::SimpleFile,
    term::{
        self as terminal,
        termcolor::{ColorChoice, StandardStream},
    },
};
use domain::{
    parser::{domain_error_diagnostic, parse_default, parse_domain},
    syntax::{Config, Domain},
};
use inference::{
    basics::{InitialStrategy, LearnConfig},
    learn::learn,
};
use rand::{rngs::StdRng, SeedableRng};
use symbolic::{bdd::SymbolicDomain, sample::sample_fresh, timing};

use crate::oracle::ReplayOracle;

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum ColorOutput {
    Never,
    Auto,
    Always,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum GenStrategy {
    /// Every configuration
    Full,
    /// Every value of every variable at least once
    Tcover,
    /// Distinct random configurations
    Rand,
    /// Distinct configurations drawn through the solver
    Smt,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum Initial {
    /// Only the default configurations
    Given,
    /// Every value of every variable at least once
    Tcover,
    /// `-n` random configurations
    Rand,
    /// Every configuration
    Full,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct GenArgs {
    /// Domain file
    file: String,

    #[arg(value_enum, long, default_value_t = GenStrategy::Tcover)]
    /// How to generate
    strategy: GenStrategy,

    #[arg(short, default_value_t = 10)]
    /// Number of configurations for `rand` and `smt`
    n: usize,

    #[arg(long, default_value_t = 0)]
    /// Random seed
    seed: u64,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct LearnArgs {
    /// Domain file
    file: String,

    #[arg(long)]
    /// Recorded runs, one `x=1 y=0: L1,L2` line each
    coverage: String,

    #[arg(value_enum, long, default_value_t = Initial::Tcover)]
    /// Initial configurations, in addition to the defaults
    initial: Initial,

    #[arg(short, default_value_t = 10)]
    /// Number of initial configurations for `--initial rand`
    n: usize,

    #[arg(long, default_value_t = 0)]
    /// Random seed
    seed: u64,

    #[arg(long, default_value_t = 3)]
    /// Stop after more than this many iterations without progress
    max_stuck: usize,

    #[arg(long)]
    /// Stop after this many iterations
    max_iters: Option<usize>,

    #[arg(long)]
    /// Give up on solver queries past this many BDD nodes
    node_limit: Option<usize>,

    #[arg(long)]
    /// Print results as JSON
    json: bool,

    #[arg(long)]
    /// Print timing statistics
    time: bool,
}

impl LearnArgs {
    fn to_cfg(&self) -> LearnConfig {
        LearnConfig {
            seed: self.seed,
            initial: match self.initial {
                Initial::Given => InitialStrategy::Given,
                Initial::Tcover => InitialStrategy::Tcover1,
                Initial::Rand => InitialStrategy::Random(self.n),
                Initial::Full => InitialStrategy::Full,
            },
            max_stuck: self.max_stuck,
            max_iters: self.max_iters,
            node_limit: self.node_limit,
        }
    }
}

#[derive(clap::Subcommand, Clone, Debug, PartialEq, Eq)]
enum Command {
    /// Parse a domain file and print a summary
    Domain {
        /// Domain file
        file: String,
    },
    /// Generate configurations
    Gen(GenArgs),
    /// Learn interaction invariants from recorded runs
    Learn(LearnArgs),
}

impl Command {
    fn file(&self) -> &str {
        match self {
            Command::Domain { file } => file,
            Command::Gen(GenArgs { file, .. }) => file,
            Command::Learn(LearnArgs { file, .. }) => file,
        }
    }
}

#[derive(clap::Parser, Debug)]
#[command(about, long_about=None)]
/// Entrypoint for the igen binary, including all commands.
pub struct App {
    #[arg(value_enum, long, default_value_t = ColorOutput::Auto)]
    /// Control color output. Auto disables colors with TERM=dumb or
    /// NO_COLOR=true.
    color: ColorOutput,

    #[command(subcommand)]
    /// Command to run
    command: Command,
}

fn read(file: &str) -> String {
    match fs::read_to_string(file) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("could not read {file}: {err}");
            process::exit(1);
        }
    }
}

/// Default configurations from the files next to `file` named after it,
/// e.g. `foo.default` and `foo.default2` for `foo.dom`.
fn default_configs(file: &str, dom: &Domain) -> Vec<Config> {
    let path = Path::new(file);
    let (Some(dir), Some(stem)) = (path.parent(), path.file_stem().and_then(|s| s.to_str())) else {
        return vec![];
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    let prefix = format!("{stem}.default");
    let mut files = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with(&prefix))
            })
            .collect::<Vec<_>>(),
        Err(_) => return vec![],
    };
    files.sort();
    files
        .iter()
        .filter_map(|p| {
            let name = p.display().to_string();
            match parse_default(dom, &read(&name)) {
                Ok(c) => {
                    log::info!("default configuration from {name}: {}", c.display(dom));
                    Some(c)
                }
                Err(err) => {
                    log::warn!("ignoring {name}: {err}");
                    None
                }
            }
        })
        .collect()
}

impl App {
    /// Run the application.
    pub fn exec(self) {
        let file = read(self.command.file());
        let files = SimpleFile::new(self.command.file(), &file);

        let writer = StandardStream::stderr(match &self.color {
            ColorOutput::Never => ColorChoice::Never,
            ColorOutput::Always => ColorChoice::Always,
            ColorOutput::Auto => ColorChoice::Auto,
        });
        let config = codespan_reporting::term::Config {
            start_context_lines: 3,
            end_context_lines: 3,
            ..Default::default()
        };

        let dom = match parse_domain(&file) {
            Ok(dom) => dom,
            Err(err) => {
                let diagnostic = domain_error_diagnostic((), &err);
                if terminal::emit(&mut writer.lock(), &config, &files, &diagnostic).is_err() {
                    eprintln!("{err}");
                }
                process::exit(1);
            }
        };

        match self.command {
            Command::Domain { .. } => {
                println!("{dom}");
            }
            Command::Gen(ref args) => {
                let mut rng = StdRng::seed_from_u64(args.seed);
                let configs = match args.strategy {
                    GenStrategy::Full => Ok(dom.gen_full()),
                    GenStrategy::Tcover => Ok(dom.gen_tcover1(&mut rng)),
                    GenStrategy::Rand => dom.gen_rand(args.n, &mut rng).map_err(|e| e.to_string()),
                    GenStrategy::Smt => SymbolicDomain::new(&dom)
                        .and_then(|mut sym| sample_fresh(&mut sym, args.n, std::iter::empty(), &mut rng))
                        .map_err(|e| e.to_string()),
                };
                match configs {
                    Ok(configs) => {
                        for c in configs {
                            println!("{}", c.display(&dom));
                        }
                    }
                    Err(err) => {
                        eprintln!("{err}");
                        process::exit(1);
                    }
                }
            }
            Command::Learn(ref args) => {
                let mut oracle = match ReplayOracle::parse(&dom, &read(&args.coverage)) {
                    Ok(oracle) => oracle,
                    Err(err) => {
                        eprintln!("{}: {err}", args.coverage);
                        process::exit(1);
                    }
                };
                log::info!("{} recorded runs", oracle.len());
                let seeds = default_configs(&args.file, &dom);
                let result = match learn(&dom, &mut oracle, &args.to_cfg(), &seeds) {
                    Ok(result) => result,
                    Err(err) => {
                        eprintln!("learning failed: {err}");
                        process::exit(1);
                    }
                };
                if oracle.misses() > 0 {
                    log::warn!("{} configurations had no recorded run", oracle.misses());
                }
                if args.json {
                    match serde_json::to_string_pretty(&result) {
                        Ok(s) => println!("{s}"),
                        Err(err) => {
                            eprintln!("could not serialize results: {err}");
                            process::exit(1);
                        }
                    }
                } else {
                    println!(
                        "{} configurations, {} locations, {} interactions",
                        result.store.num_configs(),
                        result.store.num_locations(),
                        result.merged.len()
                    );
                    print!("{}", result.merged);
                    println!("strengths: {}", result.merged.strens_str());
                    let (conj, disj, mix) = result.merged.shapes();
                    println!("shapes: {conj} conj, {disj} disj, {mix} mix");
                }
                if args.time {
                    timing::report();
                }
            }
        }
    }
}
