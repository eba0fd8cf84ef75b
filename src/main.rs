use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lddcollect::closure::{self, ResolveOptions};
use lddcollect::error::Error;
use lddcollect::loader;
use lddcollect::packages::Dpkg;
use lddcollect::report;
use lddcollect::walker::ElfWalker;

const EXIT_MISSING: u8 = 1;
const EXIT_ERROR: u8 = 2;

/// Find all other libraries and system packages an ELF executable or
/// library needs to run.
///
/// Prints files not managed by a package, one per line; then, with --dpkg,
/// a separator line followed by package names, one per line.
#[derive(Parser)]
#[command(name = "lddcollect", version)]
struct Cli {
    /// ELF files to analyze, or a single directory to scan for shared libraries
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Look up which dpkg packages own the libraries
    #[arg(long, overrides_with = "no_dpkg")]
    dpkg: bool,

    /// Do not look up packages (default)
    #[arg(long, overrides_with = "dpkg")]
    no_dpkg: bool,

    /// Output machine-readable JSON
    #[arg(long)]
    json: bool,

    /// Print diagnostic information to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Treat a package as not installed (repeatable); `name` also matches `name:arch`
    #[arg(long = "ignore-pkg", value_name = "PACKAGE", value_delimiter = ',')]
    ignore_pkg: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "lddcollect=debug" } else { "lddcollect=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode, Error> {
    let start = Instant::now();
    let inputs = loader::load_inputs(&cli.paths)?;

    let opts = ResolveOptions {
        lookup_packages: cli.dpkg,
        ignore_packages: cli.ignore_pkg.clone(),
        skip_prefix: inputs.skip_prefix().map(PathBuf::from),
    };
    let mut walker = ElfWalker::from_system();
    let dpkg = Dpkg::from_env();

    let result = closure::resolve(&inputs.roots, &mut walker, &dpkg, &opts)?;
    tracing::debug!(
        "{} roots, {} libraries resolved in {:.1}ms",
        inputs.roots.len(),
        walker.cached(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    for warning in &result.warnings {
        tracing::warn!("{warning}");
    }

    if cli.json {
        report::print_json(&result, opts.lookup_packages);
    } else {
        report::print_text(&result, opts.lookup_packages);
    }
    report::print_missing(&result);

    Ok(if result.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_MISSING)
    })
}
