//! `routectl-applyd <applier-name>`: the minimal binary that is the
//! concrete form of the §6.5 `apply(name)` service-manager entry point.
//! Not a CLI in the out-of-scope sense — a single positional argument, no
//! subcommands, no flags.

use std::path::Path;
use std::process::ExitCode;

use routectl::{EprintlnReporter, Reporter, RouterConf, RouterConfSettings};

#[tokio::main]
async fn main() -> ExitCode {
    let mut reporter = EprintlnReporter;

    let Some(name) = std::env::args().nth(1) else {
        reporter.error("usage: routectl-applyd <applier-name>");
        return ExitCode::FAILURE;
    };

    let settings = match RouterConfSettings::load_from_dir(Path::new(".")) {
        Ok(Some(settings)) => settings,
        Ok(None) => RouterConfSettings::default(),
        Err(e) => {
            reporter.error(&format!("failed to load routectl.toml: {e:#}"));
            return ExitCode::FAILURE;
        }
    };

    let conf = match RouterConf::open(settings) {
        Ok(conf) => conf,
        Err(e) => {
            reporter.error(&format!("failed to initialize: {e:#}"));
            return ExitCode::FAILURE;
        }
    };

    match conf.apply(&mut reporter, &name) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
