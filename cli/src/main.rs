use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use qfcluster_core::{
    config::{Overrides, Settings},
    logger::init_logger,
};

mod handlers;

use handlers::{CommandHandler, utils::WriteAdapter};

/// Options configurable via the CLI.
#[derive(Debug, Parser)]
#[command(name = "qfcluster", version = env!("CARGO_PKG_VERSION"), about)]
struct Flags {
    /// config file path, the embedded defaults are used when omitted
    #[clap(long, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,
    /// log level
    #[clap(long)]
    log_level: Option<log::LevelFilter>,
    /// directory the artifacts are written to
    #[clap(long, short, value_hint = clap::ValueHint::DirPath)]
    output: Option<PathBuf>,
    /// seed of every random generator
    #[clap(long)]
    seed: Option<u64>,
    /// smallest k tried by the sweep
    #[clap(long)]
    k_min: Option<usize>,
    /// largest k tried by the sweep
    #[clap(long)]
    k_max: Option<usize>,
    /// also search DBSCAN and HDBSCAN parameters, over the default grid unless one is configured
    #[clap(long)]
    density_grid: bool,
    /// subcommand to run
    #[clap(subcommand)]
    subcommand: Option<handlers::Command>,
}

impl Flags {
    fn overrides(&self) -> Overrides {
        Overrides {
            log_level: self.log_level,
            k_min: self.k_min,
            k_max: self.k_max,
            seed: self.seed,
            output_directory: self.output.clone(),
            density_grid: self.density_grid,
        }
    }
}

#[test]
fn verify_cli() {
    Flags::command().debug_assert();
}

#[cfg(not(tarpaulin_include))]
fn main() -> anyhow::Result<()> {
    clap_complete::CompleteEnv::with_factory(Flags::command).complete();

    let flags = Flags::parse();

    let settings = Settings::init(flags.config.clone(), flags.overrides())?;
    init_logger(settings.log_level);

    let mut stdout_adapter = WriteAdapter(std::io::stdout());
    let mut stderr_adapter = WriteAdapter(std::io::stderr());

    if let Some(command) = flags.subcommand {
        command.handle(&settings, &mut stdout_adapter, &mut stderr_adapter)?;
    } else {
        eprintln!("No subcommand provided");
    }

    Ok(())
}
