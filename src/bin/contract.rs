use std::path::PathBuf;
use std::process::ExitCode;

use a2a_contract::config::RunConfig;
use a2a_contract::contractor::Contractor;
use a2a_contract::mpi::Collective;
use a2a_contract::{Error, Result};
use clap::Parser;
use flexi_logger::{json_format, Duplicate, FileSpec, Logger, LoggerHandle};
use log::{error, info, LevelFilter};

#[derive(Debug, Parser)]
#[command(version, about = "Contracts A2A meson fields into correlators", long_about = None)]
struct Cli {
    /// Gauge configuration to process, as `<series>.<cfg>`.
    series_cfg: String,
    /// The YAML parameter file.
    #[arg(short, long, default_value = "params.yaml")]
    params: PathBuf,
}

/// Sets up logging for rank `rank`. Each rank logs to a separate file and to stdout.
fn setup_logging_mpi(rank: usize, level: LevelFilter) -> Result<LoggerHandle> {
    Logger::with(level)
        .format(json_format)
        .log_to_file(
            FileSpec::default()
                .discriminant(format!("rank{rank}"))
                .suppress_timestamp()
                .suffix("log.json"),
        )
        .duplicate_to_stdout(Duplicate::Info)
        .start()
        .map_err(|e| Error::Config(format!("failed to start logger: {e}")))
}

fn split_series_cfg(series_cfg: &str) -> Result<(&str, &str)> {
    series_cfg
        .split_once('.')
        .filter(|(series, cfg)| !series.is_empty() && !cfg.is_empty())
        .ok_or_else(|| Error::Value(format!("expected <series>.<cfg>, got `{series_cfg}`")))
}

fn run(cli: &Cli) -> Result<()> {
    let (series, cfg) = split_series_cfg(&cli.series_cfg)?;
    let config = RunConfig::load(&cli.params, series, cfg)?;

    let universe = mpi::initialize()
        .ok_or_else(|| Error::Value("MPI has already been initialized".into()))?;
    let world = universe.world();
    let _logger = setup_logging_mpi(world.rank(), config.log_level()?)?;

    info!(series, cfg, ranks = world.size(); "Starting contraction run");
    Contractor::new(&config, &world).run().inspect_err(|e| {
        error!(rank = world.rank(); "Contraction failed: {e}");
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
