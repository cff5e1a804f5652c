use clap::Parser;
use site_backup::backup::command::SystemCommandRunner;
use site_backup::backup::orchestrator::{RunReport, SiteBackup};
use site_backup::backup::result_error::error::Error;
use site_backup::backup::result_error::result::Result;
use site_backup::backup::result_error::AddMsg;
use site_backup::backup::run_context::RunTimestamp;
use site_backup::backup::site_config::SitesConfig;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing::{error, info};

/// Back up website files and databases, then delete old backups
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long, default_value = "site_backup.cfg")]
    config: PathBuf,

    /// Only back up these sites, may be repeated
    #[arg(short, long = "site", value_name = "NAME")]
    sites: Vec<String>,

    /// Write a JSON report of the run to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let file = File::create(path)
        .map_err(Error::from)
        .add_msg(format!("Creating report {:?} failed", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .map_err(|e| Error::from(std::io::Error::from(e)))
        .add_msg(format!("Writing report {:?} failed", path))
}

fn run(args: &Args) -> Result<()> {
    let timestamp = RunTimestamp::now();
    let config = SitesConfig::load(&args.config)?;
    let sites = config.select_sites(&args.sites)?;

    let backup = SiteBackup::new(&config, &SystemCommandRunner, timestamp);
    let (report, res) = backup.run_sites(&sites);

    if let Some(path) = &args.report {
        match write_report(path, &report) {
            Ok(_) => info!("Wrote run report to {:?}", path),
            Err(e) => {
                return match res {
                    Ok(_) => Err(e),
                    Err(run_e) => Err(run_e.chain(e)),
                }
            }
        }
    }
    res
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{e}");
        exit(1);
    }
}
