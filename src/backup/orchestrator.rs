use crate::backup::archive::build_site_archive;
use crate::backup::command::CommandRunner;
use crate::backup::dump::dump_database;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::RetentionPolicy;
use crate::backup::run_context::{RunContext, RunTimestamp};
use crate::backup::site_config::{SiteSection, SitesConfig};
use chrono::Utc;
use function_name::named;
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use validator::Validate;

/// What to do with the remaining sites once one fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Back up the remaining sites, fail the run at the end
    #[default]
    Continue,
    /// Stop at the first failing site
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(format!("unknown failure policy {other:?}")),
        }
    }
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Continue => write!(f, "continue"),
            FailurePolicy::Abort => write!(f, "abort"),
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize)]
pub struct SiteReport {
    pub name: String,
    pub archive: Option<PathBuf>,
    pub database_dumped: bool,
    pub removed: Vec<PathBuf>,
    pub error: Option<String>,
}

impl SiteReport {
    fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub sites: Vec<SiteReport>,
}

/// One backup run over the configured sites, strictly one site at a time.
pub struct SiteBackup<'a, R: CommandRunner + ?Sized> {
    config: &'a SitesConfig,
    runner: &'a R,
    timestamp: RunTimestamp,
}

impl<'a, R: CommandRunner + ?Sized> SiteBackup<'a, R> {
    pub fn new(config: &'a SitesConfig, runner: &'a R, timestamp: RunTimestamp) -> Self {
        Self {
            config,
            runner,
            timestamp,
        }
    }

    /// Backs up every site of the config in file order.
    pub fn run(&self) -> (RunReport, Result<()>) {
        let sites = self.config.sites.iter().collect::<Vec<_>>();
        self.run_sites(&sites)
    }

    /// Backs up `sites` in order. The report covers every site that was
    /// attempted, also when the result is an error.
    #[named]
    pub fn run_sites(&self, sites: &[&SiteSection]) -> (RunReport, Result<()>) {
        let ctx = RunContext::new(self.timestamp, &self.config.main);
        let policy = self.config.main.on_site_error();
        let mut report = RunReport {
            timestamp: self.timestamp.to_string(),
            sites: Vec::with_capacity(sites.len()),
        };
        let mut errors = Vec::new();

        tracing::info!(
            "Starting backup run {} for {} site(s)",
            self.timestamp,
            sites.len()
        );
        for site in sites {
            let mut site_report = SiteReport::new(site.name());
            match self.backup_site(site, &ctx, &mut site_report) {
                Ok(_) => {
                    tracing::info!("[{}] Backup finished", site.name());
                    report.sites.push(site_report);
                }
                Err(e) => {
                    let e = e.add_msg(format!("Backup of site {:?} failed", site.name()));
                    tracing::error!("{e}");
                    site_report.error = Some(e.to_string());
                    report.sites.push(site_report);
                    errors.push(e);
                    if policy == FailurePolicy::Abort {
                        tracing::warn!("Aborting run, {} policy is set", policy);
                        break;
                    }
                }
            }
        }

        let res = convert_error_vec(errors).add_fn_name(function_path!());
        (report, res)
    }

    fn backup_site(
        &self,
        site: &SiteSection,
        ctx: &RunContext,
        report: &mut SiteReport,
    ) -> Result<()> {
        site.validate()?;
        let backup_dir = site.backup_dir()?;
        ensure_backup_dir(&backup_dir)?;

        let dump = dump_database(site, ctx, self.runner)?;
        report.database_dumped = dump.is_some();

        let archive = build_site_archive(site, dump, ctx)?;
        tracing::info!("[{}] Created backup file {:?}", site.name(), archive);
        report.archive = Some(archive);

        let policy = RetentionPolicy::new(ctx.settings.keep_days());
        report.removed = policy.sweep(&backup_dir, Utc::now())?;
        Ok(())
    }
}

fn ensure_backup_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(Error::from)
        .add_msg(format!("Creating backup directory {:?} failed", dir))?;
    if !dir.is_dir() {
        return Err(Error::from(std::io::Error::other(format!(
            "{:?} is not a directory",
            dir
        ))));
    }
    Ok(())
}
