//! # site-backup
//!
//! Unattended backups for websites made of a document root and an optional
//! MySQL database.
//!
//! ## Features
//!
//! - **INI Configuration**: one `[main]` section plus one section per site
//! - **Database Dumps**: `mysqldump` output stored next to the site files
//! - **Compression**: gzip (default) or XZ archives
//! - **Exclusions**: GNU tar style glob patterns per site
//! - **Retention Management**: age based pruning of each backup directory
//!
//! ## Quick Start
//!
//! ```no_run
//! use site_backup::backup::command::SystemCommandRunner;
//! use site_backup::backup::orchestrator::SiteBackup;
//! use site_backup::backup::run_context::RunTimestamp;
//! use site_backup::backup::site_config::SitesConfig;
//!
//! let config = SitesConfig::load("site_backup.cfg")?;
//! let (report, result) = SiteBackup::new(&config, &SystemCommandRunner, RunTimestamp::now()).run();
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! result?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
