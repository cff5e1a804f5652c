use crate::backup::command::{CommandRunner, ExternalCommand, StdoutTarget};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::run_context::RunContext;
use crate::backup::site_config::{DatabaseCredentials, SiteSection};
use function_name::named;
use std::fs::File;
use std::path::{Path, PathBuf};

pub static DUMP_FILE_EXT: &str = "sql";

/// Transient `<site>_<timestamp>UTC.sql` file.
///
/// The file is deleted when the artifact is dropped, so it can only outlive
/// the run by being archived through [`DumpArtifact::consume`].
#[derive(Debug)]
pub struct DumpArtifact {
    path: PathBuf,
    file_name: String,
}

impl DumpArtifact {
    pub(crate) fn new(path: PathBuf, file_name: String) -> Self {
        Self { path, file_name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the dump is stored under inside the archive.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Removes the dump file once it has been archived.
    pub fn consume(self) -> Result<()> {
        std::fs::remove_file(&self.path)
            .map_err(Error::from)
            .add_msg(format!("Removing dump file {:?} failed", self.path))
    }
}

impl Drop for DumpArtifact {
    fn drop(&mut self) {
        if self.path.exists() {
            tracing::warn!("Removing unarchived dump file {:?}", self.path);
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove dump file {:?}: {}", self.path, e);
            }
        }
    }
}

/// `<dump_command> -h <host> -u <user> --password=<pass> <name>`
pub fn dump_command(program: &str, credentials: &DatabaseCredentials) -> ExternalCommand {
    ExternalCommand::new(program)
        .arg("-h")
        .arg(credentials.host())
        .arg("-u")
        .arg(credentials.user())
        .secret_arg("--password=", credentials.password().clone())
        .arg(credentials.name())
}

/// Dumps the site's database into its backup directory.
///
/// Returns `Ok(None)` when the site has no `dbhost`. Every required option is
/// checked before the dump tool is started.
#[named]
pub fn dump_database<R: CommandRunner + ?Sized>(
    site: &SiteSection,
    ctx: &RunContext,
    runner: &R,
) -> Result<Option<DumpArtifact>> {
    let backup_dir = site.backup_dir()?;
    let Some(credentials) = site.database()? else {
        tracing::info!("[{}] No database configured, skipping dump", site.name());
        return Ok(None);
    };

    let file_name = ctx.timestamp.artifact_file_name(site.name(), DUMP_FILE_EXT);
    let path = backup_dir.join(&file_name);
    let file = File::create(&path)
        .map_err(Error::from)
        .add_msg(format!("Creating dump file {:?} failed", path))
        .add_fn_name(function_path!())?;
    let artifact = DumpArtifact::new(path, file_name);

    tracing::info!(
        "[{}] Dumping database {:?} from {:?} into {:?}",
        site.name(),
        credentials.name(),
        credentials.host(),
        artifact.path()
    );
    let command = dump_command(ctx.settings.dump_command(), &credentials);
    runner
        .run(&command, StdoutTarget::Capture(file))
        .add_msg(format!("Dumping database {:?} failed", credentials.name()))
        .add_fn_name(function_path!())?;

    Ok(Some(artifact))
}
