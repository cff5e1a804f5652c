pub mod site_tree;

use crate::backup::archive::site_tree::{ExcludeSet, SiteTree};
use crate::backup::compress::compress_in_place;
use crate::backup::dump::DumpArtifact;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::run_context::RunContext;
use crate::backup::site_config::SiteSection;
use crate::backup::tar::write_site_tar;
use function_name::named;
use std::path::{Path, PathBuf};

pub static TAR_FILE_EXT: &str = "tar";

/// A single file, directory or symlink to be stored in the archive
#[derive(Debug)]
pub struct ArchiveEntry {
    /// Path on the filesystem
    pub src: PathBuf,

    /// Member name inside the archive, rooted at the site's directory name
    pub dst: PathBuf,

    /// Directories are stored as bare entries, their content follows
    /// as separate entries
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub fn new<A: Into<PathBuf>, B: Into<PathBuf>>(src: A, dst: B, is_dir: bool) -> ArchiveEntry {
        Self {
            src: src.into(),
            dst: dst.into(),
            is_dir,
        }
    }
}

/// Builds `<backup_dir>/<site>_<timestamp>UTC.tar.<ext>` for a site.
///
/// The site's document root is stored under its own directory name, the
/// dump (if any) is stored at the top level under its bare file name and
/// then deleted. The uncompressed `.tar` only exists while the archive is
/// being built.
#[named]
pub fn build_site_archive(
    site: &SiteSection,
    dump: Option<DumpArtifact>,
    ctx: &RunContext,
) -> Result<PathBuf> {
    let backup_dir = std::path::absolute(site.backup_dir()?)?;
    let tree = SiteTree::new(site.htdocs_dir()?, ExcludeSet::new(site.excludes())?)?;

    let tar_path = backup_dir.join(ctx.timestamp.artifact_file_name(site.name(), TAR_FILE_EXT));
    tracing::info!(
        "[{}] Archiving {:?} from {:?} into {:?}",
        site.name(),
        tree.leaf_name(),
        tree.parent(),
        tar_path
    );
    write_site_tar(&tar_path, &tree, dump.as_ref())
        .add_msg(format!("Creating archive for site {:?} failed", site.name()))
        .add_fn_name(function_path!())?;

    if let Some(dump) = dump {
        dump.consume()
            .map_err(|e| discard_tar(&tar_path, e))
            .add_fn_name(function_path!())?;
    }

    compress_in_place(&tar_path, ctx.settings.compressor())
        .add_msg(format!("Compressing archive for site {:?} failed", site.name()))
        .map_err(|e| discard_tar(&tar_path, e))
}

/// Removes an uncompressed tar left behind by a failed step.
fn discard_tar(tar_path: &Path, mut e: Error) -> Error {
    if tar_path.exists() {
        if let Err(e2) = std::fs::remove_file(tar_path) {
            e = e.chain(e2.into())
        }
    }
    e
}
