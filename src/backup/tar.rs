use crate::backup::archive::site_tree::{normalize_lexically, SiteTree};
use crate::backup::dump::DumpArtifact;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use std::fs::File;
use std::io::{BufWriter, IntoInnerError};
use std::path::Path;

/// Writes the uncompressed tar for a site: the document root under its
/// directory name, then the dump under its bare file name.
///
/// `tar_path` must not exist yet. It is removed again if writing fails. When
/// it lies inside the document root it is left out of itself.
pub fn write_site_tar(tar_path: &Path, tree: &SiteTree, dump: Option<&DumpArtifact>) -> Result<()> {
    let own_path = normalize_lexically(&std::path::absolute(tar_path)?);
    let entries = tree.entries()?;
    let file = File::create_new(tar_path)
        .map_err(Error::from)
        .add_msg(format!("Creating {:?} failed", tar_path))?;

    let mut writer = tar::Builder::new(BufWriter::new(file));
    writer.follow_symlinks(false);

    let res = (|| -> Result<()> {
        let mut entry_count = 0;
        for entry in entries {
            let entry = entry?;
            if entry.src == own_path {
                tracing::warn!("{:?}: file is the archive; not dumped", entry.dst);
                continue;
            }
            if entry.is_dir {
                writer.append_dir(&entry.dst, &entry.src)?;
            } else {
                writer.append_path_with_name(&entry.src, &entry.dst)?;
            }
            entry_count += 1;
        }
        tracing::info!("Archived {} entries from {:?}", entry_count, tree.root());

        if let Some(dump) = dump {
            tracing::info!("Appending database dump {:?}", dump.file_name());
            writer.append_path_with_name(dump.path(), dump.file_name())?;
        }

        writer
            .into_inner()?
            .into_inner()
            .map_err(IntoInnerError::into_error)?
            .sync_all()?;
        Ok(())
    })();

    res.map_err(|mut e| {
        if let Err(e2) = std::fs::remove_file(tar_path) {
            e = e.chain(e2.into())
        }
        e.add_msg(format!("Writing {:?} failed", tar_path))
    })
}
