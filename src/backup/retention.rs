use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{AddFunctionName, AddMsg};
use chrono::{DateTime, Utc};
use derive_more::From;
use function_name::named;
use getset::CopyGetters;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Age based pruning of a backup directory, `find <dir> -mtime +<days>` style
///
/// Ages are counted in whole days with the fractional part dropped, and an
/// entry expires once that count is greater than `keep_days`. With
/// `keep_days = 30` an entry has to be at least 31 days old to go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, From, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RetentionPolicy {
    keep_days: u32,
}

impl RetentionPolicy {
    pub fn new(keep_days: u32) -> Self {
        Self { keep_days }
    }

    pub fn is_expired(&self, modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(modified);
        age.num_days() > i64::from(self.keep_days)
    }

    /// Deletes every expired entry below `dir`; `dir` itself is kept.
    ///
    /// Expired directories go with everything inside them. Entries that
    /// cannot be inspected or removed are skipped and reported together once
    /// the sweep is done. Returns the removed paths.
    #[named]
    pub fn sweep<P: AsRef<Path>>(&self, dir: P, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut removed = Vec::new();
        let mut errors = Vec::new();

        let mut walker = WalkDir::new(dir).min_depth(1).follow_links(false).into_iter();
        while let Some(res) = walker.next() {
            let entry = match res {
                Ok(entry) => entry,
                Err(e) => {
                    errors.push(Error::from(e));
                    continue;
                }
            };

            let modified = match entry.metadata().map(|md| md.modified()) {
                Ok(Ok(modified)) => DateTime::<Utc>::from(modified),
                Ok(Err(e)) => {
                    let msg = format!("Reading mtime of {:?} failed", entry.path());
                    errors.push(Error::from(e).add_msg(msg));
                    continue;
                }
                Err(e) => {
                    errors.push(Error::from(e));
                    continue;
                }
            };
            if !self.is_expired(modified, now) {
                tracing::trace!("Keeping {:?}, modified {}", entry.path(), modified);
                continue;
            }

            let res = if entry.file_type().is_dir() {
                walker.skip_current_dir();
                std::fs::remove_dir_all(entry.path())
            } else {
                std::fs::remove_file(entry.path())
            };
            match res {
                Ok(_) => {
                    tracing::info!("Removed out of retention {:?}", entry.path());
                    removed.push(entry.into_path());
                }
                Err(e) => errors.push(
                    Error::from(e).add_msg(format!("Removing {:?} failed", entry.path())),
                ),
            }
        }

        convert_error_vec(errors)
            .add_msg(format!("Retention sweep of {:?} incomplete", dir))
            .add_fn_name(function_path!())?;
        Ok(removed)
    }
}
