use crate::backup::archive::ArchiveEntry;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};

use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use getset::Getters;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

use std::path::{Component, Path, PathBuf};

/// Exclusion patterns with GNU tar `--exclude` semantics
///
/// Patterns are unanchored: a member is excluded when the pattern matches
/// the whole member name or any trailing run of its components, so
/// `node_modules` excludes `site/node_modules` and `site/a/node_modules`.
/// `*` also matches `/`.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct ExcludeSet {
    patterns: Vec<String>,
    #[getset(skip)]
    globset: GlobSet,
}

impl ExcludeSet {
    pub fn new<I: IntoIterator<Item = S>, S: AsRef<str>>(patterns: I) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            let pattern = pattern.trim_end_matches('/');
            if pattern.is_empty() {
                continue;
            }
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(Error::from)
                .add_msg(format!("Invalid exclude pattern {:?}", pattern))?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }

        Ok(Self {
            patterns: kept,
            globset: builder.build()?,
        })
    }

    pub fn is_excluded<P: AsRef<Path>>(&self, member: P) -> bool {
        if self.globset.is_empty() {
            return false;
        }
        let components = member.as_ref().components().collect::<Vec<_>>();
        (0..components.len()).any(|start| {
            let suffix = components[start..].iter().collect::<PathBuf>();
            self.globset.is_match(&suffix)
        })
    }
}

/// A site's document root, archived as `<leaf>/...`
///
/// Member names never contain the absolute host path, so an archive can be
/// restored anywhere.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct SiteTree {
    /// Absolute, lexically normalized document root
    root: PathBuf,
    /// Last component of `root`, the top level directory inside the archive
    leaf_name: PathBuf,
    excludes: ExcludeSet,
}

impl SiteTree {
    pub fn new<P: AsRef<Path>>(htdocs_dir: P, excludes: ExcludeSet) -> Result<Self> {
        let htdocs_dir = htdocs_dir.as_ref();
        let root = normalize_lexically(&std::path::absolute(htdocs_dir)?);
        let leaf_name = root
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| {
                Error::from(std::io::Error::other(format!(
                    "{:?} has no directory name to archive under",
                    htdocs_dir
                )))
            })?;

        Ok(Self {
            root,
            leaf_name,
            excludes,
        })
    }

    /// Directory the archive is built from (`tar -C <parent> <leaf>`).
    pub fn parent(&self) -> &Path {
        self.root.parent().unwrap_or(Path::new("/"))
    }

    /// Every entry to archive, parents before children, sorted by name.
    /// Excluded directories are pruned with their subtree.
    #[named]
    pub fn entries<'a>(&'a self) -> Result<DynIter<'a, Result<ArchiveEntry>>> {
        if !self.root.is_dir() {
            tracing::error!(
                "Site directory does not exist or is not a directory: {:?}",
                self.root
            );
            return Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{:?} is not a directory", self.root),
            ))
            .add_fn_name(function_path!()));
        }

        tracing::debug!(
            "Scanning {:?} with {} exclude pattern(s)",
            self.root,
            self.excludes.patterns().len()
        );

        let entries = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |de| match self.member_name(de.path()) {
                Ok(member) => {
                    let excluded = self.excludes.is_excluded(&member);
                    if excluded {
                        tracing::debug!("Excluding {:?}", member);
                    }
                    !excluded
                }
                Err(_) => true,
            })
            .filter_map(move |res| match res {
                Ok(de) => self.process_dir_entry(de),
                Err(e) => Some(Err(e.into())),
            })
            .map(move |res| res.add_fn_name(function_path!()));

        Ok(entries.into_dyn_iter())
    }

    fn member_name(&self, path: &Path) -> Result<PathBuf> {
        let relative = path.strip_prefix(&self.root)?;
        if relative.as_os_str().is_empty() {
            Ok(self.leaf_name.clone())
        } else {
            Ok(self.leaf_name.join(relative))
        }
    }

    fn process_dir_entry(&self, de: DirEntry) -> Option<Result<ArchiveEntry>> {
        let file_type = de.file_type();
        if !(file_type.is_dir() || file_type.is_file() || file_type.is_symlink()) {
            tracing::trace!("Skipping {:?}, not a file, directory or symlink", de.path());
            return None;
        }

        let res = self.member_name(de.path()).map_err(|e| {
            e.add_msg(format!(
                "Stripping {:?} from {:?} failed",
                self.root,
                de.path()
            ))
        });

        Some(res.map(|dst| {
            let entry = ArchiveEntry::new(de.into_path(), dst, file_type.is_dir());
            tracing::trace!("Including {:?} -> {:?}", entry.src, entry.dst);
            entry
        }))
    }
}

/// Resolves `.` and `..` without touching the filesystem.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use tempfile::TempDir;

    fn create_test_files(dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir.join("node_modules/pkg"))?;
        std::fs::create_dir_all(dir.join("assets/node_modules"))?;
        std::fs::create_dir_all(dir.join("logs"))?;
        std::fs::write(dir.join("index.php"), "<?php")?;
        std::fs::write(dir.join("node_modules/pkg/index.js"), "js")?;
        std::fs::write(dir.join("assets/node_modules/dep.js"), "js")?;
        std::fs::write(dir.join("assets/site.css"), "css")?;
        std::fs::write(dir.join("logs/access.log"), "log")?;
        Ok(())
    }

    fn member_names(tree: &SiteTree) -> Vec<String> {
        tree.entries()
            .unwrap()
            .map(|e| e.unwrap().dst.to_string_lossy().into_owned())
            .collect_vec()
    }

    #[test]
    fn test_exclude_set_is_unanchored() {
        let excludes = ExcludeSet::new(["node_modules", "*.log"]).unwrap();

        assert!(excludes.is_excluded("www/node_modules"));
        assert!(excludes.is_excluded("www/assets/node_modules"));
        assert!(excludes.is_excluded("www/logs/access.log"));
        assert!(!excludes.is_excluded("www/node_modules_backup"));
        assert!(!excludes.is_excluded("www/index.php"));
    }

    #[test]
    fn test_exclude_set_with_path_pattern() {
        let excludes = ExcludeSet::new(["www/cache/"]).unwrap();

        assert_eq!(excludes.patterns(), &vec!["www/cache".to_string()]);
        assert!(excludes.is_excluded("www/cache"));
        assert!(!excludes.is_excluded("www/static/cache.txt"));
    }

    #[test]
    fn test_exclude_set_empty() {
        let excludes = ExcludeSet::new(Vec::<String>::new()).unwrap();
        assert!(!excludes.is_excluded("anything"));
    }

    #[test]
    fn test_exclude_set_invalid_pattern() {
        assert!(ExcludeSet::new(["[invalid"]).is_err());
    }

    #[test]
    fn test_entries_rooted_at_leaf_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("www");
        create_test_files(&root).unwrap();

        let tree = SiteTree::new(&root, ExcludeSet::new(Vec::<String>::new()).unwrap()).unwrap();
        let names = member_names(&tree);

        assert_eq!(tree.leaf_name(), Path::new("www"));
        assert_eq!(tree.parent(), temp_dir.path());
        assert_eq!(names[0], "www");
        assert!(names.contains(&"www/index.php".to_string()));
        assert!(names.contains(&"www/node_modules/pkg/index.js".to_string()));
        assert!(names.iter().all(|n| n.starts_with("www")));
    }

    #[test]
    fn test_entries_prune_excluded_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("www");
        create_test_files(&root).unwrap();

        let tree = SiteTree::new(&root, ExcludeSet::new(["node_modules"]).unwrap()).unwrap();
        let names = member_names(&tree);

        assert!(names.iter().all(|n| !n.contains("node_modules")));
        assert!(names.contains(&"www/assets/site.css".to_string()));
        assert!(names.contains(&"www/logs/access.log".to_string()));
    }

    #[test]
    fn test_entries_flag_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("www");
        create_test_files(&root).unwrap();

        let tree = SiteTree::new(&root, ExcludeSet::new(["node_modules"]).unwrap()).unwrap();
        let dirs = tree
            .entries()
            .unwrap()
            .map(Result::unwrap)
            .filter(|e| e.is_dir)
            .map(|e| e.dst.to_string_lossy().into_owned())
            .collect_vec();

        assert_eq!(dirs, vec!["www", "www/assets", "www/logs"]);
    }

    #[test]
    fn test_trailing_dots_are_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("www");
        std::fs::create_dir_all(root.join("sub")).unwrap();

        let tree = SiteTree::new(
            root.join("sub").join(".."),
            ExcludeSet::new(Vec::<String>::new()).unwrap(),
        )
        .unwrap();

        assert_eq!(tree.root(), &root);
        assert_eq!(tree.leaf_name(), Path::new("www"));
    }

    #[test]
    fn test_root_without_name_is_rejected() {
        let excludes = ExcludeSet::new(Vec::<String>::new()).unwrap();
        assert!(SiteTree::new("/", excludes).is_err());
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let tree = SiteTree::new(
            temp_dir.path().join("missing"),
            ExcludeSet::new(Vec::<String>::new()).unwrap(),
        )
        .unwrap();

        assert!(tree.entries().is_err());
    }
}
