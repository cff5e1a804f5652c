//! INI configuration: one `[main]` section with global settings and one
//! section per site.
//!
//! ```ini
//! [main]
//! keepdays = 30
//!
//! [example.com]
//! dir_backup = /var/backups/example.com
//! dir_htdocs = /var/www/example.com
//! dbhost = localhost
//! dbuser = example
//! dbpass = secret
//! dbname = example
//! exclude1 = cache
//! exclude2 = *.log
//! ```
//!
//! Only the `[main]` section is checked up front. Site options are checked
//! by the step that needs them, so a site without `dir_htdocs` only fails
//! once it gets archived.

use crate::backup::compress::CompressorConfig;
use crate::backup::function_path;
use crate::backup::orchestrator::FailurePolicy;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::validate::validate_valid_site_name;
use bon::Builder;
use function_name::named;
use getset::{CopyGetters, Getters};
use ini::{Ini, ParseOption, Properties};
use itertools::Itertools;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use validator::Validate;

pub static MAIN_SECTION: &str = "main";

pub static KEEPDAYS: &str = "keepdays";
pub static DUMP_COMMAND: &str = "dump_command";
pub static COMPRESSION: &str = "compression";
pub static COMPRESSION_LEVEL: &str = "compression_level";
pub static ON_SITE_ERROR: &str = "on_site_error";

pub static DIR_BACKUP: &str = "dir_backup";
pub static DIR_HTDOCS: &str = "dir_htdocs";
pub static DBHOST: &str = "dbhost";
pub static DBUSER: &str = "dbuser";
pub static DBPASS: &str = "dbpass";
pub static DBNAME: &str = "dbname";

static DEFAULT_DUMP_COMMAND: &str = "mysqldump";
static EXCLUDE_PREFIX: &str = "exclude";

/// Alternative spellings accepted for option keys, mapped to the canonical key.
static OPTION_ALIASES: &[(&str, &str)] = &[
    ("retention_days", "keepdays"),
    ("backup_dir", "dir_backup"),
    ("htdocs_dir", "dir_htdocs"),
    ("db_host", "dbhost"),
    ("db_user", "dbuser"),
    ("db_pass", "dbpass"),
    ("db_name", "dbname"),
];

fn canonical_key(key: &str) -> String {
    let key = key.trim().to_ascii_lowercase();
    OPTION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(key)
}

fn normalize_options(properties: &Properties) -> BTreeMap<String, String> {
    properties
        .iter()
        .map(|(k, v)| (canonical_key(k), v.to_string()))
        .collect()
}

fn ini_parse_option() -> ParseOption {
    // values such as passwords are taken verbatim
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

#[derive(Clone, Debug)]
pub struct SitesConfig {
    pub path: PathBuf,
    pub main: MainSettings,
    pub sites: Vec<SiteSection>,
}

impl SitesConfig {
    #[named]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let ini = Ini::load_from_file_opt(path, ini_parse_option())
            .map_err(Error::from)
            .add_msg(format!("Parse config failed: {:?}", path))
            .add_fn_name(function_path!())?;
        Self::from_ini(&ini, path)
    }

    /// Parses config text as if it was read from `path`.
    pub fn parse<P: AsRef<Path>>(content: &str, path: P) -> Result<Self> {
        let path = path.as_ref();
        let ini = Ini::load_from_str_opt(content, ini_parse_option())
            .map_err(|e| Error::config_invalid(path, e.to_string()))?;
        Self::from_ini(&ini, path)
    }

    fn from_ini(ini: &Ini, path: &Path) -> Result<Self> {
        let main = MainSettings::from_properties(ini.section(Some(MAIN_SECTION)), path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut seen = HashSet::new();
        let mut sites = Vec::new();
        for (name, properties) in ini.iter() {
            let Some(name) = name else { continue };
            if name == MAIN_SECTION {
                continue;
            }
            if !seen.insert(name) {
                return Err(Error::config_invalid(
                    path,
                    format!("section {:?} is defined more than once", name),
                ));
            }
            sites.push(SiteSection {
                name: name.to_string(),
                base_dir: base_dir.clone(),
                options: normalize_options(properties),
            });
        }

        tracing::info!(
            "Loaded {:?}: {} site(s), keeping backups for {} day(s)",
            path,
            sites.len(),
            main.keep_days()
        );
        Ok(Self {
            path: path.to_path_buf(),
            main,
            sites,
        })
    }

    pub fn site(&self, name: &str) -> Option<&SiteSection> {
        self.sites.iter().find(|s| s.name == name)
    }

    /// The sites to back up: all of them when `names` is empty, else the named
    /// ones in config file order.
    pub fn select_sites<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&SiteSection>> {
        if names.is_empty() {
            return Ok(self.sites.iter().collect());
        }

        let unknown = names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| self.site(n).is_none())
            .collect_vec();
        if !unknown.is_empty() {
            return Err(Error::config_invalid(
                &self.path,
                format!("unknown site section(s): {}", unknown.join(", ")),
            ));
        }

        Ok(self
            .sites
            .iter()
            .filter(|s| names.iter().any(|n| n.as_ref() == s.name))
            .collect())
    }
}

/// Settings of the `[main]` section.
#[derive(Clone, Debug, Validate, Builder, Getters, CopyGetters)]
pub struct MainSettings {
    #[getset(get_copy = "pub")]
    keep_days: u32,
    #[builder(default = DEFAULT_DUMP_COMMAND.to_string(), into)]
    #[getset(get = "pub")]
    dump_command: String,
    #[builder(default)]
    #[validate(nested)]
    #[getset(get = "pub")]
    compressor: CompressorConfig,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    on_site_error: FailurePolicy,
}

impl MainSettings {
    fn from_properties(properties: Option<&Properties>, path: &Path) -> Result<Self> {
        let options = properties.map(normalize_options).unwrap_or_default();
        let option = |key: &str| options.get(key).map(String::as_str);

        let keep_days = option(KEEPDAYS).ok_or_else(|| {
            Error::config_invalid(
                path,
                format!("'{KEEPDAYS}' option not found in '{MAIN_SECTION}' section"),
            )
        })?;
        let keep_days = parse_value::<u32>(path, KEEPDAYS, keep_days)?;

        let level = option(COMPRESSION_LEVEL)
            .map(|v| parse_value::<u32>(path, COMPRESSION_LEVEL, v))
            .transpose()?;
        let compression = option(COMPRESSION).unwrap_or("gzip");
        let compressor = CompressorConfig::from_name(compression, level).ok_or_else(|| {
            Error::config_invalid(
                path,
                format!("unknown {COMPRESSION} {compression:?}, expected gzip or xz"),
            )
        })?;

        let on_site_error = option(ON_SITE_ERROR)
            .map(|v| parse_value::<FailurePolicy>(path, ON_SITE_ERROR, v))
            .transpose()?
            .unwrap_or_default();

        let settings = MainSettings::builder()
            .keep_days(keep_days)
            .dump_command(option(DUMP_COMMAND).unwrap_or(DEFAULT_DUMP_COMMAND))
            .compressor(compressor)
            .on_site_error(on_site_error)
            .build();

        settings
            .validate()
            .map_err(|e| Error::config_invalid(path, e.to_string()))?;
        Ok(settings)
    }
}

fn parse_value<T: FromStr>(path: &Path, key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config_invalid(path, format!("invalid {key} value {value:?}")))
}

/// One site section. Options are resolved on demand.
#[derive(Clone, Debug, Validate, Getters)]
#[getset(get = "pub")]
pub struct SiteSection {
    #[validate(custom(function = validate_valid_site_name))]
    name: String,
    /// Relative paths are resolved against this directory
    base_dir: PathBuf,
    options: BTreeMap<String, String>,
}

impl SiteSection {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(
        name: S,
        base_dir: P,
        options: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_dir: base_dir.into(),
            options: options
                .into_iter()
                .map(|(k, v)| (canonical_key(&k), v))
                .collect(),
        }
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.option(key)
            .ok_or_else(|| Error::missing_option(&self.name, key))
    }

    fn resolve_path(&self, value: &str) -> PathBuf {
        self.base_dir.join(value)
    }

    pub fn backup_dir(&self) -> Result<PathBuf> {
        self.require(DIR_BACKUP).map(|v| self.resolve_path(v))
    }

    pub fn htdocs_dir(&self) -> Result<PathBuf> {
        self.require(DIR_HTDOCS).map(|v| self.resolve_path(v))
    }

    /// `None` when the site has no `dbhost`; otherwise every credential must
    /// be present, checked in the order user, password, name.
    pub fn database(&self) -> Result<Option<DatabaseCredentials>> {
        let Some(host) = self.option(DBHOST) else {
            return Ok(None);
        };
        let user = self.require(DBUSER)?;
        let password = self.require(DBPASS)?;
        let name = self.require(DBNAME)?;

        Ok(Some(
            DatabaseCredentials::builder()
                .host(host)
                .user(user)
                .password(password)
                .name(name)
                .build(),
        ))
    }

    /// Exclusion patterns from `exclude<N>` / `exclude_<N>` keys, ordered by N.
    pub fn excludes(&self) -> Vec<&str> {
        self.options
            .iter()
            .filter_map(|(k, v)| {
                let slot = k.strip_prefix(EXCLUDE_PREFIX)?;
                let slot = slot.strip_prefix('_').unwrap_or(slot);
                let slot = slot.parse::<u32>().ok()?;
                Some((slot, v.as_str()))
            })
            .filter(|(_, v)| !v.trim().is_empty())
            .sorted_by_key(|(slot, _)| *slot)
            .map(|(_, v)| v)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Builder, Getters)]
#[getset(get = "pub")]
pub struct DatabaseCredentials {
    #[builder(into)]
    host: String,
    #[builder(into)]
    user: String,
    #[builder(into)]
    password: RedactedString,
    #[builder(into)]
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(content: &str) -> Result<SitesConfig> {
        SitesConfig::parse(content, "/etc/site_backup/site_backup.cfg")
    }

    fn root_cause_option(error: &Error) -> &str {
        match error.root_cause() {
            Error::MissingOption { option, .. } => option,
            e => panic!("Expected MissingOption, got {e:?}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("site_backup.cfg");

        match SitesConfig::load(&path) {
            Err(Error::ConfigNotFound(p)) => assert_eq!(p, path),
            other => panic!("Expected ConfigNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("site_backup.cfg");
        std::fs::write(&path, "[main]\nkeepdays = 7\n\n[blog]\ndir_backup = backups\n").unwrap();

        let config = SitesConfig::load(&path).unwrap();
        assert_eq!(config.main.keep_days(), 7);
        assert_eq!(
            config.sites[0].backup_dir().unwrap(),
            temp_dir.path().join("backups")
        );
    }

    #[test]
    fn test_missing_keepdays_is_invalid() {
        let res = parse("[main]\n\n[site]\ndir_backup = /tmp/b\n");
        assert!(matches!(res, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn test_missing_main_section_is_invalid() {
        let res = parse("[site]\ndir_backup = /tmp/b\n");
        assert!(matches!(res, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn test_non_numeric_keepdays_is_invalid() {
        let res = parse("[main]\nkeepdays = thirty\n");
        match res {
            Err(Error::ConfigInvalid { reason, .. }) => assert!(reason.contains("keepdays")),
            other => panic!("Expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_main_settings_defaults() {
        let config = parse("[main]\nkeepdays = 30\n").unwrap();

        assert_eq!(config.main.keep_days(), 30);
        assert_eq!(config.main.dump_command(), "mysqldump");
        assert_eq!(config.main.compressor(), &CompressorConfig::default());
        assert_eq!(config.main.on_site_error(), FailurePolicy::Continue);
        assert!(config.sites.is_empty());
    }

    #[test]
    fn test_main_settings_overrides() {
        let config = parse(
            "[main]\nretention_days = 3\ndump_command = /opt/mysql/bin/mysqldump\n\
             compression = xz\ncompression_level = 9\non_site_error = abort\n",
        )
        .unwrap();

        assert_eq!(config.main.keep_days(), 3);
        assert_eq!(config.main.dump_command(), "/opt/mysql/bin/mysqldump");
        assert!(matches!(config.main.compressor(), CompressorConfig::Xz(_)));
        assert_eq!(config.main.on_site_error(), FailurePolicy::Abort);
    }

    #[test]
    fn test_invalid_compression_settings() {
        assert!(matches!(
            parse("[main]\nkeepdays = 1\ncompression = zip\n"),
            Err(Error::ConfigInvalid { .. })
        ));
        assert!(matches!(
            parse("[main]\nkeepdays = 1\ncompression_level = 12\n"),
            Err(Error::ConfigInvalid { .. })
        ));
        assert!(matches!(
            parse("[main]\nkeepdays = 1\non_site_error = ignore\n"),
            Err(Error::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_sites_keep_file_order_and_skip_main() {
        let config = parse(
            "[zeta]\ndir_backup = /b/z\n\n[main]\nkeepdays = 1\n\n[alpha]\ndir_backup = /b/a\n",
        )
        .unwrap();

        let names = config.sites.iter().map(|s| s.name().as_str()).collect_vec();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_duplicate_site_section_is_invalid() {
        let res = parse("[main]\nkeepdays = 1\n[a]\ndir_backup = /x\n[a]\ndir_backup = /y\n");
        assert!(matches!(res, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn test_site_paths_resolve_against_config_dir() {
        let config = parse(
            "[main]\nkeepdays = 1\n[a]\ndir_backup = backups/a\ndir_htdocs = /var/www/a\n",
        )
        .unwrap();
        let site = config.site("a").unwrap();

        assert_eq!(
            site.backup_dir().unwrap(),
            PathBuf::from("/etc/site_backup/backups/a")
        );
        assert_eq!(site.htdocs_dir().unwrap(), PathBuf::from("/var/www/a"));
    }

    #[test]
    fn test_missing_site_options_are_lazy() {
        let config = parse("[main]\nkeepdays = 1\n[a]\nDBHOST = localhost\n").unwrap();
        let site = config.site("a").unwrap();

        assert_eq!(root_cause_option(&site.backup_dir().unwrap_err()), DIR_BACKUP);
        assert_eq!(root_cause_option(&site.htdocs_dir().unwrap_err()), DIR_HTDOCS);
    }

    #[test]
    fn test_database_absent_without_dbhost() {
        let config = parse("[main]\nkeepdays = 1\n[a]\ndbuser = ignored\n").unwrap();
        assert!(config.site("a").unwrap().database().unwrap().is_none());
    }

    #[test]
    fn test_database_credentials_checked_in_order() {
        let config = parse(
            "[main]\nkeepdays = 1\n\
             [no_user]\ndbhost = h\ndbname = n\n\
             [no_pass]\ndbhost = h\ndbuser = u\n\
             [no_name]\ndbhost = h\ndbuser = u\ndbpass = p\n",
        )
        .unwrap();

        let err = |name| config.site(name).unwrap().database().unwrap_err();
        assert_eq!(root_cause_option(&err("no_user")), DBUSER);
        assert_eq!(root_cause_option(&err("no_pass")), DBPASS);
        assert_eq!(root_cause_option(&err("no_name")), DBNAME);
    }

    #[test]
    fn test_database_credentials_verbatim() {
        let config = parse(
            "[main]\nkeepdays = 1\n\
             [a]\ndb_host = db.local\ndb_user = admin\ndb_pass = p\\w\"d\ndb_name = shop\n",
        )
        .unwrap();
        let creds = config.site("a").unwrap().database().unwrap().unwrap();

        assert_eq!(creds.host(), "db.local");
        assert_eq!(creds.user(), "admin");
        assert_eq!(creds.password().inner(), "p\\w\"d");
        assert_eq!(creds.name(), "shop");
    }

    #[test]
    fn test_excludes_ordered_by_slot_without_cap() {
        let config = parse(
            "[main]\nkeepdays = 1\n\
             [a]\nexclude10 = ten\nexclude2 = two\nexclude_1 = one\nexclude5 =\nexcluded = no\n",
        )
        .unwrap();

        assert_eq!(config.site("a").unwrap().excludes(), vec!["one", "two", "ten"]);
    }

    #[test]
    fn test_select_sites() {
        let config = parse("[main]\nkeepdays = 1\n[a]\n[b]\n[c]\n").unwrap();

        let all = config.select_sites::<&str>(&[]).unwrap();
        assert_eq!(all.len(), 3);

        let picked = config.select_sites(&["c", "a"]).unwrap();
        let names = picked.iter().map(|s| s.name().as_str()).collect_vec();
        assert_eq!(names, vec!["a", "c"]);

        assert!(matches!(
            config.select_sites(&["missing"]),
            Err(Error::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_site_name_validation() {
        let site = SiteSection::new("bad/name", "/", BTreeMap::new());
        assert!(site.validate().is_err());

        let site = SiteSection::new("good.example", "/", BTreeMap::new());
        assert!(site.validate().is_ok());
    }
}
