use crate::backup::site_config::MainSettings;
use chrono::{DateTime, Utc};
use derive_more::From;
use std::fmt::{Display, Formatter};

static RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Instant captured once per invocation; every artifact of the run is named after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct RunTimestamp(DateTime<Utc>);

impl RunTimestamp {
    pub fn now() -> Self {
        Utc::now().into()
    }

    pub fn date_time(&self) -> DateTime<Utc> {
        self.0
    }

    /// `<site>_<YYYYMMDD_HHMMSS>UTC.<ext>`
    pub fn artifact_file_name(&self, site: &str, ext: &str) -> String {
        format!("{site}_{self}UTC.{ext}")
    }
}

impl Display for RunTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(RUN_TIMESTAMP_FORMAT))
    }
}

/// Read-only state shared by every step of a run.
#[derive(Clone, Copy, Debug)]
pub struct RunContext<'a> {
    pub timestamp: RunTimestamp,
    pub settings: &'a MainSettings,
}

impl<'a> RunContext<'a> {
    pub fn new(timestamp: RunTimestamp, settings: &'a MainSettings) -> Self {
        Self {
            timestamp,
            settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let ts = RunTimestamp::from(Utc.with_ymd_and_hms(2014, 5, 21, 3, 4, 5).unwrap());
        assert_eq!(ts.to_string(), "20140521_030405");
    }

    #[test]
    fn test_timestamp_format_ignores_sub_second_part() {
        let base = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let a = RunTimestamp::from(base);
        let b = RunTimestamp::from(base + chrono::Duration::milliseconds(999));
        let c = RunTimestamp::from(base + chrono::Duration::seconds(1));

        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a.to_string(), c.to_string());
        assert_eq!(c.to_string(), "20250101_000000");
    }

    #[test]
    fn test_artifact_file_name() {
        let ts = RunTimestamp::from(Utc.with_ymd_and_hms(2020, 1, 2, 13, 14, 15).unwrap());
        assert_eq!(
            ts.artifact_file_name("example.com", "sql"),
            "example.com_20200102_131415UTC.sql"
        );
        assert_eq!(
            ts.artifact_file_name("blog", "tar"),
            "blog_20200102_131415UTC.tar"
        );
    }
}
