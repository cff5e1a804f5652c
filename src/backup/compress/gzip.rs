use crate::backup::compress::{Compressor, CompressorBuilder};
use crate::backup::result_error::result::Result;
use bon::Builder;
use flate2::write::GzEncoder;
use flate2::Compression;
use getset::CopyGetters;
use std::io::Write;
use validator::Validate;

/// Same default as the `gzip` command line tool
static DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Configuration for gzip compression, the default archive format
#[derive(Clone, Default, Validate, Debug, PartialEq, Eq, Builder, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct GzipConfig {
    /// Compression level (0-9)
    #[validate(range(min = 0, max = 9))]
    level: Option<u32>,
}

impl<W: Write> CompressorBuilder<W> for GzipConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        let level = self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        tracing::debug!("Creating gzip compressor with level={}", level);
        Ok(GzEncoder::new(writer, Compression::new(level)).into())
    }
}
