use crate::backup::compress::{Compressor, CompressorBuilder};
use crate::backup::result_error::result::Result;
use bon::Builder;
use getset::CopyGetters;
use liblzma::write::XzEncoder;
use std::io::Write;
use validator::Validate;

/// Default compression level (balance of speed vs size)
static DEFAULT_COMPRESSION_LEVEL: u32 = 3;

/// Configuration for XZ (LZMA) compression
///
/// XZ gives smaller archives than gzip at the cost of CPU time. Selected
/// with `compression = xz`; archives then end in `.tar.xz`.
#[derive(Clone, Default, Validate, Debug, PartialEq, Eq, Builder, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct XzConfig {
    /// Compression level (0-9)
    ///
    /// - 0: Fastest, largest files
    /// - 3: Default balance (good speed/size ratio)
    /// - 9: Slowest, smallest files
    #[validate(range(min = 0, max = 9))]
    level: Option<u32>,
}

impl<W: Write> CompressorBuilder<W> for XzConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        let level = self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        tracing::debug!("Creating XZ compressor with level={}", level);
        Ok(XzEncoder::new(writer, level).into())
    }
}
