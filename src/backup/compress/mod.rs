pub mod gzip;
pub mod xz;

use crate::backup::file_ext::FileExtProvider;
use crate::backup::finish::Finish;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use derive_more::From;
use flate2::write::GzEncoder;
use function_name::named;
use io_enum::Write;
use liblzma::write::XzEncoder;
use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::io::{BufWriter, IntoInnerError, Write};
use std::path::{Path, PathBuf};
use std::result;
use std::sync::{Arc, OnceLock};
use validator::{Validate, ValidationErrors};

#[derive(Write, From)]
pub enum Compressor<W: Write> {
    GzEncoder(GzEncoder<W>),
    XzEncoder(XzEncoder<W>),
}

#[derive(Clone, From, Debug, PartialEq, Eq)]
pub enum CompressorConfig {
    Gzip(gzip::GzipConfig),
    Xz(xz::XzConfig),
}

impl Default for CompressorConfig {
    fn default() -> Self {
        CompressorConfig::Gzip(gzip::GzipConfig::default())
    }
}

impl CompressorConfig {
    /// Builds the config named by the `compression` setting.
    pub fn from_name(name: &str, level: Option<u32>) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Some(gzip::GzipConfig::builder().maybe_level(level).build().into()),
            "xz" => Some(xz::XzConfig::builder().maybe_level(level).build().into()),
            _ => None,
        }
    }
}

impl Validate for CompressorConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            CompressorConfig::Gzip(gzip) => gzip.validate(),
            CompressorConfig::Xz(xz) => xz.validate(),
        }
    }
}

pub trait CompressorBuilder<W: Write> {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>>;
}

impl<W: Write> Finish<W> for Compressor<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::GzEncoder(w) => w.finish(),
            Compressor::XzEncoder(w) => w.finish(),
        }
    }
}

impl<W: Write> CompressorBuilder<W> for CompressorConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        match self {
            CompressorConfig::Gzip(gzip) => gzip.build_compressor(writer),
            CompressorConfig::Xz(xz) => xz.build_compressor(writer),
        }
        .add_msg(format!("Building compressor {:?} failed", self))
    }
}

static GZ_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();
static XZ_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

impl FileExtProvider for CompressorConfig {
    fn file_ext(&self) -> Option<Arc<str>> {
        match self {
            CompressorConfig::Gzip(_) => Some(GZ_FILE_EXT.get_or_init(|| "gz".into()).clone()),
            CompressorConfig::Xz(_) => Some(XZ_FILE_EXT.get_or_init(|| "xz".into()).clone()),
        }
    }
}

/// Compresses `src` into `<src>.<ext>` and removes `src`, like `gzip <file>` does.
///
/// Returns the path of the compressed file. A partially written output is
/// removed on failure and `src` is left untouched.
#[named]
pub fn compress_in_place<P: AsRef<Path>>(src: P, config: &CompressorConfig) -> Result<PathBuf> {
    let src = src.as_ref();
    let mut dst = OsString::from(src.as_os_str());
    if let Some(ext) = config.file_ext() {
        dst.push(".");
        dst.push(ext.as_ref());
    }
    let dst = PathBuf::from(dst);

    let mut reader = File::open(src)
        .map_err(Error::from)
        .add_msg(format!("Opening {:?} for compression failed", src))?;
    let out = File::create_new(&dst)
        .map_err(Error::from)
        .add_msg(format!("Creating {:?} failed", dst))?;

    tracing::debug!("Compressing {:?} into {:?}", src, dst);
    let res = config
        .build_compressor(BufWriter::new(out))
        .and_then(|mut writer| {
            io::copy(&mut reader, &mut writer)?;
            writer
                .finish()?
                .into_inner()
                .map_err(IntoInnerError::into_error)?
                .sync_all()?;
            Ok(())
        })
        .map_err(|mut e| {
            if let Err(e2) = std::fs::remove_file(&dst) {
                e = e.chain(e2.into())
            }
            e.add_msg(format!("Compressing {:?} failed", src))
        });

    res.and_then(|_| std::fs::remove_file(src).map_err(Error::from))
        .map(|_| dst)
        .add_fn_name(function_path!())
}
