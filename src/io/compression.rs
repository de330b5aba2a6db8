//! Transparent compression for text formats.
//!
//! CSV and JSON Lines readers and writers route their byte streams through
//! [`auto_detect_reader`] / [`auto_detect_writer`]. A codec is chosen by file
//! extension first, and for reads falls back to the stream's magic bytes, so a
//! gzip file named `data.csv` still decodes.
//!
//! Built-in codecs are enabled by Cargo features:
//! - **Gzip** (`.gz`) via `flate2` (`compression-gzip`)
//! - **Zstd** (`.zst`) via `zstd` (`compression-zstd`)
//! - **Bzip2** (`.bz2`) via `bzip2` (`compression-bzip2`)
//! - **Xz** (`.xz`) via `xz2` (`compression-xz`)
//!
//! Additional codecs can be plugged in with [`register_codec`]:
//!
//! ```
//! use ironframe::io::compression::{CompressionCodec, FinishWrite, PlainWriter, register_codec};
//! use std::io::{Read, Write};
//! use std::sync::Arc;
//!
//! struct Identity;
//!
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".id"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader_dyn(&self, r: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> { Ok(r) }
//!     fn wrap_writer_dyn(&self, w: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
//!         Ok(Box::new(PlainWriter(w)))
//!     }
//! }
//!
//! register_codec(Arc::new(Identity));
//! ```
//!
//! Writers are closed with [`FinishWrite::finish`], which writes the codec's
//! trailer and surfaces any error from doing so.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn builtin_codecs() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(builtin_codecs).clone()
}

/// Register a codec alongside the built-in ones.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(builtin_codecs).push(codec);
}

/// A streaming compression algorithm.
///
/// Implementations live in a global registry and must be `Send + Sync`.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name, e.g. `"gzip"`.
    fn name(&self) -> &str;

    /// Lowercase extensions with their leading dot, e.g. `&[".gz"]`.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>>;
}

/// An output stream that has to be closed explicitly.
///
/// Dropping a compressed writer without calling `finish` may still write the
/// trailer, but any error from doing so is lost.
pub trait FinishWrite: Write {
    /// Write any trailer and flush everything down to the underlying writer.
    ///
    /// # Errors
    /// I/O failures while finishing the stream.
    fn finish(self: Box<Self>) -> std::io::Result<()>;
}

/// A writer with no trailer; `finish` only flushes.
pub struct PlainWriter<W: Write>(pub W);

impl<W: Write> Write for PlainWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> FinishWrite for PlainWriter<W> {
    fn finish(mut self: Box<Self>) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// `FinishWrite` for an encoder whose `finish(self)` hands back the inner writer.
#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
macro_rules! finish_via_inner {
    ($($encoder:ty),* $(,)?) => {
        $(
            impl<W: Write> FinishWrite for $encoder {
                fn finish(self: Box<Self>) -> std::io::Result<()> {
                    (*self).finish()?.flush()
                }
            }
        )*
    };
}

#[cfg(feature = "compression-gzip")]
finish_via_inner!(flate2::write::GzEncoder<W>);
#[cfg(feature = "compression-zstd")]
finish_via_inner!(zstd::stream::write::Encoder<'static, W>);
#[cfg(feature = "compression-bzip2")]
finish_via_inner!(bzip2::write::BzEncoder<W>);
#[cfg(feature = "compression-xz")]
finish_via_inner!(xz2::write::XzEncoder<W>);

fn detect_from_extension(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let lower = path.to_string_lossy().to_lowercase();
    registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| lower.ends_with(ext)))
}

/// Match the buffered head of `reader` against registered signatures without consuming it.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let head = reader.fill_buf().ok()?;
    if head.is_empty() {
        return None;
    }
    registry()
        .into_iter()
        .find(|codec| codec.magic_bytes().is_some_and(|magic| head.starts_with(magic)))
}

/// Codec name that a write to `path` would use, if any.
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<String> {
    detect_from_extension(path.as_ref()).map(|c| c.name().to_string())
}

/// Wrap `reader` with the decompressor matching `path_hint` or the stream's magic bytes.
///
/// # Errors
/// If the codec fails to initialize.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    let path = path_hint.as_ref();
    if let Some(codec) = detect_from_extension(path) {
        debug!(codec = codec.name(), path = %path.display(), "decompressing by extension");
        return codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buffered = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buffered) {
        debug!(codec = codec.name(), path = %path.display(), "decompressing by magic bytes");
        return codec
            .wrap_reader_dyn(Box::new(buffered))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    Ok(Box::new(buffered))
}

/// Wrap `writer` with the compressor matching `path_hint`'s extension, if any.
///
/// Call [`FinishWrite::finish`] on the result once everything is written.
///
/// # Errors
/// If the codec fails to initialize.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn FinishWrite>> {
    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        return codec
            .wrap_writer_dyn(Box::new(BufWriter::new(writer)))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(PlainWriter(BufWriter::new(writer))))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        Ok(Box::new(flate2::write::GzEncoder::new(writer, flate2::Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    // "BZh": a bare "BZ" would also match plain text starting with those letters.
    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(b"BZh")
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(bzip2::read::BzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        Ok(Box::new(bzip2::write::BzEncoder::new(writer, bzip2::Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(xz2::read::XzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}
