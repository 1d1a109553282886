//! Concrete format handlers for Switchyard.
//!
//! Each handler wraps one codec crate and declares the formats it reads and
//! writes. Enable handlers via feature flags.
//!
//! # Features
//!
//! ## Images
//! - `image` (default) - PNG, JPEG, WebP, GIF and BMP via the `image` crate
//!
//! ## Text
//! - `text` (default) - UTF-8, UTF-16LE and Latin-1 text plus JSON wrapping
//!
//! ## Compression
//! - `zstd` (default) - Zstandard; also unpacks `.zst` batches into a zip
//! - `gzip` (default) - Gzip compression of any input
//!
//! ## Archives
//! - `zip` (default) - Packs a whole batch into one zip archive

#[allow(unused_imports)]
use switchyard_core::{
    Category, ConfigError, ConvertError, FileData, Format, Handler, InitError, Registry, common,
};
#[allow(unused_imports)]
use std::sync::OnceLock;

/// Register all enabled handlers with the registry.
///
/// Registration order is the routing tie-break order: format-specific
/// handlers come before the catch-all compressors and archivers.
pub fn register_all(registry: &mut Registry) -> Result<(), ConfigError> {
    #[cfg(feature = "image")]
    registry.register(ImageHandler)?;
    #[cfg(feature = "text")]
    registry.register(TextHandler)?;
    #[cfg(feature = "zstd")]
    registry.register(ZstdHandler)?;
    #[cfg(feature = "gzip")]
    registry.register(GzipHandler)?;
    #[cfg(feature = "zip")]
    registry.register(ZipHandler)?;

    tracing::debug!(handlers = registry.len(), "registered built-in handlers");
    Ok(())
}

#[allow(dead_code)]
fn unsupported(from: &Format, to: &Format) -> ConvertError {
    ConvertError::unsupported(&from.internal_id, &to.internal_id)
}

// ============================================
// Zip writing (shared by zip and zstd)
// ============================================

#[cfg(any(feature = "zip", feature = "zstd"))]
mod archive {
    use super::*;
    use std::io::{Cursor, Write};

    pub const OUTPUT_NAME: &str = "output.zip";

    /// Store every `(name, bytes)` pair as an entry of one deflated archive.
    pub fn write_zip<I>(entries: I) -> Result<Vec<u8>, ConvertError>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in entries {
            writer.start_file(name.as_str(), options).map_err(|e| {
                ConvertError::Failed(format!("Failed to add entry '{}': {}", name, e))
            })?;
            writer.write_all(&bytes).map_err(|e| {
                ConvertError::Failed(format!("Failed to write entry '{}': {}", name, e))
            })?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| ConvertError::Failed(format!("Failed to finalize zip: {}", e)))?;
        Ok(cursor.into_inner())
    }
}

// ============================================
// Zstandard
// ============================================

#[cfg(feature = "zstd")]
mod zstd_impl {
    use super::*;

    /// Compression level 0 selects zstd's default.
    const LEVEL: i32 = 0;
    const PROBE: &[u8] = b"switchyard zstd probe";

    pub fn zst() -> Format {
        Format::define(
            "Zstandard Compressed Data",
            "zst",
            "zst",
            "application/zstd",
            Category::Archive,
        )
    }

    /// Compresses any input to `.zst` and unpacks `.zst` batches into a zip.
    pub struct ZstdHandler;

    impl Handler for ZstdHandler {
        fn name(&self) -> &str {
            "zstd"
        }

        fn supported_formats(&self) -> &[Format] {
            static FORMATS: OnceLock<Vec<Format>> = OnceLock::new();
            FORMATS.get_or_init(|| {
                vec![
                    zst().allow_both().mark_lossless(),
                    common::zip().allow_to().mark_lossless(),
                ]
            })
        }

        fn supports_any_input(&self) -> bool {
            true
        }

        fn initialize(&self) -> Result<(), InitError> {
            let packed = zstd::encode_all(PROBE, LEVEL)
                .map_err(|e| InitError::new(self.name(), format!("zstd encoder unavailable: {e}")))?;
            let unpacked = zstd::decode_all(packed.as_slice())
                .map_err(|e| InitError::new(self.name(), format!("zstd decoder unavailable: {e}")))?;
            if unpacked != PROBE {
                return Err(InitError::new(self.name(), "zstd round trip mismatch"));
            }
            Ok(())
        }

        fn convert(
            &self,
            inputs: &[FileData],
            from: &Format,
            to: &Format,
        ) -> Result<Vec<FileData>, ConvertError> {
            match (from.internal_id.as_str(), to.internal_id.as_str()) {
                (source, "zst") if source != "zst" => inputs.iter().map(compress).collect(),
                ("zst", "zip") => {
                    let entries = inputs
                        .iter()
                        .map(|file| Ok((entry_name(&file.name), decompress(file)?)))
                        .collect::<Result<Vec<_>, ConvertError>>()?;
                    Ok(vec![FileData::new(
                        archive::OUTPUT_NAME,
                        archive::write_zip(entries)?,
                    )])
                }
                _ => Err(unsupported(from, to)),
            }
        }
    }

    fn compress(file: &FileData) -> Result<FileData, ConvertError> {
        let bytes = zstd::encode_all(file.bytes.as_slice(), LEVEL).map_err(|e| {
            ConvertError::Failed(format!("Zstd compression of '{}' failed: {}", file.name, e))
        })?;
        let name = if strip_zst_suffix(&file.name).is_some() {
            file.name.clone()
        } else {
            file.renamed_with_extension("zst")
        };
        Ok(FileData::new(name, bytes))
    }

    fn decompress(file: &FileData) -> Result<Vec<u8>, ConvertError> {
        zstd::decode_all(file.bytes.as_slice()).map_err(|e| {
            ConvertError::InvalidInput(format!(
                "Zstd decompression of '{}' failed: {}",
                file.name, e
            ))
        })
    }

    /// Archive entry name for a compressed file: the name without its
    /// `.zst`/`.zstd` suffix, or `<name>.bin` if nothing would remain.
    pub(crate) fn entry_name(name: &str) -> String {
        match strip_zst_suffix(name) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            Some(_) => format!("{name}.bin"),
            None => name.to_string(),
        }
    }

    fn strip_zst_suffix(name: &str) -> Option<&str> {
        [".zstd", ".zst"]
            .into_iter()
            .find_map(|suffix| strip_suffix_ignore_case(name, suffix))
    }

    fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
        let split = name.len().checked_sub(suffix.len())?;
        if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(suffix) {
            Some(&name[..split])
        } else {
            None
        }
    }
}

#[cfg(feature = "zstd")]
pub use zstd_impl::{ZstdHandler, zst};

// ============================================
// Gzip
// ============================================

#[cfg(feature = "gzip")]
mod gzip_impl {
    use super::*;
    use flate2::Compression;
    use flate2::read::{GzDecoder, GzEncoder};
    use std::io::Read;

    const PROBE: &[u8] = b"switchyard gzip probe";

    pub fn gz() -> Format {
        Format::define(
            "Gzip Compressed Data",
            "gz",
            "gz",
            "application/gzip",
            Category::Archive,
        )
    }

    /// Compresses any input with gzip, one output per input.
    pub struct GzipHandler;

    impl Handler for GzipHandler {
        fn name(&self) -> &str {
            "gzip"
        }

        fn supported_formats(&self) -> &[Format] {
            static FORMATS: OnceLock<Vec<Format>> = OnceLock::new();
            FORMATS.get_or_init(|| vec![gz().allow_both().mark_lossless()])
        }

        fn supports_any_input(&self) -> bool {
            true
        }

        fn initialize(&self) -> Result<(), InitError> {
            let packed = gzip(PROBE)
                .map_err(|e| InitError::new(self.name(), format!("gzip encoder unavailable: {e}")))?;
            let mut unpacked = Vec::new();
            GzDecoder::new(packed.as_slice())
                .read_to_end(&mut unpacked)
                .map_err(|e| InitError::new(self.name(), format!("gzip decoder unavailable: {e}")))?;
            if unpacked != PROBE {
                return Err(InitError::new(self.name(), "gzip round trip mismatch"));
            }
            Ok(())
        }

        fn convert(
            &self,
            inputs: &[FileData],
            from: &Format,
            to: &Format,
        ) -> Result<Vec<FileData>, ConvertError> {
            if to.internal_id != "gz" || from.internal_id == "gz" {
                return Err(unsupported(from, to));
            }

            inputs
                .iter()
                .map(|file| {
                    let bytes = gzip(&file.bytes).map_err(|e| {
                        ConvertError::Failed(format!(
                            "Gzip compression of '{}' failed: {}",
                            file.name, e
                        ))
                    })?;
                    Ok(FileData::new(format!("{}.gz", file.name), bytes))
                })
                .collect()
        }
    }

    fn gzip(input: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(input, Compression::default());
        let mut output = Vec::new();
        encoder.read_to_end(&mut output)?;
        Ok(output)
    }
}

#[cfg(feature = "gzip")]
pub use gzip_impl::{GzipHandler, gz};

// ============================================
// Zip archives
// ============================================

#[cfg(feature = "zip")]
mod zip_impl {
    use super::*;
    use std::io::{Cursor, Read};

    /// Packs a whole batch into a single `output.zip`.
    pub struct ZipHandler;

    impl Handler for ZipHandler {
        fn name(&self) -> &str {
            "zip"
        }

        fn supported_formats(&self) -> &[Format] {
            static FORMATS: OnceLock<Vec<Format>> = OnceLock::new();
            FORMATS.get_or_init(|| vec![common::zip().allow_to().mark_lossless()])
        }

        fn supports_any_input(&self) -> bool {
            true
        }

        fn initialize(&self) -> Result<(), InitError> {
            let probe = || -> Result<bool, String> {
                let bytes = archive::write_zip([("probe".to_string(), b"probe".to_vec())])
                    .map_err(|e| e.to_string())?;
                let mut reader =
                    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
                let mut entry = reader.by_name("probe").map_err(|e| e.to_string())?;
                let mut contents = Vec::new();
                entry.read_to_end(&mut contents).map_err(|e| e.to_string())?;
                Ok(contents == b"probe")
            };

            match probe() {
                Ok(true) => Ok(()),
                Ok(false) => Err(InitError::new(self.name(), "zip round trip mismatch")),
                Err(reason) => Err(InitError::new(self.name(), reason)),
            }
        }

        fn convert(
            &self,
            inputs: &[FileData],
            from: &Format,
            to: &Format,
        ) -> Result<Vec<FileData>, ConvertError> {
            if to.internal_id != "zip" || from.internal_id == "zip" {
                return Err(unsupported(from, to));
            }

            let bytes = archive::write_zip(
                inputs
                    .iter()
                    .map(|file| (file.name.clone(), file.bytes.clone())),
            )?;
            Ok(vec![FileData::new(archive::OUTPUT_NAME, bytes)])
        }
    }
}

#[cfg(feature = "zip")]
pub use zip_impl::ZipHandler;

// ============================================
// Images
// ============================================

#[cfg(feature = "image")]
mod image_impl {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    /// Decodes and re-encodes raster images between common formats.
    pub struct ImageHandler;

    impl Handler for ImageHandler {
        fn name(&self) -> &str {
            "image"
        }

        fn supported_formats(&self) -> &[Format] {
            static FORMATS: OnceLock<Vec<Format>> = OnceLock::new();
            FORMATS.get_or_init(|| {
                vec![
                    common::png().allow_both().mark_lossless(),
                    common::jpeg().allow_both().mark_lossy(),
                    // The webp encoder only writes lossless bitstreams
                    common::webp().allow_both().mark_lossless(),
                    // Palette quantization
                    common::gif().allow_both().mark_lossy(),
                    common::bmp().allow_both().mark_lossless(),
                ]
            })
        }

        fn initialize(&self) -> Result<(), InitError> {
            let sample = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128])));
            let encoded = encode(&sample, ImageFormat::Png)
                .map_err(|e| InitError::new(self.name(), e.to_string()))?;
            let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Png)
                .map_err(|e| InitError::new(self.name(), format!("png decoder unavailable: {e}")))?;
            if decoded != sample {
                return Err(InitError::new(self.name(), "png round trip mismatch"));
            }
            Ok(())
        }

        fn convert(
            &self,
            inputs: &[FileData],
            from: &Format,
            to: &Format,
        ) -> Result<Vec<FileData>, ConvertError> {
            let (Some(source), Some(target)) = (image_format(from), image_format(to)) else {
                return Err(unsupported(from, to));
            };
            if source == target {
                return Err(unsupported(from, to));
            }

            inputs
                .iter()
                .map(|file| {
                    let img = image::load_from_memory_with_format(&file.bytes, source).map_err(
                        |e| {
                            ConvertError::InvalidInput(format!(
                                "Failed to decode '{}': {}",
                                file.name, e
                            ))
                        },
                    )?;
                    let bytes = encode(&prepare(img, target), target)?;
                    Ok(FileData::new(file.renamed_with_extension(&to.extension), bytes))
                })
                .collect()
        }
    }

    pub(crate) fn image_format(format: &Format) -> Option<ImageFormat> {
        match format.internal_id.as_str() {
            "png" => Some(ImageFormat::Png),
            "jpeg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::WebP),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    /// Coerce the pixel layout into one the target encoder accepts.
    fn prepare(img: DynamicImage, target: ImageFormat) -> DynamicImage {
        match target {
            // JPEG has no alpha channel
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
            ImageFormat::Png => img,
            _ => DynamicImage::ImageRgba8(img.to_rgba8()),
        }
    }

    fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ConvertError> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format)
            .map_err(|e| ConvertError::Failed(format!("Failed to encode image: {}", e)))?;
        Ok(buf.into_inner())
    }
}

#[cfg(feature = "image")]
pub use image_impl::ImageHandler;

// ============================================
// Text and charsets
// ============================================

#[cfg(feature = "text")]
mod text_impl {
    use super::*;
    use encoding_rs::{UTF_16LE, WINDOWS_1252};

    const PROBE: &str = "caf\u{e9} na\u{ef}ve";

    pub fn utf16le() -> Format {
        Format::define(
            "UTF-16LE Text",
            "utf16le",
            "txt",
            "text/plain; charset=utf-16le",
            Category::Text,
        )
    }

    pub fn latin1() -> Format {
        Format::define(
            "Latin-1 Text",
            "latin1",
            "txt",
            "text/plain; charset=iso-8859-1",
            Category::Text,
        )
    }

    /// Transcodes text between charsets and wraps it in or out of JSON.
    pub struct TextHandler;

    impl Handler for TextHandler {
        fn name(&self) -> &str {
            "text"
        }

        fn supported_formats(&self) -> &[Format] {
            static FORMATS: OnceLock<Vec<Format>> = OnceLock::new();
            FORMATS.get_or_init(|| {
                vec![
                    common::text().allow_both().mark_lossless(),
                    utf16le().allow_both().mark_lossless(),
                    latin1().allow_both().mark_lossy(),
                    common::json().allow_both().mark_lossless(),
                ]
            })
        }

        fn initialize(&self) -> Result<(), InitError> {
            let (encoded, _, unmappable) = WINDOWS_1252.encode(PROBE);
            if unmappable {
                return Err(InitError::new(self.name(), "latin1 encoder rejected probe"));
            }
            let (decoded, malformed) = WINDOWS_1252.decode_without_bom_handling(&encoded);
            if malformed || decoded != PROBE {
                return Err(InitError::new(self.name(), "latin1 round trip mismatch"));
            }
            Ok(())
        }

        fn convert(
            &self,
            inputs: &[FileData],
            from: &Format,
            to: &Format,
        ) -> Result<Vec<FileData>, ConvertError> {
            if from.same_node(to) || !self.declares_pair(&from.internal_id, &to.internal_id) {
                return Err(unsupported(from, to));
            }

            inputs
                .iter()
                .map(|file| {
                    let text = decode(file, &from.internal_id)?;
                    let bytes = encode(&text, &to.internal_id)?;
                    Ok(FileData::new(file.renamed_with_extension(&to.extension), bytes))
                })
                .collect()
        }
    }

    fn decode(file: &FileData, charset: &str) -> Result<String, ConvertError> {
        let invalid = |what: &str| {
            ConvertError::InvalidInput(format!("Invalid {} in '{}'", what, file.name))
        };

        match charset {
            "text" => String::from_utf8(file.bytes.clone()).map_err(|_| invalid("UTF-8")),
            "utf16le" => {
                let (decoded, malformed) = UTF_16LE.decode_with_bom_removal(&file.bytes);
                if malformed {
                    return Err(invalid("UTF-16LE"));
                }
                Ok(decoded.into_owned())
            }
            "latin1" => {
                let (decoded, malformed) = WINDOWS_1252.decode_without_bom_handling(&file.bytes);
                if malformed {
                    return Err(invalid("Latin-1"));
                }
                Ok(decoded.into_owned())
            }
            "json" => {
                let value: serde_json::Value = serde_json::from_slice(&file.bytes).map_err(|e| {
                    ConvertError::InvalidInput(format!("Invalid JSON in '{}': {}", file.name, e))
                })?;
                match value {
                    // Undo the wrapping applied on the way in
                    serde_json::Value::String(text) => Ok(text),
                    value => serde_json::to_string_pretty(&value).map_err(|e| {
                        ConvertError::Failed(format!("Failed to format JSON: {}", e))
                    }),
                }
            }
            other => Err(ConvertError::InvalidInput(format!(
                "Unknown text format: {}",
                other
            ))),
        }
    }

    fn encode(text: &str, charset: &str) -> Result<Vec<u8>, ConvertError> {
        match charset {
            "text" => Ok(text.as_bytes().to_vec()),
            // encoding_rs never encodes into UTF-16
            "utf16le" => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            "latin1" => {
                let (encoded, _, unmappable) = WINDOWS_1252.encode(text);
                if unmappable {
                    return Err(ConvertError::Failed(
                        "Cannot encode to Latin-1: input contains unmappable characters".into(),
                    ));
                }
                Ok(encoded.into_owned())
            }
            "json" => serde_json::to_vec(text)
                .map_err(|e| ConvertError::Failed(format!("Failed to write JSON: {}", e))),
            other => Err(ConvertError::InvalidInput(format!(
                "Unknown text format: {}",
                other
            ))),
        }
    }
}

#[cfg(feature = "text")]
pub use text_impl::{TextHandler, latin1, utf16le};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn file(name: &str, bytes: &[u8]) -> FileData {
        FileData::new(name, bytes.to_vec())
    }

    fn lookup(handler: &dyn Handler, id: &str) -> Format {
        handler
            .supported_formats()
            .iter()
            .find(|f| f.internal_id == id)
            .cloned()
            .unwrap_or_else(|| panic!("{} does not declare {}", handler.name(), id))
    }

    #[cfg(feature = "zip")]
    fn read_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (entry.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn test_register_all() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();

        let names: Vec<_> = registry.handlers().map(|slot| slot.name().to_string()).collect();
        assert_eq!(names, vec!["image", "text", "zstd", "gzip", "zip"]);
        for id in ["png", "jpeg", "text", "latin1", "zst", "gz", "zip"] {
            assert!(registry.catalog().contains(id), "missing {}", id);
        }
    }

    #[test]
    fn test_every_probe_succeeds() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();

        for (name, result) in registry.initialize_all() {
            assert!(result.is_ok(), "{} failed: {:?}", name, result);
        }
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn test_zstd_compress_names() {
        let handler = ZstdHandler;
        let png = common::png().allow_from();
        let zst = lookup(&handler, "zst");

        let out = handler
            .convert(
                &[file("a.png", b"pixels"), file("notes.ZSTD", b"x"), file("README", b"y")],
                &png,
                &zst,
            )
            .unwrap();
        let names: Vec<_> = out.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.zst", "notes.ZSTD", "README.zst"]);
        assert_eq!(zstd::decode_all(out[0].bytes.as_slice()).unwrap(), b"pixels");
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn test_zstd_to_zip() {
        let handler = ZstdHandler;
        let zst = lookup(&handler, "zst");
        let zip_fmt = lookup(&handler, "zip");

        let inputs = vec![
            file("a.zst", &zstd::encode_all(&b"first"[..], 0).unwrap()),
            file(".zst", &zstd::encode_all(&b"second"[..], 0).unwrap()),
        ];
        let out = handler.convert(&inputs, &zst, &zip_fmt).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "output.zip");
        assert_eq!(
            read_zip(&out[0].bytes),
            vec![
                ("a".to_string(), b"first".to_vec()),
                (".zst.bin".to_string(), b"second".to_vec()),
            ]
        );
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn test_zstd_rejects_corrupt_input() {
        let handler = ZstdHandler;
        let err = handler
            .convert(
                &[file("bad.zst", b"not zstd")],
                &lookup(&handler, "zst"),
                &lookup(&handler, "zip"),
            )
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidInput(_)));
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn test_zstd_rejects_undeclared_pair() {
        let handler = ZstdHandler;
        let err = handler
            .convert(
                &[file("a.png", b"x")],
                &common::png().allow_from(),
                &lookup(&handler, "zip"),
            )
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedPair { .. }));
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_gzip_compress() {
        let handler = GzipHandler;
        let out = handler
            .convert(
                &[file("data.json", b"{\"a\":1}")],
                &common::json().allow_from(),
                &lookup(&handler, "gz"),
            )
            .unwrap();

        assert_eq!(out[0].name, "data.json.gz");
        let mut plain = Vec::new();
        flate2::read::GzDecoder::new(out[0].bytes.as_slice())
            .read_to_end(&mut plain)
            .unwrap();
        assert_eq!(plain, b"{\"a\":1}");
    }

    #[test]
    #[cfg(feature = "zip")]
    fn test_zip_packs_batch() {
        let handler = ZipHandler;
        let out = handler
            .convert(
                &[file("a.txt", b"alpha"), file("b.txt", b"beta")],
                &common::text().allow_from(),
                &lookup(&handler, "zip"),
            )
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "output.zip");
        assert_eq!(
            read_zip(&out[0].bytes),
            vec![
                ("a.txt".to_string(), b"alpha".to_vec()),
                ("b.txt".to_string(), b"beta".to_vec()),
            ]
        );
    }

    #[cfg(feature = "image")]
    fn sample_png() -> Vec<u8> {
        use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(4, 3, |x, y| {
            Rgba([(x * 60) as u8, (y * 80) as u8, 200, 255 - (x * 10) as u8])
        }));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    #[cfg(feature = "image")]
    fn test_png_to_jpeg_drops_alpha() {
        let handler = ImageHandler;
        let out = handler
            .convert(
                &[file("photo.png", &sample_png())],
                &lookup(&handler, "png"),
                &lookup(&handler, "jpeg"),
            )
            .unwrap();

        assert_eq!(out[0].name, "photo.jpg");
        let decoded = image::load_from_memory_with_format(&out[0].bytes, image::ImageFormat::Jpeg)
            .unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    #[cfg(feature = "image")]
    fn test_png_to_webp_is_lossless() {
        let handler = ImageHandler;
        let png = sample_png();
        let out = handler
            .convert(
                &[file("icon.png", &png)],
                &lookup(&handler, "png"),
                &lookup(&handler, "webp"),
            )
            .unwrap();

        let original = image::load_from_memory(&png).unwrap().to_rgba8();
        let roundtrip = image::load_from_memory_with_format(&out[0].bytes, image::ImageFormat::WebP)
            .unwrap()
            .to_rgba8();
        assert_eq!(original, roundtrip);
    }

    #[test]
    #[cfg(feature = "image")]
    fn test_image_rejects_garbage() {
        let handler = ImageHandler;
        let err = handler
            .convert(
                &[file("broken.png", b"definitely not a png")],
                &lookup(&handler, "png"),
                &lookup(&handler, "bmp"),
            )
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidInput(_)));
    }

    #[test]
    #[cfg(feature = "text")]
    fn test_text_to_utf16le_and_back() {
        let handler = TextHandler;
        let text = lookup(&handler, "text");
        let utf16 = lookup(&handler, "utf16le");

        let out = handler
            .convert(&[file("hi.txt", "h\u{e9}".as_bytes())], &text, &utf16)
            .unwrap();
        assert_eq!(out[0].bytes, vec![0x68, 0x00, 0xe9, 0x00]);

        let back = handler.convert(&out, &utf16, &text).unwrap();
        assert_eq!(back[0].bytes, "h\u{e9}".as_bytes());
    }

    #[test]
    #[cfg(feature = "text")]
    fn test_latin1_roundtrip_and_unmappable() {
        let handler = TextHandler;
        let text = lookup(&handler, "text");
        let latin = lookup(&handler, "latin1");

        let out = handler
            .convert(&[file("menu.txt", b"caf\xe9")], &latin, &text)
            .unwrap();
        assert_eq!(String::from_utf8(out[0].bytes.clone()).unwrap(), "caf\u{e9}");

        let err = handler
            .convert(&[file("jp.txt", "\u{65e5}\u{672c}".as_bytes())], &text, &latin)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Failed(_)));
    }

    #[test]
    #[cfg(feature = "text")]
    fn test_json_wrapping() {
        let handler = TextHandler;
        let text = lookup(&handler, "text");
        let json = lookup(&handler, "json");

        let wrapped = handler
            .convert(&[file("quote.txt", b"say \"hi\"")], &text, &json)
            .unwrap();
        assert_eq!(wrapped[0].name, "quote.json");
        assert_eq!(wrapped[0].bytes, br#""say \"hi\"""#);

        let pretty = handler
            .convert(&[file("doc.json", br#"{"a":[1,2]}"#)], &json, &text)
            .unwrap();
        assert_eq!(pretty[0].name, "doc.txt");
        assert_eq!(
            String::from_utf8(pretty[0].bytes.clone()).unwrap(),
            "{\n  \"a\": [\n    1,\n    2\n  ]\n}"
        );

        let err = handler
            .convert(&[file("bad.json", b"{oops")], &json, &text)
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidInput(_)));
    }

    #[test]
    #[cfg(feature = "text")]
    fn test_text_json_text_is_identity() {
        let handler = TextHandler;
        let text = lookup(&handler, "text");
        let json = lookup(&handler, "json");
        let original = "line one\nsay \"hi\" \u{2603}";

        let wrapped = handler
            .convert(&[file("note.txt", original.as_bytes())], &text, &json)
            .unwrap();
        let unwrapped = handler.convert(&wrapped, &json, &text).unwrap();

        assert_eq!(unwrapped[0].name, "note.txt");
        assert_eq!(String::from_utf8(unwrapped[0].bytes.clone()).unwrap(), original);
    }
}
