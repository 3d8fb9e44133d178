//! Content inspection: content-type sniffing from magic bytes and the
//! pixel-dimension probe used by the `dimensions` rule

use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// How many leading bytes of a resource are inspected when sniffing
pub const SNIFF_LEN: usize = 8 * 1024;

pub const SVG: &str = "image/svg+xml";
pub const EMPTY: &str = "application/x-empty";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT: &str = "text/plain";

/// Reads pixel dimensions out of a stored file without decoding it fully
pub trait DimensionProbe: Send + Sync {
    /// `None` when the file is not an image this probe understands
    fn probe(&self, path: &Path) -> Option<(u32, u32)>;
}

/// The default probe, backed by the `image` crate's header readers
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageProbe;

impl DimensionProbe for ImageProbe {
    fn probe(&self, path: &Path) -> Option<(u32, u32)> {
        let reader = match image::io::Reader::open(path).and_then(|r| r.with_guessed_format()) {
            Ok(reader) => reader,
            Err(e) => {
                debug!("cannot open {} for probing: {e}", path.display());
                return None;
            }
        };

        match reader.into_dimensions() {
            Ok((width, height)) if width > 0 && height > 0 => Some((width, height)),
            Ok(_) => None,
            Err(e) => {
                debug!("{} is not a probeable image: {e}", path.display());
                None
            }
        }
    }
}

/// Best-effort content type of a byte prefix
pub fn sniff(head: &[u8]) -> &'static str {
    if head.is_empty() {
        return EMPTY;
    }

    if let Ok(format) = image::guess_format(head) {
        if let Some(mime) = raster_mime(format) {
            return mime;
        }
    }

    if looks_like_svg(head) {
        SVG
    } else if head.starts_with(b"%PDF-") {
        "application/pdf"
    } else if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        "application/zip"
    } else if head.starts_with(&[0x1f, 0x8b]) {
        "application/gzip"
    } else if is_text(head) {
        TEXT
    } else {
        OCTET_STREAM
    }
}

/// The canonical file extension for a sniffed content type
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let ext = match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/x-icon" => "ico",
        "image/tiff" => "tif",
        "image/avif" => "avif",
        "image/qoi" => "qoi",
        "image/x-farbfeld" => "ff",
        "image/x-portable-anymap" => "pnm",
        "image/vnd.radiance" => "hdr",
        "image/x-exr" => "exr",
        "image/vnd-ms.dds" => "dds",
        SVG => "svg",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/gzip" => "gz",
        TEXT => "txt",
        _ => return None,
    };
    Some(ext)
}

fn raster_mime(format: ImageFormat) -> Option<&'static str> {
    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Avif => "image/avif",
        ImageFormat::Qoi => "image/qoi",
        ImageFormat::Farbfeld => "image/x-farbfeld",
        ImageFormat::Pnm => "image/x-portable-anymap",
        ImageFormat::Hdr => "image/vnd.radiance",
        ImageFormat::OpenExr => "image/x-exr",
        ImageFormat::Dds => "image/vnd-ms.dds",
        _ => return None,
    };
    Some(mime)
}

/// SVG documents: the first element after any XML declaration, comments
/// and doctype must be `<svg`
fn looks_like_svg(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    let mut rest = text.trim_start_matches('\u{feff}').trim_start();

    loop {
        let skip = if rest.starts_with("<?") {
            rest.find("?>").map(|i| i + 2)
        } else if rest.starts_with("<!--") {
            rest.find("-->").map(|i| i + 3)
        } else if rest.starts_with("<!") {
            rest.find('>').map(|i| i + 1)
        } else {
            break;
        };

        match skip {
            Some(i) => rest = rest[i..].trim_start(),
            None => return false,
        }
    }

    rest.strip_prefix("<svg")
        .and_then(|after| after.chars().next())
        .map_or(false, |c| c.is_whitespace() || c == '>' || c == '/')
}

/// UTF-8 without NUL bytes. A multi-byte sequence cut off by the sniff
/// window still counts as text.
fn is_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test;

    #[test]
    fn test_sniff_raster() {
        assert_eq!(sniff(&test::png(4, 4)), "image/png");
        assert_eq!(sniff(&test::jpeg(4, 4)), "image/jpeg");
        assert_eq!(sniff(&test::gif(4, 4)), "image/gif");
    }

    #[test]
    fn test_sniff_svg() {
        assert_eq!(sniff(test::SVG.as_bytes()), SVG);
        assert_eq!(
            sniff(b"<?xml version=\"1.0\"?>\n<!-- logo -->\n<!DOCTYPE svg>\n<svg/>"),
            SVG
        );
        // an html page that merely embeds an svg is not an svg document
        assert_eq!(sniff(b"<html><body><svg></svg></body></html>"), TEXT);
        assert_eq!(sniff(b"<svgfoo>"), TEXT);
    }

    #[test]
    fn test_sniff_other() {
        assert_eq!(sniff(b""), EMPTY);
        assert_eq!(sniff(b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(sniff(b"PK\x03\x04rest"), "application/zip");
        assert_eq!(sniff(b"hello world"), TEXT);
        assert_eq!(sniff(&[0xaa, 0x00, 0xff, 0x13]), OCTET_STREAM);
        // truncated multi-byte character at the end of the window
        assert_eq!(sniff(&[b'a', 0xe2, 0x82]), TEXT);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for(SVG), Some("svg"));
        assert_eq!(extension_for(OCTET_STREAM), None);
        assert_eq!(extension_for(EMPTY), None);
    }

    #[test]
    fn test_image_size() {
        let png = test::file_with(&test::png(100, 200));
        assert_eq!(ImageProbe.probe(png.path()), Some((100, 200)));

        let garbage = test::file_with(&test::garbage(50));
        assert_eq!(ImageProbe.probe(garbage.path()), None);

        let svg = test::file_with(test::SVG.as_bytes());
        assert_eq!(ImageProbe.probe(svg.path()), None);
    }
}
