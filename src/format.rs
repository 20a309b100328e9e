// Format Normalizer (C2): magic-byte sniffing, extension correction, and
// conversion to a canonical decodable form.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use image::ImageFormat as ImgFmt;
use libheif_rs::{HeifContext, ColorSpace, RgbChroma};

use crate::error::{CatalogIngestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Heic,
    Heif,
    Jpg,
    Png,
    Gif,
    Bmp,
    Ico,
    Tiff,
    Pdf,
    Zip,
    Rar,
    Gz,
    Bz2,
    Docx,
    Doc,
    Unknown,
}

impl SniffedFormat {
    fn extension(self) -> Option<&'static str> {
        match self {
            SniffedFormat::Heic => Some("heic"),
            SniffedFormat::Heif => Some("heif"),
            SniffedFormat::Jpg => Some("jpg"),
            SniffedFormat::Png => Some("png"),
            SniffedFormat::Gif => Some("gif"),
            SniffedFormat::Bmp => Some("bmp"),
            SniffedFormat::Ico => Some("ico"),
            SniffedFormat::Tiff => Some("tiff"),
            SniffedFormat::Pdf => Some("pdf"),
            SniffedFormat::Zip => Some("zip"),
            SniffedFormat::Rar => Some("rar"),
            SniffedFormat::Gz => Some("gz"),
            SniffedFormat::Bz2 => Some("bz2"),
            SniffedFormat::Docx => Some("docx"),
            SniffedFormat::Doc => Some("doc"),
            SniffedFormat::Unknown => None,
        }
    }

    fn is_image(self) -> bool {
        matches!(
            self,
            SniffedFormat::Heic
                | SniffedFormat::Heif
                | SniffedFormat::Jpg
                | SniffedFormat::Png
                | SniffedFormat::Gif
                | SniffedFormat::Bmp
                | SniffedFormat::Ico
                | SniffedFormat::Tiff
        )
    }
}

const HEIC_MARKERS: [&[u8]; 7] = [
    b"ftypheic", b"ftypmif1", b"ftypmsf1", b"ftypheix", b"ftypheim", b"ftyphevc", b"ftyphe",
];
const HEIF_MARKERS: [&[u8]; 3] = [b"ftyphe", b"ftypmif1", b"ftypmsf1"];
const SIZE_PREFIXES: [[u8; 4]; 5] = [
    [0x00, 0x00, 0x00, 0x18],
    [0x00, 0x00, 0x00, 0x24],
    [0x00, 0x00, 0x00, 0x28],
    [0x00, 0x00, 0x00, 0x2C],
    [0x00, 0x00, 0x00, 0x20],
];

fn starts_with_prefix_and_marker(header: &[u8], prefix: &[u8; 4], marker: &[u8]) -> bool {
    let mut candidate = Vec::with_capacity(4 + marker.len());
    candidate.extend_from_slice(prefix);
    candidate.extend_from_slice(marker);
    header.starts_with(&candidate)
}

/// Sniffs the actual format from the first 10 bytes of a file. HEIC markers
/// are tested before the smaller HEIF marker set, so a header matching both
/// sets is classified heic.
pub fn sniff(header: &[u8]) -> SniffedFormat {
    if header.is_empty() {
        return SniffedFormat::Unknown;
    }

    for prefix in SIZE_PREFIXES {
        if HEIC_MARKERS.iter().any(|m| starts_with_prefix_and_marker(header, &prefix, m)) {
            return SniffedFormat::Heic;
        }
        if HEIF_MARKERS.iter().any(|m| starts_with_prefix_and_marker(header, &prefix, m)) {
            return SniffedFormat::Heif;
        }
    }

    if header.starts_with(&[0xFF, 0xD8]) {
        SniffedFormat::Jpg
    } else if header.starts_with(b"\x89PNG") {
        SniffedFormat::Png
    } else if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        SniffedFormat::Gif
    } else if header.starts_with(b"BM") {
        SniffedFormat::Bmp
    } else if header.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        SniffedFormat::Ico
    } else if header.starts_with(b"II*\x00") || header.starts_with(b"MM\x00*") {
        SniffedFormat::Tiff
    } else if header.starts_with(b"\x25PDF") {
        SniffedFormat::Pdf
    } else if header.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        SniffedFormat::Zip
    } else if header.starts_with(&[0x52, 0x61, 0x72, 0x21]) {
        SniffedFormat::Rar
    } else if header.starts_with(&[0x1F, 0x8B]) {
        SniffedFormat::Gz
    } else if header.starts_with(&[0x42, 0x5A, 0x68]) {
        SniffedFormat::Bz2
    } else if header.starts_with(b"PK") {
        SniffedFormat::Docx
    } else if header.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        SniffedFormat::Doc
    } else {
        SniffedFormat::Unknown
    }
}

/// Normalizes a file in place: corrects its extension if it disagrees with
/// the sniffed format, converts HEIC and other non-JPEG/PNG/GIF image
/// formats to JPEG (deleting the original), and returns the resulting path.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    let mut header = [0u8; 10];
    let mut file = File::open(path)?;
    let read = file.read(&mut header)?;
    drop(file);
    let header = &header[..read];

    let format = sniff(header);
    if !format.is_image() {
        return Err(CatalogIngestError::Format(format!(
            "{}: unsupported or unknown format",
            path.display()
        )));
    }

    let mut current = path.to_path_buf();
    if let Some(expected_ext) = format.extension() {
        let current_ext = current.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        if current_ext != expected_ext {
            let renamed = current.with_extension(expected_ext);
            std::fs::rename(&current, &renamed)?;
            current = renamed;
        }
    }

    current = match format {
        SniffedFormat::Heic => convert_heic_to_jpg(&current)?,
        SniffedFormat::Png | SniffedFormat::Gif | SniffedFormat::Jpg => current,
        _ => convert_to_jpg(&current)?,
    };

    Ok(current)
}

fn convert_heic_to_jpg(path: &Path) -> Result<PathBuf> {
    let ctx = HeifContext::read_from_file(path.to_str().ok_or_else(|| {
        CatalogIngestError::Format(format!("non-utf8 path: {}", path.display()))
    })?)
    .map_err(|e| CatalogIngestError::Format(format!("failed to read heic {}: {e}", path.display())))?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| CatalogIngestError::Format(format!("no primary image in {}: {e}", path.display())))?;
    let image = handle
        .decode(ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| CatalogIngestError::Format(format!("failed to decode heic {}: {e}", path.display())))?;

    let width = image.width();
    let height = image.height();
    let planes = image.planes();
    let interleaved = planes
        .interleaved
        .ok_or_else(|| CatalogIngestError::Format(format!("no interleaved plane for {}", path.display())))?;

    let stride = interleaved.stride;
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for row in 0..height {
        let start = (row as usize) * stride;
        let row_bytes = &interleaved.data[start..start + (width as usize) * 3];
        rgb.extend_from_slice(row_bytes);
    }

    let buffer = image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| CatalogIngestError::Format(format!("inconsistent heic buffer for {}", path.display())))?;

    let new_path = path.with_extension("jpg");
    buffer
        .save_with_format(&new_path, ImgFmt::Jpeg)
        .map_err(|e| CatalogIngestError::Format(format!("failed to write {}: {e}", new_path.display())))?;

    std::fs::remove_file(path)?;
    Ok(new_path)
}

fn convert_to_jpg(path: &Path) -> Result<PathBuf> {
    let img = image::open(path)
        .map_err(|e| CatalogIngestError::Format(format!("failed to open {}: {e}", path.display())))?;
    let new_path = path.with_extension("jpg");
    img.to_rgb8()
        .save_with_format(&new_path, ImgFmt::Jpeg)
        .map_err(|e| CatalogIngestError::Format(format!("failed to write {}: {e}", new_path.display())))?;

    std::fs::remove_file(path)?;
    Ok(new_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_header_is_unknown() {
        assert_eq!(sniff(&[]), SniffedFormat::Unknown);
    }

    #[test]
    fn jpeg_marker_sniffs_as_jpg() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), SniffedFormat::Jpg);
    }

    #[test]
    fn png_marker_sniffs_as_png() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n"), SniffedFormat::Png);
    }

    #[test]
    fn heic_marker_with_0x18_prefix_sniffs_as_heic() {
        let mut header = vec![0x00, 0x00, 0x00, 0x18];
        header.extend_from_slice(b"ftypheic");
        assert_eq!(sniff(&header), SniffedFormat::Heic);
    }

    #[test]
    fn heic_wins_over_heif_on_overlapping_marker() {
        // "ftyphe" is a member of both marker sets; HEIC must win.
        let mut header = vec![0x00, 0x00, 0x00, 0x18];
        header.extend_from_slice(b"ftyphe");
        assert_eq!(sniff(&header), SniffedFormat::Heic);
    }

    #[test]
    fn pdf_marker_sniffs_as_pdf_and_is_not_an_image() {
        assert_eq!(sniff(b"%PDF-1.4"), SniffedFormat::Pdf);
        assert!(!SniffedFormat::Pdf.is_image());
    }

    #[test]
    fn gif_markers_both_versions_recognized() {
        assert_eq!(sniff(b"GIF87a"), SniffedFormat::Gif);
        assert_eq!(sniff(b"GIF89a"), SniffedFormat::Gif);
    }
}
