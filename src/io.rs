use base64::Engine;
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, ImageOutputFormat, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

use crate::scene::{SceneDocument, SceneError};

const DATA_URL_PREFIX: &str = "data:";

// ============================================================================
// ERRORS
// ============================================================================

/// Error type for image / texture / mask loading
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Decode(ImageError),
    InvalidDataUrl(String),
    Unsupported(String),
    /// The loader panicked; carries the panic message.
    LoaderPanicked(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::Decode(e) => write!(f, "Image decode error: {}", e),
            LoadError::InvalidDataUrl(e) => write!(f, "Invalid data URL: {}", e),
            LoadError::Unsupported(e) => write!(f, "Unsupported source: {}", e),
            LoadError::LoaderPanicked(e) => write!(f, "Loader panicked: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<ImageError> for LoadError {
    fn from(e: ImageError) -> Self {
        LoadError::Decode(e)
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// Decode a `data:` URL payload to raw bytes (base64 or percent-encoded).
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, LoadError> {
    let rest = url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| LoadError::InvalidDataUrl("URL does not start with 'data:'".to_string()))?;
    let (metadata, data) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::InvalidDataUrl("Missing comma in data URL".to_string()))?;

    let is_base64 = metadata
        .split(';')
        .skip(1)
        .any(|p| p.trim().eq_ignore_ascii_case("base64"));

    if is_base64 {
        // Tolerate line-wrapped payloads
        let cleaned: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| LoadError::InvalidDataUrl(format!("Invalid base64: {e}")))
    } else {
        percent_decode(data)
    }
}

fn percent_decode(input: &str) -> Result<Vec<u8>, LoadError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| LoadError::InvalidDataUrl("Invalid percent-escape".to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

/// Decode an in-memory encoded image (format sniffed from the bytes).
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbaImage, LoadError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Resolve an image source as it appears in scene documents: a `data:` URL,
/// a `file://` URL, or a filesystem path (relative paths resolve against
/// `base_dir`).  Network URLs are not fetched.
pub fn load_image_source(source: &str, base_dir: &Path) -> Result<RgbaImage, LoadError> {
    let source = source.trim();
    if source.starts_with(DATA_URL_PREFIX) {
        return decode_image_bytes(&decode_data_url(source)?);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return Err(LoadError::Unsupported(format!("network source '{}'", source)));
    }
    let path = resolve_path(source.strip_prefix("file://").unwrap_or(source), base_dir);
    Ok(image::open(&path)?.to_rgba8())
}

fn resolve_path(source: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(source);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

/// Read and parse a scene document (preset or custom upload) from disk.
pub fn load_scene_document(path: &Path) -> Result<SceneDocument, SceneError> {
    let text = std::fs::read_to_string(path)?;
    SceneDocument::from_json(&text)
}

/// Encode as a PNG `data:` URL (the form masks take inside scene documents).
pub fn encode_png_data_url(image: &RgbaImage) -> Result<String, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut buf, ImageOutputFormat::Png)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
    Ok(format!("data:image/png;base64,{}", b64))
}

// ============================================================================
// ENCODING
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    /// Format implied by a path's extension, PNG when absent or unknown.
    pub fn for_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_default()
    }

    pub fn supports_quality(&self) -> bool {
        matches!(self, SaveFormat::Jpeg | SaveFormat::Webp)
    }
}

/// Encode and write an image to a file.
/// This is a standalone function so it can be called from background
/// threads via `rayon::spawn`.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Webp => {
            drop(writer);
            DynamicImage::ImageRgba8(image.clone()).save(path)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tiff => {
            TiffEncoder::new(&mut writer).encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn decodes_base64_and_percent_data_urls() {
        assert_eq!(decode_data_url("data:text/plain;base64,SGk=").unwrap(), b"Hi");
        assert_eq!(decode_data_url("data:,a%20b").unwrap(), b"a b");
        assert!(matches!(decode_data_url("data:,%2"), Err(LoadError::InvalidDataUrl(_))));
        assert!(matches!(decode_data_url("nope"), Err(LoadError::InvalidDataUrl(_))));
        assert!(matches!(decode_data_url("data:;base64"), Err(LoadError::InvalidDataUrl(_))));
    }

    #[test]
    fn png_data_url_round_trips_pixels() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([122, 5, 5, 100]));
        let url = encode_png_data_url(&img).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        let back = load_image_source(&url, Path::new(".")).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn network_sources_are_refused() {
        let r = load_image_source("https://example.com/a.png", Path::new("."));
        assert!(matches!(r, Err(LoadError::Unsupported(_))));
    }

    #[test]
    fn format_from_path() {
        assert_eq!(SaveFormat::for_path(Path::new("out.JPG")), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::for_path(Path::new("out")), SaveFormat::Png);
        assert_eq!(SaveFormat::for_path(Path::new("out.xyz")), SaveFormat::Png);
    }

    #[test]
    fn writes_png_to_disk() {
        let dir = std::env::temp_dir().join(format!("masonry-io-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.png");
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        encode_and_write(&img, &path, SaveFormat::Png, 90).unwrap();
        let back = load_image_source(path.to_str().unwrap(), Path::new("/")).unwrap();
        assert_eq!(back, img);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
