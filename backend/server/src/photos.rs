//! Participant photos.
//!
//! Uploads are decoded, turned upright according to their EXIF orientation
//! and re-encoded as RGB JPEG before they touch the disk, so the rest of the
//! service only ever serves `.jpg` files it produced itself.

use std::{io::Cursor, path::Path, sync::LazyLock};

use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, codecs::jpeg::JpegEncoder};
use regex::Regex;
use tokio::{fs, task::spawn_blocking};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::error::AppError;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
pub const JPEG_QUALITY: u8 = 90;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

fn base_name(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)
}

/// Lowercased extension without the dot.
pub fn extension(file_name: &str) -> Option<String> {
    let base = base_name(file_name);

    match base.rfind('.') {
        Some(dot) if dot > 0 => Some(base[dot + 1..].to_ascii_lowercase()),
        _ => None,
    }
}

pub fn is_allowed(file_name: &str) -> bool {
    extension(file_name).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// File stem reduced to characters that are safe in a path segment.
///
/// Accented letters are decomposed first so `Zdjęcie` keeps its `e`.
pub fn secure_stem(file_name: &str) -> String {
    let base = base_name(file_name);
    let stem = match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    };
    let ascii: String = stem.nfkd().filter(char::is_ascii).collect();

    let s = WHITESPACE.replace_all(ascii.trim(), "_");
    let s = UNSAFE_CHARS.replace_all(&s, "");

    s.trim_matches(['.', '_']).to_string()
}

pub fn photo_file_name(original_name: &str) -> String {
    let mut stem = secure_stem(original_name);
    if stem.is_empty() {
        stem = Uuid::new_v4().simple().to_string();
    }

    format!("{stem}-{}.jpg", Uuid::new_v4().simple())
}

pub fn photo_url(file_name: &str) -> String {
    format!("/u/{file_name}")
}

pub fn normalize_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    let rgb = image.into_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rgb)?;

    Ok(jpeg)
}

/// Normalizes the upload on the blocking pool and writes it under `upload_dir`.
pub async fn store_photo(
    upload_dir: &Path,
    original_name: &str,
    bytes: Vec<u8>,
) -> Result<String, AppError> {
    let jpeg = spawn_blocking(move || normalize_to_jpeg(&bytes))
        .await
        .map_err(|e| AppError::InternalError(Box::new(e)))?
        .map_err(|e| AppError::UnsupportedPhoto(e.to_string()))?;

    let file_name = photo_file_name(original_name);
    fs::write(upload_dir.join(&file_name), jpeg).await?;

    debug!("Stored photo {file_name}");

    Ok(file_name)
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(extension("cat.JPG"), Some("jpg".to_string()));
        assert_eq!(extension("dir/cat.tar.webp"), Some("webp".to_string()));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension(".hidden"), None);
    }

    #[test]
    fn test_is_allowed() {
        assert!(is_allowed("me.jpeg"));
        assert!(is_allowed("ME.PNG"));
        assert!(!is_allowed("me.gif"));
        assert!(!is_allowed("me.heic"));
        assert!(!is_allowed("me"));
    }

    #[test]
    fn test_secure_stem() {
        assert_eq!(secure_stem("my photo.jpg"), "my_photo");
        assert_eq!(secure_stem("../../etc/passwd.png"), "passwd");
        assert_eq!(secure_stem("C:\\Users\\me\\Zdjęcie 1.jpg"), "Zdjecie_1");
        assert_eq!(secure_stem("__init__.png"), "init");
    }

    #[test]
    fn test_secure_stem_transliterates() {
        assert_eq!(secure_stem("ąęść.jpg"), "aesc");
        assert_eq!(secure_stem("Łódź nocą.png"), "odz_noca");
        assert_eq!(secure_stem("ﬁle①.png"), "file1");
    }

    #[test]
    fn test_secure_stem_can_be_empty() {
        assert_eq!(secure_stem("!!!.png"), "");
        assert_eq!(secure_stem("日本.png"), "");
    }

    #[test]
    fn test_photo_file_name() {
        let name = photo_file_name("holiday snap.PNG");
        assert!(name.starts_with("holiday_snap-"));
        assert!(name.ends_with(".jpg"));

        let fallback = photo_file_name("???.png");
        assert!(fallback.ends_with(".jpg"));
        assert!(fallback.len() > "-.jpg".len() + 32);
    }

    #[test]
    fn test_normalize_png_to_jpeg() {
        let image = RgbImage::from_pixel(4, 3, Rgb([200, 10, 10]));
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let jpeg = normalize_to_jpeg(&png).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_to_jpeg(b"definitely not an image").is_err());
    }
}
