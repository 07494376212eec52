use crate::directive::ImageRef;
use crate::store::{ImageStore, StoreError, StoredImage};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageResult, Rgb, RgbImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use walkdir::WalkDir;

pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "svg"];

pub const MAX_IMAGE_WIDTH: u32 = 1200;
const JPEG_QUALITY: u8 = 85;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-.]").unwrap());

fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

pub fn is_allowed_image(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    UNSAFE_CHARS
        .replace_all(&base.replace(' ', "_"), "")
        .into_owned()
}

/// Downscale images wider than [`MAX_IMAGE_WIDTH`] and recompress them. The
/// original bytes are kept when decoding fails or the result is not smaller.
/// SVG and GIF pass through untouched.
pub fn process_image<'a>(filename: &str, bytes: &'a [u8]) -> Cow<'a, [u8]> {
    let Some(ext) = extension_of(filename) else {
        return Cow::Borrowed(bytes);
    };
    if !matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "webp") {
        return Cow::Borrowed(bytes);
    }
    match recompress(&ext, bytes) {
        Ok(processed) if processed.len() < bytes.len() => {
            tracing::info!(
                filename,
                before = bytes.len(),
                after = processed.len(),
                "image compressed"
            );
            Cow::Owned(processed)
        }
        Ok(processed) => {
            tracing::debug!(
                filename,
                original = bytes.len(),
                processed = processed.len(),
                "keeping original image"
            );
            Cow::Borrowed(bytes)
        }
        Err(err) => {
            tracing::warn!(filename, %err, "could not process image, storing as is");
            Cow::Borrowed(bytes)
        }
    }
}

fn recompress(ext: &str, bytes: &[u8]) -> ImageResult<Vec<u8>> {
    let mut img = image::load_from_memory(bytes)?;
    if img.width() > MAX_IMAGE_WIDTH {
        let height = (u64::from(img.height()) * u64::from(MAX_IMAGE_WIDTH)
            / u64::from(img.width()))
        .max(1) as u32;
        tracing::debug!(
            width = img.width(),
            height = img.height(),
            new_height = height,
            "downscaling image"
        );
        img = img.resize_exact(MAX_IMAGE_WIDTH, height, FilterType::Lanczos3);
    }

    let mut out = Vec::new();
    match ext {
        "jpg" | "jpeg" => {
            let rgb = if img.color().has_alpha() {
                flatten_on_white(&img)
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
        }
        "png" => img.write_with_encoder(PngEncoder::new_with_quality(
            &mut out,
            CompressionType::Best,
            PngFilter::Adaptive,
        ))?,
        // The codec only writes lossless WebP.
        _ => img.write_with_encoder(WebPEncoder::new_lossless(&mut out))?,
    }
    Ok(out)
}

fn flatten_on_white(img: &DynamicImage) -> DynamicImage {
    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        rgb.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    DynamicImage::ImageRgb8(rgb)
}

fn preview_url(filename: &str) -> String {
    ImageRef::new(filename).preview_url()
}

#[derive(Debug, Clone)]
pub struct FsImageStore {
    dir: PathBuf,
}

impl FsImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn unique_name(&self, filename: &str) -> String {
        let (base, ext) = match filename.rsplit_once('.') {
            Some((base, ext)) => (base, format!(".{ext}")),
            None => (filename, String::new()),
        };
        let mut candidate = filename.to_string();
        let mut counter = 1;
        while self.dir.join(&candidate).exists() {
            candidate = format!("{base}_{counter}{ext}");
            counter += 1;
        }
        candidate
    }
}

impl ImageStore for FsImageStore {
    fn list(&self) -> Result<Vec<StoredImage>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut found: Vec<(SystemTime, StoredImage)> = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !is_allowed_image(&filename) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((
                modified,
                StoredImage {
                    url: preview_url(&filename),
                    filename,
                },
            ));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.filename.cmp(&b.1.filename)));
        Ok(found.into_iter().map(|(_, image)| image).collect())
    }

    fn upload(&mut self, name: &str, bytes: &[u8]) -> Result<StoredImage, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::MissingFilename);
        }
        if !is_allowed_image(name) {
            return Err(StoreError::InvalidImageType {
                allowed: ALLOWED_EXTENSIONS.join(", "),
            });
        }
        let sanitized = sanitize_filename(name);
        if sanitized.is_empty() || sanitized.starts_with('.') {
            return Err(StoreError::MissingFilename);
        }

        fs::create_dir_all(&self.dir).map_err(|err| StoreError::io("create", &self.dir, err))?;
        let filename = self.unique_name(&sanitized);
        let path = self.dir.join(&filename);
        let data = process_image(&filename, bytes);
        fs::write(&path, &data).map_err(|err| StoreError::io("write", &path, err))?;
        tracing::info!(filename = %filename, bytes = data.len(), "image stored");

        Ok(StoredImage {
            url: preview_url(&filename),
            filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FsImageStore, MAX_IMAGE_WIDTH, flatten_on_white, is_allowed_image, process_image,
        sanitize_filename,
    };
    use crate::store::{ImageStore, StoreError};
    use image::codecs::png::PngEncoder;
    use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
    use std::borrow::Cow;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let mut seed = 0x2545_f491u32;
        let img = RgbImage::from_fn(width, height, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            Rgb([seed as u8, (seed >> 8) as u8, (seed >> 16) as u8])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(PngEncoder::new(&mut out))
            .unwrap();
        out
    }

    #[test]
    fn wide_png_is_downscaled_on_upload() {
        let dir = TempDir::new().unwrap();
        let mut store = FsImageStore::new(dir.path());
        let original = noisy_png(1600, 40);
        let stored = store.upload("wide.png", &original).unwrap();

        let written = fs::read(dir.path().join(&stored.filename)).unwrap();
        assert!(written.len() < original.len());
        let img = image::load_from_memory(&written).unwrap();
        assert_eq!((img.width(), img.height()), (MAX_IMAGE_WIDTH, 30));
    }

    #[test]
    fn svg_and_gif_pass_through() {
        let dir = TempDir::new().unwrap();
        let mut store = FsImageStore::new(dir.path());
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="4000" height="10"/>"#;
        let stored = store.upload("logo.svg", svg).unwrap();
        assert_eq!(fs::read(dir.path().join(stored.filename)).unwrap(), svg);

        let gif = noisy_png(1600, 4);
        assert!(matches!(process_image("anim.gif", &gif), Cow::Borrowed(_)));
    }

    #[test]
    fn undecodable_bytes_are_stored_as_is() {
        assert!(matches!(
            process_image("broken.png", b"not a png"),
            Cow::Borrowed(b) if b == b"not a png"
        ));
        assert!(matches!(process_image("broken.jpg", b""), Cow::Borrowed(_)));
    }

    #[test]
    fn transparency_is_flattened_onto_white() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(2, 0, Rgba([0, 0, 0, 128]));
        let flat = flatten_on_white(&DynamicImage::ImageRgba8(img)).to_rgb8();
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [255, 0, 0]);
        assert_eq!(flat.get_pixel(2, 0).0, [127, 127, 127]);
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("/tmp/My Photo (1).png"), "My_Photo_1.png");
        assert_eq!(sanitize_filename("C:\\pics\\café.jpg"), "café.jpg");
        assert_eq!(sanitize_filename("a$b%c.gif"), "abc.gif");
    }

    #[test]
    fn extensions_are_case_insensitive() {
        assert!(is_allowed_image("x.PNG"));
        assert!(is_allowed_image("x.jpeg"));
        assert!(!is_allowed_image("x.bmp"));
        assert!(!is_allowed_image("png"));
    }

    #[test]
    fn upload_avoids_collisions() {
        let dir = TempDir::new().unwrap();
        let mut store = FsImageStore::new(dir.path().join("images"));
        let a = store.upload("cat pic.png", b"1").unwrap();
        let b = store.upload("cat pic.png", b"2").unwrap();
        let c = store.upload("cat pic.png", b"3").unwrap();
        assert_eq!(a.filename, "cat_pic.png");
        assert_eq!(b.filename, "cat_pic_1.png");
        assert_eq!(c.filename, "cat_pic_2.png");
        assert_eq!(b.url, "/static/images/cat_pic_1.png");
        assert_eq!(fs::read(dir.path().join("images/cat_pic.png")).unwrap(), b"1");
    }

    #[test]
    fn upload_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        let mut store = FsImageStore::new(dir.path());
        assert!(matches!(
            store.upload("notes.txt", b""),
            Err(StoreError::InvalidImageType { .. })
        ));
        assert!(matches!(
            store.upload("", b""),
            Err(StoreError::MissingFilename)
        ));
    }

    #[test]
    fn list_is_newest_first_and_skips_other_files() {
        let dir = TempDir::new().unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);
        for (i, name) in ["old.png", "mid.JPG", "new.svg", "readme.md"].iter().enumerate() {
            let path = dir.path().join(name);
            fs::write(&path, b"x").unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(base + Duration::from_secs(60 * i as u64))
                .unwrap();
        }

        let store = FsImageStore::new(dir.path());
        let names: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|img| img.filename)
            .collect();
        assert_eq!(names, ["new.svg", "mid.JPG", "old.png"]);
    }
}
