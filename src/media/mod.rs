//! Image preparation for the output target.
//!
//! Every `image/*` binary is classified, resized, recoded, and named for
//! the output container. Kindle-family targets get opaque JPEG everywhere
//! (SVG rasterized, transparency flattened against white); EPUB-family
//! targets keep formats as close to the source as possible.
//!
//! Failures are never fatal: an undecodable image either keeps its
//! original bytes (`use_broken`) or is replaced by the embedded
//! placeholder, and processing moves on to the next binary.

pub mod jfif;

use std::collections::HashSet;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat};
use resvg::{tiny_skia, usvg};
use thiserror::Error;

use crate::book::{Binary, Book};
use crate::config::{CoverResize, NormalizeConfig};
use crate::diag::{Diagnostics, WarnKind};

/// The embedded "image not found" placeholder. Pure paths, so it renders
/// without font support.
pub(crate) const PLACEHOLDER_SVG: &[u8] = br##"<svg xmlns="http://www.w3.org/2000/svg" width="96" height="96" viewBox="0 0 96 96">
  <rect x="3" y="3" width="90" height="90" fill="#f2f2f2" stroke="#7a7a7a" stroke-width="4"/>
  <path d="M24 24 L72 72 M72 24 L24 72" stroke="#b04a4a" stroke-width="6" fill="none"/>
</svg>
"##;

/// Stroke boost applied to built-in vignettes rasterized for Kindle
/// screens; hairlines disappear on e-ink otherwise.
const KINDLE_STROKE_SCALE: f32 = 2.0;

/// JFIF density stamped into every produced JPEG.
const JPEG_DPI: u16 = 300;

#[derive(Error, Debug)]
enum MediaError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("svg rasterization failed: {0}")]
    Svg(String),
}

/// A processed image ready for the output container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    /// The source binary id.
    pub id: String,
    /// Final mime type after recoding.
    pub mime: String,
    pub data: Vec<u8>,
    /// `images/imgNNNNN.ext`, numbered over accepted images.
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

/// Accepted images in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookImages {
    images: Vec<PreparedImage>,
}

impl BookImages {
    pub fn get(&self, id: &str) -> Option<&PreparedImage> {
        self.images.iter().find(|image| image.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreparedImage> {
        self.images.iter()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub(crate) fn push(&mut self, image: PreparedImage) {
        self.images.push(image);
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&PreparedImage) -> bool) {
        self.images.retain(keep);
    }
}

/// Working result of one binary before a filename is assigned.
struct Processed {
    mime: String,
    data: Vec<u8>,
    width: u32,
    height: u32,
}

/// Decode, resize, recode, and name every image binary.
pub fn prepare_images(book: &Book, config: &NormalizeConfig, diag: &mut Diagnostics) -> BookImages {
    let cover_id = book.cover_id().map(str::to_string);
    let placeholder_id = book.placeholder_id.clone();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = BookImages::default();
    let mut sequence = 0usize;

    for binary in &book.binaries {
        if !binary.is_image() {
            continue;
        }
        if !seen.insert(binary.id.as_str()) {
            diag.warn(
                WarnKind::DuplicateBinaryId,
                &binary.id,
                "image binary with duplicate id skipped",
            );
            continue;
        }

        let is_cover = cover_id.as_deref() == Some(binary.id.as_str());
        let is_placeholder = placeholder_id.as_deref() == Some(binary.id.as_str());

        let result = if binary.is_svg() {
            process_svg(binary, config, is_cover, is_placeholder)
        } else {
            process_raster(binary, config, is_cover)
        };
        let processed = match result {
            Ok(processed) => processed,
            Err(err) => handle_image_error(binary, config, &err, diag),
        };

        sequence += 1;
        let filename = format!(
            "images/img{:05}.{}",
            sequence,
            ext_for_mime(&processed.mime)
        );
        out.push(PreparedImage {
            id: binary.id.clone(),
            mime: processed.mime,
            data: processed.data,
            filename,
            width: processed.width,
            height: processed.height,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// SVG branch
// ---------------------------------------------------------------------------

fn process_svg(
    binary: &Binary,
    config: &NormalizeConfig,
    is_cover: bool,
    is_placeholder: bool,
) -> Result<Processed, MediaError> {
    if !config.target.kindle() {
        let (width, height) = svg_intrinsic_size(&binary.data).unwrap_or((0, 0));
        return Ok(Processed {
            mime: "image/svg+xml".to_string(),
            data: binary.data.clone(),
            width,
            height,
        });
    }

    // Kindle has no SVG support; rasterize.
    let data;
    let source = if binary.builtin_vignette {
        data = boost_stroke_width(&binary.data, KINDLE_STROKE_SCALE);
        data.as_slice()
    } else {
        binary.data.as_slice()
    };
    let scale_to_width = if is_placeholder || binary.builtin_vignette {
        // Placeholder and vignettes keep their intrinsic size.
        None
    } else {
        Some(config.images.screen.width)
    };

    let mut img = rasterize_svg(source, scale_to_width)?;
    if is_cover {
        img = apply_cover_resize(img, config);
    } else {
        img = apply_scale_factor(img, config);
    }
    let gray = is_grayscale(&img);
    let data = encode_jpeg(&img, config.images.jpeg_quality, gray)?;
    Ok(Processed {
        mime: "image/jpeg".to_string(),
        data: jfif::ensure_density(data, JPEG_DPI, JPEG_DPI),
        width: img.width(),
        height: img.height(),
    })
}

fn rasterize_svg(data: &[u8], scale_to_width: Option<u32>) -> Result<DynamicImage, MediaError> {
    let options = usvg::Options::default();
    let tree =
        usvg::Tree::from_data(data, &options).map_err(|err| MediaError::Svg(err.to_string()))?;
    let size = tree.size();
    if size.width() <= 0.0 || size.height() <= 0.0 {
        return Err(MediaError::Svg("empty canvas".to_string()));
    }

    let (scale, width, height) = match scale_to_width {
        Some(target) => {
            let scale = target as f32 / size.width();
            let height = (size.height() * scale).round().max(1.0) as u32;
            (scale, target.max(1), height)
        }
        None => (
            1.0,
            (size.width().ceil() as u32).max(1),
            (size.height().ceil() as u32).max(1),
        ),
    };

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| MediaError::Svg("canvas allocation failed".to_string()))?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    let mut rgba = image::RgbaImage::new(width, height);
    for (pixel, out) in pixmap.pixels().iter().zip(rgba.pixels_mut()) {
        let c = pixel.demultiply();
        *out = image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(DynamicImage::ImageRgba8(rgba))
}

/// Multiply every numeric `stroke-width` in the SVG text by `factor`.
/// Anything that does not look like a bare number is left alone.
fn boost_stroke_width(data: &[u8], factor: f32) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(data) else {
        return data.to_vec();
    };
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("stroke-width") {
        let after = &rest[pos + "stroke-width".len()..];
        out.push_str(&rest[..pos]);
        out.push_str("stroke-width");

        // Attribute form `="1.5"` or style form `:1.5`.
        let mut chars = after.char_indices().peekable();
        let mut consumed = 0usize;
        let mut sep = None;
        while let Some(&(i, c)) = chars.peek() {
            match c {
                ' ' | '\t' => {
                    chars.next();
                }
                '=' | ':' => {
                    sep = Some(c);
                    chars.next();
                    consumed = i + c.len_utf8();
                    break;
                }
                _ => break,
            }
        }
        let Some(sep) = sep else {
            rest = after;
            continue;
        };

        let tail = &after[consumed..];
        let (quote, num_start) = match (sep, tail.as_bytes().first()) {
            ('=', Some(b'"')) => ("\"", 1),
            ('=', Some(b'\'')) => ("'", 1),
            (':', _) => ("", 0),
            _ => {
                rest = after;
                continue;
            }
        };
        let number: String = tail[num_start..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        match number.parse::<f32>() {
            Ok(value) if !number.is_empty() => {
                out.push_str(&after[..consumed]);
                out.push_str(quote);
                out.push_str(&format_number(value * factor));
                rest = &tail[num_start + number.len()..];
            }
            _ => {
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out.into_bytes()
}

fn format_number(value: f32) -> String {
    if (value - value.round()).abs() < f32::EPSILON {
        format!("{}", value.round() as i64)
    } else {
        format!("{value}")
    }
}

fn svg_intrinsic_size(data: &[u8]) -> Option<(u32, u32)> {
    let options = usvg::Options::default();
    let tree = usvg::Tree::from_data(data, &options).ok()?;
    let size = tree.size();
    Some((size.width().ceil() as u32, size.height().ceil() as u32))
}

// ---------------------------------------------------------------------------
// Raster branch
// ---------------------------------------------------------------------------

fn process_raster(
    binary: &Binary,
    config: &NormalizeConfig,
    is_cover: bool,
) -> Result<Processed, MediaError> {
    let mut img = image::load_from_memory(&binary.data)
        .map_err(|err| MediaError::Decode(err.to_string()))?;
    let mut mime = image::guess_format(&binary.data)
        .ok()
        .and_then(mime_for_format)
        .unwrap_or_else(|| binary.content_type.clone());
    let gray_source = is_grayscale(&img);
    let mut changed = false;

    if is_cover {
        let screen = config.images.screen;
        match config.images.cover {
            CoverResize::None => {}
            CoverResize::KeepAspectRatio => {
                // Only grow covers that fall short of the screen.
                if img.height() < screen.height {
                    img = resize_to_height(&img, screen.height);
                    changed = true;
                }
            }
            CoverResize::Stretch => {
                if img.width() != screen.width || img.height() != screen.height {
                    img = img.resize_exact(screen.width, screen.height, FilterType::Lanczos3);
                    changed = true;
                }
            }
        }
    } else {
        let factor = config.images.scale_factor;
        if factor > 0.0 && factor != 1.0 {
            let height = ((img.height() as f32 * factor).round() as u32).max(1);
            img = resize_to_height(&img, height);
            changed = true;
        }
    }

    let kindle = config.target.kindle();
    if (kindle || config.images.remove_transparency)
        && matches!(mime.as_str(), "image/png" | "image/gif")
        && has_transparency(&img)
    {
        img = flatten_white(&img);
        if mime == "image/gif" {
            mime = "image/png".to_string();
        }
        changed = true;
    }

    if config.images.optimize {
        match mime.as_str() {
            "image/jpeg" => {
                // Re-encode only when the source is visibly above the
                // configured quality; an unreadable estimate means leave
                // the bytes alone.
                if let Some(quality) = jfif::estimate_quality(&binary.data)
                    && quality > config.images.jpeg_quality
                {
                    changed = true;
                }
            }
            "image/png" => changed = true,
            _ => {}
        }
    }

    if kindle && mime != "image/jpeg" {
        mime = "image/jpeg".to_string();
        changed = true;
    }

    let data = if changed {
        encode(&img, &mime, config.images.jpeg_quality, gray_source)?
    } else {
        binary.data.clone()
    };
    let data = if mime == "image/jpeg" {
        jfif::ensure_density(data, JPEG_DPI, JPEG_DPI)
    } else {
        data
    };

    Ok(Processed {
        mime,
        data,
        width: img.width(),
        height: img.height(),
    })
}

fn apply_cover_resize(img: DynamicImage, config: &NormalizeConfig) -> DynamicImage {
    let screen = config.images.screen;
    match config.images.cover {
        CoverResize::None => img,
        CoverResize::KeepAspectRatio => {
            if img.height() < screen.height {
                resize_to_height(&img, screen.height)
            } else {
                img
            }
        }
        CoverResize::Stretch => img.resize_exact(screen.width, screen.height, FilterType::Lanczos3),
    }
}

fn apply_scale_factor(img: DynamicImage, config: &NormalizeConfig) -> DynamicImage {
    let factor = config.images.scale_factor;
    if factor > 0.0 && factor != 1.0 {
        let height = ((img.height() as f32 * factor).round() as u32).max(1);
        resize_to_height(&img, height)
    } else {
        img
    }
}

fn resize_to_height(img: &DynamicImage, height: u32) -> DynamicImage {
    let width = ((img.width() as f32 * height as f32 / img.height() as f32).round() as u32).max(1);
    img.resize_exact(width, height, FilterType::Lanczos3)
}

fn is_grayscale(img: &DynamicImage) -> bool {
    matches!(
        img.color(),
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
    )
}

fn has_transparency(img: &DynamicImage) -> bool {
    if !img.color().has_alpha() {
        return false;
    }
    img.to_rgba8().pixels().any(|pixel| pixel[3] != 255)
}

/// Composite over white, dropping the alpha channel.
fn flatten_white(img: &DynamicImage) -> DynamicImage {
    let rgba = img.to_rgba8();
    let mut out = image::RgbImage::new(rgba.width(), rgba.height());
    for (source, dest) in rgba.pixels().zip(out.pixels_mut()) {
        let alpha = source[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        *dest = image::Rgb([blend(source[0]), blend(source[1]), blend(source[2])]);
    }
    DynamicImage::ImageRgb8(out)
}

fn encode(
    img: &DynamicImage,
    mime: &str,
    jpeg_quality: u8,
    gray: bool,
) -> Result<Vec<u8>, MediaError> {
    match mime {
        "image/jpeg" => encode_jpeg(img, jpeg_quality, gray),
        "image/png" => encode_format(img, ImageFormat::Png),
        "image/gif" => encode_format(img, ImageFormat::Gif),
        other => Err(MediaError::Encode(format!("no encoder for {other}"))),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8, gray: bool) -> Result<Vec<u8>, MediaError> {
    // JPEG carries no alpha; flatten first.
    let opaque = if img.color().has_alpha() {
        flatten_white(img)
    } else {
        img.clone()
    };
    let opaque = if gray {
        DynamicImage::ImageLuma8(opaque.to_luma8())
    } else {
        opaque
    };
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality);
    opaque
        .write_with_encoder(encoder)
        .map_err(|err| MediaError::Encode(err.to_string()))?;
    Ok(buffer)
}

fn encode_format(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, MediaError> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), format)
        .map_err(|err| MediaError::Encode(err.to_string()))?;
    Ok(buffer)
}

fn mime_for_format(format: ImageFormat) -> Option<String> {
    let mime = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        _ => return None,
    };
    Some(mime.to_string())
}

fn ext_for_mime(mime: &str) -> &str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        other => other.rsplit('/').next().unwrap_or("bin"),
    }
}

/// Non-fatal recovery: keep the original bytes when `use_broken` is set,
/// otherwise substitute the placeholder (rasterized for Kindle).
fn handle_image_error(
    binary: &Binary,
    config: &NormalizeConfig,
    err: &MediaError,
    diag: &mut Diagnostics,
) -> Processed {
    let kind = match err {
        MediaError::Encode(_) => WarnKind::ImageEncode,
        _ => WarnKind::ImageDecode,
    };
    diag.warn(kind, &binary.id, err.to_string());

    if config.images.use_broken {
        return Processed {
            mime: binary.content_type.clone(),
            data: binary.data.clone(),
            width: 0,
            height: 0,
        };
    }

    if config.target.kindle() {
        // The embedded placeholder always rasterizes; if it somehow does
        // not, fall through to the raw SVG bytes.
        if let Ok(img) = rasterize_svg(PLACEHOLDER_SVG, None)
            && let Ok(data) = encode_jpeg(&img, config.images.jpeg_quality, false)
        {
            return Processed {
                mime: "image/jpeg".to_string(),
                data: jfif::ensure_density(data, JPEG_DPI, JPEG_DPI),
                width: img.width(),
                height: img.height(),
            };
        }
    }

    let (width, height) = svg_intrinsic_size(PLACEHOLDER_SVG).unwrap_or((0, 0));
    Processed {
        mime: "image/svg+xml".to_string(),
        data: PLACEHOLDER_SVG.to_vec(),
        width,
        height,
    }
}
