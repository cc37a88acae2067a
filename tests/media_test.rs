//! Image preparation against real encoded bytes.
//!
//! Fixtures are generated in-memory with the `image` crate, so the tests
//! exercise actual decode/flatten/re-encode paths.

use std::io::Cursor;

use folio::book::Binary;
use folio::{Cancel, Diagnostics, NormalizeConfig, Target, normalize_book, parse_fb2};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

fn encode(img: RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buffer), format)
        .expect("fixture encodes");
    buffer
}

/// A 50x50 GIF, left half opaque red, right half fully transparent.
fn transparent_gif() -> Vec<u8> {
    let mut img = RgbaImage::new(50, 50);
    for (x, _, pixel) in img.enumerate_pixels_mut() {
        *pixel = if x < 25 {
            Rgba([200, 40, 40, 255])
        } else {
            Rgba([0, 0, 0, 0])
        };
    }
    encode(img, ImageFormat::Gif)
}

fn book_source(extra_binaries: &str) -> String {
    format!(
        r##"<FictionBook>
  <body><section>
    <p>content <image href="#pic"/></p>
  </section></body>
  {extra_binaries}
</FictionBook>"##
    )
}

fn normalize_with_target(
    source: &str,
    binaries: Vec<Binary>,
    target: Target,
) -> (folio::Book, folio::NormalizedBook) {
    let mut diag = Diagnostics::new();
    let mut book = parse_fb2(source.as_bytes(), &mut diag).expect("parses");
    book.binaries.extend(binaries);
    let config = NormalizeConfig {
        target,
        ..Default::default()
    };
    let result = normalize_book(&mut book, &config, &Cancel::new()).expect("normalizes");
    (book, result)
}

// ============================================================================
// Kindle GIF with transparency
// ============================================================================

#[test]
fn test_kindle_gif_with_transparency_becomes_opaque_jpeg() {
    let (_, result) = normalize_with_target(
        &book_source(""),
        vec![Binary::new("pic", "image/gif", transparent_gif())],
        Target::Azw3,
    );

    let image = result.images.get("pic").expect("image kept");
    assert_eq!(image.mime, "image/jpeg");
    assert_eq!((image.width, image.height), (50, 50));
    assert!(image.filename.ends_with(".jpg"));

    // Decode the output: transparent pixels flattened to white, and the
    // result carries no alpha at all.
    let decoded = image::load_from_memory(&image.data).expect("output decodes");
    assert!(!decoded.color().has_alpha());
    let rgb = decoded.to_rgb8();
    let right = rgb.get_pixel(45, 25);
    assert!(
        right[0] > 240 && right[1] > 240 && right[2] > 240,
        "transparent region should flatten to white, got {right:?}"
    );
    let left = rgb.get_pixel(5, 25);
    assert!(left[0] > 150 && left[1] < 120, "opaque region should stay red");
}

#[test]
fn test_epub_gif_kept_as_gif() {
    let (_, result) = normalize_with_target(
        &book_source(""),
        vec![Binary::new("pic", "image/gif", transparent_gif())],
        Target::Epub,
    );

    let image = result.images.get("pic").expect("image kept");
    assert_eq!(image.mime, "image/gif");
    assert!(image.filename.ends_with(".gif"));
}

// ============================================================================
// JFIF density
// ============================================================================

#[test]
fn test_kindle_jpeg_output_declares_300_dpi() {
    let mut img = RgbaImage::new(10, 10);
    for pixel in img.pixels_mut() {
        *pixel = Rgba([90, 90, 90, 255]);
    }
    let (_, result) = normalize_with_target(
        &book_source(""),
        vec![Binary::new("pic", "image/png", encode(img, ImageFormat::Png))],
        Target::Kfx,
    );

    let image = result.images.get("pic").expect("image kept");
    assert_eq!(image.mime, "image/jpeg");
    // JFIF APP0: units=1 (pixels/inch), 300x300.
    assert_eq!(
        folio::media::jfif::read_density(&image.data),
        Some((1, 300, 300))
    );
}

// ============================================================================
// Reference filter
// ============================================================================

#[test]
fn test_unreferenced_images_filtered_out() {
    let source = r##"<FictionBook>
      <body><section><p><image href="#used"/></p></section></body>
    </FictionBook>"##;
    let mut img = RgbaImage::new(4, 4);
    for pixel in img.pixels_mut() {
        *pixel = Rgba([1, 2, 3, 255]);
    }
    let bytes = encode(img, ImageFormat::Png);
    let (_, result) = normalize_with_target(
        source,
        vec![
            Binary::new("used", "image/png", bytes.clone()),
            Binary::new("orphan", "image/png", bytes),
        ],
        Target::Epub,
    );

    assert!(result.images.contains("used"));
    assert!(!result.images.contains("orphan"));
}

#[test]
fn test_filenames_are_sequential_over_accepted_images() {
    let source = r##"<FictionBook>
      <body><section><p><image href="#a"/><image href="#b"/></p></section></body>
    </FictionBook>"##;
    let mut img = RgbaImage::new(4, 4);
    for pixel in img.pixels_mut() {
        *pixel = Rgba([9, 9, 9, 255]);
    }
    let bytes = encode(img, ImageFormat::Png);
    let (_, result) = normalize_with_target(
        source,
        vec![
            Binary::new("a", "image/png", bytes.clone()),
            Binary::new("b", "image/png", bytes),
        ],
        Target::Epub,
    );

    assert_eq!(result.images.get("a").unwrap().filename, "images/img00001.png");
    assert_eq!(result.images.get("b").unwrap().filename, "images/img00002.png");
}
