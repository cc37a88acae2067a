//! Byte-level JPEG helpers: JFIF density stamping and quality estimation.
//!
//! Works directly on the marker stream so an already-encoded JPEG never
//! has to be decoded again just to fix its header.

/// Marker constants (the byte after `0xFF`).
const SOI: u8 = 0xD8;
const APP0: u8 = 0xE0;
const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;

const JFIF_ID: &[u8] = b"JFIF\0";

/// Standard luminance quantization table (JPEG Annex K) in natural order.
/// DQT stores coefficients in zigzag order, but the estimate below only
/// sums them, so the order never matters.
const STD_LUMA: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Iterate over (marker, segment-data-range) pairs up to SOS.
fn segments(jpeg: &[u8]) -> impl Iterator<Item = (u8, std::ops::Range<usize>)> + '_ {
    let mut pos = 2usize; // past SOI
    std::iter::from_fn(move || {
        loop {
            if pos + 4 > jpeg.len() || jpeg[pos] != 0xFF {
                return None;
            }
            let marker = jpeg[pos + 1];
            // Standalone markers carry no length.
            if marker == SOI || marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
                pos += 2;
                continue;
            }
            if marker == SOS {
                return None;
            }
            let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
            if len < 2 || pos + 2 + len > jpeg.len() {
                return None;
            }
            let range = pos + 4..pos + 2 + len;
            pos += 2 + len;
            return Some((marker, range));
        }
    })
}

/// Guarantee a JFIF APP0 segment declaring the given pixel density in
/// pixels per inch. Patches an existing segment in place; inserts a fresh
/// one right after SOI when the stream has none.
pub fn ensure_density(mut jpeg: Vec<u8>, x_density: u16, y_density: u16) -> Vec<u8> {
    if !jpeg.starts_with(&[0xFF, SOI]) {
        return jpeg;
    }

    let found = segments(&jpeg).find(|(marker, range)| {
        *marker == APP0 && jpeg[range.clone()].starts_with(JFIF_ID)
    });

    if let Some((_, range)) = found {
        // identifier(5) version(2) units(1) xdensity(2) ydensity(2)
        if range.len() >= 12 {
            let base = range.start;
            jpeg[base + 7] = 1; // pixels per inch
            jpeg[base + 8..base + 10].copy_from_slice(&x_density.to_be_bytes());
            jpeg[base + 10..base + 12].copy_from_slice(&y_density.to_be_bytes());
        }
        return jpeg;
    }

    let mut segment = Vec::with_capacity(18);
    segment.extend_from_slice(&[0xFF, APP0, 0x00, 0x10]);
    segment.extend_from_slice(JFIF_ID);
    segment.extend_from_slice(&[0x01, 0x02]); // JFIF 1.02
    segment.push(1); // pixels per inch
    segment.extend_from_slice(&x_density.to_be_bytes());
    segment.extend_from_slice(&y_density.to_be_bytes());
    segment.extend_from_slice(&[0, 0]); // no thumbnail
    jpeg.splice(2..2, segment);
    jpeg
}

/// Read back the density a JFIF APP0 declares, as (units, x, y).
pub fn read_density(jpeg: &[u8]) -> Option<(u8, u16, u16)> {
    let (_, range) = segments(jpeg)
        .find(|(marker, range)| *marker == APP0 && jpeg[range.clone()].starts_with(JFIF_ID))?;
    if range.len() < 12 {
        return None;
    }
    let d = &jpeg[range];
    Some((
        d[7],
        u16::from_be_bytes([d[8], d[9]]),
        u16::from_be_bytes([d[10], d[11]]),
    ))
}

/// Estimate the encoder quality (1..=100) of a JPEG from its luminance
/// quantization table by inverting the libjpeg scaling formula. Returns
/// `None` when no usable DQT is present; callers treat that as "do not
/// re-encode".
pub fn estimate_quality(jpeg: &[u8]) -> Option<u8> {
    if !jpeg.starts_with(&[0xFF, SOI]) {
        return None;
    }

    for (marker, range) in segments(jpeg) {
        if marker != DQT {
            continue;
        }
        let data = &jpeg[range];
        let mut pos = 0usize;
        while pos < data.len() {
            let precision = data[pos] >> 4;
            let table_id = data[pos] & 0x0F;
            pos += 1;
            let width = if precision == 0 { 1 } else { 2 };
            if pos + 64 * width > data.len() {
                break;
            }
            if table_id == 0 {
                let mut values = [0u16; 64];
                for (i, value) in values.iter_mut().enumerate() {
                    *value = if precision == 0 {
                        data[pos + i] as u16
                    } else {
                        u16::from_be_bytes([data[pos + 2 * i], data[pos + 2 * i + 1]])
                    };
                }
                return Some(quality_from_table(&values));
            }
            pos += 64 * width;
        }
    }
    None
}

/// Invert `scaled = clamp((std * factor + 50) / 100)` averaged over the
/// table, where `factor = 5000/q` below 50 and `200 - 2q` above.
fn quality_from_table(table: &[u16; 64]) -> u8 {
    let mut factor_sum = 0f64;
    for (value, std) in table.iter().zip(STD_LUMA.iter()) {
        factor_sum += (f64::from(*value) * 100.0 - 50.0) / f64::from(*std);
    }
    let factor = (factor_sum / 64.0).max(1.0);
    let quality = if factor <= 100.0 {
        (200.0 - factor) / 2.0
    } else {
        5000.0 / factor
    };
    quality.round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A do-nothing JPEG skeleton: SOI + APP0(JFIF, 72dpi) + EOI.
    fn jfif_stub() -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        jpeg.extend_from_slice(b"JFIF\0");
        jpeg.extend_from_slice(&[0x01, 0x01, 0x01, 0x00, 0x48, 0x00, 0x48, 0x00, 0x00]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn test_patch_existing_app0() {
        let jpeg = ensure_density(jfif_stub(), 300, 300);
        assert_eq!(read_density(&jpeg), Some((1, 300, 300)));
    }

    #[test]
    fn test_insert_missing_app0() {
        // SOI + EOI only.
        let jpeg = ensure_density(vec![0xFF, 0xD8, 0xFF, 0xD9], 300, 300);
        assert_eq!(read_density(&jpeg), Some((1, 300, 300)));
        // Still starts with SOI and the APP0 follows immediately.
        assert_eq!(&jpeg[..4], &[0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[test]
    fn test_non_jpeg_passthrough() {
        let data = vec![0x89, b'P', b'N', b'G'];
        assert_eq!(ensure_density(data.clone(), 300, 300), data);
    }

    #[test]
    fn test_estimate_quality_of_standard_table() {
        // Quality 50 means the standard table verbatim.
        let mut jpeg = vec![0xFF, 0xD8];
        let mut dqt = vec![0xFF, 0xDB, 0x00, 0x43, 0x00];
        dqt.extend(STD_LUMA.iter().map(|&v| v as u8));
        jpeg.extend_from_slice(&dqt);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        let quality = estimate_quality(&jpeg).unwrap();
        assert!((48..=52).contains(&quality), "estimated {quality}");
    }

    #[test]
    fn test_estimate_quality_none_without_dqt() {
        assert_eq!(estimate_quality(&[0xFF, 0xD8, 0xFF, 0xD9]), None);
        assert_eq!(estimate_quality(b"not a jpeg"), None);
    }

    #[test]
    fn test_quality_formula_endpoints() {
        // All-ones table is the highest quality an encoder emits.
        let ones = [1u16; 64];
        assert!(quality_from_table(&ones) >= 97);

        // A table scaled well past the standard means low quality.
        let mut coarse = [0u16; 64];
        for (c, s) in coarse.iter_mut().zip(STD_LUMA.iter()) {
            *c = s * 4;
        }
        assert!(quality_from_table(&coarse) <= 15);
    }
}
