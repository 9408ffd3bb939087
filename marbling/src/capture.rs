use crate::capabilities::grid_size;

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Problem {
    #[error("Expected {expected} values from the readback, got {actual}")]
    WrongDataSize { expected: usize, actual: usize },

    #[error("Cannot encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// An encoded snapshot of the canvas, ready to be saved or downloaded.
#[derive(Clone, Debug)]
pub struct Capture {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
    pub filename: String,
}

// Only the capture resolution and the drawing buffer's aspect ratio decide
// the size of the export.
pub fn capture_size(resolution: u32, drawing_width: u32, drawing_height: u32) -> (u32, u32) {
    grid_size(resolution, drawing_width, drawing_height)
}

pub fn filename(timestamp: f64) -> String {
    format!("marbling-{}.png", timestamp.max(0.0) as u64)
}

// GL reads rows bottom-up; images store them top-down.
pub fn flip_and_quantize(pixels: &[f32], width: u32, height: u32) -> Result<Vec<u8>, Problem> {
    let row_length = 4 * width as usize;
    let expected = row_length * height as usize;

    if pixels.len() != expected {
        return Err(Problem::WrongDataSize {
            expected,
            actual: pixels.len(),
        });
    }

    if expected == 0 {
        return Ok(Vec::new());
    }

    Ok(pixels
        .chunks_exact(row_length)
        .rev()
        .flatten()
        .map(|value| (value.clamp(0.0, 1.0) * 255.0) as u8)
        .collect())
}

pub fn encode_png(rgba: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>, Problem> {
    let actual = rgba.len();
    let image = RgbaImage::from_raw(width, height, rgba).ok_or(Problem::WrongDataSize {
        expected: 4 * (width * height) as usize,
        actual,
    })?;

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

pub fn encode(
    pixels: &[f32],
    width: u32,
    height: u32,
    timestamp: f64,
) -> Result<Capture, Problem> {
    let rgba = flip_and_quantize(pixels, width, height)?;
    let png = encode_png(rgba, width, height)?;

    Ok(Capture {
        width,
        height,
        png,
        filename: filename(timestamp),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn size_follows_resolution_and_aspect_only() {
        assert_eq!(capture_size(1024, 1920, 1080), (1820, 1024));
        assert_eq!(capture_size(1024, 960, 540), (1820, 1024));
        assert_eq!(capture_size(1024, 1080, 1920), (1024, 1820));
        assert_eq!(capture_size(512, 1920, 1080), (910, 512));
    }

    #[test]
    fn rows_are_flipped() {
        #[rustfmt::skip]
        let pixels = [
            0.0, 0.0, 0.0, 1.0,
            1.0, 1.0, 1.0, 1.0,
        ];
        assert_eq!(
            flip_and_quantize(&pixels, 1, 2).unwrap(),
            vec![255, 255, 255, 255, 0, 0, 0, 255]
        );
    }

    #[test]
    fn values_are_clamped_and_truncated() {
        let pixels = [-0.5, 0.5, 2.0, 0.999];
        assert_eq!(
            flip_and_quantize(&pixels, 1, 1).unwrap(),
            vec![0, 127, 255, 254]
        );
    }

    #[test]
    fn short_readbacks_are_rejected() {
        assert!(matches!(
            flip_and_quantize(&[0.0; 7], 1, 2),
            Err(Problem::WrongDataSize {
                expected: 8,
                actual: 7
            })
        ));
    }

    #[test]
    fn encodes_a_decodable_png() {
        let pixels = vec![0.25; 4 * 3 * 2];
        let capture = encode(&pixels, 3, 2, 1_700_000_000_000.0).unwrap();

        assert_eq!(capture.filename, "marbling-1700000000000.png");
        let decoded = image::load_from_memory(&capture.png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [63, 63, 63, 63]);
    }
}
