//! Frame decoding into RGB565 pixel blocks.

use image::ImageFormat;

use crate::display::{color565, Rgb565};

/// Rows per emitted band.
pub const BAND_ROWS: u32 = 16;

/// A decoded rectangle of a frame, in frame coordinates.
pub struct PixelBlock<'a> {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub frame_width: u32,
    pub pixels: &'a [Rgb565],
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("empty frame")]
    Empty,
}

/// Turns one encoded frame into pixel blocks handed to `sink` in order.
pub trait FrameDecoder: Send {
    fn decode(&mut self, data: &[u8], sink: &mut dyn FnMut(&PixelBlock<'_>)) -> Result<(), CodecError>;
}

/// Baseline JPEG decoder emitting 16-row bands.
#[derive(Default)]
pub struct JpegDecoder {
    band: Vec<Rgb565>,
}

impl JpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for JpegDecoder {
    fn decode(&mut self, data: &[u8], sink: &mut dyn FnMut(&PixelBlock<'_>)) -> Result<(), CodecError> {
        if data.is_empty() {
            return Err(CodecError::Empty);
        }
        let rgb = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut y = 0;
        while y < height {
            let rows = BAND_ROWS.min(height - y);
            self.band.clear();
            for row in y..y + rows {
                for x in 0..width {
                    let [r, g, b] = rgb.get_pixel(x, row).0;
                    self.band.push(color565(r, g, b));
                }
            }
            sink(&PixelBlock {
                x: 0,
                y,
                width,
                height: rows,
                frame_width: width,
                pixels: &self.band,
            });
            y += rows;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn encode_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut bytes, ImageFormat::Jpeg)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn emits_bands_covering_the_frame() {
        let data = encode_jpeg(24, 40, [255, 255, 255]);
        let mut decoder = JpegDecoder::new();
        let mut bands = Vec::new();
        decoder
            .decode(&data, &mut |block: &PixelBlock<'_>| {
                assert_eq!(block.pixels.len(), (block.width * block.height) as usize);
                bands.push((block.y, block.height, block.frame_width));
            })
            .unwrap();
        assert_eq!(bands, [(0, 16, 24), (16, 16, 24), (32, 8, 24)]);
    }

    #[test]
    fn converts_to_rgb565() {
        let data = encode_jpeg(16, 16, [0, 0, 0]);
        let mut decoder = JpegDecoder::new();
        let mut dark = true;
        decoder
            .decode(&data, &mut |block: &PixelBlock<'_>| {
                // JPEG is lossy; near-black stays in the lowest few levels.
                dark &= block.pixels.iter().all(|&p| p & 0xE71C == 0);
            })
            .unwrap();
        assert!(dark);
    }

    #[test]
    fn rejects_garbage_and_empty_input() {
        let mut decoder = JpegDecoder::new();
        assert!(matches!(decoder.decode(&[], &mut |_: &PixelBlock<'_>| {}), Err(CodecError::Empty)));
        assert!(matches!(
            decoder.decode(b"not a jpeg", &mut |_: &PixelBlock<'_>| {}),
            Err(CodecError::Decode(_))
        ));
    }
}
