use std::path::Path;

/// Coverage mask for a rendered line of text (0 = background, 255 = ink).
pub struct TextBitmap {
    pub width: u32,
    pub height: u32,
    pub coverage: Vec<u8>,
}

/// Rasterised overlay font.
pub struct OsdFont {
    font: fontdue::Font,
    px: f32,
}

impl OsdFont {
    pub fn from_bytes(bytes: &[u8], px: f32) -> Result<Self, String> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| format!("Failed to parse font: {e}"))?;
        Ok(Self { font, px })
    }

    pub fn load(path: &Path, px: f32) -> Result<Self, String> {
        let bytes = std::fs::read(path)
            .map_err(|e| format!("Failed to read font {}: {e}", path.display()))?;
        let font = Self::from_bytes(&bytes, px)?;
        log::info!("Loaded OSD font {} at {px}px", path.display());
        Ok(font)
    }

    pub fn render(&self, text: &str) -> TextBitmap {
        let (ascent, descent) = self
            .font
            .horizontal_line_metrics(self.px)
            .map_or((self.px, 0.0), |m| (m.ascent, m.descent));
        let baseline = ascent.ceil() as i32;
        let height = (ascent - descent).ceil().max(1.0) as u32;

        let glyphs: Vec<_> = text.chars().map(|c| self.font.rasterize(c, self.px)).collect();
        let width = glyphs
            .iter()
            .map(|(m, _)| m.advance_width)
            .sum::<f32>()
            .ceil()
            .max(1.0) as u32;

        let mut coverage = vec![0u8; (width * height) as usize];
        let mut pen = 0.0f32;
        for (metrics, bitmap) in &glyphs {
            let left = pen.round() as i32 + metrics.xmin;
            let top = baseline - metrics.height as i32 - metrics.ymin;
            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let x = left + gx as i32;
                    let y = top + gy as i32;
                    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                        continue;
                    }
                    let dst = &mut coverage[y as usize * width as usize + x as usize];
                    *dst = (*dst).max(bitmap[gy * metrics.width + gx]);
                }
            }
            pen += metrics.advance_width;
        }
        TextBitmap {
            width,
            height,
            coverage,
        }
    }
}
