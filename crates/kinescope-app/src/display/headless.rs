use std::path::Path;

use parking_lot::Mutex;

use super::text::OsdFont;
use super::{osd_origin, rgb565_to_rgb888, Display, Rgb565, ScreenLock, BLACK, GREEN};
use crate::osd::{OsdLevel, OsdPosition};

/// Block-glyph cell size used when no font is loaded.
const CELL_W: u32 = 8;
const CELL_H: u32 = 12;

struct Surface {
    sprite: Vec<Rgb565>,
    /// Presentation ring; `ring[front]` is what is on screen.
    ring: [Vec<Rgb565>; 2],
    front: usize,
    brightness: u8,
    brightness_changes: Vec<u8>,
    /// Overlay texts drawn into the sprite since it was last filled.
    pending_osd: Vec<String>,
    /// Overlay texts carried by the frame currently on screen.
    presented_osd: Vec<String>,
    presents: u64,
}

/// In-memory display for hosts without a panel.
///
/// Behaves like the appliance screen (offscreen sprite, double-buffered
/// present, level-gated overlays) and keeps enough history to inspect what
/// was shown.
pub struct HeadlessDisplay {
    lock: ScreenLock,
    width: u32,
    height: u32,
    osd_level: OsdLevel,
    font: Option<OsdFont>,
    surface: Mutex<Surface>,
}

impl HeadlessDisplay {
    pub fn new(width: u32, height: u32, osd_level: OsdLevel) -> Self {
        let pixels = (width * height) as usize;
        log::info!("Headless display {width}x{height}, OSD level {osd_level}");
        Self {
            lock: ScreenLock::new(),
            width,
            height,
            osd_level,
            font: None,
            surface: Mutex::new(Surface {
                sprite: vec![BLACK; pixels],
                ring: [vec![BLACK; pixels], vec![BLACK; pixels]],
                front: 0,
                brightness: 0,
                brightness_changes: Vec::new(),
                pending_osd: Vec::new(),
                presented_osd: Vec::new(),
                presents: 0,
            }),
        }
    }

    pub fn with_font(mut self, font: OsdFont) -> Self {
        self.font = Some(font);
        self
    }

    pub fn osd_level(&self) -> OsdLevel {
        self.osd_level
    }

    /// Number of sprite presents so far.
    pub fn presents(&self) -> u64 {
        self.surface.lock().presents
    }

    /// Overlay texts on the frame currently shown.
    #[cfg(test)]
    pub fn presented_osd(&self) -> Vec<String> {
        self.surface.lock().presented_osd.clone()
    }

    pub fn brightness(&self) -> u8 {
        self.surface.lock().brightness
    }

    /// Every brightness value set so far, in order.
    #[cfg(test)]
    pub fn brightness_changes(&self) -> Vec<u8> {
        self.surface.lock().brightness_changes.clone()
    }

    #[cfg(test)]
    pub fn clear_history(&self) {
        let mut surface = self.surface.lock();
        surface.brightness_changes.clear();
        surface.presents = 0;
    }

    /// Copy of the visible buffer.
    pub fn screen_pixels(&self) -> Vec<Rgb565> {
        let _screen = self.lock.hold();
        let surface = self.surface.lock();
        surface.ring[surface.front].clone()
    }

    pub fn save_snapshot(&self, path: &Path) -> image::ImageResult<()> {
        let pixels = self.screen_pixels();
        let width = self.width;
        let img = image::RgbImage::from_fn(self.width, self.height, |x, y| {
            image::Rgb(rgb565_to_rgb888(pixels[(y * width + x) as usize]))
        });
        img.save(path)?;
        log::info!("Saved snapshot to {}", path.display());
        Ok(())
    }

    /// Green-on-black overlay pixels for `text`.
    fn render_text(&self, text: &str) -> (u32, u32, Vec<Rgb565>) {
        if let Some(font) = &self.font {
            let bitmap = font.render(text);
            let pixels = bitmap
                .coverage
                .iter()
                .map(|&c| if c >= 128 { GREEN } else { BLACK })
                .collect();
            return (bitmap.width, bitmap.height, pixels);
        }

        let chars: Vec<char> = text.chars().collect();
        let w = (chars.len() as u32).max(1) * CELL_W;
        let mut pixels = vec![BLACK; (w * CELL_H) as usize];
        for (i, c) in chars.iter().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            let x0 = i as u32 * CELL_W + 1;
            for y in 1..CELL_H - 1 {
                for x in x0..x0 + CELL_W - 2 {
                    pixels[(y * w + x) as usize] = GREEN;
                }
            }
        }
        (w, CELL_H, pixels)
    }

    fn blit(target: &mut [Rgb565], stride: u32, rows: u32, x: u32, y: u32, w: u32, h: u32, pixels: &[Rgb565]) {
        if x >= stride || y >= rows {
            return;
        }
        let visible_w = w.min(stride - x) as usize;
        let visible_h = h.min(rows - y);
        for row in 0..visible_h {
            let src_start = (row * w) as usize;
            let Some(src) = pixels.get(src_start..src_start + visible_w) else {
                break;
            };
            let dst_start = ((y + row) * stride + x) as usize;
            target[dst_start..dst_start + visible_w].copy_from_slice(src);
        }
    }
}

impl Display for HeadlessDisplay {
    fn screen_lock(&self) -> &ScreenLock {
        &self.lock
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fill_screen(&self, color: Rgb565) {
        let _screen = self.lock.hold();
        let mut surface = self.surface.lock();
        let front = surface.front;
        surface.ring[front].fill(color);
    }

    fn fill_sprite(&self, color: Rgb565) {
        let _screen = self.lock.hold();
        let mut surface = self.surface.lock();
        surface.sprite.fill(color);
        surface.pending_osd.clear();
    }

    fn draw_pixels(&self, x: u32, y: u32, w: u32, h: u32, pixels: &[Rgb565]) {
        let _screen = self.lock.hold();
        let mut surface = self.surface.lock();
        let front = surface.front;
        Self::blit(&mut surface.ring[front], self.width, self.height, x, y, w, h, pixels);
    }

    fn draw_pixels_to_sprite(&self, x: u32, y: u32, w: u32, h: u32, pixels: &[Rgb565]) {
        let _screen = self.lock.hold();
        let mut surface = self.surface.lock();
        Self::blit(&mut surface.sprite, self.width, self.height, x, y, w, h, pixels);
    }

    fn flush_sprite(&self) {
        let _screen = self.lock.hold();
        let mut surface = self.surface.lock();
        let back = 1 - surface.front;
        let Surface {
            sprite,
            ring,
            pending_osd,
            presented_osd,
            ..
        } = &mut *surface;
        ring[back].copy_from_slice(sprite);
        presented_osd.clone_from(pending_osd);
        surface.front = back;
        surface.presents += 1;
    }

    fn draw_osd(&self, text: &str, position: OsdPosition, level: OsdLevel) {
        if !level.visible_at(self.osd_level) {
            return;
        }
        let _screen = self.lock.hold();
        let (w, h, pixels) = self.render_text(text);
        let (x, y) = osd_origin(position, self.width, self.height, w, h);
        // Re-enters the screen lock.
        self.draw_pixels_to_sprite(x, y, w, h, &pixels);
        self.surface.lock().pending_osd.push(text.to_string());
    }

    fn set_brightness(&self, level: u8) {
        let mut surface = self.surface.lock();
        surface.brightness = level;
        surface.brightness_changes.push(level);
    }
}
