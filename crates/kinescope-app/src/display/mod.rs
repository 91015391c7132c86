//! Presentation surface.
//!
//! The player only ever talks to [`Display`]. Everything that touches pixels
//! serialises on the display's [`ScreenLock`], which is re-entrant because
//! overlay drawing queries and draws again while already holding it.

pub mod headless;
pub mod text;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

pub use headless::HeadlessDisplay;
pub use text::OsdFont;

use crate::osd::{OsdLevel, OsdPosition};

/// 16-bit 5-6-5 pixel.
pub type Rgb565 = u16;

pub const BLACK: Rgb565 = 0x0000;
#[cfg(test)]
pub const WHITE: Rgb565 = 0xFFFF;
pub const GREEN: Rgb565 = 0x07E0;

/// Gap between an anchored overlay and the screen edge.
pub const OSD_MARGIN: u32 = 20;

pub const fn color565(r: u8, g: u8, b: u8) -> Rgb565 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Expand to 8 bits per channel, replicating high bits into the low ones.
pub fn rgb565_to_rgb888(pixel: Rgb565) -> [u8; 3] {
    let r = ((pixel >> 11) & 0x1F) as u8;
    let g = ((pixel >> 5) & 0x3F) as u8;
    let b = (pixel & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Re-entrant lock guarding the physical screen.
#[derive(Default)]
pub struct ScreenLock(ReentrantMutex<()>);

impl ScreenLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self) -> ReentrantMutexGuard<'_, ()> {
        self.0.lock()
    }
}

/// Pixel sink with an offscreen sprite and an atomic present.
///
/// Implementations take the screen lock inside every method, so callers
/// only need to hold it themselves to make a sequence of calls atomic.
pub trait Display: Send + Sync {
    fn screen_lock(&self) -> &ScreenLock;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Paint the visible screen directly, bypassing the sprite.
    fn fill_screen(&self, color: Rgb565);

    fn fill_sprite(&self, color: Rgb565);

    /// Push a block straight to the screen.
    fn draw_pixels(&self, x: u32, y: u32, w: u32, h: u32, pixels: &[Rgb565]);

    /// Composite a block into the offscreen sprite, clipped to the screen.
    fn draw_pixels_to_sprite(&self, x: u32, y: u32, w: u32, h: u32, pixels: &[Rgb565]);

    /// Present the sprite in one step.
    fn flush_sprite(&self);

    /// Draw overlay text into the sprite if `level` passes the display's OSD
    /// preference.
    fn draw_osd(&self, text: &str, position: OsdPosition, level: OsdLevel);

    fn set_brightness(&self, level: u8);
}

/// Top-left corner for a `text_w` x `text_h` overlay at `position`.
pub fn osd_origin(
    position: OsdPosition,
    screen_w: u32,
    screen_h: u32,
    text_w: u32,
    text_h: u32,
) -> (u32, u32) {
    let right = screen_w.saturating_sub(text_w + OSD_MARGIN);
    let bottom = screen_h.saturating_sub(text_h + OSD_MARGIN);
    match position {
        OsdPosition::TopLeft => (OSD_MARGIN, OSD_MARGIN),
        OsdPosition::TopRight => (right, OSD_MARGIN),
        OsdPosition::BottomLeft => (OSD_MARGIN, bottom),
        OsdPosition::BottomRight => (right, bottom),
        OsdPosition::Center => (
            screen_w.saturating_sub(text_w) / 2,
            screen_h.saturating_sub(text_h) / 2,
        ),
    }
}
