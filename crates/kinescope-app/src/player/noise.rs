use crate::display::{color565, Rgb565};

/// Four-word 16-bit xorshift generator for static noise.
pub struct Xorshift16 {
    x: u16,
    y: u16,
    z: u16,
    w: u16,
}

impl Default for Xorshift16 {
    fn default() -> Self {
        Self::new(12345, 6789, 42, 1729)
    }
}

impl Xorshift16 {
    pub fn new(x: u16, y: u16, z: u16, w: u16) -> Self {
        Self { x, y, z, w }
    }

    pub fn next_u16(&mut self) -> u16 {
        let t = self.x ^ (self.x << 5);
        self.x = self.y;
        self.y = self.z;
        self.z = self.w;
        self.w = self.w ^ (self.w >> 1) ^ t ^ (t >> 3);
        self.w
    }

    /// Fill `band` with random grey pixels.
    pub fn fill_grey(&mut self, band: &mut [Rgb565]) {
        for pixel in band {
            let grey = (self.next_u16() >> 8) as u8;
            *pixel = color565(grey, grey, grey);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sequence_is_fixed() {
        let mut rng = Xorshift16::default();
        assert_eq!(rng.next_u16(), 13403);
        let mut again = Xorshift16::default();
        again.next_u16();
        assert_eq!(rng.next_u16(), again.next_u16());
    }

    #[test]
    fn grey_pixels_have_equal_channels() {
        let mut rng = Xorshift16::default();
        let mut band = [0u16; 64];
        rng.fill_grey(&mut band);
        for p in band {
            let r = p >> 11;
            let b = p & 0x1F;
            let g = (p >> 5) & 0x3F;
            assert_eq!(r, b);
            assert_eq!(g >> 1, r);
        }
        assert!(band.iter().any(|&p| p != band[0]));
    }
}
