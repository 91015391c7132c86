use std::time::Duration;

use crate::display::Display;

/// Blocking backlight ramp from `from` to `to` in `steps` increments.
/// Zero steps jumps straight to the target.
pub fn fade_backlight(display: &dyn Display, from: u8, to: u8, steps: u32, delay: Duration) {
    if steps == 0 {
        display.set_brightness(to);
        return;
    }
    let (from, to, steps) = (i64::from(from), i64::from(to), i64::from(steps));
    for i in 0..=steps {
        let level = from + (to - from) * i / steps;
        display.set_brightness(level.clamp(0, 255) as u8);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::HeadlessDisplay;
    use crate::osd::OsdLevel;

    #[test]
    fn ramps_inclusive_of_both_ends() {
        let display = HeadlessDisplay::new(1, 1, OsdLevel::Off);
        fade_backlight(&display, 200, 0, 4, Duration::ZERO);
        assert_eq!(display.brightness_changes(), [200, 150, 100, 50, 0]);
    }

    #[test]
    fn zero_steps_sets_target() {
        let display = HeadlessDisplay::new(1, 1, OsdLevel::Off);
        fade_backlight(&display, 0, 255, 0, Duration::from_secs(10));
        assert_eq!(display.brightness_changes(), [255]);
    }
}
