use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use super::fade::fade_backlight;
use super::fps::FpsCounter;
use super::noise::Xorshift16;
use super::{PlayerState, Shared};
use crate::codec::PixelBlock;
use crate::display::{Rgb565, BLACK};
use crate::osd::{OsdLevel, OsdPosition};
use crate::source::FrameBuffer;

/// What the source reported alongside a polled frame.
struct PolledFrame {
    is_still: bool,
    channel: usize,
    channel_name: Option<String>,
}

/// Buffers owned by one run of the render task, released when it exits.
struct TaskState {
    frame: FrameBuffer,
    /// Last encoded frame, kept so overlay changes can be recomposed.
    retained: FrameBuffer,
    static_band: Vec<Rgb565>,
    rng: Xorshift16,
    fps: FpsCounter,
    last_rendered: Option<usize>,
}

pub(super) fn run(shared: &Shared) {
    let mut task = TaskState {
        frame: FrameBuffer::new(),
        retained: FrameBuffer::new(),
        static_band: Vec::new(),
        rng: Xorshift16::default(),
        fps: FpsCounter::new(),
        last_rendered: None,
    };
    let idle = Duration::from_millis(shared.config.idle_poll_ms);
    let frame_poll = Duration::from_millis(shared.config.frame_poll_ms);

    while shared.run.load(Ordering::SeqCst) {
        let state = shared.state();
        if state == PlayerState::Playing {
            advance_slideshow(shared);
        }

        let expired = shared
            .osd
            .lock()
            .expire(Instant::now(), shared.config.osd_level);
        if expired {
            redraw(shared, &task);
        }

        match state {
            PlayerState::Stopped | PlayerState::Paused => {
                std::thread::sleep(idle);
                continue;
            }
            PlayerState::Static => {
                render_static(shared, &mut task);
                std::thread::sleep(idle);
                continue;
            }
            PlayerState::Playing => {}
        }

        let Some(polled) = poll_frame(shared, &mut task.frame) else {
            std::thread::sleep(frame_poll);
            continue;
        };
        render_frame(shared, &mut task, &polled);
    }
    log::debug!("Frame player task exiting");
}

/// Sole owner of the slideshow timer.
fn advance_slideshow(shared: &Shared) {
    let mut source = shared.source.lock();
    if !source.is_still_image_source() {
        return;
    }
    let interval = source.auto_advance_interval_ms();
    if interval == 0 {
        return;
    }
    let mut last = shared.last_still_advance.lock();
    if last.elapsed() >= Duration::from_millis(u64::from(interval)) {
        if let Err(e) = source.next_channel() {
            log::warn!("Slideshow advance failed: {e}");
        }
        *last = Instant::now();
    }
}

fn poll_frame(shared: &Shared, frame: &mut FrameBuffer) -> Option<PolledFrame> {
    let mut source = shared.source.lock();
    if !source.get_video_frame(frame) {
        return None;
    }
    let is_still = source.is_still_image_source();
    Some(PolledFrame {
        is_still,
        channel: source.channel_number(),
        // Only still channel transitions carry a name overlay.
        channel_name: (is_still && source.show_channel_name_osd()).then(|| source.channel_name()),
    })
}

fn render_frame(shared: &Shared, task: &mut TaskState, polled: &PolledFrame) {
    let display = &*shared.display;
    let brightness = shared.config.brightness;
    let fade_delay = Duration::from_millis(shared.config.fade_delay_ms);
    let first_of_channel = polled.is_still && task.last_rendered != Some(polled.channel);
    let faded = first_of_channel && task.last_rendered.is_some();

    if faded {
        fade_backlight(display, brightness, 0, shared.config.fade_steps, fade_delay);
    }

    if let Err(e) = task.retained.copy_from(task.frame.as_slice()) {
        log::warn!("Cannot retain frame of {} bytes: {e}", task.frame.len());
        task.retained.clear();
    }
    if OsdLevel::Debug.visible_at(shared.config.osd_level) {
        task.fps.record(Instant::now());
    }

    {
        let _screen = display.screen_lock().hold();
        display.fill_sprite(BLACK);
        decode_into_sprite(shared, task.frame.as_slice());
        if first_of_channel {
            if let Some(name) = &polled.channel_name {
                shared.osd.lock().push(
                    name.clone(),
                    OsdPosition::TopLeft,
                    OsdLevel::Standard,
                    shared.osd_duration(),
                );
            }
        }
        draw_overlays(shared, &task.fps);
        display.flush_sprite();
    }

    if faded {
        fade_backlight(display, 0, brightness, shared.config.fade_steps, fade_delay);
    }
    if polled.is_still {
        task.last_rendered = Some(polled.channel);
    }
}

/// Recompose the retained frame with the current overlays.
fn redraw(shared: &Shared, task: &TaskState) {
    let display = &*shared.display;
    let _screen = display.screen_lock().hold();
    display.fill_sprite(BLACK);
    if !task.retained.is_empty() {
        decode_into_sprite(shared, task.retained.as_slice());
    }
    draw_overlays(shared, &task.fps);
    display.flush_sprite();
}

fn decode_into_sprite(shared: &Shared, data: &[u8]) {
    let display = &*shared.display;
    let screen_w = display.width();
    let mut decoder = shared.decoder.lock();
    let result = decoder.decode(data, &mut |block: &PixelBlock<'_>| {
        // Narrow frames are centred.
        let x_offset = screen_w.saturating_sub(block.frame_width) / 2;
        display.draw_pixels_to_sprite(
            block.x + x_offset,
            block.y,
            block.width,
            block.height,
            block.pixels,
        );
    });
    if let Err(e) = result {
        log::warn!("Frame decode failed: {e}");
    }
}

/// Status and timed overlays. Caller holds the screen lock.
fn draw_overlays(shared: &Shared, fps: &FpsCounter) {
    let display = &*shared.display;
    let battery = &*shared.battery;

    if OsdLevel::Debug.visible_at(shared.config.osd_level) {
        display.draw_osd(&format!("{} FPS", fps.fps()), OsdPosition::BottomRight, OsdLevel::Debug);
        display.draw_osd(
            &format!("{}% {:.2}", battery.battery_level(), battery.voltage()),
            OsdPosition::BottomLeft,
            OsdLevel::Debug,
        );
    }
    if battery.is_charging() {
        display.draw_osd("Charging", OsdPosition::TopRight, OsdLevel::Debug);
    } else if battery.is_low_battery() {
        display.draw_osd("Low Batt.", OsdPosition::TopRight, OsdLevel::Standard);
    }

    for entry in shared.osd.lock().iter() {
        display.draw_osd(&entry.text, entry.position, entry.level);
    }
}

/// Grey noise straight to the screen, one band at a time.
fn render_static(shared: &Shared, task: &mut TaskState) {
    let display = &*shared.display;
    let width = display.width();
    let height = display.height();
    let rows = shared.config.static_band_rows.max(1);
    task.static_band.resize((width * rows) as usize, BLACK);

    let mut y = 0;
    while y < height {
        if !shared.run.load(Ordering::SeqCst) {
            break;
        }
        let band_rows = rows.min(height - y);
        let band = &mut task.static_band[..(width * band_rows) as usize];
        task.rng.fill_grey(band);
        display.draw_pixels(0, y, width, band_rows, band);
        y += band_rows;
    }
}
