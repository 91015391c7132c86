//! Playback scheduler.
//!
//! [`VideoPlayer`] owns one [`VideoSource`] and at most one background render
//! task. Control calls come from any thread; the task reads the shared state
//! every iteration and exits promptly once its run flag is cleared.
//!
//! Lock order is screen lock, then the OSD queue. Control paths push to the
//! queue before they take the screen lock.

pub mod fade;
pub mod fps;
pub mod noise;
mod task;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::battery::Battery;
use crate::codec::FrameDecoder;
use crate::display::{Display, BLACK};
use crate::osd::{OsdLevel, OsdPosition, OsdQueue};
use crate::source::{SourceError, VideoSource};

pub use crate::source::PlayerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub osd_level: OsdLevel,
    /// Backlight level while playing.
    pub brightness: u8,
    pub osd_duration_ms: u64,
    pub fade_steps: u32,
    pub fade_delay_ms: u64,
    /// Deadline for the render task to exit on stop or channel change.
    pub stop_timeout_ms: u64,
    /// Sleep while stopped or paused.
    pub idle_poll_ms: u64,
    /// Sleep when the source has no frame ready.
    pub frame_poll_ms: u64,
    /// Height of one static-noise band.
    pub static_band_rows: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            osd_level: OsdLevel::Standard,
            brightness: 255,
            osd_duration_ms: 2000,
            fade_steps: 50,
            fade_delay_ms: 20,
            stop_timeout_ms: 5000,
            idle_poll_ms: 50,
            frame_poll_ms: 10,
            static_band_rows: 8,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("failed to spawn render task: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("render task did not exit within {0:?}")]
    StopTimeout(Duration),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// State shared between control calls and the render task.
struct Shared {
    config: PlayerConfig,
    state: Mutex<PlayerState>,
    source: Mutex<Box<dyn VideoSource>>,
    decoder: Mutex<Box<dyn FrameDecoder>>,
    display: Arc<dyn Display>,
    battery: Arc<dyn Battery>,
    osd: Mutex<OsdQueue>,
    /// Cleared to ask the task to exit.
    run: AtomicBool,
    /// Set while a task is executing.
    alive: AtomicBool,
    last_still_advance: Mutex<Instant>,
}

impl Shared {
    fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    fn osd_duration(&self) -> Duration {
        Duration::from_millis(self.config.osd_duration_ms)
    }
}

struct RenderTask {
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

/// Signals task exit however the task body ends, panics included.
struct ExitSignal {
    shared: Arc<Shared>,
    tx: crossbeam_channel::Sender<()>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        let _ = self.tx.try_send(());
    }
}

pub struct VideoPlayer {
    shared: Arc<Shared>,
    task: Mutex<Option<RenderTask>>,
}

impl VideoPlayer {
    pub fn new(
        source: Box<dyn VideoSource>,
        decoder: Box<dyn FrameDecoder>,
        display: Arc<dyn Display>,
        battery: Arc<dyn Battery>,
        config: PlayerConfig,
    ) -> Self {
        display.set_brightness(config.brightness);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(PlayerState::Stopped),
                source: Mutex::new(source),
                decoder: Mutex::new(decoder),
                display,
                battery,
                osd: Mutex::new(OsdQueue::new()),
                run: AtomicBool::new(false),
                alive: AtomicBool::new(false),
                last_still_advance: Mutex::new(Instant::now()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        self.shared.source.lock().start();
    }

    /// Enumerate the source's channels.
    pub fn fetch_channel_data(&self) -> bool {
        self.shared.source.lock().fetch_channel_data()
    }

    pub fn state(&self) -> PlayerState {
        self.shared.state()
    }

    pub fn is_task_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    pub fn channel_name(&self) -> String {
        self.shared.source.lock().channel_name()
    }

    pub fn channel_number(&self) -> usize {
        self.shared.source.lock().channel_number()
    }

    pub fn channel_count(&self) -> usize {
        self.shared.source.lock().channel_count()
    }

    pub fn play(&self) -> Result<(), PlayerError> {
        {
            let mut state = self.shared.state.lock();
            if *state == PlayerState::Playing {
                return Ok(());
            }
            *state = PlayerState::Playing;
        }
        self.shared.source.lock().set_state(PlayerState::Playing);
        log::info!("Playing");
        self.ensure_task()
    }

    pub fn pause(&self) {
        if self.shared.state() != PlayerState::Playing {
            return;
        }
        let battery = &self.shared.battery;
        let status = if battery.is_charging() {
            format!("Chrg {}%", battery.battery_level())
        } else {
            format!("Batt. {}%", battery.battery_level())
        };
        self.show_osd(status, OsdPosition::TopRight, OsdLevel::Standard);
        self.show_osd("Paused", OsdPosition::Center, OsdLevel::Standard);
        *self.shared.state.lock() = PlayerState::Paused;
        self.shared.source.lock().set_state(PlayerState::Paused);
        log::info!("Paused");
    }

    pub fn play_pause_toggle(&self) -> Result<(), PlayerError> {
        if self.state() == PlayerState::Playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Halt the render task, blank the screen and show "Stopped".
    pub fn stop(&self) -> Result<(), PlayerError> {
        if self.state() == PlayerState::Stopped {
            return Ok(());
        }
        self.halt_task()?;
        *self.shared.state.lock() = PlayerState::Stopped;
        self.shared.source.lock().set_state(PlayerState::Stopped);

        let display = &self.shared.display;
        let _screen = display.screen_lock().hold();
        display.fill_sprite(BLACK);
        display.draw_osd("Stopped", OsdPosition::Center, OsdLevel::Standard);
        display.flush_sprite();
        log::info!("Stopped");
        Ok(())
    }

    /// Restart the render task drawing static noise.
    pub fn play_static(&self) -> Result<(), PlayerError> {
        if self.state() == PlayerState::Static {
            return Ok(());
        }
        self.halt_task()?;
        *self.shared.state.lock() = PlayerState::Static;
        self.shared.source.lock().set_state(PlayerState::Static);
        self.shared.display.fill_screen(BLACK);
        log::info!("Static");
        self.ensure_task()
    }

    pub fn set_channel(&self, index: usize) -> Result<(), PlayerError> {
        self.change_channel(|source| source.set_channel(index))
    }

    /// Advance one channel. Resumes playback first when paused.
    pub fn next_channel(&self) -> Result<(), PlayerError> {
        if self.state() == PlayerState::Paused {
            self.play()?;
        }
        self.change_channel(|source| source.next_channel())
    }

    fn change_channel(
        &self,
        change: impl FnOnce(&mut dyn VideoSource) -> Result<(), SourceError>,
    ) -> Result<(), PlayerError> {
        let is_still = self.shared.source.lock().is_still_image_source();
        if is_still {
            // The running task notices the new channel and renders it once.
            change(&mut **self.shared.source.lock())?;
            *self.shared.last_still_advance.lock() = Instant::now();
            return Ok(());
        }

        // Streaming: no frame of the old channel may be decoded after this.
        let was_running = self.halt_task()?;
        let (result, name) = {
            let mut source = self.shared.source.lock();
            let result = change(&mut **source);
            let name = (result.is_ok() && source.show_channel_name_osd()).then(|| source.channel_name());
            (result, name)
        };
        if let Some(name) = name {
            self.show_osd(name, OsdPosition::TopLeft, OsdLevel::Standard);
        }
        if was_running {
            self.ensure_task()?;
        }
        result.map_err(PlayerError::from)
    }

    /// Show `text` for the configured overlay duration.
    pub fn show_osd(&self, text: impl Into<String>, position: OsdPosition, level: OsdLevel) {
        self.show_osd_for(text, position, level, self.shared.osd_duration());
    }

    /// Queue a timed overlay and present it over the current frame at once.
    pub fn show_osd_for(
        &self,
        text: impl Into<String>,
        position: OsdPosition,
        level: OsdLevel,
        duration: Duration,
    ) {
        let text = text.into();
        self.shared.osd.lock().push(text.clone(), position, level, duration);
        let display = &self.shared.display;
        let _screen = display.screen_lock().hold();
        display.draw_osd(&text, position, level);
        display.flush_sprite();
    }

    /// Start the render task unless one is already running.
    fn ensure_task(&self) -> Result<(), PlayerError> {
        let mut slot = self.task.lock();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                return Ok(());
            }
        }
        if let Some(stale) = slot.take() {
            let _ = stale.handle.join();
        }

        self.shared.run.store(true, Ordering::SeqCst);
        self.shared.alive.store(true, Ordering::SeqCst);
        let (tx, exited) = crossbeam_channel::bounded(1);
        let signal = ExitSignal {
            shared: Arc::clone(&self.shared),
            tx,
        };
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("frame-player".into())
            .spawn(move || {
                let _signal = signal;
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    task::run(&shared);
                })) {
                    Ok(()) => {}
                    Err(e) => {
                        let msg = if let Some(s) = e.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = e.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        log::error!("Frame player task panicked: {msg}");
                    }
                }
            });
        match spawned {
            Ok(handle) => {
                *slot = Some(RenderTask { handle, exited });
                log::debug!("Frame player task started");
                Ok(())
            }
            Err(e) => {
                self.shared.alive.store(false, Ordering::SeqCst);
                self.shared.run.store(false, Ordering::SeqCst);
                log::error!("Failed to spawn frame player task: {e}");
                Err(PlayerError::Spawn(e))
            }
        }
    }

    /// Ask the render task to exit and wait for it, bounded by the stop
    /// timeout. Returns whether a task was running.
    fn halt_task(&self) -> Result<bool, PlayerError> {
        let mut slot = self.task.lock();
        let Some(task) = slot.take() else {
            return Ok(false);
        };
        self.shared.run.store(false, Ordering::SeqCst);
        let deadline = Duration::from_millis(self.shared.config.stop_timeout_ms);
        match task.exited.recv_timeout(deadline) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if task.handle.join().is_err() {
                    log::warn!("Frame player task ended abnormally");
                }
                log::debug!("Frame player task stopped");
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => {
                log::error!("Frame player task did not stop within {deadline:?}");
                *slot = Some(task);
                Err(PlayerError::StopTimeout(deadline))
            }
        }
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        if let Err(e) = self.halt_task() {
            log::error!("Failed to halt frame player: {e}");
        }
    }
}
