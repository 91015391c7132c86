mod avi;
mod battery;
mod codec;
mod control;
mod display;
mod osd;
mod player;
mod settings;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use battery::{Battery, BatteryMonitor, FixedAdc};
use codec::JpegDecoder;
use control::Command;
use display::{HeadlessDisplay, OsdFont};
use osd::{OsdLevel, OsdPosition};
use player::VideoPlayer;
use settings::{SettingsConfig, SourceKind};
use source::{AviVideoSource, StillImageSource, VideoSource};

const BATTERY_INTERVAL: Duration = Duration::from_secs(1);

/// Single-channel video and slideshow player with VCR-style controls.
///
/// Commands are read from stdin, one per line: play, pause, toggle, stop,
/// static, next, channel N, osd TEXT, snapshot PATH, info, quit.
#[derive(Parser, Debug)]
#[command(name = "kinescope", version)]
struct Cli {
    /// Directory holding the images or AVI files.
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Kind of media to play.
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// Overlay verbosity: off, standard or debug.
    #[arg(long)]
    osd_level: Option<OsdLevel>,

    /// Settings file (defaults to the user config directory).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the effective settings back to the settings file.
    #[arg(long)]
    save_settings: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(SettingsConfig::default_path);
    let mut settings = SettingsConfig::load_from(&settings_path);
    if let Some(dir) = cli.media_dir {
        settings.library.media_dir = dir;
    }
    if let Some(kind) = cli.source {
        settings.library.source = kind;
    }
    if let Some(level) = cli.osd_level {
        settings.player.osd_level = level;
    }
    if cli.save_settings {
        settings.save_to(&settings_path);
    }

    let mut display = HeadlessDisplay::new(
        settings.display.width,
        settings.display.height,
        settings.player.osd_level,
    );
    if let Some(font_path) = &settings.display.osd_font {
        match OsdFont::load(font_path, settings.display.osd_font_px) {
            Ok(font) => display = display.with_font(font),
            Err(e) => log::warn!("{e}; using block glyphs"),
        }
    }
    let display = Arc::new(display);

    let battery = Arc::new(BatteryMonitor::new(
        settings.battery.clone(),
        Box::new(FixedAdc(settings.battery.simulated_adc)),
    ));

    let library = &settings.library;
    log::info!("Media directory: {}", library.media_dir.display());
    let source: Box<dyn VideoSource> = match library.source {
        SourceKind::Still => Box::new(StillImageSource::new(
            &library.media_dir,
            library.auto_advance_ms,
            library.show_channel_name,
        )),
        SourceKind::Video => Box::new(AviVideoSource::new(&library.media_dir, library.show_channel_name)),
    };

    let player = VideoPlayer::new(
        source,
        Box::new(JpegDecoder::new()),
        display.clone(),
        battery.clone(),
        settings.player.clone(),
    );
    player.start();
    if player.fetch_channel_data() {
        player.play()?;
    } else {
        player.show_osd("No media", OsdPosition::Center, OsdLevel::Standard);
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let _reader = control::spawn_stdin_reader(tx)?;
    let mut control_open = true;
    let mut next_battery = Instant::now() + BATTERY_INTERVAL;

    loop {
        let wait = next_battery.saturating_duration_since(Instant::now());
        let command = if control_open {
            match rx.recv_timeout(wait) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("Control input closed; playing until interrupted");
                    control_open = false;
                    None
                }
            }
        } else {
            std::thread::sleep(wait);
            None
        };

        if let Some(command) = command {
            if command == Command::Quit {
                break;
            }
            if let Err(e) = apply(&player, &display, battery.as_ref(), command) {
                log::error!("{e:#}");
            }
        }

        if Instant::now() >= next_battery {
            battery.update();
            next_battery = Instant::now() + BATTERY_INTERVAL;
        }
    }

    log::info!("Shutting down");
    player.stop()?;
    Ok(())
}

fn apply(player: &VideoPlayer, display: &HeadlessDisplay, battery: &dyn Battery, command: Command) -> Result<()> {
    match command {
        Command::Play => player.play()?,
        Command::Pause => player.pause(),
        Command::Toggle => player.play_pause_toggle()?,
        Command::Stop => player.stop()?,
        Command::Static => player.play_static()?,
        Command::Next => player.next_channel()?,
        Command::Channel(index) => player.set_channel(index)?,
        Command::Osd(text) => player.show_osd(text, OsdPosition::Center, OsdLevel::Standard),
        Command::Snapshot(path) => display.save_snapshot(&path)?,
        Command::Info => log::info!(
            "{:?} (task {}) on channel {}/{} ({}), battery {}% {:.2}V{}{}, backlight {}, {} presents, OSD {}",
            player.state(),
            if player.is_task_alive() { "running" } else { "idle" },
            player.channel_number() + 1,
            player.channel_count(),
            player.channel_name(),
            battery.battery_level(),
            battery.voltage(),
            if battery.is_charging() { " charging" } else { "" },
            if battery.is_low_battery() { " low" } else { "" },
            display.brightness(),
            display.presents(),
            display.osd_level(),
        ),
        Command::Quit => {}
    }
    Ok(())
}
