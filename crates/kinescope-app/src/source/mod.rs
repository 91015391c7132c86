//! Frame producers.
//!
//! A [`VideoSource`] hands the player one encoded frame at a time. The player
//! owns exactly one source and only swaps its channel under the
//! channel-change protocol in `player`.

pub mod buffer;
pub mod still;
pub mod video;

use std::io;
use std::path::{Path, PathBuf};

pub use buffer::FrameBuffer;
pub use still::StillImageSource;
pub use video::AviVideoSource;

use crate::avi::AviError;

/// Playback state, held by the player and mirrored into the active source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Static,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no channels available")]
    NoChannels,
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: AviError,
    },
}

/// Capability set every frame producer implements.
///
/// None of these operations block for long; `get_video_frame` returning
/// `false` means "nothing ready yet, poll again".
pub trait VideoSource: Send {
    /// One-time setup.
    fn start(&mut self);

    /// (Re)enumerate channels. False if none were found or the medium is unavailable.
    fn fetch_channel_data(&mut self) -> bool;

    /// Poll for the next encoded frame. On success `buffer` holds the frame.
    fn get_video_frame(&mut self, buffer: &mut FrameBuffer) -> bool;

    /// Select a channel, clamped to the available range. Guarantees the new
    /// channel renders once regardless of timing.
    fn set_channel(&mut self, index: usize) -> Result<(), SourceError>;

    /// Advance one channel, wrapping to 0 past the end.
    fn next_channel(&mut self) -> Result<(), SourceError>;

    fn channel_count(&self) -> usize;

    fn channel_number(&self) -> usize;

    /// Display name of the active channel, "Unknown" if there is none.
    fn channel_name(&self) -> String;

    fn is_still_image_source(&self) -> bool;

    fn show_channel_name_osd(&self) -> bool;

    /// Slideshow interval; 0 disables auto-advance.
    fn auto_advance_interval_ms(&self) -> u32;

    fn set_state(&mut self, state: PlayerState);
}

/// Files in `dir` whose extension matches one of `extensions`
/// (case-insensitive), sorted and de-duplicated.
pub fn list_media_files(dir: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        })
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

/// Basename of `files[index]`, or "Unknown".
pub fn channel_display_name(files: &[PathBuf], index: usize) -> String {
    files
        .get(index)
        .and_then(|path| path.file_name())
        .map_or_else(|| "Unknown".to_string(), |name| name.to_string_lossy().into_owned())
}
