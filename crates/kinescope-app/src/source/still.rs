use std::fs::File;
use std::path::PathBuf;

use super::{
    channel_display_name, list_media_files, FrameBuffer, PlayerState, SourceError, VideoSource,
};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Default slideshow interval.
pub const DEFAULT_INTERVAL_MS: u32 = 5000;

/// Slideshow of JPEG files from one directory; each file is a channel.
///
/// A frame is emitted only when the force-next-frame flag is set, which
/// happens on enumeration and channel changes. The player owns the slideshow
/// timer and calls `next_channel` when it fires.
pub struct StillImageSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    channel: usize,
    state: PlayerState,
    force_next: bool,
    /// Channel most recently handed out as a frame.
    emitted: Option<usize>,
    interval_ms: u32,
    show_filename: bool,
}

impl StillImageSource {
    pub fn new(dir: impl Into<PathBuf>, interval_ms: u32, show_filename: bool) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            channel: 0,
            state: PlayerState::Stopped,
            force_next: true,
            emitted: None,
            interval_ms,
            show_filename,
        }
    }

    fn load_current_image(&self, buffer: &mut FrameBuffer) -> bool {
        let Some(path) = self.files.get(self.channel) else {
            return false;
        };
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("Failed to open image {}: {e}", path.display());
                return false;
            }
        };
        let size = match file.metadata() {
            Ok(meta) if meta.len() > 0 => meta.len() as usize,
            Ok(_) => {
                log::warn!("Image {} is empty", path.display());
                return false;
            }
            Err(e) => {
                log::warn!("Failed to stat image {}: {e}", path.display());
                return false;
            }
        };
        if let Err(e) = buffer.read_from(&mut file, size) {
            log::warn!("Short read for {}: {e}", path.display());
            return false;
        }
        true
    }
}

impl VideoSource for StillImageSource {
    fn start(&mut self) {}

    fn fetch_channel_data(&mut self) -> bool {
        self.files = match list_media_files(&self.dir, IMAGE_EXTENSIONS) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("Cannot read image directory {}: {e}", self.dir.display());
                self.files.clear();
                return false;
            }
        };
        if self.files.is_empty() {
            log::warn!("No image files found in {}", self.dir.display());
            return false;
        }
        log::info!("Found {} images in {}", self.files.len(), self.dir.display());
        self.channel = 0;
        self.emitted = None;
        self.force_next = true;
        true
    }

    fn get_video_frame(&mut self, buffer: &mut FrameBuffer) -> bool {
        if self.files.is_empty() || self.state != PlayerState::Playing || !self.force_next {
            return false;
        }
        self.force_next = false;
        self.emitted = Some(self.channel);
        self.load_current_image(buffer)
    }

    fn set_channel(&mut self, index: usize) -> Result<(), SourceError> {
        if self.files.is_empty() {
            return Err(SourceError::NoChannels);
        }
        self.channel = index.min(self.files.len() - 1);
        // Repeated requests for the image already on screen render nothing new.
        if self.emitted != Some(self.channel) {
            self.force_next = true;
        }
        Ok(())
    }

    fn next_channel(&mut self) -> Result<(), SourceError> {
        if self.files.is_empty() {
            return Err(SourceError::NoChannels);
        }
        let next = self.channel + 1;
        self.set_channel(if next >= self.files.len() { 0 } else { next })
    }

    fn channel_count(&self) -> usize {
        self.files.len()
    }

    fn channel_number(&self) -> usize {
        self.channel
    }

    fn channel_name(&self) -> String {
        channel_display_name(&self.files, self.channel)
    }

    fn is_still_image_source(&self) -> bool {
        true
    }

    fn show_channel_name_osd(&self) -> bool {
        self.show_filename
    }

    fn auto_advance_interval_ms(&self) -> u32 {
        self.interval_ms
    }

    fn set_state(&mut self, state: PlayerState) {
        // Leaving stop/static wipes the screen, so the current image is due again.
        if state == PlayerState::Playing
            && matches!(self.state, PlayerState::Stopped | PlayerState::Static)
        {
            self.force_next = true;
        }
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(names: &[&str]) -> (tempfile::TempDir, StillImageSource) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), format!("bytes of {name}")).unwrap();
        }
        let mut source = StillImageSource::new(dir.path(), DEFAULT_INTERVAL_MS, true);
        source.start();
        (dir, source)
    }

    #[test]
    fn empty_directory_has_no_channels() {
        let (_dir, mut source) = source_with(&[]);
        assert!(!source.fetch_channel_data());
        assert!(matches!(source.set_channel(0), Err(SourceError::NoChannels)));
        assert_eq!(source.channel_name(), "Unknown");
    }

    #[test]
    fn emits_once_per_channel_change() {
        let (_dir, mut source) = source_with(&["a.jpg", "b.jpg"]);
        assert!(source.fetch_channel_data());
        source.set_state(PlayerState::Playing);

        let mut buf = FrameBuffer::new();
        assert!(source.get_video_frame(&mut buf));
        assert_eq!(buf.as_slice(), b"bytes of a.jpg");
        assert!(!source.get_video_frame(&mut buf));

        source.next_channel().unwrap();
        assert!(source.get_video_frame(&mut buf));
        assert_eq!(buf.as_slice(), b"bytes of b.jpg");
        assert!(!source.get_video_frame(&mut buf));
    }

    #[test]
    fn nothing_emitted_unless_playing() {
        let (_dir, mut source) = source_with(&["a.jpg"]);
        source.fetch_channel_data();
        let mut buf = FrameBuffer::new();
        for state in [PlayerState::Stopped, PlayerState::Paused, PlayerState::Static] {
            source.set_state(state);
            assert!(!source.get_video_frame(&mut buf));
        }
        source.set_state(PlayerState::Playing);
        assert!(source.get_video_frame(&mut buf));
    }

    #[test]
    fn set_channel_clamps_and_next_wraps() {
        let (_dir, mut source) = source_with(&["1.jpg", "2.jpg", "3.jpg"]);
        source.fetch_channel_data();
        source.set_channel(99).unwrap();
        assert_eq!(source.channel_number(), 2);
        assert_eq!(source.channel_name(), "3.jpg");
        source.next_channel().unwrap();
        assert_eq!(source.channel_number(), 0);
    }

    #[test]
    fn repeated_set_channel_renders_once() {
        let (_dir, mut source) = source_with(&["1.jpg", "2.jpg"]);
        source.fetch_channel_data();
        source.set_state(PlayerState::Playing);
        let mut buf = FrameBuffer::new();
        assert!(source.get_video_frame(&mut buf));

        source.set_channel(1).unwrap();
        source.set_channel(1).unwrap();
        assert!(source.get_video_frame(&mut buf));
        source.set_channel(1).unwrap();
        assert!(!source.get_video_frame(&mut buf));
    }

    #[test]
    fn replays_current_image_after_stop() {
        let (_dir, mut source) = source_with(&["1.jpg"]);
        source.fetch_channel_data();
        source.set_state(PlayerState::Playing);
        let mut buf = FrameBuffer::new();
        assert!(source.get_video_frame(&mut buf));

        source.set_state(PlayerState::Paused);
        source.set_state(PlayerState::Playing);
        assert!(!source.get_video_frame(&mut buf));

        source.set_state(PlayerState::Stopped);
        source.set_state(PlayerState::Playing);
        assert!(source.get_video_frame(&mut buf));
    }

    #[test]
    fn reports_capabilities() {
        let source = StillImageSource::new("/nowhere", 1234, false);
        assert!(source.is_still_image_source());
        assert!(!source.show_channel_name_osd());
        assert_eq!(source.auto_advance_interval_ms(), 1234);
    }
}
