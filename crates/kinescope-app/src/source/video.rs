use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use super::{
    channel_display_name, list_media_files, FrameBuffer, PlayerState, SourceError, VideoSource,
};
use crate::avi::{AviParser, ChunkType};

const VIDEO_EXTENSIONS: &[&str] = &["avi"];

/// Pacing rate for files without an `avih` header.
pub const FALLBACK_FRAME_RATE: f32 = 15.0;

/// Frames read in one poll when playback has fallen behind. Beyond this the
/// pacing clock is re-anchored instead of skipping further.
const MAX_CATCH_UP_FRAMES: u64 = 8;

/// Wall-clock anchor for frame pacing.
struct Pacing {
    started: Instant,
    frames_emitted: u64,
}

/// MJPEG-in-AVI playback; each `.avi` file in a directory is a channel.
///
/// Channel changes open the file immediately so a broken file is reported to
/// whoever picked it. Frames are paced by the file's frame rate and the
/// channel loops when its `movi` list runs out.
pub struct AviVideoSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    channel: usize,
    state: PlayerState,
    parser: Option<AviParser<BufReader<File>>>,
    pacing: Option<Pacing>,
    force_next: bool,
    show_channel_name: bool,
}

impl AviVideoSource {
    pub fn new(dir: impl Into<PathBuf>, show_channel_name: bool) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            channel: 0,
            state: PlayerState::Stopped,
            parser: None,
            pacing: None,
            force_next: false,
            show_channel_name,
        }
    }

    /// Frame rate of the open channel, if known.
    pub fn frame_rate(&self) -> Option<f32> {
        self.parser.as_ref().and_then(AviParser::frame_rate)
    }

    fn open_channel(&mut self) -> Result<(), SourceError> {
        self.parser = None;
        self.pacing = None;
        self.force_next = false;
        let path = self
            .files
            .get(self.channel)
            .ok_or(SourceError::NoChannels)?
            .clone();
        let parser = AviParser::open(&path, ChunkType::Video)
            .map_err(|source| SourceError::Open { path, source })?;
        log::debug!(
            "Opened {}: {} movi bytes at offset {}",
            self.channel_name(),
            parser.movi_len(),
            parser.movi_start()
        );
        self.parser = Some(parser);
        match self.frame_rate() {
            Some(fps) => log::debug!("Pacing at {fps} fps"),
            None => log::debug!("No frame rate in header, pacing at {FALLBACK_FRAME_RATE} fps"),
        }
        self.force_next = true;
        Ok(())
    }

    /// How many frames are owed at `now` according to the pacing clock.
    fn frames_due(&self, now: Instant, fps: f32) -> u64 {
        match &self.pacing {
            None => 1,
            Some(p) => {
                let elapsed = now.duration_since(p.started).as_secs_f64();
                let target = (elapsed * f64::from(fps)) as u64 + 1;
                target.saturating_sub(p.frames_emitted)
            }
        }
    }
}

impl VideoSource for AviVideoSource {
    fn start(&mut self) {}

    fn fetch_channel_data(&mut self) -> bool {
        self.parser = None;
        self.files = match list_media_files(&self.dir, VIDEO_EXTENSIONS) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("Cannot read video directory {}: {e}", self.dir.display());
                self.files.clear();
                return false;
            }
        };
        if self.files.is_empty() {
            log::warn!("No AVI files found in {}", self.dir.display());
            return false;
        }
        log::info!("Found {} videos in {}", self.files.len(), self.dir.display());
        // Start on the first channel that opens.
        for index in 0..self.files.len() {
            self.channel = index;
            match self.open_channel() {
                Ok(()) => return true,
                Err(e) => log::error!("{e}"),
            }
        }
        log::error!("No playable AVI files in {}", self.dir.display());
        self.channel = 0;
        false
    }

    fn get_video_frame(&mut self, buffer: &mut FrameBuffer) -> bool {
        if self.state != PlayerState::Playing {
            return false;
        }
        let Some(fps) = self
            .parser
            .as_ref()
            .map(|p| p.frame_rate().unwrap_or(FALLBACK_FRAME_RATE))
        else {
            return false;
        };

        let now = Instant::now();
        let due = self.frames_due(now, fps);
        if due == 0 && !self.force_next {
            return false;
        }
        let reads = due.clamp(1, MAX_CATCH_UP_FRAMES);

        let mut frame_len = 0;
        let mut reached_end = false;
        if let Some(parser) = self.parser.as_mut() {
            for _ in 0..reads {
                match parser.next_chunk(buffer) {
                    0 if parser.is_exhausted() => {
                        reached_end = true;
                        break;
                    }
                    0 => {}
                    len => frame_len = len,
                }
            }
        }
        // A failed read after a good one leaves the buffer without a frame.
        if buffer.is_empty() {
            frame_len = 0;
        }

        if reached_end {
            log::debug!("{} finished, looping", self.channel_name());
            if let Err(e) = self.open_channel() {
                log::error!("Cannot reopen channel: {e}");
            }
            if frame_len == 0 {
                return false;
            }
        }

        match &mut self.pacing {
            Some(p) if due <= MAX_CATCH_UP_FRAMES => p.frames_emitted += reads,
            pacing => {
                *pacing = Some(Pacing {
                    started: now,
                    frames_emitted: 1,
                });
            }
        }
        if frame_len == 0 {
            return false;
        }
        self.force_next = false;
        true
    }

    fn set_channel(&mut self, index: usize) -> Result<(), SourceError> {
        if self.files.is_empty() {
            return Err(SourceError::NoChannels);
        }
        self.channel = index.min(self.files.len() - 1);
        log::info!("Switching to channel {} ({})", self.channel, self.channel_name());
        self.open_channel()
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
        false
    }

    fn show_channel_name_osd(&self) -> bool {
        self.show_channel_name
    }

    fn auto_advance_interval_ms(&self) -> u32 {
        0
    }

    fn set_state(&mut self, state: PlayerState) {
        if state == PlayerState::Playing && self.state != PlayerState::Playing {
            // Time spent paused or stopped must not count as frames owed.
            self.pacing = None;
        }
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn write_avi(path: &Path, rate: u32, frames: &[&[u8]]) {
        let mut movi = b"movi".to_vec();
        for frame in frames {
            movi.extend_from_slice(b"00dc");
            movi.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            movi.extend_from_slice(frame);
            if frame.len() % 2 == 1 {
                movi.push(0);
            }
        }
        let mut avih = vec![0u8; 56];
        avih[40..44].copy_from_slice(&1u32.to_le_bytes());
        avih[44..48].copy_from_slice(&rate.to_le_bytes());
        let mut hdrl = b"hdrlavih".to_vec();
        hdrl.extend_from_slice(&56u32.to_le_bytes());
        hdrl.extend_from_slice(&avih);

        let mut body = b"AVI ".to_vec();
        for list in [hdrl, movi] {
            body.extend_from_slice(b"LIST");
            body.extend_from_slice(&(list.len() as u32).to_le_bytes());
            body.extend_from_slice(&list);
        }
        let mut file = b"RIFF".to_vec();
        file.extend_from_slice(&(body.len() as u32).to_le_bytes());
        file.extend_from_slice(&body);
        std::fs::write(path, file).unwrap();
    }

    #[test]
    fn enumerates_and_opens_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        write_avi(&dir.path().join("b.avi"), 10, &[b"b0"]);
        write_avi(&dir.path().join("a.avi"), 25, &[b"a0"]);
        let mut source = AviVideoSource::new(dir.path(), true);
        assert!(source.fetch_channel_data());
        assert_eq!(source.channel_count(), 2);
        assert_eq!(source.channel_name(), "a.avi");
        assert_eq!(source.frame_rate(), Some(25.0));
        assert!(!source.is_still_image_source());
        assert_eq!(source.auto_advance_interval_ms(), 0);
    }

    #[test]
    fn first_frame_is_immediate_then_paced() {
        let dir = tempfile::tempdir().unwrap();
        // 1 fps: the second frame is not due for a second.
        write_avi(&dir.path().join("slow.avi"), 1, &[b"frame-0", b"frame-1"]);
        let mut source = AviVideoSource::new(dir.path(), false);
        source.fetch_channel_data();
        let mut buf = FrameBuffer::new();

        assert!(!source.get_video_frame(&mut buf), "stopped sources emit nothing");
        source.set_state(PlayerState::Playing);
        assert!(source.get_video_frame(&mut buf));
        assert_eq!(buf.as_slice(), b"frame-0");
        assert!(!source.get_video_frame(&mut buf));
    }

    #[test]
    fn loops_at_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        write_avi(&dir.path().join("fast.avi"), 1000, &[b"only"]);
        let mut source = AviVideoSource::new(dir.path(), false);
        source.fetch_channel_data();
        source.set_state(PlayerState::Playing);
        let mut buf = FrameBuffer::new();

        assert!(source.get_video_frame(&mut buf));
        std::thread::sleep(std::time::Duration::from_millis(5));
        // End of list reopens the file; the following poll replays it.
        let mut replayed = false;
        for _ in 0..4 {
            if source.get_video_frame(&mut buf) {
                replayed = true;
                break;
            }
        }
        assert!(replayed);
        assert_eq!(buf.as_slice(), b"only");
    }

    #[test]
    fn broken_channel_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_avi(&dir.path().join("a.avi"), 10, &[b"ok"]);
        std::fs::write(dir.path().join("b.avi"), b"definitely not riff").unwrap();
        let mut source = AviVideoSource::new(dir.path(), false);
        source.fetch_channel_data();
        source.set_state(PlayerState::Playing);

        let err = source.next_channel().unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
        let mut buf = FrameBuffer::new();
        assert!(!source.get_video_frame(&mut buf));

        source.set_channel(0).unwrap();
        assert!(source.get_video_frame(&mut buf));
        assert_eq!(buf.as_slice(), b"ok");
    }

    #[test]
    fn unopenable_library_reports_no_channels() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.avi"), b"not riff at all").unwrap();
        let mut source = AviVideoSource::new(dir.path(), false);
        assert!(!source.fetch_channel_data());
        source.set_state(PlayerState::Playing);
        let mut buf = FrameBuffer::new();
        assert!(!source.get_video_frame(&mut buf));
    }

    #[test]
    fn starts_on_first_playable_channel() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.avi"), b"not riff at all").unwrap();
        write_avi(&dir.path().join("b.avi"), 10, &[b"b0"]);
        let mut source = AviVideoSource::new(dir.path(), false);
        assert!(source.fetch_channel_data());
        assert_eq!(source.channel_number(), 1);
        source.set_state(PlayerState::Playing);
        let mut buf = FrameBuffer::new();
        assert!(source.get_video_frame(&mut buf));
        assert_eq!(buf.as_slice(), b"b0");
    }

    #[test]
    fn truncated_frame_during_catch_up_is_not_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.avi");
        write_avi(&path, 1000, &[b"frame-0", b"frame-1", b"frame-2"]);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 2);
        std::fs::write(&path, bytes).unwrap();

        let mut source = AviVideoSource::new(dir.path(), false);
        assert!(source.fetch_channel_data());
        source.set_state(PlayerState::Playing);
        let mut buf = FrameBuffer::new();
        assert!(source.get_video_frame(&mut buf));
        assert_eq!(buf.as_slice(), b"frame-0");

        // Several frames are owed; the last one cannot be read in full.
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!source.get_video_frame(&mut buf));

        // The channel was reopened and plays from the start.
        assert!(source.get_video_frame(&mut buf));
        assert_eq!(buf.as_slice(), b"frame-0");
    }

    #[test]
    fn channel_selection_clamps_and_wraps() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1.avi", "2.avi"] {
            write_avi(&dir.path().join(name), 10, &[b"x"]);
        }
        let mut source = AviVideoSource::new(dir.path(), false);
        source.fetch_channel_data();
        source.set_channel(7).unwrap();
        assert_eq!(source.channel_number(), 1);
        source.next_channel().unwrap();
        assert_eq!(source.channel_number(), 0);
    }
}
