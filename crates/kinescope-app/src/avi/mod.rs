//! RIFF/AVI container reading.
//!
//! Playback only needs two things from an AVI file: the frame rate from the
//! main header and sequential access to the payload chunks of one stream
//! inside the `movi` list. Index (`idx1`) and stream headers are ignored.

pub mod parser;

use std::io;

pub use parser::AviParser;

/// A RIFF chunk tag.
pub type FourCc = [u8; 4];

pub const RIFF: &FourCc = b"RIFF";
pub const AVI_FORM: &FourCc = b"AVI ";
pub const LIST: &FourCc = b"LIST";
pub const HDRL: &FourCc = b"hdrl";
pub const AVIH: &FourCc = b"avih";
pub const MOVI: &FourCc = b"movi";

/// Stream payloads a parser can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Compressed video frames (`00dc`).
    Video,
    /// Audio samples (`01wb`).
    Audio,
}

impl ChunkType {
    pub fn fourcc(self) -> &'static FourCc {
        match self {
            ChunkType::Video => b"00dc",
            ChunkType::Audio => b"01wb",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AviError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("not a RIFF file")]
    NotRiff,
    #[error("RIFF form type is {0:?}, expected \"AVI \"")]
    NotAvi(String),
    #[error("no movi list found")]
    NoMoviList,
}

/// Render a tag for log output, replacing non-printable bytes.
pub fn fourcc_str(id: &FourCc) -> String {
    id.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_type_tags() {
        assert_eq!(ChunkType::Video.fourcc(), b"00dc");
        assert_eq!(ChunkType::Audio.fourcc(), b"01wb");
    }

    #[test]
    fn fourcc_str_masks_binary() {
        assert_eq!(fourcc_str(b"AVI "), "AVI ");
        assert_eq!(fourcc_str(&[0x00, b'a', 0xff, b'b']), ".a.b");
    }
}
