use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use super::{fourcc_str, AviError, ChunkType, FourCc, AVIH, AVI_FORM, HDRL, LIST, MOVI, RIFF};
use crate::source::FrameBuffer;

/// FourCC + little-endian size.
const CHUNK_HEADER_LEN: u64 = 8;

/// Size of the fixed `avih` record (fourteen little-endian u32 fields).
const AVIH_LEN: usize = 56;
/// `dwScale` and `dwRate` byte offsets inside the `avih` record.
const AVIH_SCALE_OFFSET: usize = 40;
const AVIH_RATE_OFFSET: usize = 44;

struct ChunkHeader {
    id: FourCc,
    size: u32,
}

fn read_chunk_header<R: Read>(reader: &mut R) -> io::Result<ChunkHeader> {
    let mut id = [0u8; 4];
    reader.read_exact(&mut id)?;
    let size = reader.read_u32::<LittleEndian>()?;
    Ok(ChunkHeader { id, size })
}

/// Sequential reader over the `movi` list of an AVI file.
///
/// The parser is positioned at the first `movi` chunk once constructed.
/// `movi_remaining` is the byte budget left in the list: it only ever
/// decreases, by exactly the header, payload and pad bytes consumed.
pub struct AviParser<R> {
    reader: R,
    chunk_type: ChunkType,
    frame_rate: Option<f32>,
    movi_start: u64,
    movi_len: u64,
    movi_remaining: u64,
}

impl AviParser<BufReader<File>> {
    /// Open an AVI file and locate its `movi` list.
    ///
    /// On failure the file handle is dropped before returning.
    pub fn open(path: &Path, chunk_type: ChunkType) -> Result<Self, AviError> {
        let file = File::open(path)?;
        let parser = Self::from_reader(BufReader::new(file), chunk_type)?;
        log::info!(
            "Opened {}: {} fps, movi list {} bytes at offset {}",
            path.display(),
            parser
                .frame_rate
                .map_or_else(|| "unknown".to_string(), |r| format!("{r:.2}")),
            parser.movi_len,
            parser.movi_start,
        );
        Ok(parser)
    }
}

impl<R: Read + Seek> AviParser<R> {
    /// Validate the RIFF header and scan top-level chunks up to `movi`.
    pub fn from_reader(mut reader: R, chunk_type: ChunkType) -> Result<Self, AviError> {
        let riff = read_chunk_header(&mut reader)?;
        if &riff.id != RIFF {
            return Err(AviError::NotRiff);
        }
        let mut form = [0u8; 4];
        reader.read_exact(&mut form)?;
        if &form != AVI_FORM {
            return Err(AviError::NotAvi(fourcc_str(&form)));
        }

        let mut frame_rate = None;
        loop {
            let header = match read_chunk_header(&mut reader) {
                Ok(h) => h,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            if &header.id != LIST {
                reader.seek(SeekFrom::Current(i64::from(header.size)))?;
                continue;
            }

            let content_start = reader.stream_position()?;
            let mut list_type = [0u8; 4];
            match reader.read_exact(&mut list_type) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            if &list_type == HDRL {
                let list_end = content_start + u64::from(header.size);
                if let Some(rate) = read_frame_rate(&mut reader, list_end)? {
                    log::debug!("avih frame rate: {rate}");
                    frame_rate = Some(rate);
                }
                // Only the rate is needed; skip whatever else the list holds.
                reader.seek(SeekFrom::Start(list_end))?;
            } else if &list_type == MOVI {
                let movi_start = reader.stream_position()?;
                let movi_len = u64::from(header.size.saturating_sub(4));
                log::debug!("Found movi list at {movi_start}, {movi_len} bytes");
                return Ok(Self {
                    reader,
                    chunk_type,
                    frame_rate,
                    movi_start,
                    movi_len,
                    movi_remaining: movi_len,
                });
            } else {
                log::debug!("Skipping LIST {}", fourcc_str(&list_type));
                reader.seek(SeekFrom::Current(i64::from(header.size.saturating_sub(4))))?;
            }
        }

        Err(AviError::NoMoviList)
    }

    /// Frames per second from `avih` (`dwRate / dwScale`), if the file had one.
    pub fn frame_rate(&self) -> Option<f32> {
        self.frame_rate
    }

    /// File offset of the first `movi` chunk.
    pub fn movi_start(&self) -> u64 {
        self.movi_start
    }

    /// Declared payload length of the `movi` list.
    pub fn movi_len(&self) -> u64 {
        self.movi_len
    }

    /// Bytes of the `movi` list not yet consumed.
    #[cfg(test)]
    pub fn bytes_remaining(&self) -> u64 {
        self.movi_remaining
    }

    /// No further chunk header fits in the remaining budget.
    pub fn is_exhausted(&self) -> bool {
        self.movi_remaining < CHUNK_HEADER_LEN
    }

    /// Copy the next chunk of the requested stream into `buffer`.
    ///
    /// Chunks of other streams are skipped. Returns the payload length, or 0
    /// once the list is exhausted. A frame that cannot be buffered (allocation
    /// failure) is skipped and also reported as 0 while the list continues;
    /// check [`is_exhausted`](Self::is_exhausted) to tell the two apart.
    pub fn next_chunk(&mut self, buffer: &mut FrameBuffer) -> usize {
        match self.read_next_chunk(buffer) {
            Ok(len) => len,
            Err(e) => {
                log::warn!("AVI read failed, ending stream: {e}");
                self.movi_remaining = 0;
                0
            }
        }
    }

    fn read_next_chunk(&mut self, buffer: &mut FrameBuffer) -> io::Result<usize> {
        let wanted = self.chunk_type.fourcc();
        while self.movi_remaining >= CHUNK_HEADER_LEN {
            let header = read_chunk_header(&mut self.reader)?;
            self.movi_remaining -= CHUNK_HEADER_LEN;

            let size = u64::from(header.size);
            if size > self.movi_remaining {
                log::warn!(
                    "Chunk {} ({size} bytes) overruns movi list ({} bytes left)",
                    fourcc_str(&header.id),
                    self.movi_remaining
                );
                // Consume the rest of the list; the budget must never go negative.
                self.reader
                    .seek(SeekFrom::Current(self.movi_remaining as i64))?;
                self.movi_remaining = 0;
                return Ok(0);
            }

            if &header.id == wanted {
                let len = header.size as usize;
                let copied = match buffer.ensure_capacity(len) {
                    Ok(()) => {
                        buffer.read_from(&mut self.reader, len)?;
                        true
                    }
                    Err(e) => {
                        log::warn!("Cannot buffer {len} byte frame, skipping: {e}");
                        buffer.clear();
                        self.reader.seek(SeekFrom::Current(size as i64))?;
                        false
                    }
                };
                self.movi_remaining -= size;
                self.skip_pad(size)?;
                return Ok(if copied { len } else { 0 });
            }

            self.reader.seek(SeekFrom::Current(size as i64))?;
            self.movi_remaining -= size;
            self.skip_pad(size)?;
        }
        Ok(0)
    }

    /// Odd-sized payloads are followed by one pad byte.
    fn skip_pad(&mut self, size: u64) -> io::Result<()> {
        if size % 2 == 1 && self.movi_remaining > 0 {
            self.reader.seek(SeekFrom::Current(1))?;
            self.movi_remaining -= 1;
        }
        Ok(())
    }
}

/// Scan the chunks of an `hdrl` list for `avih` and compute its frame rate.
fn read_frame_rate<R: Read + Seek>(reader: &mut R, list_end: u64) -> io::Result<Option<f32>> {
    while reader.stream_position()? + CHUNK_HEADER_LEN <= list_end {
        let header = match read_chunk_header(reader) {
            Ok(h) => h,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };
        if &header.id != AVIH {
            let skip = u64::from(header.size) + u64::from(header.size % 2);
            reader.seek(SeekFrom::Current(skip as i64))?;
            continue;
        }

        let mut record = [0u8; AVIH_LEN];
        let len = (header.size as usize).min(AVIH_LEN);
        if len < AVIH_RATE_OFFSET + 4 {
            log::warn!("avih chunk too short ({} bytes)", header.size);
            return Ok(None);
        }
        reader.read_exact(&mut record[..len])?;
        let field = |offset: usize| {
            u32::from_le_bytes([
                record[offset],
                record[offset + 1],
                record[offset + 2],
                record[offset + 3],
            ])
        };
        let scale = field(AVIH_SCALE_OFFSET);
        let rate = field(AVIH_RATE_OFFSET);
        if scale == 0 || rate == 0 {
            log::warn!("avih has dwRate {rate} / dwScale {scale}, frame rate unknown");
            return Ok(None);
        }
        return Ok(Some(rate as f32 / scale as f32));
    }
    Ok(None)
}
