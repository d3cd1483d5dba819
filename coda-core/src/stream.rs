//! Readers and writers for CODA event streams.
//!
//! Two framings are supported:
//!
//! - EVIO version 4 files: a sequence of blocks, each an 8-word header
//!   followed by whole events. The byte order is detected from the magic
//!   word of the first block.
//! - Raw streams: events back to back, each starting with its length word,
//!   in a byte order chosen by the caller.
//!
//! Events are handed out as `&[u32]` slices in native word order, ready for
//! the decoders. Length words are not trusted for allocation: records
//! longer than the reader's limit are rejected, and buffers grow only as
//! data arrives.

use crate::constants::{
    DEFAULT_MAX_RECORD_WORDS, EVIO_BLOCK_HEADER_WORDS, EVIO_MAGIC, EVIO_VERSION,
};
use crate::parser;
use crate::types::BlockBitInfo;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, BufWriter, Read, Write};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while reading a stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not an EVIO block: magic word {found:#010x}")]
    BadMagic { found: u32 },

    #[error("Unsupported EVIO version {0}")]
    UnsupportedVersion(u32),

    #[error("Block {block_number}: {reason}")]
    BadBlockHeader { block_number: u32, reason: String },

    #[error("Stream ends inside a block or event: expected {expected} bytes, got {read}")]
    Truncated { expected: usize, read: usize },

    #[error("Record of {length} words exceeds the limit of {limit} words")]
    TooLarge { length: u64, limit: usize },

    #[error("Block {block_number}: event of {event_length} words overruns block ({remaining} words left)")]
    EventOverrun {
        block_number: u32,
        event_length: u64,
        remaining: usize,
    },
}

/// Byte order of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl std::str::FromStr for Endianness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "little" | "le" => Ok(Self::Little),
            "big" | "be" => Ok(Self::Big),
            other => Err(format!("Unknown byte order: {}. Use little or big", other)),
        }
    }
}

impl Endianness {
    fn decode_words(self, bytes: &[u8], words: &mut [u32]) {
        match self {
            Self::Little => LittleEndian::read_u32_into(bytes, words),
            Self::Big => BigEndian::read_u32_into(bytes, words),
        }
    }

    fn read_word<R: Read>(self, reader: &mut R) -> io::Result<u32> {
        match self {
            Self::Little => reader.read_u32::<LittleEndian>(),
            Self::Big => reader.read_u32::<BigEndian>(),
        }
    }

    fn write_word<W: Write>(self, writer: &mut W, word: u32) -> io::Result<()> {
        match self {
            Self::Little => writer.write_u32::<LittleEndian>(word),
            Self::Big => writer.write_u32::<BigEndian>(word),
        }
    }

    /// Detects the byte order from the bytes of an EVIO magic word.
    fn detect(magic: &[u8]) -> Result<Self, StreamError> {
        if LittleEndian::read_u32(magic) == EVIO_MAGIC {
            Ok(Self::Little)
        } else if BigEndian::read_u32(magic) == EVIO_MAGIC {
            Ok(Self::Big)
        } else {
            Err(StreamError::BadMagic {
                found: LittleEndian::read_u32(magic),
            })
        }
    }
}

/// Fills `buf` unless the reader is exhausted first; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Words read per step when filling a record buffer.
const READ_CHUNK_WORDS: usize = 1 << 16;

/// Appends `count` words to `words`, growing the buffer one chunk at a time.
fn read_words_growing<R: Read>(
    order: Endianness,
    reader: &mut R,
    words: &mut Vec<u32>,
    count: usize,
) -> Result<(), StreamError> {
    let mut bytes = vec![0u8; count.min(READ_CHUNK_WORDS) * 4];
    let mut done = 0;
    while done < count {
        let chunk = (count - done).min(READ_CHUNK_WORDS);
        let raw = &mut bytes[..chunk * 4];
        let read = read_full(reader, raw)?;
        if read < raw.len() {
            return Err(StreamError::Truncated {
                expected: count * 4,
                read: done * 4 + read,
            });
        }
        let filled = words.len();
        words.resize(filled + chunk, 0);
        order.decode_words(raw, &mut words[filled..]);
        done += chunk;
    }
    Ok(())
}

fn check_length(length: u64, limit: usize) -> Result<usize, StreamError> {
    if length > limit as u64 {
        return Err(StreamError::TooLarge { length, limit });
    }
    Ok(length as usize)
}

fn truncated(err: io::Error, expected: usize) -> StreamError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        StreamError::Truncated { expected, read: 0 }
    } else {
        StreamError::Io(err)
    }
}

/// EVIO version 4 block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block length in words, header included.
    pub length: u32,
    pub number: u32,
    pub header_length: u32,
    pub event_count: u32,
    pub version: u32,
    pub info: BlockBitInfo,
}

impl BlockHeader {
    fn from_words(words: &[u32; EVIO_BLOCK_HEADER_WORDS]) -> Self {
        Self {
            length: words[0],
            number: words[1],
            header_length: words[2],
            event_count: words[3],
            version: words[5] & 0xFF,
            info: parser::decode_block_bits(words[5] >> 8),
        }
    }

    fn validate(&self) -> Result<(), StreamError> {
        if self.version != EVIO_VERSION {
            return Err(StreamError::UnsupportedVersion(self.version));
        }
        let bad = |reason: String| {
            Err(StreamError::BadBlockHeader {
                block_number: self.number,
                reason,
            })
        };
        if (self.header_length as usize) < EVIO_BLOCK_HEADER_WORDS {
            return bad(format!("header length {} is too short", self.header_length));
        }
        if self.length < self.header_length {
            return bad(format!(
                "block length {} is shorter than its header ({})",
                self.length, self.header_length
            ));
        }
        Ok(())
    }
}

/// One block of an EVIO file, borrowing the reader's buffer.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub header: BlockHeader,
    /// Words following the block header.
    pub words: &'a [u32],
}

impl<'a> Block<'a> {
    /// The dictionary event, if this block carries one.
    pub fn dictionary(&self) -> Option<&'a [u32]> {
        if !self.header.info.has_dictionary {
            return None;
        }
        let len = *self.words.first()? as usize + 1;
        self.words.get(..len)
    }

    /// Iterates over the events of the block, skipping the dictionary.
    pub fn events(&self) -> BlockEvents<'a> {
        let pos = self.dictionary().map_or(0, <[u32]>::len);
        BlockEvents {
            words: self.words,
            pos,
            block_number: self.header.number,
        }
    }
}

/// Iterator over the events of a [`Block`].
///
/// Stops after the first event that overruns the block.
#[derive(Debug, Clone)]
pub struct BlockEvents<'a> {
    words: &'a [u32],
    pos: usize,
    block_number: u32,
}

impl<'a> Iterator for BlockEvents<'a> {
    type Item = Result<&'a [u32], StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = &self.words[self.pos.min(self.words.len())..];
        let first = *remaining.first()?;
        let event_length = first as u64 + 1;
        if event_length > remaining.len() as u64 {
            self.pos = self.words.len();
            return Some(Err(StreamError::EventOverrun {
                block_number: self.block_number,
                event_length,
                remaining: remaining.len(),
            }));
        }
        let event = &remaining[..event_length as usize];
        self.pos += event.len();
        Some(Ok(event))
    }
}

/// Reads EVIO version 4 blocks.
pub struct EvioBlockReader<R: Read> {
    reader: R,
    order: Option<Endianness>,
    words: Vec<u32>,
    blocks_read: u64,
    max_words: usize,
}

impl<R: Read> EvioBlockReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            order: None,
            words: Vec::new(),
            blocks_read: 0,
            max_words: DEFAULT_MAX_RECORD_WORDS,
        }
    }

    /// Sets the longest block accepted, in words, header included.
    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    /// Byte order detected from the first block.
    pub fn byte_order(&self) -> Option<Endianness> {
        self.order
    }

    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Reads the next block; returns `None` at the end of the stream.
    pub fn read_block(&mut self) -> Result<Option<Block<'_>>, StreamError> {
        let mut raw = [0u8; EVIO_BLOCK_HEADER_WORDS * 4];
        let read = read_full(&mut self.reader, &mut raw)?;
        if read == 0 {
            return Ok(None);
        }
        if read < raw.len() {
            return Err(StreamError::Truncated {
                expected: raw.len(),
                read,
            });
        }

        let magic = &raw[(EVIO_BLOCK_HEADER_WORDS - 1) * 4..];
        let order = match self.order {
            Some(order) => order,
            None => {
                let order = Endianness::detect(magic)?;
                debug!(?order, "detected EVIO byte order");
                self.order = Some(order);
                order
            }
        };
        let mut header_words = [0u32; EVIO_BLOCK_HEADER_WORDS];
        order.decode_words(&raw, &mut header_words);
        if header_words[EVIO_BLOCK_HEADER_WORDS - 1] != EVIO_MAGIC {
            return Err(StreamError::BadMagic {
                found: header_words[EVIO_BLOCK_HEADER_WORDS - 1],
            });
        }
        let header = BlockHeader::from_words(&header_words);
        header.validate()?;
        check_length(header.length as u64, self.max_words)?;

        // Extended headers carry nothing we use.
        for _ in EVIO_BLOCK_HEADER_WORDS..header.header_length as usize {
            order
                .read_word(&mut self.reader)
                .map_err(|e| truncated(e, 4))?;
        }

        let data_words = (header.length - header.header_length) as usize;
        self.words.clear();
        read_words_growing(order, &mut self.reader, &mut self.words, data_words)?;
        self.blocks_read += 1;

        let block = Block {
            header,
            words: &self.words,
        };
        let found = block.events().count() + block.dictionary().is_some() as usize;
        if found != header.event_count as usize {
            warn!(
                block = header.number,
                declared = header.event_count,
                found,
                "EVIO block event count mismatch"
            );
        }
        debug!(
            block = header.number,
            length = header.length,
            events = header.event_count,
            info = %header.info,
            "read EVIO block"
        );
        Ok(Some(block))
    }
}

/// Writes EVIO version 4 blocks.
pub struct EvioBlockWriter<W: Write> {
    writer: BufWriter<W>,
    order: Endianness,
    next_block: u32,
}

impl<W: Write> EvioBlockWriter<W> {
    pub fn new(writer: W, order: Endianness) -> Self {
        Self {
            writer: BufWriter::new(writer),
            order,
            next_block: 1,
        }
    }

    /// Writes one block holding `events`.
    pub fn write_block(
        &mut self,
        info: &BlockBitInfo,
        events: &[&[u32]],
    ) -> Result<(), StreamError> {
        let data_words: usize = events.iter().map(|e| e.len()).sum();
        let header = [
            (EVIO_BLOCK_HEADER_WORDS + data_words) as u32,
            self.next_block,
            EVIO_BLOCK_HEADER_WORDS as u32,
            events.len() as u32,
            0,
            (parser::encode_block_bits(info) << 8) | EVIO_VERSION,
            0,
            EVIO_MAGIC,
        ];
        for word in header.into_iter().chain(events.iter().flat_map(|e| e.iter().copied())) {
            self.order.write_word(&mut self.writer, word)?;
        }
        self.next_block += 1;
        Ok(())
    }

    /// Flushes buffered blocks and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, StreamError> {
        self.writer
            .into_inner()
            .map_err(|e| StreamError::Io(e.into_error()))
    }
}

/// Reads length-prefixed events with no block framing.
pub struct RawEventReader<R: Read> {
    reader: R,
    order: Endianness,
    words: Vec<u32>,
    max_words: usize,
}

impl<R: Read> RawEventReader<R> {
    pub fn new(reader: R, order: Endianness) -> Self {
        Self {
            reader,
            order,
            words: Vec::new(),
            max_words: DEFAULT_MAX_RECORD_WORDS,
        }
    }

    /// Sets the longest event accepted, in words, length word included.
    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    /// Reads the next event, length word included.
    pub fn read_event(&mut self) -> Result<Option<&[u32]>, StreamError> {
        let mut raw = [0u8; 4];
        let read = read_full(&mut self.reader, &mut raw)?;
        if read == 0 {
            return Ok(None);
        }
        if read < raw.len() {
            return Err(StreamError::Truncated {
                expected: raw.len(),
                read,
            });
        }
        let mut length = [0u32; 1];
        self.order.decode_words(&raw, &mut length);

        let data_words = check_length(length[0] as u64 + 1, self.max_words)? - 1;
        self.words.clear();
        self.words.push(length[0]);
        read_words_growing(self.order, &mut self.reader, &mut self.words, data_words)?;
        Ok(Some(&self.words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PayloadType;
    use std::io::Cursor;

    fn phys_info() -> BlockBitInfo {
        BlockBitInfo {
            payload_type: PayloadType::Phys,
            has_dictionary: false,
            is_last_block: false,
            is_first_event: false,
        }
    }

    fn write_file(order: Endianness, blocks: &[(BlockBitInfo, Vec<Vec<u32>>)]) -> Vec<u8> {
        let mut writer = EvioBlockWriter::new(Vec::new(), order);
        for (info, events) in blocks {
            let events: Vec<&[u32]> = events.iter().map(Vec::as_slice).collect();
            writer.write_block(info, &events).unwrap();
        }
        writer.into_inner().unwrap()
    }

    #[test]
    fn test_block_round_trip_both_orders() {
        for order in [Endianness::Little, Endianness::Big] {
            let mut last = phys_info();
            last.is_last_block = true;
            let bytes = write_file(
                order,
                &[
                    (phys_info(), vec![vec![1, 0xAA], vec![2, 0xBB, 0xCC]]),
                    (last, vec![]),
                ],
            );
            let mut reader = EvioBlockReader::new(Cursor::new(bytes));

            let block = reader.read_block().unwrap().unwrap();
            assert_eq!(block.header.number, 1);
            assert_eq!(block.header.event_count, 2);
            assert_eq!(block.header.info.payload_type, PayloadType::Phys);
            let events: Vec<_> = block.events().map(Result::unwrap).collect();
            assert_eq!(events, vec![&[1, 0xAA][..], &[2, 0xBB, 0xCC][..]]);

            let block = reader.read_block().unwrap().unwrap();
            assert!(block.header.info.is_last_block);
            assert_eq!(block.events().count(), 0);

            assert!(reader.read_block().unwrap().is_none());
            assert_eq!(reader.byte_order(), Some(order));
            assert_eq!(reader.blocks_read(), 2);
        }
    }

    #[test]
    fn test_dictionary_is_skipped() {
        let mut info = phys_info();
        info.has_dictionary = true;
        let bytes = write_file(
            Endianness::Little,
            &[(info, vec![vec![1, 0x3c786d6c], vec![1, 7]])],
        );
        let mut reader = EvioBlockReader::new(Cursor::new(bytes));
        let block = reader.read_block().unwrap().unwrap();
        assert_eq!(block.dictionary(), Some(&[1, 0x3c786d6c][..]));
        let events: Vec<_> = block.events().map(Result::unwrap).collect();
        assert_eq!(events, vec![&[1, 7][..]]);
    }

    #[test]
    fn test_bad_magic() {
        let bytes = vec![0u8; 32];
        let mut reader = EvioBlockReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_block(),
            Err(StreamError::BadMagic { found: 0 })
        ));
    }

    #[test]
    fn test_truncated_block() {
        let mut bytes = write_file(Endianness::Little, &[(phys_info(), vec![vec![3, 1, 2, 3]])]);
        bytes.truncate(bytes.len() - 4);
        let mut reader = EvioBlockReader::new(Cursor::new(bytes.clone()));
        assert!(matches!(reader.read_block(), Err(StreamError::Truncated { .. })));

        bytes.truncate(10);
        let mut reader = EvioBlockReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_block(),
            Err(StreamError::Truncated { expected: 32, read: 10 })
        ));
    }

    #[test]
    fn test_event_overrun_in_block() {
        let bytes = write_file(Endianness::Big, &[(phys_info(), vec![vec![9, 1, 2]])]);
        let mut reader = EvioBlockReader::new(Cursor::new(bytes));
        let block = reader.read_block().unwrap().unwrap();
        let mut events = block.events();
        assert!(matches!(
            events.next(),
            Some(Err(StreamError::EventOverrun { event_length: 10, remaining: 3, .. }))
        ));
        assert!(events.next().is_none());
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = write_file(Endianness::Little, &[(phys_info(), vec![])]);
        bytes[20] = 3;
        let mut reader = EvioBlockReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_block(),
            Err(StreamError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn test_raw_event_reader() {
        let mut bytes = Vec::new();
        for word in [2u32, 0x0001_10CC, 5, 0, 0x0012_01CC] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        let mut reader = RawEventReader::new(Cursor::new(bytes), Endianness::Big);
        assert_eq!(reader.read_event().unwrap(), Some(&[2, 0x0001_10CC, 5][..]));
        assert_eq!(reader.read_event().unwrap(), Some(&[0][..]));
        assert!(matches!(reader.read_event(), Err(StreamError::Truncated { .. })));
    }

    #[test]
    fn test_raw_event_length_limit() {
        let bytes = 0xFFFF_FFF0u32.to_le_bytes().to_vec();
        let mut reader = RawEventReader::new(Cursor::new(bytes.clone()), Endianness::Little);
        assert!(matches!(
            reader.read_event(),
            Err(StreamError::TooLarge {
                length: 0xFFFF_FFF1,
                limit: DEFAULT_MAX_RECORD_WORDS
            })
        ));

        // Without a limit the buffer only grows as far as the data goes.
        let mut reader =
            RawEventReader::new(Cursor::new(bytes), Endianness::Little).with_max_words(usize::MAX);
        assert!(matches!(
            reader.read_event(),
            Err(StreamError::Truncated { read: 0, .. })
        ));

        let mut bytes = Vec::new();
        for word in [3u32, 1, 2, 3] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let mut reader =
            RawEventReader::new(Cursor::new(bytes.clone()), Endianness::Little).with_max_words(3);
        assert!(matches!(
            reader.read_event(),
            Err(StreamError::TooLarge { length: 4, limit: 3 })
        ));
        let mut reader =
            RawEventReader::new(Cursor::new(bytes), Endianness::Little).with_max_words(4);
        assert_eq!(reader.read_event().unwrap(), Some(&[3, 1, 2, 3][..]));
    }

    #[test]
    fn test_block_length_limit() {
        let mut bytes = write_file(Endianness::Little, &[(phys_info(), vec![vec![1, 7]])]);
        bytes[..4].copy_from_slice(&0x7FFF_FFFFu32.to_le_bytes());
        let mut reader = EvioBlockReader::new(Cursor::new(bytes.clone()));
        assert!(matches!(
            reader.read_block(),
            Err(StreamError::TooLarge { length: 0x7FFF_FFFF, .. })
        ));

        let mut reader = EvioBlockReader::new(Cursor::new(bytes)).with_max_words(usize::MAX);
        assert!(matches!(
            reader.read_block(),
            Err(StreamError::Truncated { read: 8, .. })
        ));
    }

    #[test]
    fn test_endianness_parsing() {
        assert_eq!("LE".parse::<Endianness>().unwrap(), Endianness::Little);
        assert_eq!("big".parse::<Endianness>().unwrap(), Endianness::Big);
        assert!("middle".parse::<Endianness>().is_err());
    }
}
