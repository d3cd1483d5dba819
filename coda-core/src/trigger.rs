//! CODA3 trigger bank parsing.
//!
//! The trigger bank summarizes a block of triggers: the starting event
//! number, optional run info and timestamps, one event type per trigger, and
//! the per-ROC segments that include the Trigger Supervisor's own data.
//!
//! Layout (word offsets from the bank's length word):
//!
//! ```text
//! 0        bank length
//! 1        tag (0xff2x) | type 0x20 | nrocs
//! 2        segment 1 header: tag | type 0x0a | length
//!          u64 event number
//!          u64 run info                    if tag bit 1
//!          u64 timestamp[block_size]       if tag bit 0
//! ...      segment 2 header: tag | type 0x05 | length
//!          u16 event type[block_size], padded to a word boundary
//! ...      nrocs ROC segments: roc | type | length, then data
//! ```
//!
//! Every array is a view into the event buffer; nothing is copied.

use crate::constants::*;
use crate::error::{Severity, TrigBankAnomaly, TrigBankError};
use crate::parser;

/// Borrowed view of 64-bit values stored as low/high word pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct U64View<'a> {
    words: &'a [u32],
}

impl<'a> U64View<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self { words }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.len() / 2
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<u64> {
        let lo = *self.words.get(2 * index)?;
        let hi = *self.words.get(2 * index + 1)?;
        Some(parser::join_u64(lo, hi))
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + 'a {
        self.words
            .chunks_exact(2)
            .map(|pair| parser::join_u64(pair[0], pair[1]))
    }

    pub fn as_words(&self) -> &'a [u32] {
        self.words
    }
}

/// Borrowed view of packed 16-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct U16View<'a> {
    words: &'a [u32],
    count: usize,
}

impl<'a> U16View<'a> {
    pub fn new(words: &'a [u32], count: usize) -> Self {
        Self {
            words,
            count: count.min(words.len() * 2),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<u16> {
        if index >= self.count {
            return None;
        }
        parser::packed_u16(self.words, index)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + 'a {
        let words = self.words;
        (0..self.count).filter_map(move |i| parser::packed_u16(words, i))
    }
}

/// A parsed CODA3 trigger bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerBank<'a> {
    /// Number of triggers in the block.
    pub block_size: u32,
    /// Trigger bank tag, 0xff2x.
    pub tag: u16,
    /// Number of ROC segments, 1-255.
    pub nrocs: u16,
    /// Total length including the length word.
    pub len: u32,
    /// Number of words in the TS ROC segment.
    pub ts_roc_len: u32,
    /// Starting event number of the block.
    pub event_number: u64,
    pub run_info: u64,
    pub timestamps: Option<U64View<'a>>,
    pub event_types: U16View<'a>,
    pub ts_roc: Option<&'a [u32]>,
    /// First warn-level anomaly; the data above is best-effort.
    pub warning: Option<TrigBankError>,
}

/// Trigger information for one event of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEventInfo {
    pub event_number: u64,
    pub event_type: u16,
    pub time: Option<u64>,
    pub trigger_bits: Option<u32>,
}

impl<'a> TriggerBank<'a> {
    #[inline]
    pub fn with_time_stamp(&self) -> bool {
        self.tag & TRIGGER_TAG_TIMESTAMP != 0
    }

    #[inline]
    pub fn with_run_info(&self) -> bool {
        self.tag & TRIGGER_TAG_RUN_INFO != 0
    }

    #[inline]
    pub fn with_trigger_bits(&self) -> bool {
        self.ts_roc_len > 2 * self.block_size
    }

    /// Returns the trigger information of the `index`-th event in the block.
    pub fn event_info(&self, index: u32) -> Option<TriggerEventInfo> {
        if index >= self.block_size {
            return None;
        }
        let i = index as usize;
        let event_type = self.event_types.get(i)?;

        let time = match (self.timestamps, self.ts_roc) {
            (Some(ts), _) => ts.get(i),
            (None, Some(tsroc)) => {
                let stride = if self.with_trigger_bits() { 3 } else { 2 };
                let lo = tsroc.get(stride * i).copied();
                let hi = tsroc.get(stride * i + 1).copied();
                lo.zip(hi)
                    .map(|(lo, hi)| parser::join_u64(lo, hi) & TS_ROC_TIME_MASK)
            }
            (None, None) => None,
        };

        let trigger_bits = if self.with_trigger_bits() {
            self.ts_roc
                .and_then(|tsroc| tsroc.get(2 + 3 * i))
                .map(|bits| bits & TS_ROC_TRIGGER_BITS_MASK)
        } else {
            None
        };

        Some(TriggerEventInfo {
            event_number: self.event_number.wrapping_add(index as u64),
            event_type,
            time,
            trigger_bits,
        })
    }

    /// Iterates over the trigger information of every event in the block.
    pub fn events(&self) -> impl Iterator<Item = TriggerEventInfo> + '_ {
        (0..self.block_size).filter_map(move |i| self.event_info(i))
    }
}

fn fail(anomaly: TrigBankAnomaly) -> TrigBankError {
    TrigBankError::from(anomaly)
}

/// Reads a segment header at `offset` and returns `(data range, header word)`.
fn segment(
    buffer: &[u32],
    offset: usize,
    len: usize,
) -> Result<(std::ops::Range<usize>, u32), TrigBankError> {
    let word = buffer[offset];
    let slen = parser::segment_length(word) as usize;
    let end = offset + 1 + slen;
    if end > len {
        return Err(fail(TrigBankAnomaly::SegmentOverrun {
            offset: offset as u32,
            len: slen as u32,
            bank_len: len as u32,
        }));
    }
    Ok((offset + 1..end, word))
}

/// Parses a CODA3 trigger bank.
///
/// `buffer` starts at the trigger bank's length word and may extend past the
/// bank. `ts_roc_number` selects the ROC segment belonging to the Trigger
/// Supervisor.
pub fn parse_trigger_bank(
    buffer: &[u32],
    block_size: u32,
    ts_roc_number: u32,
) -> Result<TriggerBank<'_>, TrigBankError> {
    if block_size == 0 {
        return Err(fail(TrigBankAnomaly::BlockSizeZero));
    }
    if buffer.len() < 2 {
        return Err(fail(TrigBankAnomaly::BankExceedsBuffer {
            declared: 2,
            available: buffer.len() as u32,
        }));
    }

    let len = buffer[0] as u64 + 1;
    if len > buffer.len() as u64 {
        return Err(fail(TrigBankAnomaly::BankExceedsBuffer {
            declared: len.min(u32::MAX as u64) as u32,
            available: buffer.len() as u32,
        }));
    }
    let len = len as usize;

    let mut bank = TriggerBank {
        block_size,
        tag: parser::bank_tag(buffer[1]),
        nrocs: parser::bank_num(buffer[1]) as u16,
        len: len as u32,
        ..TriggerBank::default()
    };
    if bank.tag & TRIGGER_BANK_TAG_MASK != TRIGGER_BANK_TAG_BASE {
        return Err(fail(TrigBankAnomaly::UnexpectedTag { tag: bank.tag }));
    }

    // Segment 1: event number, run info, timestamps.
    let mut p = 2;
    if p >= len {
        return Err(fail(TrigBankAnomaly::PastEndAfterSegment1));
    }
    {
        let (range, word) = segment(buffer, p, len)?;
        let expected = 2
            * (1 + bank.with_run_info() as u32
                + if bank.with_time_stamp() { block_size } else { 0 });
        let actual = parser::segment_length(word);
        if actual != expected {
            return Err(fail(TrigBankAnomaly::Segment1Length { expected, actual }));
        }
        let values = U64View::new(&buffer[range.clone()]);
        let mut q = 0;
        bank.event_number = values.get(q).unwrap_or_default();
        q += 1;
        if bank.with_run_info() {
            bank.run_info = values.get(q).unwrap_or_default();
            q += 1;
        }
        if bank.with_time_stamp() {
            bank.timestamps = Some(U64View::new(&buffer[range.start + 2 * q..range.end]));
        }
        p = range.end;
    }
    if p >= len {
        return Err(fail(TrigBankAnomaly::PastEndAfterSegment1));
    }

    // Segment 2: event types.
    {
        let (range, word) = segment(buffer, p, len)?;
        let expected = (block_size - 1) / 2 + 1;
        let actual = parser::segment_length(word);
        if actual != expected {
            return Err(fail(TrigBankAnomaly::Segment2Length { expected, actual }));
        }
        bank.event_types = U16View::new(&buffer[range.clone()], block_size as usize);
        p = range.end;
    }

    // ROC segments, scanned for the TS ROC.
    if bank.nrocs == 0 {
        bank.warning.get_or_insert(fail(TrigBankAnomaly::NoRocSegments));
    }
    for scanned in 0..bank.nrocs as u32 {
        if p >= len {
            return Err(fail(TrigBankAnomaly::PastEndScanningRocs {
                scanned,
                nrocs: bank.nrocs as u32,
            }));
        }
        let (range, word) = segment(buffer, p, len)?;
        if parser::segment_tag(word) as u32 == ts_roc_number {
            bank.ts_roc_len = range.len() as u32;
            bank.ts_roc = Some(&buffer[range]);
            break;
        }
        p = range.end;
    }

    match bank.ts_roc {
        None if !bank.with_time_stamp() && bank.nrocs > 0 => {
            bank.warning.get_or_insert(fail(TrigBankAnomaly::TsRocNotFound {
                ts_roc: ts_roc_number,
            }));
        }
        Some(_) if bank.ts_roc_len < 2 * block_size => {
            bank.warning.get_or_insert(fail(TrigBankAnomaly::TsRocTooShort {
                expected: 2 * block_size,
                actual: bank.ts_roc_len,
            }));
        }
        _ => {}
    }
    debug_assert!(bank
        .warning
        .map_or(true, |w| w.severity == Severity::Warn));

    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a trigger bank with `block_size` events and one TS ROC segment.
    fn build_bank(tag_flags: u16, block_size: u32, ts_roc_words: u32) -> Vec<u32> {
        let mut seg1 = vec![0x0000_1000, 0x0000_0000]; // event number 4096
        if tag_flags & TRIGGER_TAG_RUN_INFO != 0 {
            seg1.extend_from_slice(&[0xAAAA, 0xBBBB]);
        }
        if tag_flags & TRIGGER_TAG_TIMESTAMP != 0 {
            for i in 0..block_size {
                seg1.extend_from_slice(&[100 + i, 1]);
            }
        }
        let types_len = (block_size - 1) / 2 + 1;
        let mut types = vec![0u32; types_len as usize];
        for i in 0..block_size as usize {
            types[i / 2] |= ((i as u32 + 1) & 0xFFFF) << (16 * (i % 2));
        }
        let mut tsroc = Vec::new();
        for i in 0..ts_roc_words {
            tsroc.push(if i % 3 == 2 { 0xFFC1 } else { 0x10 + i });
        }

        let mut bank = vec![0, parser::bank_word(TRIGGER_BANK_TAG_BASE | tag_flags, 0x20, 2)];
        bank.push(parser::segment_word(1, DATA_ULONG64, seg1.len() as u16));
        bank.extend(seg1);
        bank.push(parser::segment_word(1, DATA_USHORT16, types_len as u16));
        bank.extend(types);
        // A ROC that is not the TS, then the TS itself (ROC 0).
        bank.push(parser::segment_word(3, DATA_UINT32, 1));
        bank.push(0xDEAD);
        bank.push(parser::segment_word(0, DATA_UINT32, tsroc.len() as u16));
        bank.extend(tsroc);
        bank[0] = bank.len() as u32 - 1;
        bank
    }

    #[test]
    fn test_tag_flag_accessors() {
        for flags in 0..=3u16 {
            let words = build_bank(flags, 1, 3);
            let bank = parse_trigger_bank(&words, 1, 0).unwrap();
            assert_eq!(bank.with_time_stamp(), flags & 1 != 0);
            assert_eq!(bank.with_run_info(), flags & 2 != 0);
            assert_eq!(bank.with_trigger_bits(), bank.ts_roc_len > 2 * bank.block_size);
            assert_eq!(bank.timestamps.is_some(), flags & 1 != 0);
            assert_eq!(bank.event_number, 0x1000);
            if flags & 2 != 0 {
                assert_eq!(bank.run_info, 0x0000_BBBB_0000_AAAA);
            }
        }
    }

    #[test]
    fn test_event_info_from_timestamps() {
        let words = build_bank(TRIGGER_TAG_TIMESTAMP, 3, 9);
        let bank = parse_trigger_bank(&words, 3, 0).unwrap();
        assert!(bank.warning.is_none());
        assert_eq!(bank.event_types.len(), 3);
        assert_eq!(bank.event_types.iter().collect::<Vec<_>>(), vec![1, 2, 3]);

        let infos: Vec<_> = bank.events().collect();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].event_number, 0x1000);
        assert_eq!(infos[2].event_number, 0x1002);
        assert_eq!(infos[1].event_type, 2);
        assert_eq!(infos[1].time, Some((1u64 << 32) | 101));
        assert_eq!(infos[1].trigger_bits, Some(0x01));
    }

    #[test]
    fn test_event_info_from_ts_roc() {
        // No timestamps, TS ROC with 2 words per event (no trigger bits).
        let words = build_bank(0, 2, 4);
        let bank = parse_trigger_bank(&words, 2, 0).unwrap();
        assert!(!bank.with_trigger_bits());
        let info = bank.event_info(1).unwrap();
        assert_eq!(info.time, Some(parser::join_u64(0xFFC1, 0x13)));
        assert_eq!(info.trigger_bits, None);
        assert!(bank.event_info(2).is_none());
    }

    #[test]
    fn test_event_number_wraps() {
        let mut words = build_bank(0, 2, 6);
        words[3] = 0xFFFF_FFFF;
        words[4] = 0xFFFF_FFFF;
        let bank = parse_trigger_bank(&words, 2, 0).unwrap();
        assert_eq!(bank.event_number, u64::MAX);

        let infos: Vec<_> = bank.events().collect();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].event_number, u64::MAX);
        assert_eq!(infos[1].event_number, 0);
    }

    #[test]
    fn test_ts_roc_views_borrow_buffer() {
        let words = build_bank(TRIGGER_TAG_TIMESTAMP, 1, 3);
        let bank = parse_trigger_bank(&words, 1, 0).unwrap();
        let tsroc = bank.ts_roc.unwrap();
        let last = &words[words.len() - 3..];
        assert_eq!(tsroc.as_ptr(), last.as_ptr());
        assert_eq!(bank.ts_roc_len, 3);
    }

    #[test]
    fn test_block_size_zero() {
        let words = build_bank(0, 1, 2);
        let err = parse_trigger_bank(&words, 0, 0).unwrap_err();
        assert_eq!(err.anomaly, TrigBankAnomaly::BlockSizeZero);
        assert_eq!(err.severity, Severity::Err);
    }

    #[test]
    fn test_bank_exceeds_buffer_is_fatal() {
        let mut words = build_bank(0, 1, 2);
        words[0] += 10;
        let err = parse_trigger_bank(&words, 1, 0).unwrap_err();
        assert_eq!(err.severity, Severity::Fatal);
    }

    #[test]
    fn test_segment1_length_mismatch() {
        // Bank claims timestamps but is parsed with a larger block size.
        let words = build_bank(TRIGGER_TAG_TIMESTAMP, 1, 3);
        let err = parse_trigger_bank(&words, 2, 0).unwrap_err();
        assert_eq!(
            err.anomaly,
            TrigBankAnomaly::Segment1Length {
                expected: 6,
                actual: 4
            }
        );
    }

    #[test]
    fn test_segment2_length_mismatch() {
        let words = build_bank(0, 3, 6);
        let err = parse_trigger_bank(&words, 1, 0).unwrap_err();
        assert!(matches!(err.anomaly, TrigBankAnomaly::Segment2Length { .. }));
        assert_eq!(err.severity, Severity::Err);
    }

    #[test]
    fn test_unexpected_tag() {
        let mut words = build_bank(0, 1, 2);
        words[1] = parser::bank_word(0xff50, 0x20, 2);
        let err = parse_trigger_bank(&words, 1, 0).unwrap_err();
        assert_eq!(err.anomaly, TrigBankAnomaly::UnexpectedTag { tag: 0xff50 });
    }

    #[test]
    fn test_missing_ts_roc_warns() {
        let words = build_bank(0, 1, 2);
        let bank = parse_trigger_bank(&words, 1, 7).unwrap();
        assert!(bank.ts_roc.is_none());
        let warning = bank.warning.unwrap();
        assert_eq!(warning.severity, Severity::Warn);
        assert_eq!(warning.anomaly, TrigBankAnomaly::TsRocNotFound { ts_roc: 7 });
        assert_eq!(bank.event_info(0).unwrap().time, None);
    }

    #[test]
    fn test_past_end_scanning_rocs() {
        let mut words = build_bank(0, 1, 2);
        // Claim more ROC segments than are present; TS ROC 9 never matches.
        words[1] = parser::bank_word(TRIGGER_BANK_TAG_BASE, 0x20, 5);
        let err = parse_trigger_bank(&words, 1, 9).unwrap_err();
        assert_eq!(
            err.anomaly,
            TrigBankAnomaly::PastEndScanningRocs {
                scanned: 2,
                nrocs: 5
            }
        );
    }

    #[test]
    fn test_segment_overrun() {
        let mut words = build_bank(0, 1, 2);
        let last_seg = words.len() - 3;
        words[last_seg] = parser::segment_word(0, DATA_UINT32, 40);
        let err = parse_trigger_bank(&words, 1, 0).unwrap_err();
        assert!(matches!(err.anomaly, TrigBankAnomaly::SegmentOverrun { .. }));
        assert_eq!(err.severity, Severity::Fatal);
    }
}
