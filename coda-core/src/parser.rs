#![allow(clippy::unusual_byte_groupings)]
//! Low-level parsing of EVIO 32-bit header words.
//!
//! This module provides functions to extract fields from bank headers,
//! segment headers and the block-header bit field using bitwise operations.

use crate::types::{BlockBitInfo, PayloadType};

// ============================================================================
// Bank header, second word
// Bits: [31:16] tag | [15:8] data type | [7:0] num
// ============================================================================

/// Extracts the 16-bit tag from a bank header word.
#[inline]
pub fn bank_tag(word: u32) -> u16 {
    ((word & 0xFFFF_0000) >> 16) as u16
}

/// Extracts the 8-bit data type from a bank header word.
#[inline]
pub fn bank_data_type(word: u32) -> u8 {
    ((word & 0xFF00) >> 8) as u8
}

/// Extracts the 8-bit num field from a bank header word.
#[inline]
pub fn bank_num(word: u32) -> u8 {
    (word & 0xFF) as u8
}

/// Packs tag, data type and num into a bank header word.
#[inline]
pub fn bank_word(tag: u16, data_type: u8, num: u8) -> u32 {
    ((tag as u32) << 16) | ((data_type as u32) << 8) | num as u32
}

// ============================================================================
// Segment header
// Bits: [31:24] tag | [23:16] data type | [15:0] length
// ============================================================================

/// Extracts the 8-bit tag of a segment (the ROC number for TS ROC segments).
#[inline]
pub fn segment_tag(word: u32) -> u8 {
    ((word & 0xFF00_0000) >> 24) as u8
}

/// Extracts the data type of a segment.
#[inline]
pub fn segment_data_type(word: u32) -> u8 {
    ((word >> 16) & 0x3F) as u8
}

/// Extracts the word count following a segment header.
#[inline]
pub fn segment_length(word: u32) -> u32 {
    word & 0xFFFF
}

/// Packs tag, data type and length into a segment header word.
#[inline]
pub fn segment_word(tag: u8, data_type: u8, len: u16) -> u32 {
    ((tag as u32) << 24) | (((data_type & 0x3F) as u32) << 16) | len as u32
}

// ============================================================================
// Block-header bit info (EVIO v4 word 5, bits 8-14)
// Bits: [6] first event | [5:2] payload type | [1] last block | [0] dictionary
// ============================================================================

/// Decodes the transport block bit field.
///
/// Pure bit extraction; payload codes without a meaning fall back to
/// [`PayloadType::Other`].
#[inline]
pub fn decode_block_bits(word: u32) -> BlockBitInfo {
    BlockBitInfo {
        has_dictionary: word & 0x1 != 0,
        is_last_block: (word & 0x2) >> 1 != 0,
        payload_type: PayloadType::from_code(((word & 0x3C) >> 2) as u8),
        is_first_event: (word & 0x40) >> 6 != 0,
    }
}

/// Packs a [`BlockBitInfo`] back into its bit field.
#[inline]
pub fn encode_block_bits(info: &BlockBitInfo) -> u32 {
    (info.has_dictionary as u32)
        | ((info.is_last_block as u32) << 1)
        | ((info.payload_type.code() as u32 & 0xF) << 2)
        | ((info.is_first_event as u32) << 6)
}

// ============================================================================
// 64-bit values stored as two consecutive words, low word first
// ============================================================================

/// Joins a low and a high word into a 64-bit value.
#[inline]
pub fn join_u64(lo: u32, hi: u32) -> u64 {
    (lo as u64) | ((hi as u64) << 32)
}

/// Splits a 64-bit value into its low and high words.
#[inline]
pub fn split_u64(value: u64) -> (u32, u32) {
    (value as u32, (value >> 32) as u32)
}

/// Extracts the `index`-th 16-bit value from a packed word array.
///
/// Even indices live in the low half of a word, odd ones in the high half.
#[inline]
pub fn packed_u16(words: &[u32], index: usize) -> Option<u16> {
    let word = *words.get(index / 2)?;
    Some(if index % 2 == 0 {
        (word & 0xFFFF) as u16
    } else {
        (word >> 16) as u16
    })
}
