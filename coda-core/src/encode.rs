//! Writers for EVIO banks.
//!
//! These helpers lay out bank headers the way a CODA event builder does, so
//! that replay and simulation tools can produce events the decoders accept.
//!
//! ```
//! use coda_core::encode::{begin_bank, end_bank, push_leaf_bank};
//!
//! let mut event = Vec::new();
//! let top = begin_bank(&mut event, 1, 0x10, 0xCC);
//! let roc = begin_bank(&mut event, 4, 0x10, 0);
//! push_leaf_bank(&mut event, 0x101, 0x01, 0, &[1, 2, 3]);
//! end_bank(&mut event, roc);
//! end_bank(&mut event, top);
//! assert_eq!(event[0] as usize, event.len() - 1);
//! ```

use crate::constants::{BANK_OF_BANKS, DATA_UINT32};
use crate::parser;
use crate::types::RocId;

/// Opens a bank and returns the index of its length word.
///
/// The length is filled in by [`end_bank`].
pub fn begin_bank(words: &mut Vec<u32>, tag: u16, data_type: u8, num: u8) -> usize {
    let start = words.len();
    words.push(0);
    words.push(parser::bank_word(tag, data_type, num));
    start
}

/// Closes the bank opened at `start`, writing its length word.
pub fn end_bank(words: &mut [u32], start: usize) {
    words[start] = (words.len() - start - 1) as u32;
}

/// Appends a complete bank holding `data`.
pub fn push_leaf_bank(words: &mut Vec<u32>, tag: u16, data_type: u8, num: u8, data: &[u32]) {
    words.push(data.len() as u32 + 1);
    words.push(parser::bank_word(tag, data_type, num));
    words.extend_from_slice(data);
}

/// Appends a ROC bank holding one 32-bit subbank per `(tag, data)` pair.
pub fn push_roc_bank(words: &mut Vec<u32>, roc: RocId, subbanks: &[(u16, &[u32])]) {
    let start = begin_bank(words, roc, BANK_OF_BANKS, 0);
    for (tag, data) in subbanks {
        push_leaf_bank(words, *tag, DATA_UINT32, 0, data);
    }
    end_bank(words, start);
}

/// Rewrites the event length word after banks were appended.
pub fn finish_event(words: &mut [u32]) {
    if !words.is_empty() {
        end_bank(words, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_bank_lengths() {
        let mut words = Vec::new();
        let top = begin_bank(&mut words, 1, 0x10, 0xCC);
        push_roc_bank(&mut words, 3, &[(0x100, &[7, 8]), (0x101, &[])]);
        end_bank(&mut words, top);

        assert_eq!(words[0], 9);
        // ROC bank: header + two subbanks (4 + 2 words)
        assert_eq!(words[2], 7);
        assert_eq!(words[3], parser::bank_word(3, 0x10, 0));
        assert_eq!(words[4], 3);
        assert_eq!(&words[6..8], &[7, 8]);
        assert_eq!(words[8], 1);
    }

    #[test]
    fn test_finish_event() {
        let mut words = vec![0, parser::bank_word(1, 0x10, 0xCC)];
        push_leaf_bank(&mut words, 0x40, 0x01, 0, &[1]);
        finish_event(&mut words);
        assert_eq!(words[0], 4);
    }
}
