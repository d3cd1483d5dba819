//! Decode position tracking and nested bank walking.
//!
//! [`EventCursor`] tracks how many words of an event have been consumed.
//! [`decode_subbank_header`] decodes one bank level, and [`BankWalker`]
//! drives it recursively over the ROC banks of a physics event.

use crate::constants::{BANK_HEADER_WORDS, BANK_OF_BANKS, MAX_BANK_DEPTH_LIMIT, MAX_ROC_TAG};
use crate::error::DecodeError;
use crate::parser;
use crate::types::{BankHeader, BankId, LeafBank, RocId, SubbankStep};
use tracing::{debug, error};

/// Position inside one event buffer.
///
/// Invariant: `words_so_far <= evt_length` whenever the cursor is observed
/// outside of [`decode_subbank_header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventCursor {
    pub words_so_far: u32,
    pub evt_length: u32,
    /// Data words of the most recently decoded subbank.
    pub frag_length: u32,
}

impl EventCursor {
    pub fn new(words_so_far: u32, evt_length: u32) -> Self {
        Self {
            words_so_far,
            evt_length,
            frag_length: 0,
        }
    }

    /// Returns true once every word of the event has been consumed.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.words_so_far >= self.evt_length
    }

    #[inline]
    pub fn remaining(&self) -> u32 {
        self.evt_length.saturating_sub(self.words_so_far)
    }

    /// Skips over the data of the most recently decoded subbank.
    #[inline]
    pub fn skip_fragment(&mut self) {
        self.words_so_far = (self.words_so_far + self.frag_length).min(self.evt_length);
    }
}

/// ROC and subbank identity of the most recently decoded bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankPosition {
    /// Data type of the enclosing bank.
    pub bank_data_type: u8,
    pub roc: RocId,
    pub subbank_tag: BankId,
    /// Tag word of the most recently decoded subbank, as written.
    pub tag: u16,
    pub subbank_type: u8,
    pub subbank_num: u8,
}

impl BankPosition {
    pub fn new(bank_data_type: u8) -> Self {
        Self {
            bank_data_type,
            ..Self::default()
        }
    }

    /// Makes the most recently decoded subbank the enclosing bank.
    #[inline]
    pub fn descend(&mut self) {
        self.bank_data_type = self.subbank_type;
    }
}

/// Returns true if a bank tag names a ROC under the given policy.
///
/// Internal subbank tags must be greater than 31. With
/// `allow_low_subbank_ids`, low tags only name a ROC on banks of banks.
#[inline]
pub fn is_roc_tag(tag: u16, data_type: u8, allow_low_subbank_ids: bool) -> bool {
    tag <= MAX_ROC_TAG && (!allow_low_subbank_ids || data_type == BANK_OF_BANKS)
}

/// Decodes the header of a ROC bank or subbank at the cursor.
///
/// `buffer` is the whole event. On success the cursor points at the first
/// data word of the subbank and `frag_length` holds its data length. A
/// header that claims more words than the event holds fails with
/// [`DecodeError::LengthOverrun`] and leaves the cursor and position
/// untouched. Enclosing banks that do not contain banks produce no header.
pub fn decode_subbank_header(
    buffer: &[u32],
    cursor: &mut EventCursor,
    position: &mut BankPosition,
    allow_low_subbank_ids: bool,
) -> Result<SubbankStep, DecodeError> {
    if cursor.at_end() {
        return Ok(SubbankStep::EndOfEvent);
    }
    if position.bank_data_type != BANK_OF_BANKS {
        return Ok(SubbankStep::Continue);
    }

    let start = cursor.words_so_far as usize;
    let (length_word, id_word) = match buffer.get(start..start + 2) {
        Some(&[length_word, id_word]) => (length_word, id_word),
        _ => {
            return Err(DecodeError::Truncated {
                needed: start as u64 + 2,
                available: buffer.len(),
            })
        }
    };

    // A zero length word would underflow; treat it as an empty bank.
    let frag_length = length_word.saturating_sub(1);
    let tag = parser::bank_tag(id_word);
    let data_type = parser::bank_data_type(id_word);
    let num = parser::bank_num(id_word);

    let needed = cursor.words_so_far as u64 + BANK_HEADER_WORDS as u64 + frag_length as u64;
    if needed > cursor.evt_length as u64 {
        error!(
            needed,
            evt_length = cursor.evt_length,
            tag,
            "subbank header claims more words than the event holds"
        );
        return Err(DecodeError::LengthOverrun {
            needed,
            evt_length: cursor.evt_length,
        });
    }

    if is_roc_tag(tag, data_type, allow_low_subbank_ids) {
        position.roc = tag;
        position.subbank_tag = 0;
    } else {
        position.subbank_tag = tag;
    }
    position.tag = tag;
    position.subbank_type = data_type;
    position.subbank_num = num;

    cursor.frag_length = frag_length;
    cursor.words_so_far += BANK_HEADER_WORDS;

    debug!(
        roc = position.roc,
        subbank_tag = position.subbank_tag,
        subbank_type = data_type,
        subbank_num = num,
        words_so_far = cursor.words_so_far,
        evt_length = cursor.evt_length,
        "decoded subbank header"
    );

    Ok(SubbankStep::Continue)
}

/// Walks the nested banks of an event and collects its leaf banks.
///
/// Recursion depth is bounded by `max_depth`, itself capped at
/// [`MAX_BANK_DEPTH_LIMIT`]; deeper nesting fails with
/// [`DecodeError::NestingTooDeep`].
#[derive(Debug, Clone, Copy)]
pub struct BankWalker {
    pub allow_low_subbank_ids: bool,
    pub max_depth: u32,
}

impl BankWalker {
    pub fn new(allow_low_subbank_ids: bool, max_depth: u32) -> Self {
        Self {
            allow_low_subbank_ids,
            max_depth: max_depth.min(MAX_BANK_DEPTH_LIMIT),
        }
    }

    /// Effective depth limit, capped even if `max_depth` was set directly.
    #[inline]
    pub fn depth_limit(&self) -> u32 {
        self.max_depth.min(MAX_BANK_DEPTH_LIMIT)
    }

    /// Collects every leaf bank between `start` and `evt_length`.
    ///
    /// `bank_data_type` is the data type of the bank enclosing `start`.
    pub fn walk<'a>(
        &self,
        buffer: &'a [u32],
        start: u32,
        evt_length: u32,
        bank_data_type: u8,
    ) -> Result<Vec<LeafBank<'a>>, DecodeError> {
        if evt_length as usize > buffer.len() {
            return Err(DecodeError::Truncated {
                needed: evt_length as u64,
                available: buffer.len(),
            });
        }
        let mut leaves = Vec::new();
        let mut position = BankPosition::new(bank_data_type);
        let mut cursor = EventCursor::new(start, evt_length);
        self.walk_level(buffer, &mut cursor, &mut position, 1, &mut leaves)?;
        Ok(leaves)
    }

    fn walk_level<'a>(
        &self,
        buffer: &'a [u32],
        cursor: &mut EventCursor,
        position: &mut BankPosition,
        depth: u32,
        leaves: &mut Vec<LeafBank<'a>>,
    ) -> Result<(), DecodeError> {
        let limit = self.depth_limit();
        if depth > limit {
            return Err(DecodeError::NestingTooDeep { depth, limit });
        }

        let enclosing_type = position.bank_data_type;
        while !cursor.at_end() {
            position.bank_data_type = enclosing_type;
            let before = cursor.words_so_far;
            if decode_subbank_header(buffer, cursor, position, self.allow_low_subbank_ids)?
                == SubbankStep::EndOfEvent
            {
                break;
            }
            if cursor.words_so_far == before {
                // Leaf payload: nothing more to decode at this level.
                cursor.words_so_far = cursor.evt_length;
                break;
            }

            let header = BankHeader {
                tag: position.tag,
                data_type: position.subbank_type,
                num: position.subbank_num,
                len: cursor.frag_length,
            };
            let data_start = cursor.words_so_far;
            let data_end = data_start + cursor.frag_length;

            if header.contains_banks() {
                let mut child = EventCursor::new(data_start, data_end);
                position.descend();
                self.walk_level(buffer, &mut child, position, depth + 1, leaves)?;
            } else {
                leaves.push(LeafBank {
                    roc: position.roc,
                    subbank_tag: position.subbank_tag,
                    header,
                    depth,
                    offset: data_start,
                    data: &buffer[data_start as usize..data_end as usize],
                });
            }
            cursor.words_so_far = data_end;
        }
        Ok(())
    }
}
