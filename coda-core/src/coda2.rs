//! CODA 2.x event format.
//!
//! A CODA2 event is a bank of banks whose tag is the event type. Physics
//! events open with an event-ID bank:
//!
//! ```text
//! 0  event length
//! 1  event type << 16 | 0x10 << 8 | 0xCC
//! 2  4                              event-ID bank length
//! 3  0xC000 << 16 | 0x01 << 8 | 0
//! 4  event number
//! 5  event classification
//! 6  status summary
//! 7  ROC banks ...
//! ```
//!
//! Control events hold three data words after the header.

use crate::config::DecoderConfig;
use crate::constants::*;
use crate::decoder::{event_length, require_words, DecodedEvent, EventDecoder};
use crate::error::DecodeError;
use crate::parser;
use crate::types::{CodaVersion, ControlEvent, EventClass, EventHeader};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Coda2Decoder {
    config: DecoderConfig,
    /// Number of the last physics event produced by the encoder.
    last_event_number: u32,
}

impl Coda2Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            last_event_number: 0,
        }
    }
}

impl EventDecoder for Coda2Decoder {
    fn version(&self) -> CodaVersion {
        CodaVersion::Coda2
    }

    fn config(&self) -> &DecoderConfig {
        &self.config
    }

    fn decode_event_id_bank<'a>(&self, buffer: &'a [u32]) -> Result<DecodedEvent<'a>, DecodeError> {
        let Some(evt_length) = event_length(buffer)? else {
            return Ok(DecodedEvent::empty(buffer));
        };
        require_words(evt_length, BANK_HEADER_WORDS)?;
        let words = &buffer[..evt_length as usize];

        let mut header = EventHeader {
            evt_length,
            evt_tag: parser::bank_tag(words[1]),
            evt_type: parser::bank_tag(words[1]) as u32,
            bank_data_type: parser::bank_data_type(words[1]),
            bank_num: parser::bank_num(words[1]),
            data_offset: BANK_HEADER_WORDS,
            ..EventHeader::default()
        };
        header.class = EventClass::from_event_type(header.evt_type);

        match header.class {
            EventClass::Physics => {
                require_words(evt_length, CODA2_PHYS_HEADER_WORDS)?;
                let id_tag = parser::bank_tag(words[3]);
                if id_tag != CODA2_EVENT_ID_TAG {
                    warn!(tag = id_tag, "unexpected CODA2 event-ID bank tag");
                }
                header.evt_number = words[4] as u64;
                header.evt_class = words[5];
                header.stat_sum = words[6];
                // Data follow the event-ID bank, whatever its length.
                let offset = BANK_HEADER_WORDS as u64 + 1 + words[2] as u64;
                if offset > evt_length as u64 {
                    return Err(DecodeError::LengthOverrun {
                        needed: offset,
                        evt_length,
                    });
                }
                header.data_offset = offset as u32;
            }
            EventClass::Control(kind) => {
                require_words(evt_length, 5)?;
                let control = ControlEvent::from_words(kind, [words[2], words[3], words[4]]);
                header.control = Some(control);
                header.data_offset = 5;
            }
            _ => {}
        }

        debug!(header = %header, "decoded CODA2 event header");
        Ok(DecodedEvent::new(words, header))
    }

    /// CODA2 physics headers carry no time stamp; `local_time` is ignored.
    fn encode_phys_event_header(&mut self, event_type: u16, _local_time: u64) -> Vec<u32> {
        self.last_event_number = self.last_event_number.wrapping_add(1);
        vec![
            CODA2_PHYS_HEADER_WORDS - 1,
            parser::bank_word(event_type, BANK_OF_BANKS, CODA2_EVENT_BANK_NUM),
            4,
            parser::bank_word(CODA2_EVENT_ID_TAG, DATA_UINT32, 0),
            self.last_event_number,
            0,
            0,
        ]
    }

    fn encode_control_event(&self, event: &ControlEvent) -> [u32; 5] {
        let [time, second, third] = event.to_words();
        [
            4,
            parser::bank_word(event.kind.event_type() as u16, DATA_UINT32, CODA2_EVENT_BANK_NUM),
            time,
            second,
            third,
        ]
    }
}
