//! CODA 3.x event format.
//!
//! The event bank tag identifies the event: `0xffd0..=0xffd4` are run
//! control transitions, `0xff50`, `0xff58`, `0xff70` and `0xff78` are built
//! physics events, and tags below `0xff00` are user events whose tag is the
//! event type. Physics events carry a trigger bank right after the event
//! bank header; see [`crate::trigger`].

use crate::config::DecoderConfig;
use crate::constants::*;
use crate::decoder::{event_length, require_words, DecodeStatus, DecodedEvent, EventDecoder};
use crate::error::{DecodeError, Severity, TrigBankError};
use crate::parser;
use crate::trigger::parse_trigger_bank;
use crate::types::{CodaVersion, ControlEvent, ControlKind, EventClass, EventHeader};
use tracing::{debug, error, warn};

/// Meaning of a CODA3 event bank tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankTagKind {
    Control(ControlKind),
    Physics,
    /// Reserved tag (0xff00 and above) with no defined meaning.
    Reserved,
    /// User event; the tag is the event type.
    User,
}

/// Interprets a CODA3 event bank tag.
pub fn interpret_bank_tag(tag: u16) -> BankTagKind {
    match tag {
        CODA3_SYNC_TAG => BankTagKind::Control(ControlKind::Sync),
        CODA3_PRESTART_TAG => BankTagKind::Control(ControlKind::Prestart),
        CODA3_GO_TAG => BankTagKind::Control(ControlKind::Go),
        CODA3_PAUSE_TAG => BankTagKind::Control(ControlKind::Pause),
        CODA3_END_TAG => BankTagKind::Control(ControlKind::End),
        t if CODA3_PHYSICS_TAGS.contains(&t) => BankTagKind::Physics,
        t if t >= CODA3_RESERVED_TAG_MIN => BankTagKind::Reserved,
        _ => BankTagKind::User,
    }
}

fn control_tag(kind: ControlKind) -> u16 {
    match kind {
        ControlKind::Sync => CODA3_SYNC_TAG,
        ControlKind::Prestart => CODA3_PRESTART_TAG,
        ControlKind::Go => CODA3_GO_TAG,
        ControlKind::Pause => CODA3_PAUSE_TAG,
        ControlKind::End => CODA3_END_TAG,
    }
}

/// Logs a trigger bank anomaly at the level its severity calls for.
fn report_trigger_error(err: &TrigBankError, event_number: u64) {
    match err.severity {
        Severity::Ok => {}
        Severity::Warn => warn!(event_number, "{}", err),
        Severity::Err => error!(event_number, "{}; skipping event", err),
        Severity::Fatal => error!(event_number, "{}; aborting run", err),
    }
}

#[derive(Debug, Clone)]
pub struct Coda3Decoder {
    config: DecoderConfig,
    /// Number of the last physics event produced by the encoder.
    last_event_number: u64,
}

impl Coda3Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            last_event_number: 0,
        }
    }

    fn ts_roc_number(&self) -> u32 {
        self.config.ts_roc_number
    }

    /// Fills the physics fields of `event` from its trigger bank.
    fn decode_trigger_bank<'a>(
        &self,
        words: &'a [u32],
        event: &mut DecodedEvent<'a>,
    ) -> Result<(), DecodeError> {
        let header = &mut event.header;
        let block_size = header.bank_num as u32;
        if block_size > 1 {
            warn!(
                block_size,
                "multi-block event; only the first event of the block is decoded"
            );
        }

        let trigger_words = &words[BANK_HEADER_WORDS as usize..];
        let bank = match parse_trigger_bank(trigger_words, block_size, self.ts_roc_number()) {
            Ok(bank) => bank,
            Err(err) => {
                report_trigger_error(&err, header.evt_number);
                return Err(err.into());
            }
        };
        if let Some(warning) = bank.warning {
            report_trigger_error(&warning, bank.event_number);
            event.status = DecodeStatus::Degraded(warning);
        }

        header.evt_number = bank.event_number;
        if let Some(info) = bank.event_info(0) {
            header.evt_type = info.event_type as u32;
            header.evt_time = info.time;
            header.trigger_bits = info.trigger_bits;
        }
        header.data_offset = BANK_HEADER_WORDS + bank.len;
        event.trigger = Some(bank);
        Ok(())
    }
}

impl EventDecoder for Coda3Decoder {
    fn version(&self) -> CodaVersion {
        CodaVersion::Coda3
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

        let tag = parser::bank_tag(words[1]);
        let header = EventHeader {
            evt_length,
            evt_tag: tag,
            evt_type: tag as u32,
            bank_data_type: parser::bank_data_type(words[1]),
            bank_num: parser::bank_num(words[1]),
            data_offset: BANK_HEADER_WORDS,
            ..EventHeader::default()
        };
        let mut event = DecodedEvent::new(words, header);

        match interpret_bank_tag(tag) {
            BankTagKind::Control(kind) => {
                require_words(evt_length, 5)?;
                let header = &mut event.header;
                header.evt_type = kind.event_type();
                header.class = EventClass::Control(kind);
                header.control = Some(ControlEvent::from_words(
                    kind,
                    [words[2], words[3], words[4]],
                ));
                header.data_offset = 5;
            }
            BankTagKind::Physics => {
                event.header.evt_type = CODA3_PHYSICS_EVTYPE;
                event.header.class = EventClass::Physics;
                self.decode_trigger_bank(words, &mut event)?;
            }
            BankTagKind::Reserved => {
                warn!(tag, "undefined CODA3 event type");
                event.header.class = EventClass::Other;
            }
            BankTagKind::User => {
                // Physics-range types outside a trigger bank are raw ROC data.
                event.header.class = match EventClass::from_event_type(tag as u32) {
                    EventClass::Physics => EventClass::Other,
                    class => class,
                };
            }
        }

        debug!(header = %event.header, "decoded CODA3 event header");
        Ok(event)
    }

    /// Encodes a block of one physics event with a time-stamped trigger bank.
    ///
    /// The trigger bank holds a single ROC segment, the Trigger Supervisor's,
    /// carrying `local_time`.
    fn encode_phys_event_header(&mut self, event_type: u16, local_time: u64) -> Vec<u32> {
        self.last_event_number = self.last_event_number.wrapping_add(1);
        let ts_roc = self.ts_roc_number() as u8;
        let (evnum_lo, evnum_hi) = parser::split_u64(self.last_event_number);
        let (time_lo, time_hi) = parser::split_u64(local_time);

        let mut words = vec![0, parser::bank_word(CODA3_PHYSICS_TAGS[0], BANK_OF_BANKS, 1)];
        let trigger_bank = words.len();
        words.push(0);
        words.push(parser::bank_word(
            TRIGGER_BANK_TAG_BASE | TRIGGER_TAG_TIMESTAMP,
            BANK_OF_SEGMENTS,
            1,
        ));
        words.push(parser::segment_word(ts_roc, DATA_ULONG64, 4));
        words.extend_from_slice(&[evnum_lo, evnum_hi, time_lo, time_hi]);
        words.push(parser::segment_word(ts_roc, DATA_USHORT16, 1));
        words.push(event_type as u32);
        words.push(parser::segment_word(ts_roc, DATA_UINT32, 2));
        words.extend_from_slice(&[time_lo, time_hi]);
        words[trigger_bank] = (words.len() - trigger_bank - 1) as u32;
        words[0] = (words.len() - 1) as u32;
        words
    }

    fn encode_control_event(&self, event: &ControlEvent) -> [u32; 5] {
        let [time, second, third] = event.to_words();
        [
            4,
            parser::bank_word(control_tag(event.kind), DATA_UINT32, 0),
            time,
            second,
            third,
        ]
    }

    fn decode_control_payload<'a>(
        &self,
        buffer: &'a [u32],
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        self.decode_event_id_bank(buffer)
    }

    fn decode_user_payload<'a>(&self, buffer: &'a [u32]) -> Result<DecodedEvent<'a>, DecodeError> {
        self.decode_event_id_bank(buffer)
    }
}
