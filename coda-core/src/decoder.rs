//! Format-independent event decoding.
//!
//! [`EventDecoder`] is the operation set shared by the CODA2 and CODA3
//! decoders. [`FormatVariant`] selects one of them at run time, and
//! [`CodaDecoder`] adds the per-run bookkeeping a stream consumer needs.

use crate::coda2::Coda2Decoder;
use crate::coda3::Coda3Decoder;
use crate::config::DecoderConfig;
use crate::cursor::{self, BankPosition, BankWalker, EventCursor};
use crate::dispatch::{dispatch_payload, UnimplementedReporter};
use crate::error::{DecodeError, TrigBankError};
use crate::trigger::TriggerBank;
use crate::types::{
    BlockBitInfo, CodaVersion, ControlEvent, ControlKind, EventHeader, LeafBank, PayloadType,
    SubbankStep,
};
use tracing::warn;

/// Quality of a successfully decoded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeStatus {
    #[default]
    Ok,
    /// Decoded with best-effort data after a warn-level anomaly.
    Degraded(TrigBankError),
}

/// One decoded event, borrowing the event buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent<'a> {
    pub header: EventHeader,
    /// CODA3 physics events only.
    pub trigger: Option<TriggerBank<'a>>,
    /// Leaf banks of physics events.
    pub banks: Vec<LeafBank<'a>>,
    pub status: DecodeStatus,
    /// The event's words, length word included.
    pub words: &'a [u32],
}

impl<'a> DecodedEvent<'a> {
    pub fn new(words: &'a [u32], header: EventHeader) -> Self {
        Self {
            header,
            trigger: None,
            banks: Vec::new(),
            status: DecodeStatus::Ok,
            words,
        }
    }

    /// An event whose length word is zero.
    pub fn empty(words: &'a [u32]) -> Self {
        let header = EventHeader {
            evt_length: 1,
            data_offset: 1,
            ..EventHeader::default()
        };
        Self::new(&words[..words.len().min(1)], header)
    }

    /// Words following the event and event-ID (or trigger) bank headers.
    pub fn payload(&self) -> &'a [u32] {
        let start = (self.header.data_offset as usize).min(self.words.len());
        &self.words[start..]
    }
}

/// Validates the event length word and returns the event length in words.
///
/// Returns `None` for an empty event (length word zero).
pub(crate) fn event_length(buffer: &[u32]) -> Result<Option<u32>, DecodeError> {
    let length = match buffer.first() {
        None | Some(0) => return Ok(None),
        Some(&length) => length as u64 + 1,
    };
    if length > buffer.len() as u64 {
        return Err(DecodeError::Truncated {
            needed: length,
            available: buffer.len(),
        });
    }
    Ok(Some(length as u32))
}

/// Fails unless an event holds at least `needed` words.
pub(crate) fn require_words(evt_length: u32, needed: u32) -> Result<(), DecodeError> {
    if evt_length < needed {
        return Err(DecodeError::Truncated {
            needed: needed as u64,
            available: evt_length as usize,
        });
    }
    Ok(())
}

/// Operations every CODA format variant provides.
///
/// Decoding takes `&self`; a decoder can be shared by threads decoding
/// independent buffers. Payload hooks that a variant does not support
/// return [`DecodeError::UnimplementedPayload`].
pub trait EventDecoder {
    fn version(&self) -> CodaVersion;

    fn config(&self) -> &DecoderConfig;

    /// Decodes the event bank header and the version-specific ID bank.
    fn decode_event_id_bank<'a>(&self, buffer: &'a [u32]) -> Result<DecodedEvent<'a>, DecodeError>;

    /// Encodes the header of a physics event carrying no ROC banks yet.
    ///
    /// Append ROC banks and call [`crate::encode::finish_event`] afterwards.
    fn encode_phys_event_header(&mut self, event_type: u16, local_time: u64) -> Vec<u32>;

    /// Encodes a complete control event.
    fn encode_control_event(&self, event: &ControlEvent) -> [u32; 5];

    fn encode_prestart_event_header(
        &self,
        run_number: u32,
        run_type: u32,
        local_time: u32,
    ) -> [u32; 5] {
        self.encode_control_event(&ControlEvent::from_words(
            ControlKind::Prestart,
            [local_time, run_number, run_type],
        ))
    }

    fn encode_go_event_header(&self, event_count: u32, local_time: u32) -> [u32; 5] {
        self.encode_control_event(&ControlEvent::from_words(
            ControlKind::Go,
            [local_time, 0, event_count],
        ))
    }

    fn encode_pause_event_header(&self, event_count: u32, local_time: u32) -> [u32; 5] {
        self.encode_control_event(&ControlEvent::from_words(
            ControlKind::Pause,
            [local_time, 0, event_count],
        ))
    }

    fn encode_end_event_header(&self, event_count: u32, local_time: u32) -> [u32; 5] {
        self.encode_control_event(&ControlEvent::from_words(
            ControlKind::End,
            [local_time, 0, event_count],
        ))
    }

    fn decode_subbank_header(
        &self,
        buffer: &[u32],
        cursor: &mut EventCursor,
        position: &mut BankPosition,
    ) -> Result<SubbankStep, DecodeError> {
        cursor::decode_subbank_header(buffer, cursor, position, self.config().allow_low_subbank_ids)
    }

    fn bank_walker(&self) -> BankWalker {
        let config = self.config();
        BankWalker::new(config.allow_low_subbank_ids, config.max_bank_depth)
    }

    fn is_physics_event(&self, header: &EventHeader) -> bool {
        header.class.is_physics()
    }

    fn is_control_event(&self, header: &EventHeader) -> bool {
        header.class.is_control()
    }

    fn is_roc_configuration_event(&self, header: &EventHeader) -> bool {
        header.class.is_roc_configuration()
    }

    fn is_epics_event(&self, header: &EventHeader) -> bool {
        header.class.is_epics()
    }

    /// Decodes a fully built event, walking the ROC banks of physics events.
    fn decode_phys_payload<'a>(&self, buffer: &'a [u32]) -> Result<DecodedEvent<'a>, DecodeError> {
        let mut event = self.decode_event_id_bank(buffer)?;
        if self.is_physics_event(&event.header) {
            let header = &event.header;
            event.banks = self.bank_walker().walk(
                buffer,
                header.data_offset,
                header.evt_length,
                header.bank_data_type,
            )?;
        }
        Ok(event)
    }

    fn decode_roc_raw_payload<'a>(
        &self,
        _buffer: &'a [u32],
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        Err(DecodeError::UnimplementedPayload(PayloadType::RocRaw))
    }

    fn decode_partial_phys_payload<'a>(
        &self,
        _buffer: &'a [u32],
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        Err(DecodeError::UnimplementedPayload(PayloadType::PartialPhys))
    }

    fn decode_disentangled_payload<'a>(
        &self,
        _buffer: &'a [u32],
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        Err(DecodeError::UnimplementedPayload(PayloadType::Disentangled))
    }

    fn decode_user_payload<'a>(&self, _buffer: &'a [u32]) -> Result<DecodedEvent<'a>, DecodeError> {
        Err(DecodeError::UnimplementedPayload(PayloadType::User))
    }

    fn decode_control_payload<'a>(
        &self,
        _buffer: &'a [u32],
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        Err(DecodeError::UnimplementedPayload(PayloadType::Control))
    }

    fn decode_other_payload<'a>(
        &self,
        _buffer: &'a [u32],
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        Err(DecodeError::UnimplementedPayload(PayloadType::Other))
    }
}

/// A decoder for one CODA wire format.
#[derive(Debug, Clone)]
pub enum FormatVariant {
    Coda2(Coda2Decoder),
    Coda3(Coda3Decoder),
}

impl FormatVariant {
    pub fn new(config: DecoderConfig) -> Self {
        match config.version {
            CodaVersion::Coda2 => Self::Coda2(Coda2Decoder::new(config)),
            CodaVersion::Coda3 => Self::Coda3(Coda3Decoder::new(config)),
        }
    }

    pub fn version(&self) -> CodaVersion {
        match self {
            Self::Coda2(_) => CodaVersion::Coda2,
            Self::Coda3(_) => CodaVersion::Coda3,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        match self {
            Self::Coda2(d) => d.config(),
            Self::Coda3(d) => d.config(),
        }
    }

    /// Decodes one event, dispatching on the block's payload type.
    pub fn decode<'a>(
        &self,
        buffer: &'a [u32],
        block_info: Option<&BlockBitInfo>,
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        match self {
            Self::Coda2(d) => dispatch_payload(d, buffer, block_info),
            Self::Coda3(d) => dispatch_payload(d, buffer, block_info),
        }
    }

    pub fn decode_event_id_bank<'a>(
        &self,
        buffer: &'a [u32],
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        match self {
            Self::Coda2(d) => d.decode_event_id_bank(buffer),
            Self::Coda3(d) => d.decode_event_id_bank(buffer),
        }
    }

    pub fn encode_phys_event_header(&mut self, event_type: u16, local_time: u64) -> Vec<u32> {
        match self {
            Self::Coda2(d) => d.encode_phys_event_header(event_type, local_time),
            Self::Coda3(d) => d.encode_phys_event_header(event_type, local_time),
        }
    }

    pub fn encode_control_event(&self, event: &ControlEvent) -> [u32; 5] {
        match self {
            Self::Coda2(d) => d.encode_control_event(event),
            Self::Coda3(d) => d.encode_control_event(event),
        }
    }
}

/// Stream-level decoder: a format variant plus once-per-run reporting.
#[derive(Debug, Clone)]
pub struct CodaDecoder {
    variant: FormatVariant,
    reporter: UnimplementedReporter,
}

impl CodaDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            variant: FormatVariant::new(config),
            reporter: UnimplementedReporter::default(),
        }
    }

    pub fn variant(&self) -> &FormatVariant {
        &self.variant
    }

    pub fn variant_mut(&mut self) -> &mut FormatVariant {
        &mut self.variant
    }

    pub fn config(&self) -> &DecoderConfig {
        self.variant.config()
    }

    /// Decodes one event.
    ///
    /// An unimplemented payload kind is logged the first time it is seen and
    /// returned as an error every time, so the caller can skip the event.
    pub fn decode_event<'a>(
        &mut self,
        buffer: &'a [u32],
        block_info: Option<&BlockBitInfo>,
    ) -> Result<DecodedEvent<'a>, DecodeError> {
        let result = self.variant.decode(buffer, block_info);
        if let Err(DecodeError::UnimplementedPayload(kind)) = &result {
            if self.reporter.first_report(*kind) {
                warn!(
                    payload = %kind,
                    version = %self.variant.version(),
                    "decoding of this payload type is not implemented; skipping such events"
                );
            }
        }
        result
    }

    /// Forgets which payload kinds were reported, e.g. at a new run.
    pub fn reset(&mut self) {
        self.reporter.reset();
    }
}
