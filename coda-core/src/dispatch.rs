//! Payload dispatch by transport block type.

use crate::decoder::{DecodedEvent, EventDecoder};
use crate::error::DecodeError;
use crate::types::{BlockBitInfo, PayloadType};

/// Routes an event to the decode hook for its block's payload type.
///
/// Without block information (plain file decoding) the event is decoded as
/// a physics payload.
pub fn dispatch_payload<'a, D: EventDecoder + ?Sized>(
    decoder: &D,
    buffer: &'a [u32],
    block_info: Option<&BlockBitInfo>,
) -> Result<DecodedEvent<'a>, DecodeError> {
    let payload_type = block_info.map_or(PayloadType::Phys, |info| info.payload_type);
    match payload_type {
        PayloadType::RocRaw => decoder.decode_roc_raw_payload(buffer),
        PayloadType::Phys => decoder.decode_phys_payload(buffer),
        PayloadType::PartialPhys => decoder.decode_partial_phys_payload(buffer),
        PayloadType::Disentangled => decoder.decode_disentangled_payload(buffer),
        PayloadType::User => decoder.decode_user_payload(buffer),
        PayloadType::Control => decoder.decode_control_payload(buffer),
        PayloadType::Other => decoder.decode_other_payload(buffer),
    }
}

/// Remembers which unimplemented payload kinds were already reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnimplementedReporter {
    reported: u8,
}

impl UnimplementedReporter {
    /// Marks `kind` as reported; returns true the first time only.
    pub fn first_report(&mut self, kind: PayloadType) -> bool {
        let bit = 1u8 << kind.index();
        let first = self.reported & bit == 0;
        self.reported |= bit;
        first
    }

    pub fn reset(&mut self) {
        self.reported = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coda2::Coda2Decoder;
    use crate::config::DecoderConfig;
    use crate::parser;
    use crate::types::CodaVersion;

    fn block(payload_type: PayloadType) -> BlockBitInfo {
        BlockBitInfo {
            payload_type,
            has_dictionary: false,
            is_last_block: false,
            is_first_event: false,
        }
    }

    #[test]
    fn test_unimplemented_payloads_do_not_panic() {
        let decoder = Coda2Decoder::new(DecoderConfig::new(CodaVersion::Coda2));
        let buffer = [1, parser::bank_word(140, 0x01, 0xCC)];
        for kind in PayloadType::ALL {
            let result = dispatch_payload(&decoder, &buffer, Some(&block(kind)));
            if kind == PayloadType::Phys {
                assert!(result.is_ok());
            } else {
                assert_eq!(result.unwrap_err(), DecodeError::UnimplementedPayload(kind));
            }
        }
    }

    #[test]
    fn test_unknown_payload_code_reports_unimplemented() {
        let decoder = Coda2Decoder::new(DecoderConfig::new(CodaVersion::Coda2));
        let info = parser::decode_block_bits(0b0_1011_0_0);
        let buffer = [1, parser::bank_word(140, 0x01, 0xCC)];
        let err = dispatch_payload(&decoder, &buffer, Some(&info)).unwrap_err();
        assert_eq!(err, DecodeError::UnimplementedPayload(PayloadType::Other));
    }

    #[test]
    fn test_missing_block_info_defaults_to_physics() {
        let decoder = Coda2Decoder::new(DecoderConfig::new(CodaVersion::Coda2));
        let buffer = [1, parser::bank_word(140, 0x01, 0xCC)];
        let event = dispatch_payload(&decoder, &buffer, None).unwrap();
        assert_eq!(event.header.evt_type, 140);
    }

    #[test]
    fn test_reporter_once_per_kind() {
        let mut reporter = UnimplementedReporter::default();
        assert!(reporter.first_report(PayloadType::User));
        assert!(!reporter.first_report(PayloadType::User));
        assert!(reporter.first_report(PayloadType::Other));
        reporter.reset();
        assert!(reporter.first_report(PayloadType::User));
    }
}
