//! Integration tests decoding complete synthetic runs from disk.
//!
//! Run with: cargo test --test integration_tests

use coda_core::output::{self, EventRecord};
use coda_core::stream::{EvioBlockReader, EvioBlockWriter, RawEventReader};
use coda_core::types::ControlKind;
use coda_core::{
    encode, BlockBitInfo, CodaDecoder, CodaVersion, ControlEvent, DecodeError, DecoderConfig,
    Endianness, EventClass, PayloadType, RunContext,
};
use std::fs::File;
use std::io::{BufReader, Write};

fn block(payload_type: PayloadType) -> BlockBitInfo {
    BlockBitInfo {
        payload_type,
        has_dictionary: false,
        is_last_block: false,
        is_first_event: false,
    }
}

/// Builds a run: prestart, go, `n` physics events, end.
fn synthetic_run(decoder: &mut CodaDecoder, n: u32) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let variant = decoder.variant_mut();
    let control_start = vec![
        variant
            .encode_control_event(&ControlEvent::from_words(
                ControlKind::Prestart,
                [1_700_000_000, 4242, 3],
            ))
            .to_vec(),
        variant
            .encode_control_event(&ControlEvent::from_words(
                ControlKind::Go,
                [1_700_000_005, 0, 0],
            ))
            .to_vec(),
    ];
    let mut physics = Vec::new();
    for i in 0..n {
        let mut words = variant.encode_phys_event_header(1 + (i % 3) as u16, 1000 * i as u64);
        encode::push_roc_bank(&mut words, 1, &[(0x100, &[i, i + 1])]);
        encode::push_roc_bank(&mut words, 2, &[(0x200, &[0xCAFE]), (0x201, &[])]);
        encode::finish_event(&mut words);
        physics.push(words);
    }
    (control_start, physics)
}

/// A CODA3 run written as an EVIO file decodes back event by event.
#[test]
fn test_decode_evio_run_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run_4242.evio");

    let mut decoder = CodaDecoder::new(DecoderConfig::new(CodaVersion::Coda3));
    let (start, physics) = synthetic_run(&mut decoder, 25);
    let end = decoder.variant().encode_control_event(&ControlEvent::from_words(
        ControlKind::End,
        [1_700_000_065, 0, 25],
    ));
    {
        let mut writer = EvioBlockWriter::new(File::create(&path).unwrap(), Endianness::Big);
        let start: Vec<&[u32]> = start.iter().map(Vec::as_slice).collect();
        writer.write_block(&block(PayloadType::Control), &start).unwrap();
        for chunk in physics.chunks(10) {
            let chunk: Vec<&[u32]> = chunk.iter().map(Vec::as_slice).collect();
            writer.write_block(&block(PayloadType::Phys), &chunk).unwrap();
        }
        let mut last = block(PayloadType::Control);
        last.is_last_block = true;
        writer.write_block(&last, &[&end]).unwrap();
        writer.into_inner().unwrap().flush().unwrap();
    }

    let mut reader = EvioBlockReader::new(BufReader::new(File::open(&path).unwrap()));
    let mut run = RunContext::new();
    let mut records = Vec::new();
    let mut expected_number = 1;
    while let Some(block) = reader.read_block().unwrap() {
        for words in block.events() {
            let event = decoder
                .decode_event(words.unwrap(), Some(&block.header.info))
                .unwrap();
            if let Some(control) = &event.header.control {
                run.apply(control);
            }
            if event.header.class == EventClass::Physics {
                assert_eq!(event.header.evt_number, expected_number);
                assert_eq!(event.header.evt_time, Some(1000 * (expected_number - 1)));
                assert_eq!(event.banks.len(), 3);
                assert_eq!(event.banks[2].roc, 2);
                assert!(event.banks[2].data.is_empty());
                expected_number += 1;
            }
            records.push(EventRecord::from_event(records.len() as u64, &event));
        }
    }

    assert_eq!(reader.byte_order(), Some(Endianness::Big));
    assert_eq!(reader.blocks_read(), 5);
    assert_eq!(records.len(), 28);
    assert_eq!(run.run_number, 4242);
    assert_eq!(run.run_type, 3);
    assert_eq!(run.event_count, 25);
    assert_eq!(run.duration(), Some(60));

    let csv = dir.path().join("events.csv");
    output::write_event_csv(&csv, &records).unwrap();
    let contents = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(contents.lines().count(), 29);
    assert!(contents.lines().nth(1).unwrap().contains(",prestart,"));
}

/// A CODA2 raw stream is read with the configured byte order.
#[test]
fn test_decode_raw_coda2_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.dat");

    let mut decoder = CodaDecoder::new(DecoderConfig::new(CodaVersion::Coda2));
    let (start, physics) = synthetic_run(&mut decoder, 5);
    {
        let mut file = File::create(&path).unwrap();
        for event in start.iter().chain(&physics) {
            for word in event {
                file.write_all(&word.to_le_bytes()).unwrap();
            }
        }
    }

    let mut reader = RawEventReader::new(File::open(&path).unwrap(), Endianness::Little);
    let mut classes = Vec::new();
    while let Some(words) = reader.read_event().unwrap() {
        let event = decoder.decode_event(words, None).unwrap();
        if event.header.class == EventClass::Physics {
            assert_eq!(event.header.data_offset, 7);
            assert_eq!(event.banks[0].data[0] + 1, event.banks[0].data[1]);
        }
        classes.push(event.header.class);
    }
    assert_eq!(classes.len(), 7);
    assert!(classes[0].is_control());
    assert_eq!(classes.iter().filter(|c| c.is_physics()).count(), 5);
}

/// Unimplemented payload kinds and broken events do not stop a stream.
#[test]
fn test_stream_continues_past_bad_events() {
    let mut decoder = CodaDecoder::new(DecoderConfig::new(CodaVersion::Coda3));
    let (_, physics) = synthetic_run(&mut decoder, 3);

    let mut broken = physics[1].clone();
    // Inflate the first ROC bank beyond the event.
    let roc_bank = 2 + broken[2] as usize + 1;
    broken[roc_bank] += 100;

    let disentangled = block(PayloadType::Disentangled);
    let err = decoder.decode_event(&physics[0], Some(&disentangled)).unwrap_err();
    assert_eq!(err, DecodeError::UnimplementedPayload(PayloadType::Disentangled));

    let err = decoder.decode_event(&broken, None).unwrap_err();
    assert!(matches!(err, DecodeError::LengthOverrun { .. }));
    assert!(!err.is_fatal());

    let event = decoder.decode_event(&physics[2], None).unwrap();
    assert_eq!(event.header.evt_number, 3);
}
