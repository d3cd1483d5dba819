//! Keyword table for CODA event types, bank types and reserved tags.
//!
//! Every magic number the decoders and the classification logic need lives
//! here, so both format variants consult one table.

use std::ops::RangeInclusive;

// ============================================================================
// Event types
// ============================================================================

/// Event types up to this value are physics events.
pub const MAX_PHYS_EVTYPE: u32 = 14;
pub const SYNC_EVTYPE: u32 = 16;
pub const PRESTART_EVTYPE: u32 = 17;
pub const GO_EVTYPE: u32 = 18;
pub const PAUSE_EVTYPE: u32 = 19;
pub const END_EVTYPE: u32 = 20;
pub const TS_PRESCALE_EVTYPE: u32 = 120;
pub const EPICS_EVTYPE: u32 = 131;
pub const PRESCALE_EVTYPE: u32 = 133;
pub const DETMAP_FILE: u32 = 135;
pub const TRIGGER_FILE: u32 = 136;
pub const DAQCONFIG_FILE1: u32 = 137;
pub const DAQCONFIG_FILE2: u32 = 138;
pub const SCALER_EVTYPE: u32 = 140;
pub const SBSSCALER_EVTYPE: u32 = 141;
pub const HV_DATA_EVTYPE: u32 = 150;

/// Event types carrying ROC configuration dumps.
pub const ROC_CONFIG_EVTYPES: RangeInclusive<u32> = 0x90..=0x18f;

/// Event types handled as run-control transitions.
pub const CONTROL_EVTYPES: RangeInclusive<u32> = SYNC_EVTYPE..=END_EVTYPE;

// ============================================================================
// Bank layout
// ============================================================================

/// Bank data type meaning "contains further banks".
pub const BANK_OF_BANKS: u8 = 0x10;
/// Bank data type of a bank of segments (CODA3 trigger bank).
pub const BANK_OF_SEGMENTS: u8 = 0x20;
/// Bank data type for unsigned 32-bit words.
pub const DATA_UINT32: u8 = 0x01;
/// Segment data type for unsigned 16-bit values.
pub const DATA_USHORT16: u8 = 0x05;
/// Segment data type for unsigned 64-bit values.
pub const DATA_ULONG64: u8 = 0x0a;

/// Bank tags at or below this value identify a ROC.
pub const MAX_ROC_TAG: u16 = 31;

/// Number of header words in front of every bank's data.
pub const BANK_HEADER_WORDS: u32 = 2;

// ============================================================================
// CODA2
// ============================================================================

/// Bank number of a CODA2 event bank.
pub const CODA2_EVENT_BANK_NUM: u8 = 0xCC;
/// Tag of the CODA2 event-ID bank.
pub const CODA2_EVENT_ID_TAG: u16 = 0xC000;
/// Total header words of a CODA2 physics event (event bank + event-ID bank).
pub const CODA2_PHYS_HEADER_WORDS: u32 = 7;

// ============================================================================
// CODA3
// ============================================================================

/// Tags at or above this value are reserved by CODA3.
pub const CODA3_RESERVED_TAG_MIN: u16 = 0xff00;
pub const CODA3_SYNC_TAG: u16 = 0xffd0;
pub const CODA3_PRESTART_TAG: u16 = 0xffd1;
pub const CODA3_GO_TAG: u16 = 0xffd2;
pub const CODA3_PAUSE_TAG: u16 = 0xffd3;
pub const CODA3_END_TAG: u16 = 0xffd4;
/// Built physics event tags (PEB, SEB, with and without the sync flag).
pub const CODA3_PHYSICS_TAGS: [u16; 4] = [0xff50, 0xff58, 0xff70, 0xff78];
/// Event type assigned to CODA3 physics events before the trigger bank is read.
pub const CODA3_PHYSICS_EVTYPE: u32 = 1;

/// Trigger bank tags are `0xff20..=0xff27`; the low bits carry flags.
pub const TRIGGER_BANK_TAG_BASE: u16 = 0xff20;
pub const TRIGGER_BANK_TAG_MASK: u16 = 0xfff8;
pub const TRIGGER_TAG_TIMESTAMP: u16 = 1 << 0;
pub const TRIGGER_TAG_RUN_INFO: u16 = 1 << 1;

/// Only the lower 48 bits of a TS ROC timestamp carry the time.
pub const TS_ROC_TIME_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
/// Only the lower 6 bits of the TS ROC trigger word carry trigger bits.
pub const TS_ROC_TRIGGER_BITS_MASK: u32 = 0x3F;

// ============================================================================
// EVIO v4 block header
// ============================================================================

pub const EVIO_BLOCK_HEADER_WORDS: usize = 8;
pub const EVIO_MAGIC: u32 = 0xc0da0100;
pub const EVIO_VERSION: u32 = 4;
/// Default ceiling on the length of one block or raw event, in words.
pub const DEFAULT_MAX_RECORD_WORDS: usize = 1 << 24;

/// Default ceiling on bank nesting depth.
pub const DEFAULT_MAX_BANK_DEPTH: u32 = 16;
/// Hard ceiling on bank nesting depth; the walker recurses once per level.
pub const MAX_BANK_DEPTH_LIMIT: u32 = 256;
