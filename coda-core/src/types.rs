//! Core types for decoded CODA event data.
//!
//! This module defines the header, classification and block-level structures
//! shared by the CODA2 and CODA3 decoders.

use crate::constants::*;
use serde::Deserialize;
use std::fmt;

/// Identifier of a Readout Controller (bank tags 0-31).
pub type RocId = u16;

/// Identifier of an ordinary subbank (bank tags above 31).
pub type BankId = u16;

/// CODA wire format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum CodaVersion {
    #[serde(alias = "coda2", alias = "2")]
    Coda2,
    #[default]
    #[serde(alias = "coda3", alias = "3")]
    Coda3,
}

impl std::str::FromStr for CodaVersion {
    type Err = String;

    /// Parses "2", "3", "coda2" or "coda3" (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "2" | "coda2" => Ok(Self::Coda2),
            "3" | "coda3" => Ok(Self::Coda3),
            other => Err(format!("Unknown CODA version: {}. Use 2 or 3", other)),
        }
    }
}

impl fmt::Display for CodaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coda2 => f.write_str("CODA2"),
            Self::Coda3 => f.write_str("CODA3"),
        }
    }
}

/// Payload type carried in the transport block header.
///
/// The 4-bit code selects how the banks of a block are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    /// Raw ROC data (0x0)
    RocRaw = 0x0,
    /// Fully built physics events (0x1)
    Phys = 0x1,
    /// Partially built physics events (0x2)
    PartialPhys = 0x2,
    /// Disentangled physics events (0x3)
    Disentangled = 0x3,
    /// User events (0x4)
    User = 0x4,
    /// Run control events (0x5)
    Control = 0x5,
    /// Anything else (0xF)
    Other = 0xF,
}

impl PayloadType {
    /// All payload kinds, in code order.
    pub const ALL: [PayloadType; 7] = [
        Self::RocRaw,
        Self::Phys,
        Self::PartialPhys,
        Self::Disentangled,
        Self::User,
        Self::Control,
        Self::Other,
    ];

    /// Maps a 4-bit code to a payload type; unknown codes become `Other`.
    #[inline]
    pub fn from_code(code: u8) -> Self {
        match code {
            0x0 => Self::RocRaw,
            0x1 => Self::Phys,
            0x2 => Self::PartialPhys,
            0x3 => Self::Disentangled,
            0x4 => Self::User,
            0x5 => Self::Control,
            _ => Self::Other,
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Position of this kind in [`PayloadType::ALL`].
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Self::RocRaw => 0,
            Self::Phys => 1,
            Self::PartialPhys => 2,
            Self::Disentangled => 3,
            Self::User => 4,
            Self::Control => 5,
            Self::Other => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RocRaw => "ROC",
            Self::Phys => "PHYS",
            Self::PartialPhys => "Partial PHYS",
            Self::Disentangled => "Disentangled",
            Self::User => "USER",
            Self::Control => "CONTROL",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transport block bit info, valid for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockBitInfo {
    pub payload_type: PayloadType,
    pub has_dictionary: bool,
    pub is_last_block: bool,
    pub is_first_event: bool,
}

impl fmt::Display for BlockBitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dictionary={} last_block={} first_event={} payload={}",
            self.has_dictionary, self.is_last_block, self.is_first_event, self.payload_type
        )
    }
}

/// A decoded bank or subbank header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankHeader {
    pub tag: u16,
    pub data_type: u8,
    pub num: u8,
    /// Data words following the two header words.
    pub len: u32,
}

impl BankHeader {
    /// Returns true if the bank holds further banks.
    #[inline]
    pub fn contains_banks(&self) -> bool {
        self.data_type == BANK_OF_BANKS
    }
}

/// Outcome of one subbank header step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubbankStep {
    /// More words remain in the enclosing bank.
    Continue,
    /// The cursor reached the end of the event.
    EndOfEvent,
}

/// Run control transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Sync,
    Prestart,
    Go,
    Pause,
    End,
}

impl ControlKind {
    /// Canonical event type of this transition.
    pub fn event_type(self) -> u32 {
        match self {
            Self::Sync => SYNC_EVTYPE,
            Self::Prestart => PRESTART_EVTYPE,
            Self::Go => GO_EVTYPE,
            Self::Pause => PAUSE_EVTYPE,
            Self::End => END_EVTYPE,
        }
    }
}

/// Event classification derived from the event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventClass {
    Physics,
    Control(ControlKind),
    RocConfiguration,
    Epics,
    Scaler,
    Prescale,
    /// Database or configuration file dumps.
    FileDump,
    #[default]
    Other,
}

impl EventClass {
    /// Classifies an event type with the shared keyword table.
    pub fn from_event_type(evt_type: u32) -> Self {
        match evt_type {
            t if t <= MAX_PHYS_EVTYPE => Self::Physics,
            SYNC_EVTYPE => Self::Control(ControlKind::Sync),
            PRESTART_EVTYPE => Self::Control(ControlKind::Prestart),
            GO_EVTYPE => Self::Control(ControlKind::Go),
            PAUSE_EVTYPE => Self::Control(ControlKind::Pause),
            END_EVTYPE => Self::Control(ControlKind::End),
            EPICS_EVTYPE => Self::Epics,
            TS_PRESCALE_EVTYPE | PRESCALE_EVTYPE => Self::Prescale,
            SCALER_EVTYPE | SBSSCALER_EVTYPE => Self::Scaler,
            DETMAP_FILE | TRIGGER_FILE | DAQCONFIG_FILE1 | DAQCONFIG_FILE2 => Self::FileDump,
            t if ROC_CONFIG_EVTYPES.contains(&t) => Self::RocConfiguration,
            _ => Self::Other,
        }
    }

    pub fn is_physics(self) -> bool {
        self == Self::Physics
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::Control(_))
    }

    pub fn is_roc_configuration(self) -> bool {
        self == Self::RocConfiguration
    }

    pub fn is_epics(self) -> bool {
        self == Self::Epics
    }

    /// Short lowercase label used in summaries.
    pub fn label(self) -> &'static str {
        match self {
            Self::Physics => "physics",
            Self::Control(ControlKind::Sync) => "sync",
            Self::Control(ControlKind::Prestart) => "prestart",
            Self::Control(ControlKind::Go) => "go",
            Self::Control(ControlKind::Pause) => "pause",
            Self::Control(ControlKind::End) => "end",
            Self::RocConfiguration => "roc-configuration",
            Self::Epics => "epics",
            Self::Scaler => "scaler",
            Self::Prescale => "prescale",
            Self::FileDump => "file-dump",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Payload of a run control event.
///
/// Prestart events carry the run number and run type; the other transitions
/// carry the number of events taken so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEvent {
    pub kind: ControlKind,
    /// Unix time written by the run control.
    pub time: u32,
    pub run_number: u32,
    pub run_type: u32,
    pub event_count: u32,
}

impl ControlEvent {
    /// Interprets the three data words of a control bank.
    pub fn from_words(kind: ControlKind, words: [u32; 3]) -> Self {
        let [time, second, third] = words;
        match kind {
            ControlKind::Prestart => Self {
                kind,
                time,
                run_number: second,
                run_type: third,
                event_count: 0,
            },
            _ => Self {
                kind,
                time,
                run_number: 0,
                run_type: 0,
                event_count: third,
            },
        }
    }

    /// Lays out the three data words of a control bank.
    pub fn to_words(&self) -> [u32; 3] {
        match self.kind {
            ControlKind::Prestart => [self.time, self.run_number, self.run_type],
            _ => [self.time, 0, self.event_count],
        }
    }
}

/// Header information extracted from one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventHeader {
    /// Total event length in words, length word included.
    pub evt_length: u32,
    pub evt_tag: u16,
    pub evt_type: u32,
    pub bank_data_type: u8,
    /// CODA2: event-ID bank number. CODA3: block size.
    pub bank_num: u8,
    /// Only defined for physics events.
    pub evt_number: u64,
    /// CODA2 event classification word.
    pub evt_class: u32,
    /// CODA2 status summary word.
    pub stat_sum: u32,
    /// CODA3 event time (250 MHz clock).
    pub evt_time: Option<u64>,
    /// CODA3 trigger bits from the TS ROC.
    pub trigger_bits: Option<u32>,
    pub class: EventClass,
    /// Word offset where the event's data banks begin.
    pub data_offset: u32,
    pub control: Option<ControlEvent>,
}

impl fmt::Display for EventHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "length={} tag={:#x} type={} data_type={:#x} num={:#x} number={} class={}",
            self.evt_length,
            self.evt_tag,
            self.evt_type,
            self.bank_data_type,
            self.bank_num,
            self.evt_number,
            self.class
        )?;
        if let Some(time) = self.evt_time {
            write!(f, " time={}", time)?;
        }
        Ok(())
    }
}

/// A leaf bank of a physics event, with the ROC that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafBank<'a> {
    pub roc: RocId,
    /// Subbank tag; 0 when the bank itself is the ROC bank.
    pub subbank_tag: BankId,
    /// Header as written in the stream, raw tag included.
    pub header: BankHeader,
    /// Nesting depth, 1 for banks directly under the event bank.
    pub depth: u32,
    /// Word offset of the bank's data within the event buffer.
    pub offset: u32,
    pub data: &'a [u32],
}
