//! Structured decode errors and their severities.
//!
//! Callers branch on [`Severity`] and [`ErrorAction`] instead of parsing log
//! lines.

use crate::types::PayloadType;
use std::fmt;
use thiserror::Error;

/// Escalating severity of a decode anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Ok,
    /// Keep processing the event with best-effort data.
    Warn,
    /// Discard this event, continue the run.
    Err,
    /// Stop the run.
    Fatal,
}

impl Severity {
    /// Legacy `HED_*` status code.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Warn => -63,
            Self::Err => -127,
            Self::Fatal => -255,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Err => "ERR",
            Self::Fatal => "FATAL",
        })
    }
}

/// What the caller should do after a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Log and carry on with the next event.
    Continue,
    /// Abandon the current event.
    SkipEvent,
    /// Stop decoding the run.
    AbortRun,
}

/// Inconsistencies detected while parsing a CODA3 trigger bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrigBankAnomaly {
    /// The event bank declares a block size of zero.
    BlockSizeZero,
    /// The bank length runs past the end of the event buffer.
    BankExceedsBuffer { declared: u32, available: u32 },
    /// The bank tag is not a trigger bank tag.
    UnexpectedTag { tag: u16 },
    /// The bank declares no ROC segments.
    NoRocSegments,
    /// Segment 1 length disagrees with the tag flags and block size.
    Segment1Length { expected: u32, actual: u32 },
    /// A segment claims more words than the bank holds.
    SegmentOverrun { offset: u32, len: u32, bank_len: u32 },
    /// Segment 1 consumed the whole bank.
    PastEndAfterSegment1,
    /// Segment 2 length disagrees with the block size.
    Segment2Length { expected: u32, actual: u32 },
    /// The bank ended before all ROC segments were scanned.
    PastEndScanningRocs { scanned: u32, nrocs: u32 },
    /// No segment belongs to the TS ROC and no timestamps are present.
    TsRocNotFound { ts_roc: u32 },
    /// The TS ROC segment is too short to hold one timestamp per event.
    TsRocTooShort { expected: u32, actual: u32 },
}

impl TrigBankAnomaly {
    /// Severity table for trigger bank anomalies.
    pub const fn severity(self) -> Severity {
        match self {
            Self::NoRocSegments => Severity::Warn,
            Self::TsRocNotFound { .. } => Severity::Warn,
            Self::TsRocTooShort { .. } => Severity::Warn,
            Self::BlockSizeZero => Severity::Err,
            Self::UnexpectedTag { .. } => Severity::Err,
            Self::Segment1Length { .. } => Severity::Err,
            Self::Segment2Length { .. } => Severity::Err,
            Self::PastEndAfterSegment1 => Severity::Err,
            Self::PastEndScanningRocs { .. } => Severity::Err,
            Self::SegmentOverrun { .. } => Severity::Fatal,
            Self::BankExceedsBuffer { .. } => Severity::Fatal,
        }
    }
}

impl fmt::Display for TrigBankAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::BlockSizeZero => write!(f, "physics event with block size 0"),
            Self::BankExceedsBuffer {
                declared,
                available,
            } => write!(
                f,
                "trigger bank length {} exceeds the {} words available",
                declared, available
            ),
            Self::UnexpectedTag { tag } => write!(f, "unexpected trigger bank tag {:#06x}", tag),
            Self::NoRocSegments => write!(f, "trigger bank declares no ROC segments"),
            Self::Segment1Length { expected, actual } => write!(
                f,
                "invalid length for trigger bank segment 1: expected {}, got {}",
                expected, actual
            ),
            Self::SegmentOverrun {
                offset,
                len,
                bank_len,
            } => write!(
                f,
                "segment at word {} with length {} overruns trigger bank of {} words",
                offset, len, bank_len
            ),
            Self::PastEndAfterSegment1 => {
                write!(f, "past end of bank after trigger bank segment 1")
            }
            Self::Segment2Length { expected, actual } => write!(
                f,
                "invalid length for trigger bank segment 2: expected {}, got {}",
                expected, actual
            ),
            Self::PastEndScanningRocs { scanned, nrocs } => write!(
                f,
                "past end of bank after {} of {} ROC segments",
                scanned, nrocs
            ),
            Self::TsRocNotFound { ts_roc } => {
                write!(f, "no segment for TS ROC {} and no timestamps", ts_roc)
            }
            Self::TsRocTooShort { expected, actual } => write!(
                f,
                "TS ROC segment has {} words, expected at least {}",
                actual, expected
            ),
        }
    }
}

/// A trigger bank format error carrying its severity.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("CODA 3 format error ({severity}): {anomaly}")]
pub struct TrigBankError {
    pub severity: Severity,
    pub anomaly: TrigBankAnomaly,
}

impl From<TrigBankAnomaly> for TrigBankError {
    fn from(anomaly: TrigBankAnomaly) -> Self {
        Self {
            severity: anomaly.severity(),
            anomaly,
        }
    }
}

/// Errors that can occur while decoding one event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(
        "Bank length overrun: words_so_far + 2 + frag_length = {needed} exceeds evt_length = {evt_length}"
    )]
    LengthOverrun { needed: u64, evt_length: u32 },

    #[error("Event buffer truncated: need {needed} words, have {available}")]
    Truncated { needed: u64, available: usize },

    #[error("Bank nesting depth {depth} exceeds limit {limit}")]
    NestingTooDeep { depth: u32, limit: u32 },

    #[error(transparent)]
    TriggerBank(#[from] TrigBankError),

    #[error("Decoding {0} payloads is not implemented")]
    UnimplementedPayload(PayloadType),
}

impl DecodeError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::LengthOverrun { .. } | Self::Truncated { .. } | Self::NestingTooDeep { .. } => {
                Severity::Err
            }
            Self::TriggerBank(e) => e.severity,
            Self::UnimplementedPayload(_) => Severity::Warn,
        }
    }

    /// Propagation policy for this error.
    pub fn action(&self) -> ErrorAction {
        match self {
            Self::LengthOverrun { .. } | Self::Truncated { .. } | Self::NestingTooDeep { .. } => {
                ErrorAction::SkipEvent
            }
            Self::UnimplementedPayload(_) => ErrorAction::Continue,
            Self::TriggerBank(e) => match e.severity {
                Severity::Ok | Severity::Warn => ErrorAction::Continue,
                Severity::Err => ErrorAction::SkipEvent,
                Severity::Fatal => ErrorAction::AbortRun,
            },
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.action() == ErrorAction::AbortRun
    }
}
