//! CSV writers for decoded CODA events.
//!
//! One writer summarizes events (one row per event), the other lists the
//! leaf banks of physics events (one row per bank).

use crate::decoder::{DecodeStatus, DecodedEvent};
use crate::error::Severity;
use crate::types::{EventClass, LeafBank};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output writing.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Summary of one decoded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    /// Position of the event in the stream, from 0.
    pub index: u64,
    pub class: EventClass,
    pub evt_type: u32,
    pub evt_tag: u16,
    pub evt_number: u64,
    pub evt_length: u32,
    pub evt_time: Option<u64>,
    pub trigger_bits: Option<u32>,
    pub banks: usize,
    pub status: Severity,
}

impl EventRecord {
    pub fn from_event(index: u64, event: &DecodedEvent<'_>) -> Self {
        let header = &event.header;
        Self {
            index,
            class: header.class,
            evt_type: header.evt_type,
            evt_tag: header.evt_tag,
            evt_number: header.evt_number,
            evt_length: header.evt_length,
            evt_time: header.evt_time,
            trigger_bits: header.trigger_bits,
            banks: event.banks.len(),
            status: match event.status {
                DecodeStatus::Ok => Severity::Ok,
                DecodeStatus::Degraded(err) => err.severity,
            },
        }
    }
}

fn optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// CSV writer for event summaries.
pub struct EventCsvWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> EventCsvWriter<W> {
    pub const HEADER: &'static str =
        "index,class,type,tag,number,length,time,trigger_bits,banks,status";

    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn write_header(&mut self) -> Result<(), OutputError> {
        writeln!(self.writer, "{}", Self::HEADER)?;
        Ok(())
    }

    pub fn write_records(&mut self, records: &[EventRecord]) -> Result<(), OutputError> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    #[inline]
    pub fn write_record(&mut self, record: &EventRecord) -> Result<(), OutputError> {
        writeln!(
            self.writer,
            "{},{},{},{:#06x},{},{},{},{},{},{}",
            record.index,
            record.class,
            record.evt_type,
            record.evt_tag,
            record.evt_number,
            record.evt_length,
            optional(record.evt_time),
            optional(record.trigger_bits),
            record.banks,
            record.status
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// CSV writer for the leaf banks of physics events.
pub struct BankCsvWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> BankCsvWriter<W> {
    pub const HEADER: &'static str = "event,roc,subbank,data_type,num,offset,length";

    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn write_header(&mut self) -> Result<(), OutputError> {
        writeln!(self.writer, "{}", Self::HEADER)?;
        Ok(())
    }

    /// Writes one row per leaf bank of the event at `index`.
    pub fn write_banks(&mut self, index: u64, banks: &[LeafBank<'_>]) -> Result<(), OutputError> {
        for bank in banks {
            writeln!(
                self.writer,
                "{},{},{:#x},{:#04x},{},{},{}",
                index,
                bank.roc,
                bank.subbank_tag,
                bank.header.data_type,
                bank.header.num,
                bank.offset,
                bank.data.len()
            )?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes event summaries to a CSV file.
pub fn write_event_csv<P: AsRef<Path>>(
    path: P,
    records: &[EventRecord],
) -> Result<(), OutputError> {
    let file = File::create(path)?;
    let mut writer = EventCsvWriter::new(file);
    writer.write_header()?;
    writer.write_records(records)?;
    writer.flush()?;
    Ok(())
}
