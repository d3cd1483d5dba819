//! CODA/EVIO event decoder library.
//!
//! This crate decodes events written by the CODA data-acquisition system in
//! the EVIO bank format. It walks the nested bank structure, classifies
//! events, parses the CODA3 trigger bank and hands the leaf banks of physics
//! events to the caller. Both the CODA2 and CODA3 wire formats are supported,
//! and both can be encoded again for replay or simulation.
//!
//! # Example
//!
//! ```no_run
//! use coda_core::stream::EvioBlockReader;
//! use coda_core::{CodaDecoder, DecoderConfig};
//! use std::fs::File;
//!
//! let mut decoder = CodaDecoder::new(DecoderConfig::default());
//! let mut reader = EvioBlockReader::new(File::open("run_1234.evio").unwrap());
//! while let Some(block) = reader.read_block().unwrap() {
//!     for words in block.events() {
//!         let event = decoder.decode_event(words.unwrap(), Some(&block.header.info)).unwrap();
//!         println!("{} with {} banks", event.header, event.banks.len());
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - CODA2 and CODA3 event headers, control events and event classification
//! - CODA3 trigger banks with per-event numbers, types, times and trigger bits
//! - Bounded recursive walk of ROC banks and subbanks
//! - Structured errors with a severity and a recommended action
//! - EVIO version 4 and raw length-prefixed stream readers

pub mod coda2;
pub mod coda3;
pub mod config;
pub mod constants;
pub mod control;
pub mod cursor;
pub mod decoder;
pub mod dispatch;
pub mod encode;
pub mod error;
pub mod output;
pub mod parser;
pub mod stream;
pub mod trigger;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigError, DecoderConfig};
pub use control::RunContext;
pub use decoder::{CodaDecoder, DecodeStatus, DecodedEvent, EventDecoder, FormatVariant};
pub use error::{DecodeError, ErrorAction, Severity, TrigBankError};
pub use output::{EventRecord, OutputError};
pub use stream::{Endianness, StreamError};
pub use trigger::TriggerBank;
pub use types::{BlockBitInfo, CodaVersion, ControlEvent, EventClass, EventHeader, PayloadType};
