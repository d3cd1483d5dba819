//! CODA event stream decoder CLI application.
//!
//! Decodes EVIO or raw CODA event streams to CSV summaries.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use coda_core::output::{BankCsvWriter, EventCsvWriter};
use coda_core::constants::DEFAULT_MAX_RECORD_WORDS;
use coda_core::stream::{EvioBlockReader, RawEventReader};
use coda_core::{
    BlockBitInfo, CodaDecoder, CodaVersion, DecodeStatus, DecoderConfig, Endianness, ErrorAction,
    EventClass, EventRecord, RunContext,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Stream framing of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Framing {
    /// EVIO version 4 blocks
    Evio,
    /// Length-prefixed events without block headers
    Raw,
}

/// CODA/EVIO event stream decoder.
///
/// Decodes CODA2 or CODA3 events and writes one CSV row per event.
#[derive(Parser, Debug)]
#[command(name = "coda-decode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input event stream
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output CSV file for event summaries
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Output CSV file listing the ROC banks of physics events (optional)
    #[arg(short, long, value_name = "PATH")]
    banks: Option<PathBuf>,

    /// Decoder configuration file (TOML)
    ///
    /// Command-line options override values from the file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// CODA format version (2 or 3)
    #[arg(long, value_name = "VERSION")]
    coda: Option<CodaVersion>,

    /// Input framing
    #[arg(long, value_enum, default_value = "evio")]
    framing: Framing,

    /// Byte order of raw streams (EVIO files are detected automatically)
    #[arg(long, default_value = "little")]
    byte_order: Endianness,

    /// Treat tags 0-31 on non-bank banks as subbank tags instead of ROCs
    #[arg(long)]
    allow_low_subbank_ids: bool,

    /// ROC number of the Trigger Supervisor
    #[arg(long, value_name = "ROC")]
    ts_roc: Option<u32>,

    /// Longest block or raw event accepted, in 32-bit words
    #[arg(long, value_name = "WORDS", default_value_t = DEFAULT_MAX_RECORD_WORDS)]
    max_record_words: usize,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn decoder_config(&self) -> Result<DecoderConfig> {
        let mut config = match &self.config {
            Some(path) => DecoderConfig::load(path)
                .with_context(|| format!("Failed to load configuration {:?}", path))?,
            None => DecoderConfig::default(),
        };
        if let Some(version) = self.coda {
            config.version = version;
        }
        if self.allow_low_subbank_ids {
            config.allow_low_subbank_ids = true;
        }
        if let Some(ts_roc) = self.ts_roc {
            config.ts_roc_number = ts_roc;
        }
        config.validate().context("Invalid decoder configuration")?;
        Ok(config)
    }

    fn log_filter(&self) -> EnvFilter {
        let level = match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }
}

#[derive(Debug, Default)]
struct Stats {
    events: u64,
    physics: u64,
    control: u64,
    other: u64,
    degraded: u64,
    skipped: u64,
    banks: u64,
}

/// Decodes events and writes their summaries.
struct Pipeline {
    decoder: CodaDecoder,
    run: RunContext,
    events: EventCsvWriter<File>,
    banks: Option<BankCsvWriter<File>>,
    stats: Stats,
}

impl Pipeline {
    fn process(&mut self, words: &[u32], block: Option<&BlockBitInfo>) -> Result<()> {
        let index = self.stats.events;
        self.stats.events += 1;

        let event = match self.decoder.decode_event(words, block) {
            Ok(event) => event,
            Err(e) => {
                self.stats.skipped += 1;
                return match e.action() {
                    ErrorAction::AbortRun => {
                        Err(e).with_context(|| format!("Fatal error in event {}", index))
                    }
                    ErrorAction::SkipEvent => {
                        warn!(event = index, "skipping event: {}", e);
                        Ok(())
                    }
                    ErrorAction::Continue => Ok(()),
                };
            }
        };

        match event.header.class {
            EventClass::Physics => self.stats.physics += 1,
            EventClass::Control(_) => self.stats.control += 1,
            _ => self.stats.other += 1,
        }
        if let DecodeStatus::Degraded(_) = event.status {
            self.stats.degraded += 1;
        }
        if let Some(control) = &event.header.control {
            self.run.apply(control);
            info!(kind = ?control.kind, run = self.run.run_number, "run control event");
        }

        self.stats.banks += event.banks.len() as u64;
        if let Some(writer) = self.banks.as_mut() {
            writer.write_banks(index, &event.banks)?;
        }
        self.events
            .write_record(&EventRecord::from_event(index, &event))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.events.flush()?;
        if let Some(writer) = self.banks.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_filter())
        .with_writer(std::io::stderr)
        .init();

    let config = args.decoder_config()?;

    // Setup progress bar
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        pb.set_message("Decoding...");
        pb
    };

    let start_time = Instant::now();

    let input = File::open(&args.input)
        .with_context(|| format!("Failed to open {:?}", args.input))?;
    let mut events = EventCsvWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create {:?}", args.output))?,
    );
    events.write_header()?;
    let banks = match &args.banks {
        Some(path) => {
            let mut writer = BankCsvWriter::new(
                File::create(path)
                    .with_context(|| format!("Failed to create {:?}", path))?,
            );
            writer.write_header()?;
            Some(writer)
        }
        None => None,
    };

    let mut pipeline = Pipeline {
        decoder: CodaDecoder::new(config),
        run: RunContext::new(),
        events,
        banks,
        stats: Stats::default(),
    };

    progress.set_message(format!(
        "Decoding {:?}...",
        args.input.file_name().unwrap_or_default()
    ));

    match args.framing {
        Framing::Evio => {
            let mut reader = EvioBlockReader::new(BufReader::new(input))
                .with_max_words(args.max_record_words);
            while let Some(block) = reader.read_block().context("Failed to read EVIO block")? {
                let info = block.header.info;
                for words in block.events() {
                    match words {
                        Ok(words) => pipeline.process(words, Some(&info))?,
                        Err(e) => {
                            error!("{}; skipping rest of block", e);
                            pipeline.stats.skipped += 1;
                        }
                    }
                }
                progress.set_message(format!(
                    "Block {}: {} events",
                    block.header.number, pipeline.stats.events
                ));
                progress.tick();
            }
        }
        Framing::Raw => {
            let mut reader = RawEventReader::new(BufReader::new(input), args.byte_order)
                .with_max_words(args.max_record_words);
            while let Some(words) = reader.read_event().context("Failed to read event")? {
                pipeline.process(words, None)?;
                if pipeline.stats.events % 10_000 == 0 {
                    progress.set_message(format!("{} events", pipeline.stats.events));
                    progress.tick();
                }
            }
        }
    }
    pipeline.finish().context("Failed to write CSV output")?;

    let total_duration = start_time.elapsed();
    let stats = &pipeline.stats;

    if stats.events == 0 {
        bail!("No events found in {:?}", args.input);
    }

    progress.finish_with_message(format!(
        "Done! Decoded {} events in {:.2}s",
        stats.events,
        total_duration.as_secs_f64()
    ));

    if !args.quiet {
        // Print summary
        let run = &pipeline.run;
        let events_per_sec = stats.events as f64 / total_duration.as_secs_f64();
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Output:       {:?}", args.output);
        eprintln!("  Format:       {}", pipeline.decoder.config().version);
        eprintln!("  Run:          {} (type {})", run.run_number, run.run_type);
        eprintln!("  Events:       {}", stats.events);
        eprintln!("  Physics:      {}", stats.physics);
        eprintln!("  Control:      {}", stats.control);
        eprintln!("  Other:        {}", stats.other);
        eprintln!("  ROC banks:    {}", stats.banks);
        eprintln!("  Degraded:     {}", stats.degraded);
        eprintln!("  Skipped:      {}", stats.skipped);
        if let Some(duration) = run.duration() {
            eprintln!("  Run length:   {}s", duration);
        }
        eprintln!("  Duration:     {:.3}s", total_duration.as_secs_f64());
        eprintln!("  Throughput:   {:.0} events/s", events_per_sec);
    }

    Ok(())
}
