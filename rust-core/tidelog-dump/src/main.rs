// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! tidelog-dump -- inspect a TideLog segment file from the command line.
//!
//! Subcommands:
//! - `batches` lists every batch, optionally with records and CRC checks
//! - `find-offset` locates the batch holding an offset
//! - `find-timestamp` locates the first record at or after a timestamp
//! - `max-timestamp` reports the largest timestamp and its offset
//!
//! The file is always opened read-only. `--config` validates a segment
//! configuration and checks the file against its `max_segment_bytes`; the
//! pre-allocation settings only matter when creating files and are ignored.
//! Log verbosity follows `RUST_LOG`.

mod report;

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tidelog_segment::{SegmentConfig, SegmentFile};
use tracing::{debug, warn};

/// Version string, pulled from Cargo.toml at compile time.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

/// Inspect TideLog segment files.
#[derive(Parser, Debug)]
#[command(name = "tidelog-dump", version = VERSION, about = "Inspect TideLog segment files")]
struct Cli {
    /// Segment file to inspect.
    file: PathBuf,

    /// JSON segment configuration to validate and check the file's size against.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the batches of the segment.
    Batches {
        /// Also list every record of each batch.
        #[arg(long)]
        records: bool,
        /// Check each batch's CRC against its contents.
        #[arg(long)]
        verify_crc: bool,
        /// Byte position of the first batch to list.
        #[arg(long, default_value_t = 0)]
        starting_position: u64,
    },
    /// Find the first batch whose last offset is at least OFFSET.
    FindOffset {
        offset: i64,
        #[arg(long, default_value_t = 0)]
        starting_position: u64,
    },
    /// Find the first record at or after TIMESTAMP (milliseconds).
    FindTimestamp {
        timestamp: i64,
        /// Ignore records below this offset.
        #[arg(long, default_value_t = 0)]
        starting_offset: i64,
        #[arg(long, default_value_t = 0)]
        starting_position: u64,
    },
    /// Report the largest timestamp in the segment.
    MaxTimestamp {
        #[arg(long, default_value_t = 0)]
        starting_position: u64,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let segment = SegmentFile::open(&cli.file, false, true, &config)
        .with_context(|| format!("opening segment {}", cli.file.display()))?;
    debug!(segment = %segment, size = segment.size_in_bytes(), "Inspecting segment");
    if !within_limit(&segment, &config) {
        warn!(
            segment = %segment,
            size = segment.size_in_bytes(),
            max_segment_bytes = config.max_segment_bytes,
            "Segment is larger than the configured maximum"
        );
    }

    run(&segment, cli.command, cli.json)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SegmentConfig> {
    let Some(path) = path else {
        return Ok(SegmentConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: SegmentConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(config)
}

fn within_limit(segment: &SegmentFile, config: &SegmentConfig) -> bool {
    segment.size_in_bytes() <= config.max_segment_bytes
}

fn run(segment: &SegmentFile, command: Command, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Batches {
            records,
            verify_crc,
            starting_position,
        } => {
            let summaries =
                report::summarize_batches(segment, starting_position, records, verify_crc)?;
            if json {
                print_json(&summaries)?;
            } else {
                println!("Dumping {}", segment.path().display());
                for summary in &summaries {
                    println!("{summary}");
                }
            }
        }
        Command::FindOffset {
            offset,
            starting_position,
        } => {
            let found = segment.search_for_offset_with_size(offset, starting_position)?;
            if json {
                print_json(&found)?;
            } else {
                match found {
                    Some(position) => println!("{position}"),
                    None => println!("offset {offset} not found"),
                }
            }
        }
        Command::FindTimestamp {
            timestamp,
            starting_offset,
            starting_position,
        } => {
            let found =
                segment.search_for_timestamp(timestamp, starting_position, starting_offset)?;
            if json {
                print_json(&found)?;
            } else {
                match found {
                    Some(hit) => println!("{hit}"),
                    None => println!("no record at or after timestamp {timestamp}"),
                }
            }
        }
        Command::MaxTimestamp { starting_position } => {
            let largest = segment.largest_timestamp_after(starting_position)?;
            if json {
                print_json(&largest)?;
            } else {
                println!("{largest}");
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
