//! Telemetry ingestion.
//!
//! A telemetry file holds one interaction per line, whitespace separated:
//!
//! ```text
//! context initiator target
//! m1 explorer.exe http://www.virus.com
//! ```
//!
//! Lines with fewer than three tokens are skipped with a warning. Extra
//! trailing tokens are ignored (with a warning) and the first three are used.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::{Crawler, Interaction};

/// One classified telemetry line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Nothing but whitespace.
    Blank,
    /// Fewer than three tokens.
    Malformed,
    /// A usable interaction; `extra_tokens` is set when tokens followed the
    /// third one.
    Record {
        interaction: Interaction,
        extra_tokens: bool,
    },
}

/// Classifies a single telemetry line.
pub fn parse_line(line: &str) -> Line {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (None, _, _) => Line::Blank,
        (Some(context), Some(initiator), Some(target)) => Line::Record {
            interaction: Interaction::new(context, initiator, target),
            extra_tokens: tokens.next().is_some(),
        },
        _ => Line::Malformed,
    }
}

/// Counters from one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines read, blank ones included.
    pub lines: u64,
    /// Interactions written to both indexes.
    pub ingested: u64,
    /// Lines skipped for having fewer than three tokens or not being UTF-8.
    pub malformed: u64,
    /// Lines whose fields the store cannot hold (too long, NUL bytes).
    pub rejected: u64,
    /// Ingested lines that carried extra tokens; a subset of `ingested`.
    pub extra_tokens: u64,
}

impl Crawler {
    /// Ingests the telemetry file at `path`.
    pub fn ingest<P: AsRef<Path>>(&mut self, path: P) -> Result<IngestStats> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open telemetry file {}", path.display()))?;
        let stats = self.ingest_reader(BufReader::new(file))?;
        self.sync()?;
        info!(
            path = %path.display(),
            lines = stats.lines,
            ingested = stats.ingested,
            malformed = stats.malformed,
            rejected = stats.rejected,
            "ingested telemetry"
        );
        Ok(stats)
    }

    /// Ingests telemetry lines from any buffered reader.
    ///
    /// Bad lines (too few tokens, invalid UTF-8, fields the store cannot
    /// hold) are logged and skipped. A read or storage failure stops
    /// ingestion and is returned; interactions already written stay written.
    pub fn ingest_reader<R: BufRead>(&mut self, mut reader: R) -> Result<IngestStats> {
        anyhow::ensure!(self.is_open(), "crawler is not open");
        let mut stats = IngestStats::default();
        let mut buf = Vec::new();
        let mut line_no = 0u64;

        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .context("failed to read telemetry line")?;
            if n == 0 {
                break;
            }
            line_no += 1;
            stats.lines += 1;

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!(line_no, error = %e, "ignoring line that is not valid UTF-8");
                    stats.malformed += 1;
                    continue;
                }
            };
            let (interaction, extra_tokens) = match parse_line(line) {
                Line::Blank => continue,
                Line::Malformed => {
                    warn!(line_no, line = %line.trim_end(), "ignoring badly-formatted input line");
                    stats.malformed += 1;
                    continue;
                }
                Line::Record {
                    interaction,
                    extra_tokens,
                } => (interaction, extra_tokens),
            };

            match self.insert_mirrored(&interaction) {
                Ok(()) => {}
                Err(e) if e.is_validation() => {
                    warn!(line_no, error = %e, "ignoring line the store cannot hold");
                    stats.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e).context(format!("failed to store line {line_no}")),
            }
            if extra_tokens {
                warn!(line_no, line = %line.trim_end(), "ignoring extra data in line");
                stats.extra_tokens += 1;
            }
            stats.ingested += 1;
        }
        Ok(stats)
    }
}
