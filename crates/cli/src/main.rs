//! # CLI - Spider Interactive Shell
//!
//! A REPL-style front end for the interaction crawler. Reads commands from
//! stdin, runs them against a [`Crawler`], and prints results to stdout.
//! Logs go to stderr, so piping commands in and reading stdout back works
//! for scripted use.
//!
//! ## Commands
//!
//! ```text
//! CREATE [prefix] [max_items]   Create (or replace) both stores
//! OPEN [prefix]                 Open existing stores
//! CLOSE                         Close both stores
//! INGEST path                   Load a telemetry file
//! CRAWL [threshold] seed...     Crawl from seeds (threshold defaults to config)
//! PURGE entity                  Remove every interaction touching entity
//! PREVALENCE entity             Count interactions touching entity
//! INTERACTIONS entity           List interactions touching entity
//! STATS                         Print store debug info
//! EXIT / QUIT                   Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! SPIDER_PREFIX          store path prefix            (default: "data/spider")
//! SPIDER_MAX_ITEMS       capacity hint for CREATE     (default: 100000)
//! SPIDER_MIN_PREVALENCE  default CRAWL threshold      (default: 10)
//! SPIDER_LOAD_FACTOR     buckets per expected item    (default: 1.333)
//! RUST_LOG               log filter                   (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! Spider started (prefix=data/spider, max_items=100000, min_prevalence=10)
//! > INGEST jan.txt
//! OK (lines=3, ingested=3, malformed=0, rejected=0)
//! > CRAWL 3 a.exe
//! bad a.exe
//! bad b.exe
//! edge m1 a.exe b.exe
//! (2 bad entities, 1 interactions)
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use config::Config;
use crawler::{store_paths, Crawler};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Creates the directory a store prefix lives in, if it has one.
fn ensure_parent(prefix: &Path) -> Result<()> {
    if let Some(parent) = prefix.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct Shell {
    crawler: Crawler,
    config: Config,
}

impl Shell {
    fn new(config: Config) -> Self {
        Self {
            crawler: Crawler::new(),
            config,
        }
    }

    /// Opens the configured stores if both files exist, otherwise creates
    /// them.
    fn open_or_create(&mut self) -> Result<()> {
        let prefix = self.config.prefix.clone();
        let (a, b) = store_paths(&prefix);
        if a.exists() && b.exists() {
            self.crawler.open(&prefix)
        } else {
            if a.exists() || b.exists() {
                warn!(prefix = %prefix.display(), "only one store file present, recreating both");
            }
            self.create(&prefix, self.config.max_items)
        }
    }

    fn create(&mut self, prefix: &Path, max_items: u32) -> Result<()> {
        ensure_parent(prefix)?;
        self.crawler
            .create_with_load_factor(prefix, max_items, self.config.load_factor)
    }

    /// Runs one command line, writing its output to `out`.
    fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Flow> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(Flow::Continue);
        };

        match cmd.to_uppercase().as_str() {
            "CREATE" => {
                let prefix = parts
                    .next()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.config.prefix.clone());
                let max_items = match parts.next().map(str::parse::<u32>) {
                    None => self.config.max_items,
                    Some(Ok(n)) => n,
                    Some(Err(_)) => {
                        writeln!(out, "ERR usage: CREATE [prefix] [max_items]")?;
                        return Ok(Flow::Continue);
                    }
                };
                match self.create(&prefix, max_items) {
                    Ok(()) => writeln!(out, "OK")?,
                    Err(e) => writeln!(out, "ERR create failed: {e:#}")?,
                }
            }
            "OPEN" => {
                let prefix = parts
                    .next()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.config.prefix.clone());
                match self.crawler.open(&prefix) {
                    Ok(()) => writeln!(out, "OK")?,
                    Err(e) => writeln!(out, "ERR open failed: {e:#}")?,
                }
            }
            "CLOSE" => {
                self.crawler.close();
                writeln!(out, "OK")?;
            }
            "INGEST" => {
                if let Some(path) = parts.next() {
                    match self.crawler.ingest(path) {
                        Ok(stats) => writeln!(
                            out,
                            "OK (lines={}, ingested={}, malformed={}, rejected={})",
                            stats.lines, stats.ingested, stats.malformed, stats.rejected
                        )?,
                        Err(e) => writeln!(out, "ERR ingest failed: {e:#}")?,
                    }
                } else {
                    writeln!(out, "ERR usage: INGEST path")?;
                }
            }
            "CRAWL" => {
                let mut args: Vec<&str> = parts.collect();
                let threshold = match args.first().and_then(|s| s.parse::<u32>().ok()) {
                    Some(t) => {
                        args.remove(0);
                        t
                    }
                    None => self.config.min_prevalence,
                };
                if args.is_empty() {
                    writeln!(out, "ERR usage: CRAWL [threshold] seed [seed...]")?;
                    return Ok(Flow::Continue);
                }
                match self.crawler.crawl(&args, threshold) {
                    Ok(report) => {
                        for entity in &report.bad_entities {
                            writeln!(out, "bad {entity}")?;
                        }
                        for interaction in &report.interactions {
                            writeln!(out, "edge {interaction}")?;
                        }
                        writeln!(
                            out,
                            "({} bad entities, {} interactions)",
                            report.bad_count(),
                            report.interactions.len()
                        )?;
                    }
                    Err(e) => writeln!(out, "ERR crawl failed: {e:#}")?,
                }
            }
            "PURGE" => {
                if let Some(entity) = parts.next() {
                    match self.crawler.purge(entity) {
                        Ok(true) => writeln!(out, "OK")?,
                        Ok(false) => writeln!(out, "(nothing to purge)")?,
                        Err(e) => writeln!(out, "ERR purge failed: {e:#}")?,
                    }
                } else {
                    writeln!(out, "ERR usage: PURGE entity")?;
                }
            }
            "PREVALENCE" => {
                if let Some(entity) = parts.next() {
                    match self.crawler.prevalence(entity) {
                        Ok(n) => writeln!(out, "{n}")?,
                        Err(e) => writeln!(out, "ERR prevalence failed: {e:#}")?,
                    }
                } else {
                    writeln!(out, "ERR usage: PREVALENCE entity")?;
                }
            }
            "INTERACTIONS" => {
                if let Some(entity) = parts.next() {
                    match self.crawler.interactions_of(entity) {
                        Ok(found) if found.is_empty() => writeln!(out, "(empty)")?,
                        Ok(found) => {
                            for interaction in &found {
                                writeln!(out, "{interaction}")?;
                            }
                            writeln!(out, "({} interactions)", found.len())?;
                        }
                        Err(e) => writeln!(out, "ERR lookup failed: {e:#}")?,
                    }
                } else {
                    writeln!(out, "ERR usage: INTERACTIONS entity")?;
                }
            }
            "STATS" => {
                writeln!(out, "{:?}", self.crawler)?;
            }
            "EXIT" | "QUIT" => {
                writeln!(out, "bye")?;
                return Ok(Flow::Exit);
            }
            other => {
                writeln!(out, "unknown command: {other}")?;
            }
        }
        Ok(Flow::Continue)
    }
}

fn main() -> Result<()> {
    install_tracing_subscriber();
    let config = Config::from_env();
    config.validate()?;

    let mut shell = Shell::new(config);
    shell.open_or_create()?;
    info!(prefix = %shell.config.prefix.display(), "stores ready");

    println!(
        "Spider started (prefix={}, max_items={}, min_prevalence={})",
        shell.config.prefix.display(),
        shell.config.max_items,
        shell.config.min_prevalence
    );
    println!("Commands: CREATE [prefix] [max_items] | OPEN [prefix] | CLOSE | INGEST path");
    println!("          CRAWL [threshold] seed... | PURGE entity | PREVALENCE entity");
    println!("          INTERACTIONS entity | STATS | EXIT");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write!(out, "> ")?;
    out.flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if shell.execute(&line, &mut out)? == Flow::Exit {
            break;
        }
        write!(out, "> ")?;
        out.flush()?;
    }

    shell.crawler.close();
    Ok(())
}
