use crate::{Crawler, Interaction};
use anyhow::Result;
use std::io::Cursor;
use std::path::Path;

/// Creates a crawler under `dir` and ingests `telemetry`.
pub fn crawler_with(dir: &Path, telemetry: &str) -> Result<Crawler> {
    let mut crawler = Crawler::new();
    crawler.create(dir.join("web"), 100)?;
    crawler.ingest_reader(Cursor::new(telemetry.as_bytes()))?;
    Ok(crawler)
}

/// The three-interaction dataset used throughout: a.exe launched b.exe and
/// c.exe; z launched a.exe.
pub const SMALL: &str = "m1 a.exe b.exe\nm2 a.exe c.exe\nm3 z a.exe\n";

pub fn ix(context: &str, initiator: &str, target: &str) -> Interaction {
    Interaction::new(context, initiator, target)
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
