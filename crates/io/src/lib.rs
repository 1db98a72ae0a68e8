use anyhow::{Context, Result};
use std::{fs::File, io::{BufRead, Write}, path::Path};
use serde::{Serialize, Deserialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use model::*;

/// Write the lap log in the format implied by the file extension
/// (`.ndjson`/`.jsonl` → NDJSON, anything else → CSV).
pub fn export_laps(laps: &[LapRecord], path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ndjson") | Some("jsonl") => export_laps_ndjson(laps, path),
        _ => export_laps_csv(laps, path),
    }
}

pub fn export_laps_csv(laps: &[LapRecord], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for l in laps {
        w.serialize(CsvRow {
            lap_number: l.lap_number,
            completed_at: l.completed_at.format(&Rfc3339)?,
        })?;
    }
    w.flush()?;
    Ok(())
}

pub fn import_laps_csv(path: &Path) -> Result<Vec<LapRecord>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut laps = vec![];
    for rec in rdr.deserialize() {
        let r: CsvRow = rec?;
        laps.push(LapRecord {
            lap_number: r.lap_number,
            completed_at: OffsetDateTime::parse(&r.completed_at, &Rfc3339)
                .with_context(|| format!("lap {} timestamp", r.lap_number))?,
        });
    }
    Ok(laps)
}

pub fn import_laps_ndjson(path: &Path) -> Result<Vec<LapRecord>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = std::io::BufReader::new(f);
    let mut laps = vec![];
    for line in rdr.lines() {
        let s = line?;
        if s.trim().is_empty() { continue; }
        let l: LapRecord = serde_json::from_str(&s)?;
        laps.push(l);
    }
    Ok(laps)
}

pub fn export_laps_ndjson(laps: &[LapRecord], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = std::io::BufWriter::new(f);
    for l in laps {
        let s = serde_json::to_string(l)?;
        writeln!(w, "{}", s)?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct CsvRow {
    lap_number: u32,
    completed_at: String,
}
