use crate::{annotate::BeatRecord, signal::Waveform};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Column headers of the exported annotation table, in order.
pub const ANNOTATION_COLUMNS: [&str; 12] = [
    "Beat_Index",
    "P_Amp_mV",
    "QRS_Amp_mV",
    "T_Amp_mV",
    "P_Dur_s",
    "QRS_Dur_s",
    "T_Dur_s",
    "PR_Dur_s",
    "ST_Dur_s",
    "RP_Dur_s",
    "RR_Dur_s",
    "Diagnosis",
];

/// Serialize the annotation table as comma-delimited text with a header row.
pub fn write_annotations<W: Write>(writer: W, records: &[BeatRecord]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(ANNOTATION_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_annotations_csv(path: &Path, records: &[BeatRecord]) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_annotations(file, records)
}

/// Annotation table as UTF-8 CSV text.
pub fn annotations_to_csv_string(records: &[BeatRecord]) -> Result<String> {
    let mut buf = Vec::new();
    write_annotations(&mut buf, records)?;
    Ok(String::from_utf8(buf)?)
}

pub fn read_annotations_csv(path: &Path) -> Result<Vec<BeatRecord>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening annotations {}", path.display()))?;
    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<BeatRecord>().enumerate() {
        let record = row.with_context(|| {
            format!("parsing annotation row {} in {}", idx + 1, path.display())
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write the tracing as `time_s,amplitude_mV` rows.
pub fn write_signal_csv(path: &Path, wave: &Waveform) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(["time_s", "amplitude_mV"])?;
    for (t, a) in wave.time.iter().zip(&wave.amplitude) {
        writer.write_record(&[t.to_string(), a.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// One worksheet cell. Numbers stay numbers so a sheet receives numeric
/// columns, and a CSV writer formats them as it formats the annotation export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(usize),
    Number(f64),
    Text(String),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

/// Header row followed by one row of cell values per beat.
pub fn table_rows(records: &[BeatRecord]) -> Vec<Vec<Cell>> {
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(ANNOTATION_COLUMNS.iter().map(|&c| Cell::from(c)).collect());
    for r in records {
        rows.push(vec![
            Cell::Integer(r.beat_index),
            Cell::Number(r.p_amp_mv),
            Cell::Number(r.qrs_amp_mv),
            Cell::Number(r.t_amp_mv),
            Cell::Number(r.p_dur_s),
            Cell::Number(r.qrs_dur_s),
            Cell::Number(r.t_dur_s),
            Cell::Number(r.pr_dur_s),
            Cell::Number(r.st_dur_s),
            Cell::Number(r.rp_dur_s),
            Cell::Number(r.rr_dur_s),
            Cell::Text(r.diagnosis.to_string()),
        ]);
    }
    rows
}
