use crate::{
    annotate::{BeatRecord, Diagnosis},
    metrics::hrv::{hrv_time, HRVTime},
    signal::RRSeries,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reductions over an annotation table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub beats: usize,
    /// Most frequent label; ties resolve to the first label in sort order.
    pub overall_rhythm: Diagnosis,
    pub mean_rr_s: f64,
    /// 60 / mean RR
    pub heart_rate_bpm: f64,
    pub normal_beats: usize,
    pub hrv: HRVTime,
}

pub fn summarize(records: &[BeatRecord]) -> Option<Summary> {
    if records.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<Diagnosis, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.diagnosis).or_default() += 1;
    }
    let top = counts.values().copied().max().unwrap_or(0);
    let overall_rhythm = counts
        .iter()
        .find(|(_, &count)| count == top)
        .map(|(&label, _)| label)?;
    let rr = RRSeries {
        rr: records.iter().map(|r| r.rr_dur_s).collect(),
    };
    let hrv = hrv_time(&rr);
    let mean_rr_s = hrv.avnn;
    let heart_rate_bpm = if mean_rr_s > 0.0 { 60.0 / mean_rr_s } else { 0.0 };
    Some(Summary {
        beats: records.len(),
        overall_rhythm,
        mean_rr_s,
        heart_rate_bpm,
        normal_beats: counts
            .get(&Diagnosis::NormalSinusRhythm)
            .copied()
            .unwrap_or(0),
        hrv,
    })
}
