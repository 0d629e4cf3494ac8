//! Beat-by-beat annotation of detected R-peaks.
//!
//! Only the RR interval and the QRS amplitude come from the signal. The P/T
//! wave and segment fields are placeholder constants carried by
//! [`AnnotationConfig`].

use crate::{
    detectors::ecg::{detect_r_peaks, PeakConfig},
    signal::{round3, Events, Waveform},
    simulate::{simulate_ecg, SignalError, SimulationConfig},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error("insufficient beats: found {found} peak(s), at least 2 are needed")]
    InsufficientBeats { found: usize },
}

/// Rhythm label assigned from the RR interval of a single beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Diagnosis {
    #[serde(rename = "Normal Sinus Rhythm")]
    NormalSinusRhythm,
    #[serde(rename = "Tachycardia/Bradycardia")]
    TachycardiaBradycardia,
}

impl Diagnosis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Diagnosis::NormalSinusRhythm => "Normal Sinus Rhythm",
            Diagnosis::TachycardiaBradycardia => "Tachycardia/Bradycardia",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the annotation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatRecord {
    #[serde(rename = "Beat_Index")]
    pub beat_index: usize,
    #[serde(rename = "P_Amp_mV")]
    pub p_amp_mv: f64,
    #[serde(rename = "QRS_Amp_mV")]
    pub qrs_amp_mv: f64,
    #[serde(rename = "T_Amp_mV")]
    pub t_amp_mv: f64,
    #[serde(rename = "P_Dur_s")]
    pub p_dur_s: f64,
    #[serde(rename = "QRS_Dur_s")]
    pub qrs_dur_s: f64,
    #[serde(rename = "T_Dur_s")]
    pub t_dur_s: f64,
    #[serde(rename = "PR_Dur_s")]
    pub pr_dur_s: f64,
    #[serde(rename = "ST_Dur_s")]
    pub st_dur_s: f64,
    #[serde(rename = "RP_Dur_s")]
    pub rp_dur_s: f64,
    #[serde(rename = "RR_Dur_s")]
    pub rr_dur_s: f64,
    #[serde(rename = "Diagnosis")]
    pub diagnosis: Diagnosis,
}

/// Sample positions marking one beat on the tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatMarkers {
    pub q: usize,
    pub r: usize,
    pub s: usize,
}

/// Placeholder morphology values and the rhythm window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub p_amp_mv: f64,
    pub t_amp_mv: f64,
    pub p_dur_s: f64,
    pub qrs_dur_s: f64,
    pub t_dur_s: f64,
    pub pr_dur_s: f64,
    pub st_dur_s: f64,
    /// Half-width of the QRS boundary window around each R-peak (seconds).
    pub qrs_window_s: f64,
    /// Shortest RR interval still labelled normal (seconds, inclusive).
    pub normal_rr_min_s: f64,
    /// Longest RR interval still labelled normal (seconds, inclusive).
    pub normal_rr_max_s: f64,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            p_amp_mv: 0.15,
            t_amp_mv: 0.3,
            p_dur_s: 0.10,
            qrs_dur_s: 0.08,
            t_dur_s: 0.16,
            pr_dur_s: 0.15,
            st_dur_s: 0.08,
            qrs_window_s: 0.05,
            normal_rr_min_s: 0.6,
            normal_rr_max_s: 1.0,
        }
    }
}

impl AnnotationConfig {
    pub fn classify(&self, rr_s: f64) -> Diagnosis {
        if (self.normal_rr_min_s..=self.normal_rr_max_s).contains(&rr_s) {
            Diagnosis::NormalSinusRhythm
        } else {
            Diagnosis::TachycardiaBradycardia
        }
    }

    fn window_samples(&self, sampling_rate: u32) -> usize {
        (self.qrs_window_s * sampling_rate as f64).floor().max(0.0) as usize
    }
}

/// Q/R/S markers for an R-peak, clamped to the tracing.
pub fn beat_markers(wave: &Waveform, r: usize, cfg: &AnnotationConfig) -> BeatMarkers {
    let half = cfg.window_samples(wave.sampling_rate);
    let last = wave.len().saturating_sub(1);
    BeatMarkers {
        q: r.saturating_sub(half),
        r,
        s: r.saturating_add(half).min(last),
    }
}

/// Build one [`BeatRecord`] per consecutive pair of peaks.
///
/// Fewer than two peaks is a failed analysis, never an empty table.
pub fn annotate_beats(
    wave: &Waveform,
    events: &Events,
    cfg: &AnnotationConfig,
) -> Result<Vec<BeatRecord>, AnalysisError> {
    if events.len() < 2 {
        return Err(AnalysisError::InsufficientBeats {
            found: events.len(),
        });
    }
    let fs = wave.fs();
    let records = events
        .indices
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let (r, next) = (pair[0], pair[1]);
            let markers = beat_markers(wave, r, cfg);
            let rr = (next - r) as f64 / fs;
            let rr_dur_s = round3(rr);
            BeatRecord {
                beat_index: i + 1,
                p_amp_mv: round3(cfg.p_amp_mv),
                qrs_amp_mv: round3(wave.amplitude[r] - wave.amplitude[markers.q]),
                t_amp_mv: round3(cfg.t_amp_mv),
                p_dur_s: round3(cfg.p_dur_s),
                qrs_dur_s: round3(cfg.qrs_dur_s),
                t_dur_s: round3(cfg.t_dur_s),
                pr_dur_s: round3(cfg.pr_dur_s),
                st_dur_s: round3(cfg.st_dur_s),
                rp_dur_s: round3(rr - cfg.pr_dur_s),
                rr_dur_s,
                diagnosis: cfg.classify(rr_dur_s),
            }
        })
        .collect();
    Ok(records)
}

/// Everything one analysis run produces. Owned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub waveform: Waveform,
    pub peaks: Events,
    pub markers: Vec<BeatMarkers>,
    pub records: Vec<BeatRecord>,
}

/// Simulate a tracing, detect its R-peaks and annotate every beat.
pub fn analyze<R: Rng + ?Sized>(
    sim: &SimulationConfig,
    peaks: &PeakConfig,
    annotation: &AnnotationConfig,
    rng: &mut R,
) -> Result<AnalysisResult, AnalysisError> {
    let waveform = simulate_ecg(sim, rng)?;
    analyze_waveform(waveform, peaks, annotation)
}

/// Detection and annotation over an existing tracing.
pub fn analyze_waveform(
    waveform: Waveform,
    peaks: &PeakConfig,
    annotation: &AnnotationConfig,
) -> Result<AnalysisResult, AnalysisError> {
    let events = detect_r_peaks(&waveform, peaks);
    let records = annotate_beats(&waveform, &events, annotation)?;
    let markers = events
        .indices
        .iter()
        .map(|&r| beat_markers(&waveform, r, annotation))
        .collect();
    Ok(AnalysisResult {
        waveform,
        peaks: events,
        markers,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn spiky_wave() -> Waveform {
        let mut data = vec![0.0; 1000];
        for (r, amp) in [(100usize, 1.2), (300, 1.0), (520, 1.4)] {
            data[r] = amp;
            data[r - 10] = 0.2;
        }
        Waveform::from_samples(200, data)
    }

    #[test]
    fn annotates_consecutive_peak_pairs() {
        let wave = spiky_wave();
        let events = Events::from_indices(vec![100, 300, 520]);
        let records = annotate_beats(&wave, &events, &AnnotationConfig::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].beat_index, 1);
        assert_eq!(records[1].beat_index, 2);
        assert_eq!(records[0].rr_dur_s, 1.0);
        assert_eq!(records[1].rr_dur_s, 1.1);
        assert_eq!(records[0].diagnosis, Diagnosis::NormalSinusRhythm);
        assert_eq!(records[1].diagnosis, Diagnosis::TachycardiaBradycardia);
        assert_eq!(records[0].qrs_amp_mv, 1.0);
        assert_eq!(records[1].qrs_amp_mv, 0.8);
        assert_eq!(records[0].rp_dur_s, 0.85);
        assert_eq!(records[0].p_amp_mv, 0.15);
        assert_eq!(records[0].st_dur_s, 0.08);
    }

    #[test]
    fn classification_window_is_inclusive() {
        let cfg = AnnotationConfig::default();
        assert_eq!(cfg.classify(0.6), Diagnosis::NormalSinusRhythm);
        assert_eq!(cfg.classify(1.0), Diagnosis::NormalSinusRhythm);
        assert_eq!(cfg.classify(0.599), Diagnosis::TachycardiaBradycardia);
        assert_eq!(cfg.classify(1.001), Diagnosis::TachycardiaBradycardia);
    }

    #[test]
    fn fewer_than_two_peaks_fails() {
        let wave = spiky_wave();
        for indices in [vec![], vec![300]] {
            let events = Events::from_indices(indices.clone());
            let err = annotate_beats(&wave, &events, &AnnotationConfig::default()).unwrap_err();
            assert!(matches!(
                err,
                AnalysisError::InsufficientBeats { found } if found == indices.len()
            ));
        }
    }

    #[test]
    fn markers_clamp_at_signal_edges() {
        let wave = Waveform::from_samples(200, vec![0.0; 100]);
        let cfg = AnnotationConfig::default();
        let head = beat_markers(&wave, 3, &cfg);
        assert_eq!((head.q, head.r, head.s), (0, 3, 13));
        let tail = beat_markers(&wave, 95, &cfg);
        assert_eq!((tail.q, tail.s), (85, 99));
    }

    #[test]
    fn oversized_qrs_window_spans_the_whole_tracing() {
        let wave = Waveform::from_samples(200, vec![0.0; 100]);
        let cfg = AnnotationConfig {
            qrs_window_s: 1e30,
            ..Default::default()
        };
        let m = beat_markers(&wave, 50, &cfg);
        assert_eq!((m.q, m.r, m.s), (0, 50, 99));
    }

    #[test]
    fn record_count_is_one_less_than_peak_count() {
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sim = SimulationConfig::default();
            match analyze(&sim, &PeakConfig::default(), &AnnotationConfig::default(), &mut rng) {
                Ok(result) => {
                    assert_eq!(result.records.len(), result.peaks.len() - 1);
                    assert_eq!(result.markers.len(), result.peaks.len());
                    for (i, (record, pair)) in result
                        .records
                        .iter()
                        .zip(result.peaks.indices.windows(2))
                        .enumerate()
                    {
                        assert_eq!(record.beat_index, i + 1);
                        let expected = round3((pair[1] - pair[0]) as f64 / 200.0);
                        assert_eq!(record.rr_dur_s, expected);
                        let normal = (0.6..=1.0).contains(&record.rr_dur_s);
                        assert_eq!(record.diagnosis == Diagnosis::NormalSinusRhythm, normal);
                    }
                }
                Err(AnalysisError::InsufficientBeats { found }) => assert!(found < 2),
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn short_clean_tracing_is_insufficient() {
        let sim = SimulationConfig {
            duration_s: 0.5,
            noise_scale: 0.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let err = analyze(&sim, &PeakConfig::default(), &AnnotationConfig::default(), &mut rng)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientBeats { found: 1 }));
    }

    #[test]
    fn diagnosis_serializes_as_label() {
        let js = serde_json::to_string(&Diagnosis::TachycardiaBradycardia).unwrap();
        assert_eq!(js, "\"Tachycardia/Bradycardia\"");
        assert_eq!(Diagnosis::NormalSinusRhythm.to_string(), "Normal Sinus Rhythm");
    }
}
