use crate::signal::{Events, Waveform};
use log::debug;
use serde::{Deserialize, Serialize};

/// Thresholds for the R-peak picker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Minimum amplitude a local maximum must reach to count as a beat (mV).
    pub min_height: f64,
    /// Minimum separation between accepted peaks (seconds).
    pub min_distance_s: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            min_height: 0.5,
            min_distance_s: 0.5,
        }
    }
}

impl PeakConfig {
    /// Minimum separation in samples, never less than one.
    pub fn distance_samples(&self, sampling_rate: u32) -> usize {
        ((sampling_rate as f64 * self.min_distance_s).floor() as usize).max(1)
    }
}

/// Locate R-peaks: local maxima at or above `min_height`, thinned so no two
/// survivors are closer than the configured distance. Higher peaks win.
pub fn detect_r_peaks(wave: &Waveform, cfg: &PeakConfig) -> Events {
    let distance = cfg.distance_samples(wave.sampling_rate);
    let peaks = find_peaks(&wave.amplitude, cfg.min_height, distance);
    debug!(
        "detected {} peak(s) over {} samples (height >= {}, distance >= {})",
        peaks.len(),
        wave.len(),
        cfg.min_height,
        distance
    );
    Events::from_indices(peaks)
}

/// Height- and distance-filtered local maxima, in ascending index order.
pub fn find_peaks(data: &[f64], min_height: f64, distance: usize) -> Vec<usize> {
    let candidates: Vec<usize> = local_maxima(data)
        .into_iter()
        .filter(|&i| data[i] >= min_height)
        .collect();
    select_by_distance(data, &candidates, distance.max(1))
}

/// Strict local maxima; a flat top counts once, at its midpoint. The first
/// and last samples are never maxima.
fn local_maxima(data: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if data.len() < 3 {
        return peaks;
    }
    let last = data.len() - 1;
    let mut i = 1;
    while i < last {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < last && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                let left = i;
                let right = ahead - 1;
                peaks.push((left + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

fn select_by_distance(data: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    // Highest first; ties go to the later peak, like a stable ascending sort walked backwards.
    order.sort_by(|&a, &b| data[peaks[a]].total_cmp(&data[peaks[b]]));
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}
