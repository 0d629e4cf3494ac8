use serde::{Deserialize, Serialize};

/// Uniformly sampled waveform with its time axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveform {
    /// Samples per second
    pub sampling_rate: u32,
    /// Seconds since the start of the recording
    pub time: Vec<f64>,
    /// Amplitude in mV
    pub amplitude: Vec<f64>,
}

impl Waveform {
    pub fn len(&self) -> usize {
        self.amplitude.len()
    }
    pub fn is_empty(&self) -> bool {
        self.amplitude.is_empty()
    }
    pub fn fs(&self) -> f64 {
        self.sampling_rate as f64
    }
    pub fn duration(&self) -> f64 {
        self.amplitude.len() as f64 / self.fs()
    }

    /// Build a waveform from raw samples, deriving the time axis from the rate.
    pub fn from_samples(sampling_rate: u32, amplitude: Vec<f64>) -> Self {
        let fs = sampling_rate.max(1) as f64;
        let time = (0..amplitude.len()).map(|i| i as f64 / fs).collect();
        Self {
            sampling_rate,
            time,
            amplitude,
        }
    }
}

/// Point events on a timeline (e.g., R-peaks indices)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: f64) -> Self {
        let mut rr = Vec::new();
        for w in events.indices.windows(2) {
            let dt = (w[1] as f64 - w[0] as f64) / fs;
            rr.push(dt);
        }
        Self { rr }
    }
}

/// Round to three decimals, the precision of every exported measurement.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_axis_follows_sampling_rate() {
        let wave = Waveform::from_samples(250, vec![0.0; 500]);
        assert_eq!(wave.time.len(), 500);
        assert!((wave.time[1] - 0.004).abs() < 1e-12);
        assert!((wave.duration() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn rr_series_from_events() {
        let events = Events::from_indices(vec![100, 300, 520]);
        let rr = RRSeries::from_events(&events, 200.0);
        assert_eq!(rr.rr.len(), 2);
        assert!((rr.rr[0] - 1.0).abs() < 1e-12);
        assert!((rr.rr[1] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn rounds_to_three_decimals() {
        assert_eq!(round3(0.83333), 0.833);
        assert_eq!(round3(1.1), 1.1);
    }
}
