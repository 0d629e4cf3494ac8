use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};

/// Time-domain variability of an RR series (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HRVTime {
    pub n: usize,
    pub avnn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
}

/// Time-domain variability over the beat-to-beat intervals of an annotation
/// table. Fewer than two intervals leave the dispersion terms at zero.
pub fn hrv_time(rr: &RRSeries) -> HRVTime {
    let n = rr.rr.len();
    if n == 0 {
        return HRVTime {
            n,
            avnn: 0.0,
            sdnn: 0.0,
            rmssd: 0.0,
            pnn50: 0.0,
        };
    }
    let avnn = rr.rr.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return HRVTime {
            n,
            avnn,
            sdnn: 0.0,
            rmssd: 0.0,
            pnn50: 0.0,
        };
    }
    let dof = (n - 1) as f64;
    let sdnn = (rr.rr.iter().map(|x| (x - avnn).powi(2)).sum::<f64>() / dof).sqrt();
    let deltas: Vec<f64> = rr.rr.windows(2).map(|w| w[1] - w[0]).collect();
    let rmssd = (deltas.iter().map(|d| d * d).sum::<f64>() / dof).sqrt();
    // successive differences above 50 ms
    let pnn50 = deltas.iter().filter(|d| d.abs() > 0.050).count() as f64 / dof;
    HRVTime {
        n,
        avnn,
        sdnn,
        rmssd,
        pnn50,
    }
}
