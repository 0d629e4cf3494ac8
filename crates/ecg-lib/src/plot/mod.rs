use crate::annotate::AnalysisResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Discrete points drawn as filled circles; `style.width` is the radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Markers(MarkerSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Markers(markers) => &markers.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Data extent as `(x_min, x_max, y_min, y_max)`, or `None` without points.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

pub const TRACE_COLOR: u32 = 0x1F77B4;
pub const R_PEAK_COLOR: u32 = 0xFF0000;
pub const QRS_BOUND_COLOR: u32 = 0x2CA02C;

/// ECG tracing with R-peak markers and Q/S boundary markers.
pub fn figure_from_analysis(result: &AnalysisResult, max_points: usize) -> Figure {
    let wave = &result.waveform;
    let at = |i: usize| [wave.time[i], wave.amplitude[i]];
    let trace: Vec<[f64; 2]> = (0..wave.len()).map(at).collect();

    let mut fig = Figure::new(Some(format!(
        "ECG Tracing (Sampling Rate: {} Hz)",
        wave.sampling_rate
    )));
    fig.x.label = Some("Time (s)".into());
    fig.y.label = Some("Amplitude (mV)".into());
    fig.add_series(Series::Line(LineSeries {
        name: "ECG".into(),
        points: decimate_points(&trace, max_points),
        style: Style {
            width: 1.4,
            color: Color(TRACE_COLOR),
        },
    }));
    fig.add_series(Series::Markers(MarkerSeries {
        name: "QRS bounds".into(),
        points: result
            .markers
            .iter()
            .flat_map(|m| [at(m.q), at(m.s)])
            .collect(),
        style: Style {
            width: 2.5,
            color: Color(QRS_BOUND_COLOR),
        },
    }));
    fig.add_series(Series::Markers(MarkerSeries {
        name: "R-Peaks".into(),
        points: result.peaks.indices.iter().map(|&i| at(i)).collect(),
        style: Style {
            width: 4.0,
            color: Color(R_PEAK_COLOR),
        },
    }));
    fig
}
