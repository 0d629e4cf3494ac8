pub mod annotate;
pub mod detectors;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod signal;
pub mod simulate;

pub use annotate::*;
pub use detectors::*;
pub use metrics::*;
pub use signal::*;
pub use simulate::*;
