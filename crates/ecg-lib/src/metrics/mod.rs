pub mod hrv;
pub mod summary;
