pub mod meter;
pub mod recorder;
pub mod reservoir;

pub use meter::{Ewma, Meter, RateWindow};
pub use recorder::{MetricsRecorder, MetricsSnapshot};
pub use reservoir::{SlidingWindowReservoir, Snapshot};
