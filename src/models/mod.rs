pub mod merged;
pub mod observation;
pub mod station;

pub use merged::{MergedRecord, MERGED_COLUMNS};
pub use observation::{Observation, Reading};
pub use station::StationId;
