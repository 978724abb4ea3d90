// Output files: naming, relocation from staging, and disk/memory usage

pub mod layout;
pub mod relocator;
pub mod stats;

pub use layout::{MediaCategory, OutputLayout};
pub use relocator::{FileRelocator, RelocationError, RelocationProgress};
pub use stats::{StatsProbe, UsageStats};
