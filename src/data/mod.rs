//! Input data: CSV loading, hourly resampling and alignment

pub mod align;
pub mod loader;

pub use align::{align, AlignedTable};
pub use loader::{load_table, parse_timestamp, DataLoader, SourceTables};
