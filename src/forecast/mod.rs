pub mod engine;
pub mod features;
pub mod writer;

pub use engine::*;
pub use features::{required_lookback, CalendarFeatures, FeatureEngineer, WindowStats};
pub use writer::ForecastWriter;

/// Number of hourly predictions per run
pub const HORIZON_HOURS: usize = 24;
