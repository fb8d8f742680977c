pub mod log_entry;
pub mod query;

pub use log_entry::LogEntry;
pub use query::{
    Analysis, AnalysisResult, Pattern, PatternConfig, Query, QueryBuilder, TimeRange,
};
