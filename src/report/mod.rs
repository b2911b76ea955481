pub mod storage;
pub mod types;

pub use storage::{ReportFormat, ReportWriter};
pub use types::{Report, ReportError};
